use std::sync::Arc;

use axum::extract::{FromRef, FromRequestParts};
use axum::http::HeaderMap;
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;

use super::error::AuthError;
use crate::token::{AccessTokenSigner, TokenError};
use crate::types::{Subject, UserProfile};

/// Authenticated caller, decoded from the `Authorization: Bearer` access token.
///
/// Use as an Axum extractor in route handlers. Rejects with `401 Unauthorized`
/// when the token is missing, malformed, expired or forged. Works with any
/// router state from which an `Arc<AccessTokenSigner>` can be extracted.
///
/// # Example
///
/// ```rust,ignore
/// async fn protected(user: AuthUser) -> impl IntoResponse {
///     format!("Hello, {} ({})", user.profile.name, user.sub())
/// }
/// ```
#[derive(Debug, Clone)]
pub struct AuthUser {
    /// Profile claims carried by the access token.
    pub profile: UserProfile,
}

impl AuthUser {
    #[must_use]
    pub fn sub(&self) -> &Subject {
        &self.profile.sub
    }
}

impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
    Arc<AccessTokenSigner>: FromRef<S>,
{
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let token = bearer_token(&parts.headers)?;
        let signer = Arc::<AccessTokenSigner>::from_ref(state);
        let profile = signer.verify(token)?;
        Ok(Self { profile })
    }
}

/// Extract the bearer token from the `Authorization` header.
///
/// # Errors
///
/// [`TokenError::Missing`] without the header, [`TokenError::Malformed`] when
/// it is not `Bearer <token>`.
pub fn bearer_token(headers: &HeaderMap) -> Result<&str, TokenError> {
    let value = headers
        .get(AUTHORIZATION)
        .ok_or(TokenError::Missing)?
        .to_str()
        .map_err(|_| TokenError::Malformed)?;
    let (scheme, token) = value.split_once(' ').ok_or(TokenError::Malformed)?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return Err(TokenError::Malformed);
    }
    let token = token.trim();
    if token.is_empty() {
        return Err(TokenError::Malformed);
    }
    Ok(token)
}

#[cfg(test)]
mod tests {
    use axum::http::HeaderValue;

    use super::*;

    fn headers(value: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, HeaderValue::from_str(value).unwrap());
        headers
    }

    #[test]
    fn missing_header() {
        assert_eq!(bearer_token(&HeaderMap::new()), Err(TokenError::Missing));
    }

    #[test]
    fn bearer_scheme_is_case_insensitive() {
        assert_eq!(bearer_token(&headers("Bearer abc")), Ok("abc"));
        assert_eq!(bearer_token(&headers("bearer abc")), Ok("abc"));
    }

    #[test]
    fn malformed_headers() {
        assert_eq!(bearer_token(&headers("Bearer")), Err(TokenError::Malformed));
        assert_eq!(bearer_token(&headers("Bearer   ")), Err(TokenError::Malformed));
        assert_eq!(bearer_token(&headers("Basic abc")), Err(TokenError::Malformed));
    }
}
