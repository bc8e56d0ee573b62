use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::types::{RefreshTokenHash, SealedGrant, Subject, UserProfile};

/// External identity assertion presented to `POST /auth/google`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Assertion {
    /// Google ID token (Sign In With Google "credential").
    IdToken(String),
    /// Authorization code from the Google code client.
    AuthorizationCode {
        code: String,
        /// Must match the URI used to obtain the code; `None` means the
        /// configured default.
        redirect_uri: Option<String>,
    },
}

/// Outcome of a successful assertion check.
#[derive(Debug, Clone)]
pub struct VerifiedIdentity {
    pub profile: UserProfile,
    /// Delegated Google refresh token, plaintext. Sealed before storage.
    pub grant: Option<String>,
}

/// Durable per-user record.
///
/// Keyed by `sub`. Holds at most one refresh token hash: writing a new one
/// invalidates the previous session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserRecord {
    pub sub: Subject,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub picture: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token_hash: Option<RefreshTokenHash>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub google_grant: Option<SealedGrant>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub last_login_at: OffsetDateTime,
}

impl UserRecord {
    /// Profile snapshot used for access token claims.
    #[must_use]
    pub fn profile(&self) -> UserProfile {
        UserProfile {
            sub: self.sub.clone(),
            email: self.email.clone(),
            name: self.name.clone(),
            picture: self.picture.clone(),
        }
    }
}

/// Everything a successful login writes to the user record.
///
/// Passed to [`UserStore::upsert_login`](super::UserStore::upsert_login).
/// `google_grant: None` keeps whatever grant is already stored.
#[derive(Debug, Clone)]
pub struct LoginUpdate {
    pub profile: UserProfile,
    pub refresh_token_hash: RefreshTokenHash,
    pub google_grant: Option<SealedGrant>,
    pub at: OffsetDateTime,
}

/// Body of `POST /auth/google`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct LoginRequest {
    #[serde(default)]
    pub(super) credential: Option<String>,
    #[serde(default)]
    pub(super) code: Option<String>,
    #[serde(default)]
    pub(super) redirect_uri: Option<String>,
}

impl LoginRequest {
    /// `credential` wins when both are present; blank values count as absent.
    pub(super) fn into_assertion(self) -> Option<Assertion> {
        let non_blank = |v: Option<String>| v.filter(|s| !s.trim().is_empty());
        if let Some(credential) = non_blank(self.credential) {
            return Some(Assertion::IdToken(credential));
        }
        non_blank(self.code).map(|code| Assertion::AuthorizationCode {
            code,
            redirect_uri: non_blank(self.redirect_uri),
        })
    }
}
