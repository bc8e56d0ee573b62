use std::time::{Duration, Instant};

use jsonwebtoken::jwk::JwkSet;
use jsonwebtoken::{Algorithm, DecodingKey, Validation};
use serde::Deserialize;
use tokio::sync::RwLock;
use url::Url;

use crate::error::Error;
use crate::issuer::{Assertion, IdentityVerifier, VerifiedIdentity};
use crate::types::UserProfile;

const GOOGLE_ISSUERS: [&str; 2] = ["accounts.google.com", "https://accounts.google.com"];
const JWKS_TTL: Duration = Duration::from_secs(60 * 60);
/// Minimum age of a fresh key set before an unknown `kid` may refetch it.
const JWKS_REFETCH_COOLDOWN: Duration = Duration::from_secs(60);

/// Google `OAuth2` / OpenID Connect configuration.
///
/// ```rust,ignore
/// use backtime_auth::google::GoogleConfig;
///
/// let config = GoogleConfig::new(
///     "1234.apps.googleusercontent.com",
///     "client-secret",
///     "https://backtime.example.com".parse()?,
/// );
/// ```
#[derive(Debug, Clone)]
#[non_exhaustive]
pub struct GoogleConfig {
    pub(crate) client_id: String,
    pub(crate) client_secret: String,
    pub(crate) redirect_uri: Url,
    pub(crate) token_url: Url,
    pub(crate) certs_url: Url,
}

impl GoogleConfig {
    #[must_use]
    pub fn new(
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
        redirect_uri: Url,
    ) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            redirect_uri,
            token_url: "https://oauth2.googleapis.com/token"
                .parse()
                .expect("valid default URL"),
            certs_url: "https://www.googleapis.com/oauth2/v3/certs"
                .parse()
                .expect("valid default URL"),
        }
    }

    /// Override the token endpoint.
    #[must_use]
    pub fn with_token_url(mut self, url: Url) -> Self {
        self.token_url = url;
        self
    }

    /// Override the JWKS endpoint used to verify ID tokens.
    #[must_use]
    pub fn with_certs_url(mut self, url: Url) -> Self {
        self.certs_url = url;
        self
    }

    /// `OAuth2` client ID, also the expected ID token audience.
    #[must_use]
    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    /// Redirect URI used when the login request does not name one.
    #[must_use]
    pub fn redirect_uri(&self) -> &Url {
        &self.redirect_uri
    }

    #[must_use]
    pub fn token_url(&self) -> &Url {
        &self.token_url
    }

    #[must_use]
    pub fn certs_url(&self) -> &Url {
        &self.certs_url
    }
}

/// Token response from the Google token endpoint.
#[derive(Debug, Clone, Deserialize)]
#[non_exhaustive]
pub struct GoogleTokenResponse {
    pub access_token: String,
    #[serde(default)]
    pub id_token: Option<String>,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub expires_in: Option<u64>,
    #[serde(default)]
    pub scope: Option<String>,
}

#[derive(Debug, Deserialize)]
struct IdTokenClaims {
    sub: String,
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    picture: Option<String>,
}

struct CachedKeys {
    keys: JwkSet,
    fetched_at: Instant,
}

/// Verifies Google identity assertions.
///
/// ID tokens are checked against Google's published signing keys, which are
/// cached for an hour and refetched early when a token names an unknown `kid`.
pub struct GoogleClient {
    config: GoogleConfig,
    http: reqwest::Client,
    jwks: RwLock<Option<CachedKeys>>,
}

impl GoogleClient {
    #[must_use]
    pub fn new(config: GoogleConfig) -> Self {
        Self {
            config,
            http: reqwest::Client::new(),
            jwks: RwLock::new(None),
        }
    }

    /// Use a custom HTTP client (for connection pool reuse or testing).
    #[must_use]
    pub fn with_http_client(mut self, client: reqwest::Client) -> Self {
        self.http = client;
        self
    }

    #[must_use]
    pub fn config(&self) -> &GoogleConfig {
        &self.config
    }

    /// Exchange an authorization code for Google tokens.
    ///
    /// `redirect_uri` must match the one used to obtain the code; the
    /// configured redirect URI is used when `None`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Http`] on network failure, or
    /// [`Error::Google`] if the token endpoint returns an error.
    pub async fn exchange_code(
        &self,
        code: &str,
        redirect_uri: Option<&str>,
    ) -> Result<GoogleTokenResponse, Error> {
        let redirect_uri = redirect_uri.unwrap_or(self.config.redirect_uri.as_str());
        let params = [
            ("grant_type", "authorization_code"),
            ("code", code),
            ("redirect_uri", redirect_uri),
            ("client_id", self.config.client_id.as_str()),
            ("client_secret", self.config.client_secret.as_str()),
        ];

        let response = self
            .http
            .post(self.config.token_url.clone())
            .form(&params)
            .send()
            .await?;

        let response = Self::ensure_success(response, "token exchange").await?;
        response
            .json::<GoogleTokenResponse>()
            .await
            .map_err(Into::into)
    }

    /// Verify a Google ID token and extract the profile it asserts.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Token`] if the signature, audience, issuer or expiry
    /// check fails, or [`Error::Http`]/[`Error::Google`] if the signing keys
    /// cannot be fetched.
    pub async fn verify_id_token(&self, id_token: &str) -> Result<UserProfile, Error> {
        let header =
            jsonwebtoken::decode_header(id_token).map_err(|e| Error::Token(e.to_string()))?;
        let kid = header
            .kid
            .ok_or_else(|| Error::Token("missing header claim: kid".into()))?;
        let key = self.decoding_key(&kid).await?;

        let mut validation = Validation::new(Algorithm::RS256);
        validation.set_audience(&[self.config.client_id.as_str()]);
        validation.set_issuer(&GOOGLE_ISSUERS);

        let claims = jsonwebtoken::decode::<IdTokenClaims>(id_token, &key, &validation)
            .map_err(|e| Error::Token(e.to_string()))?
            .claims;

        Ok(UserProfile::new(claims.sub)
            .with_email(claims.email.unwrap_or_default())
            .with_name(claims.name.unwrap_or_default())
            .with_picture(claims.picture.unwrap_or_default()))
    }

    async fn decoding_key(&self, kid: &str) -> Result<DecodingKey, Error> {
        if let Some(key) = cached_key(self.jwks.read().await.as_ref(), kid) {
            return key;
        }

        let mut cache = self.jwks.write().await;
        // Another request may have refetched while we waited for the lock.
        if let Some(key) = cached_key(cache.as_ref(), kid) {
            return key;
        }

        tracing::debug!(kid = %kid, "Fetching Google signing keys");
        let response = self.http.get(self.config.certs_url.clone()).send().await?;
        let response = Self::ensure_success(response, "signing key fetch").await?;
        let keys = response.json::<JwkSet>().await?;

        let key = keys
            .find(kid)
            .map(DecodingKey::from_jwk)
            .transpose()
            .map_err(|e| Error::Token(e.to_string()))?;

        *cache = Some(CachedKeys {
            keys,
            fetched_at: Instant::now(),
        });

        key.ok_or_else(|| unknown_key(kid))
    }

    /// Checks HTTP response status; returns the response on success or an error with details.
    async fn ensure_success(
        response: reqwest::Response,
        operation: &'static str,
    ) -> Result<reqwest::Response, Error> {
        if response.status().is_success() {
            return Ok(response);
        }
        let status = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();
        Err(Error::Google {
            operation,
            status: Some(status),
            detail: body,
        })
    }
}

/// `None` when the keys must be (re)fetched.
fn cached_key(cache: Option<&CachedKeys>, kid: &str) -> Option<Result<DecodingKey, Error>> {
    let cached = cache.filter(|c| c.fetched_at.elapsed() < JWKS_TTL)?;
    match cached.keys.find(kid) {
        Some(jwk) => Some(DecodingKey::from_jwk(jwk).map_err(|e| Error::Token(e.to_string()))),
        None if cached.fetched_at.elapsed() < JWKS_REFETCH_COOLDOWN => {
            Some(Err(unknown_key(kid)))
        }
        None => None,
    }
}

fn unknown_key(kid: &str) -> Error {
    Error::Token(format!("unknown signing key: {kid}"))
}

impl IdentityVerifier for GoogleClient {
    async fn verify(&self, assertion: &Assertion) -> Result<VerifiedIdentity, Error> {
        match assertion {
            Assertion::IdToken(id_token) => Ok(VerifiedIdentity {
                profile: self.verify_id_token(id_token).await?,
                grant: None,
            }),
            Assertion::AuthorizationCode { code, redirect_uri } => {
                let tokens = self.exchange_code(code, redirect_uri.as_deref()).await?;
                let id_token = tokens
                    .id_token
                    .ok_or_else(|| Error::google("token exchange", "no id_token from google"))?;
                Ok(VerifiedIdentity {
                    profile: self.verify_id_token(&id_token).await?,
                    grant: tokens.refresh_token,
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use axum::Router;
    use axum::response::IntoResponse;
    use axum::routing::{get, post};
    use jsonwebtoken::{EncodingKey, Header};
    use serde_json::json;

    use super::*;

    const TEST_KEY_PEM: &str = include_str!("../tests/fixtures/google_test_key.pem");
    const TEST_KEY_N: &str = "2TeYByRl5AqZTRaZpFY0Wmfc8stl_cIFpd6JPRdwrBOgdMfGAd52UTPse6FPiQgffPUGbufYQqvSchO8nhDaUKyetfIee4mY52zhuZpo-IwWSsv7MbvqQ_2sqRg6lBIAEVGbH6zoSgubzHdyQHr4WhYeQymgqsgQmySW0oy3QPMsIcTXTiP9BBkGgVZrlCBvJhVGmET-MmSWwUPW-2NapWyfn59-XApwScoMpONFAnJM2MnT3QgdzDotnzXLJWcoE6oQDmsPXr9fy5CX5jndtJPYvr0nTW0gNz60d6wcjibovT1zPie6VB6SjNVcP9qGLqLxC5bODqKG6EkP--XIzQ";
    const CLIENT_ID: &str = "test-client.apps.googleusercontent.com";

    fn id_token(sub: &str, aud: &str, kid: &str) -> String {
        let now = time::OffsetDateTime::now_utc().unix_timestamp();
        let claims = json!({
            "iss": "https://accounts.google.com",
            "aud": aud,
            "sub": sub,
            "email": format!("{sub}@example.com"),
            "name": "Test User",
            "picture": "https://example.com/p.png",
            "iat": now,
            "exp": now + 3600,
        });
        let mut header = Header::new(Algorithm::RS256);
        header.kid = Some(kid.into());
        let key = EncodingKey::from_rsa_pem(TEST_KEY_PEM.as_bytes()).unwrap();
        jsonwebtoken::encode(&header, &claims, &key).unwrap()
    }

    /// Serves `/certs` and `/token` like Google does; returns the base URL and
    /// the number of key fetches so far.
    async fn mock_google() -> (Url, Arc<AtomicUsize>) {
        let fetches = Arc::new(AtomicUsize::new(0));
        let counter = fetches.clone();
        let app = Router::new()
            .route(
                "/certs",
                get(move || {
                    let counter = counter.clone();
                    async move {
                        counter.fetch_add(1, Ordering::SeqCst);
                        axum::Json(json!({
                            "keys": [{
                                "kty": "RSA",
                                "alg": "RS256",
                                "use": "sig",
                                "kid": "test-kid",
                                "n": TEST_KEY_N,
                                "e": "AQAB",
                            }]
                        }))
                    }
                }),
            )
            .route(
                "/token",
                post(|body: String| async move {
                    if body.contains("code=good-code") {
                        axum::Json(json!({
                            "access_token": "ya29.google-access",
                            "id_token": id_token("u1", CLIENT_ID, "test-kid"),
                            "refresh_token": "1//google-refresh",
                            "expires_in": 3599,
                        }))
                        .into_response()
                    } else {
                        (
                            axum::http::StatusCode::BAD_REQUEST,
                            axum::Json(json!({ "error": "invalid_grant" })),
                        )
                            .into_response()
                    }
                }),
            );

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move { axum::serve(listener, app).await.unwrap() });
        (format!("http://{addr}/").parse().unwrap(), fetches)
    }

    fn client(base: &Url) -> GoogleClient {
        let config = GoogleConfig::new(
            CLIENT_ID,
            "secret",
            "https://backtime.example.com".parse().unwrap(),
        )
        .with_token_url(base.join("token").unwrap())
        .with_certs_url(base.join("certs").unwrap());
        GoogleClient::new(config)
    }

    #[test]
    fn config_defaults_point_at_google() {
        let config = GoogleConfig::new("id", "secret", "https://app.example.com".parse().unwrap());
        assert_eq!(config.client_id(), "id");
        assert_eq!(config.token_url().as_str(), "https://oauth2.googleapis.com/token");
        assert_eq!(
            config.certs_url().as_str(),
            "https://www.googleapis.com/oauth2/v3/certs"
        );
    }

    #[tokio::test]
    async fn verifies_id_token_and_caches_keys() {
        let (base, fetches) = mock_google().await;
        let google = client(&base);

        let profile = google
            .verify_id_token(&id_token("u1", CLIENT_ID, "test-kid"))
            .await
            .unwrap();
        assert_eq!(profile.sub.as_str(), "u1");
        assert_eq!(profile.email, "u1@example.com");
        assert_eq!(profile.name, "Test User");

        google
            .verify_id_token(&id_token("u2", CLIENT_ID, "test-kid"))
            .await
            .unwrap();
        assert_eq!(fetches.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn rejects_foreign_audience() {
        let (base, _) = mock_google().await;
        let google = client(&base);
        let res = google
            .verify_id_token(&id_token("u1", "someone-else", "test-kid"))
            .await;
        assert!(matches!(res, Err(Error::Token(_))));
    }

    #[tokio::test]
    async fn rejects_unknown_key() {
        let (base, _) = mock_google().await;
        let google = client(&base);
        let res = google
            .verify_id_token(&id_token("u1", CLIENT_ID, "rotated-away"))
            .await;
        assert!(matches!(res, Err(Error::Token(_))));
    }

    #[tokio::test]
    async fn unknown_keys_do_not_refetch_within_cooldown() {
        let (base, fetches) = mock_google().await;
        let google = client(&base);

        for kid in ["rotated-away", "made-up", "rotated-away"] {
            let res = google.verify_id_token(&id_token("u1", CLIENT_ID, kid)).await;
            assert!(matches!(res, Err(Error::Token(ref m)) if m.contains(kid)), "{res:?}");
        }
        assert_eq!(fetches.load(Ordering::SeqCst), 1);

        google
            .verify_id_token(&id_token("u1", CLIENT_ID, "test-kid"))
            .await
            .unwrap();
        assert_eq!(fetches.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn rejects_garbage() {
        let (base, fetches) = mock_google().await;
        let google = client(&base);
        assert!(google.verify_id_token("not.a.jwt").await.is_err());
        assert_eq!(fetches.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn code_flow_returns_profile_and_grant() {
        let (base, _) = mock_google().await;
        let google = client(&base);
        let identity = google
            .verify(&Assertion::AuthorizationCode {
                code: "good-code".into(),
                redirect_uri: None,
            })
            .await
            .unwrap();
        assert_eq!(identity.profile.sub.as_str(), "u1");
        assert_eq!(identity.grant.as_deref(), Some("1//google-refresh"));
    }

    #[tokio::test]
    async fn code_flow_surfaces_google_errors() {
        let (base, _) = mock_google().await;
        let google = client(&base);
        let res = google
            .verify(&Assertion::AuthorizationCode {
                code: "bad-code".into(),
                redirect_uri: Some("https://other.example.com".into()),
            })
            .await;
        assert!(matches!(
            res,
            Err(Error::Google {
                status: Some(400),
                ..
            })
        ));
    }
}
