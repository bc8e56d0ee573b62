use std::sync::Arc;

use url::Url;

use super::error::AuthError;
use crate::google::GoogleConfig;
use crate::grant::GrantCipher;
use crate::token::AccessTokenSigner;

/// Cookie and routing settings shared by config and runtime state.
#[derive(Debug, Clone)]
pub(crate) struct IssuerSettings {
    pub(crate) refresh_cookie_name: String,
    pub(crate) refresh_ttl_days: i64,
    pub(crate) secure_cookies: bool,
    pub(crate) auth_path: String,
}

impl IssuerSettings {
    fn defaults() -> Self {
        Self {
            refresh_cookie_name: "refreshToken".into(),
            refresh_ttl_days: 30,
            secure_cookies: true,
            auth_path: "/auth".into(),
        }
    }
}

/// Session issuer configuration.
///
/// The token signer is a constructor parameter; everything else has defaults
/// overridable with `with_*` methods.
///
/// Use [`from_env()`](IssuerConfig::from_env) for convention-based setup.
pub struct IssuerConfig {
    pub(super) signer: Arc<AccessTokenSigner>,
    pub(super) cipher: GrantCipher,
    pub(super) settings: IssuerSettings,
}

impl IssuerConfig {
    /// Create config around an access token signer.
    ///
    /// The grant cipher defaults to an ephemeral key.
    #[must_use]
    pub fn new(signer: AccessTokenSigner) -> Self {
        Self {
            signer: Arc::new(signer),
            cipher: GrantCipher::generate(),
            settings: IssuerSettings::defaults(),
        }
    }

    /// Create config from environment variables.
    ///
    /// # Optional env vars
    /// - `ACCESS_TOKEN_KEY`: hex Ed25519 secret key (64 bytes). Ephemeral when unset.
    /// - `ACCESS_TOKEN_TTL_SECS`: access token lifetime (default 900)
    /// - `TOKEN_ISSUER` / `TOKEN_AUDIENCE`: token `iss` / `aud` (default `backtime` / `backtime-api`)
    /// - `GRANT_ENCRYPTION_KEY`: hex 32-byte key for stored Google grants. Ephemeral when unset.
    /// - `REFRESH_TOKEN_TTL_DAYS`: refresh cookie max-age (default 30)
    /// - `SECURE_COOKIES`: `"0"` or `"false"` to drop the `Secure` attribute (local HTTP only)
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Config`] if a variable is set but invalid.
    pub fn from_env() -> Result<Self, AuthError> {
        let ttl_secs: i64 = parse_env("ACCESS_TOKEN_TTL_SECS", 900)?;
        let ttl = time::Duration::seconds(ttl_secs);
        let issuer = std::env::var("TOKEN_ISSUER").unwrap_or_else(|_| "backtime".into());
        let audience = std::env::var("TOKEN_AUDIENCE").unwrap_or_else(|_| "backtime-api".into());

        let signer = match std::env::var("ACCESS_TOKEN_KEY") {
            Ok(key) => AccessTokenSigner::from_secret_hex(&key, issuer, audience, ttl)
                .map_err(|e| AuthError::Config(format!("ACCESS_TOKEN_KEY: {e}")))?,
            Err(_) => {
                tracing::warn!(
                    "ACCESS_TOKEN_KEY not set; using an ephemeral signing key, \
                     access tokens will not survive a restart"
                );
                AccessTokenSigner::generate(issuer, audience, ttl)
                    .map_err(|e| AuthError::Config(e.to_string()))?
            }
        };

        let cipher = match std::env::var("GRANT_ENCRYPTION_KEY") {
            Ok(key) => GrantCipher::from_hex(&key)
                .map_err(|e| AuthError::Config(format!("GRANT_ENCRYPTION_KEY: {e}")))?,
            Err(_) => {
                tracing::warn!(
                    "GRANT_ENCRYPTION_KEY not set; stored Google grants will be unreadable after a restart"
                );
                GrantCipher::generate()
            }
        };

        let refresh_ttl_days: i64 = parse_env("REFRESH_TOKEN_TTL_DAYS", 30)?;
        let secure_cookies = !matches!(
            std::env::var("SECURE_COOKIES").as_deref(),
            Ok("0") | Ok("false"),
        );

        Ok(Self::new(signer)
            .with_grant_cipher(cipher)
            .with_refresh_ttl_days(refresh_ttl_days)
            .with_secure_cookies(secure_cookies))
    }

    /// Shared handle to the access token signer, for mounting other protected routes.
    #[must_use]
    pub fn signer(&self) -> Arc<AccessTokenSigner> {
        self.signer.clone()
    }

    #[must_use]
    pub fn with_grant_cipher(mut self, cipher: GrantCipher) -> Self {
        self.cipher = cipher;
        self
    }

    #[must_use]
    pub fn with_refresh_cookie_name(mut self, name: impl Into<String>) -> Self {
        self.settings.refresh_cookie_name = name.into();
        self
    }

    #[must_use]
    pub fn with_refresh_ttl_days(mut self, days: i64) -> Self {
        self.settings.refresh_ttl_days = days;
        self
    }

    #[must_use]
    pub fn with_secure_cookies(mut self, secure: bool) -> Self {
        self.settings.secure_cookies = secure;
        self
    }

    #[must_use]
    pub fn with_auth_path(mut self, path: impl Into<String>) -> Self {
        self.settings.auth_path = path.into();
        self
    }
}

impl GoogleConfig {
    /// Create Google config from environment variables.
    ///
    /// # Required env vars
    /// - `GOOGLE_CLIENT_ID`: OAuth2 client ID (also the ID token audience)
    /// - `GOOGLE_CLIENT_SECRET`: OAuth2 client secret
    /// - `REDIRECT_URI`: redirect URI registered for the code flow (must be a valid URL)
    ///
    /// # Optional env vars
    /// - `GOOGLE_TOKEN_URL`: Override the token endpoint
    /// - `GOOGLE_CERTS_URL`: Override the JWKS endpoint
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Config`] if required env vars are missing or URLs are invalid.
    pub fn from_env() -> Result<Self, AuthError> {
        let client_id = std::env::var("GOOGLE_CLIENT_ID")
            .map_err(|_| AuthError::Config("GOOGLE_CLIENT_ID is required".into()))?;
        let client_secret = std::env::var("GOOGLE_CLIENT_SECRET")
            .map_err(|_| AuthError::Config("GOOGLE_CLIENT_SECRET is required".into()))?;
        let redirect_uri = parse_url_env("REDIRECT_URI")?
            .ok_or_else(|| AuthError::Config("REDIRECT_URI is required".into()))?;

        let mut config = GoogleConfig::new(client_id, client_secret, redirect_uri);
        if let Some(url) = parse_url_env("GOOGLE_TOKEN_URL")? {
            config = config.with_token_url(url);
        }
        if let Some(url) = parse_url_env("GOOGLE_CERTS_URL")? {
            config = config.with_certs_url(url);
        }
        Ok(config)
    }
}

fn parse_env<T: std::str::FromStr>(name: &str, default: T) -> Result<T, AuthError>
where
    T::Err: std::fmt::Display,
{
    match std::env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|e| AuthError::Config(format!("{name}: {e}"))),
        Err(_) => Ok(default),
    }
}

fn parse_url_env(name: &str) -> Result<Option<Url>, AuthError> {
    match std::env::var(name) {
        Ok(raw) => raw
            .parse()
            .map(Some)
            .map_err(|e| AuthError::Config(format!("{name}: {e}"))),
        Err(_) => Ok(None),
    }
}
