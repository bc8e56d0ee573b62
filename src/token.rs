use pasetors::claims::{Claims, ClaimsValidationRules};
use pasetors::keys::{AsymmetricKeyPair, AsymmetricPublicKey, AsymmetricSecretKey, Generate};
use pasetors::token::UntrustedToken;
use pasetors::version4::V4;
use pasetors::{Public, public};
use rand::RngCore;
use serde::Deserialize;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

use crate::error::Error;
use crate::types::{Subject, UserProfile};

const TOKEN_PREFIX: &str = "v4.public.";

/// Why an access token was rejected.
///
/// All variants map to `401 Unauthorized`; the distinction only feeds the
/// response message and logs.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TokenError {
    #[error("missing auth token")]
    Missing,
    #[error("malformed token")]
    Malformed,
    #[error("invalid or expired token: {0}")]
    Invalid(String),
}

/// Claims carried by an access token besides the registered ones.
#[derive(Debug, Deserialize)]
struct AccessClaims {
    sub: Subject,
    #[serde(default)]
    email: String,
    #[serde(default)]
    name: String,
    #[serde(default)]
    picture: String,
}

impl From<AccessClaims> for UserProfile {
    fn from(c: AccessClaims) -> Self {
        Self {
            sub: c.sub,
            email: c.email,
            name: c.name,
            picture: c.picture,
        }
    }
}

/// Issues and verifies PASETO `v4.public` access tokens.
///
/// Tokens are stateless: a token is valid when its Ed25519 signature checks
/// out, `iss`/`aud` match and the current time lies within `nbf..exp`.
pub struct AccessTokenSigner {
    secret: AsymmetricSecretKey<V4>,
    public: AsymmetricPublicKey<V4>,
    issuer: String,
    audience: String,
    ttl: time::Duration,
}

impl AccessTokenSigner {
    /// Signer with a freshly generated key pair.
    ///
    /// # Errors
    ///
    /// Returns `Error::Token` if key generation fails.
    pub fn generate(
        issuer: impl Into<String>,
        audience: impl Into<String>,
        ttl: time::Duration,
    ) -> Result<Self, Error> {
        let kp = AsymmetricKeyPair::<V4>::generate().map_err(|e| Error::Token(e.to_string()))?;
        Ok(Self {
            secret: kp.secret,
            public: kp.public,
            issuer: issuer.into(),
            audience: audience.into(),
            ttl,
        })
    }

    /// Signer from a hex-encoded Ed25519 secret key (64 bytes: seed || public key).
    ///
    /// # Errors
    ///
    /// Returns `Error::Token` if the hex is invalid or the key is malformed.
    pub fn from_secret_hex(
        secret_key_hex: &str,
        issuer: impl Into<String>,
        audience: impl Into<String>,
        ttl: time::Duration,
    ) -> Result<Self, Error> {
        let bytes = hex::decode(secret_key_hex.trim())
            .map_err(|e| Error::Token(format!("invalid hex: {e}")))?;
        if bytes.len() != 64 {
            return Err(Error::Token(format!(
                "invalid key length: expected 64, got {}",
                bytes.len()
            )));
        }
        let secret =
            AsymmetricSecretKey::<V4>::from(&bytes).map_err(|e| Error::Token(e.to_string()))?;
        let public =
            AsymmetricPublicKey::<V4>::try_from(&secret).map_err(|e| Error::Token(e.to_string()))?;
        Ok(Self {
            secret,
            public,
            issuer: issuer.into(),
            audience: audience.into(),
            ttl,
        })
    }

    /// Access token lifetime.
    #[must_use]
    pub fn ttl(&self) -> time::Duration {
        self.ttl
    }

    /// Signs an access token for `profile`, valid from now for [`ttl`](Self::ttl).
    ///
    /// # Errors
    ///
    /// Returns `Error::Token` if the claims cannot be built or signed.
    pub fn issue(&self, profile: &UserProfile) -> Result<String, Error> {
        self.issue_at(profile, OffsetDateTime::now_utc())
    }

    /// Signs an access token as if it had been issued at `issued_at`.
    pub(crate) fn issue_at(
        &self,
        profile: &UserProfile,
        issued_at: OffsetDateTime,
    ) -> Result<String, Error> {
        let token_err = |e: pasetors::errors::Error| Error::Token(e.to_string());
        let iat = issued_at
            .format(&Rfc3339)
            .map_err(|e| Error::Token(e.to_string()))?;
        let exp = (issued_at + self.ttl)
            .format(&Rfc3339)
            .map_err(|e| Error::Token(e.to_string()))?;

        let mut claims = Claims::new().map_err(token_err)?;
        claims.issued_at(&iat).map_err(token_err)?;
        claims.not_before(&iat).map_err(token_err)?;
        claims.expiration(&exp).map_err(token_err)?;
        claims.issuer(&self.issuer).map_err(token_err)?;
        claims.audience(&self.audience).map_err(token_err)?;
        claims.subject(profile.sub.as_str()).map_err(token_err)?;
        claims.token_identifier(&token_id()).map_err(token_err)?;
        claims
            .add_additional("email", profile.email.as_str())
            .map_err(token_err)?;
        claims
            .add_additional("name", profile.name.as_str())
            .map_err(token_err)?;
        claims
            .add_additional("picture", profile.picture.as_str())
            .map_err(token_err)?;

        public::sign(&self.secret, &claims, None, None).map_err(token_err)
    }

    /// Verifies an access token and returns the profile it carries.
    ///
    /// # Errors
    ///
    /// - [`TokenError::Malformed`] if the value is not a `v4.public` token.
    /// - [`TokenError::Invalid`] on a bad signature, wrong issuer/audience, or
    ///   when the token is expired or not yet valid.
    pub fn verify(&self, token: &str) -> Result<UserProfile, TokenError> {
        if !token.starts_with(TOKEN_PREFIX) {
            return Err(TokenError::Malformed);
        }
        let untrusted =
            UntrustedToken::<Public, V4>::try_from(token).map_err(|_| TokenError::Malformed)?;

        let mut rules = ClaimsValidationRules::new();
        rules.validate_issuer_with(&self.issuer);
        rules.validate_audience_with(&self.audience);

        let trusted = public::verify(&self.public, &untrusted, &rules, None, None)
            .map_err(|e| TokenError::Invalid(e.to_string()))?;

        let payload = trusted
            .payload_claims()
            .ok_or_else(|| TokenError::Invalid("missing payload".into()))?;
        let payload_str = payload
            .to_string()
            .map_err(|e| TokenError::Invalid(e.to_string()))?;
        let claims: AccessClaims = serde_json::from_str(&payload_str)
            .map_err(|e| TokenError::Invalid(e.to_string()))?;

        Ok(claims.into())
    }
}

/// Random `jti`, so two tokens for one profile never collide.
fn token_id() -> String {
    let mut bytes = [0u8; 16];
    rand::rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn signer() -> AccessTokenSigner {
        AccessTokenSigner::generate("backtime", "backtime-api", time::Duration::minutes(15))
            .unwrap()
    }

    fn profile() -> UserProfile {
        UserProfile::new("u1")
            .with_email("u1@example.com")
            .with_name("User One")
            .with_picture("https://example.com/u1.png")
    }

    #[test]
    fn issue_then_verify_carries_profile() {
        let signer = signer();
        let token = signer.issue(&profile()).unwrap();
        assert!(token.starts_with("v4.public."));
        assert_eq!(signer.verify(&token).unwrap(), profile());
    }

    #[test]
    fn expired_token_is_invalid() {
        let signer = signer();
        let issued_at = OffsetDateTime::now_utc() - time::Duration::hours(1);
        let token = signer.issue_at(&profile(), issued_at).unwrap();
        assert!(matches!(signer.verify(&token), Err(TokenError::Invalid(_))));
    }

    #[test]
    fn foreign_key_is_invalid() {
        let token = signer().issue(&profile()).unwrap();
        assert!(matches!(signer().verify(&token), Err(TokenError::Invalid(_))));
    }

    #[test]
    fn wrong_audience_is_invalid() {
        let signer = signer();
        let token = signer.issue(&profile()).unwrap();

        let other = AccessTokenSigner {
            secret: signer.secret,
            public: signer.public,
            issuer: "backtime".into(),
            audience: "someone-else".into(),
            ttl: time::Duration::minutes(15),
        };
        assert!(matches!(other.verify(&token), Err(TokenError::Invalid(_))));
    }

    #[test]
    fn garbage_is_malformed() {
        let signer = signer();
        assert_eq!(signer.verify("not-a-token"), Err(TokenError::Malformed));
        assert_eq!(signer.verify("v4.public.%%%"), Err(TokenError::Malformed));
    }

    #[test]
    fn secret_hex_roundtrip_shares_verification() {
        let kp = AsymmetricKeyPair::<V4>::generate().unwrap();
        let hex_key = hex::encode(kp.secret.as_bytes());
        let a = AccessTokenSigner::from_secret_hex(
            &hex_key,
            "backtime",
            "backtime-api",
            time::Duration::minutes(15),
        )
        .unwrap();
        let b = AccessTokenSigner::from_secret_hex(
            &hex_key,
            "backtime",
            "backtime-api",
            time::Duration::minutes(15),
        )
        .unwrap();
        let token = a.issue(&profile()).unwrap();
        assert_eq!(b.verify(&token).unwrap().sub.as_str(), "u1");
    }

    #[test]
    fn secret_hex_rejects_wrong_length() {
        let res = AccessTokenSigner::from_secret_hex(
            &"ab".repeat(32),
            "backtime",
            "backtime-api",
            time::Duration::minutes(15),
        );
        assert!(matches!(res, Err(Error::Token(_))));
    }
}
