use derive_more::{Display, From, Into};
use serde::{Deserialize, Serialize};

/// Google account identifier (ID token `sub` claim).
///
/// Stable across logins and unique per Google account. Used as the key of the
/// user record.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, Display, From, Into)]
#[serde(transparent)]
pub struct Subject(pub String);

impl Subject {
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for Subject {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

/// Public profile snapshot shared by the login response, the access token
/// claims and `/auth/me`.
///
/// Serialized as `{ sub, email, name, picture }`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    pub sub: Subject,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub picture: String,
}

impl UserProfile {
    #[must_use]
    pub fn new(sub: impl Into<Subject>) -> Self {
        Self {
            sub: sub.into(),
            email: String::new(),
            name: String::new(),
            picture: String::new(),
        }
    }

    #[must_use]
    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email = email.into();
        self
    }

    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    #[must_use]
    pub fn with_picture(mut self, picture: impl Into<String>) -> Self {
        self.picture = picture.into();
        self
    }
}

/// One-way hash of a refresh token, as persisted in the user record.
///
/// Lowercase hex SHA-256. Never holds the plaintext token.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, Display, From, Into)]
#[serde(transparent)]
pub struct RefreshTokenHash(pub String);

impl RefreshTokenHash {
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Delegated Google grant, encrypted for storage.
///
/// Produced by [`GrantCipher::seal`](crate::grant::GrantCipher::seal).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Display, From, Into)]
#[serde(transparent)]
pub struct SealedGrant(pub String);

/// Response body of `/auth/google` and `/auth/refresh`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionResponse {
    pub access_token: String,
    pub user_data: UserProfile,
}

/// Error body returned by every failing endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageBody {
    pub message: String,
}

impl MessageBody {
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}
