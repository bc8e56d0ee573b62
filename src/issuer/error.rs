use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

use crate::token::TokenError;
use crate::types::MessageBody;

/// Failures of the issuer endpoints and the [`AuthUser`](super::AuthUser) extractor.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    /// `/auth/google` called without a credential or code.
    #[error("missing credential or authorization code")]
    MissingAssertion,

    /// Google rejected or could not verify the assertion.
    #[error("google auth failed: {0}")]
    Verification(#[source] crate::error::Error),

    /// Bearer token absent, malformed, expired or forged.
    #[error(transparent)]
    Token(#[from] TokenError),

    /// No refresh cookie on the request.
    #[error("no refresh token")]
    MissingRefreshToken,

    /// Refresh cookie does not match any active session.
    #[error("invalid refresh token")]
    InvalidRefreshToken,

    /// User store operation failed.
    #[error("Store error: {0}")]
    Store(String),

    /// Demo data could not be loaded.
    #[error("Data error: {0}")]
    Data(String),

    /// Missing or invalid configuration.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Token signing or grant encryption failed.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            Self::MissingAssertion => (StatusCode::BAD_REQUEST, self.to_string()),
            Self::Verification(e) => {
                tracing::warn!(error = %e, "Google identity verification failed");
                (StatusCode::UNAUTHORIZED, "google auth failed".to_string())
            }
            Self::Token(TokenError::Invalid(detail)) => {
                tracing::debug!(detail = %detail, "Access token rejected");
                (
                    StatusCode::UNAUTHORIZED,
                    "invalid or expired token".to_string(),
                )
            }
            Self::Token(e) => (StatusCode::UNAUTHORIZED, e.to_string()),
            Self::MissingRefreshToken | Self::InvalidRefreshToken => {
                (StatusCode::UNAUTHORIZED, self.to_string())
            }
            Self::Data(_) => {
                tracing::error!(error = %self, "Failed to load data");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "failed to load data".to_string(),
                )
            }
            Self::Store(_) | Self::Config(_) | Self::Internal(_) => {
                tracing::error!(error = %self, "Auth internal error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal error".to_string(),
                )
            }
        };
        (status, Json(MessageBody::new(message))).into_response()
    }
}

impl From<crate::error::Error> for AuthError {
    fn from(e: crate::error::Error) -> Self {
        Self::Internal(e.to_string())
    }
}
