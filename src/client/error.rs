use std::sync::Arc;

/// Session client failures.
///
/// `Clone` so one refresh outcome can be handed to every waiting request.
#[derive(Debug, Clone, thiserror::Error)]
#[non_exhaustive]
pub enum ClientError {
    #[error("HTTP error: {0}")]
    Http(Arc<reqwest::Error>),

    /// Still `401` after a refresh and retry.
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// The session could not be refreshed; log in again.
    #[error("session refresh failed: {0}")]
    RefreshFailed(String),

    /// Non-success response other than a handled `401`.
    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("invalid response body: {0}")]
    Decode(String),

    #[error("invalid request body: {0}")]
    Encode(String),

    #[error("invalid URL: {0}")]
    Url(#[from] url::ParseError),
}

impl From<reqwest::Error> for ClientError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            Self::Decode(e.to_string())
        } else {
            Self::Http(Arc::new(e))
        }
    }
}
