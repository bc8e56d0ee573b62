#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    #[error("Google {operation} failed (status {status:?}): {detail}")]
    Google {
        operation: &'static str,
        status: Option<u16>,
        detail: String,
    },
    #[cfg(any(feature = "issuer", feature = "client"))]
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Token error: {0}")]
    Token(String),
    #[error("Crypto error: {0}")]
    Crypto(String),
}

impl Error {
    #[cfg(feature = "issuer")]
    pub(crate) fn google(operation: &'static str, detail: impl Into<String>) -> Self {
        Self::Google {
            operation,
            status: None,
            detail: detail.into(),
        }
    }
}
