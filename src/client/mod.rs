//! Session client: keeps the access token in memory, attaches it as a bearer
//! header and refreshes the session transparently on `401`.
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use backtime_auth::client::{ClientConfig, SessionClient, SessionStatus};
//!
//! let client = SessionClient::new(ClientConfig::new("https://api.example.com".parse()?))?;
//! if let SessionStatus::Unauthenticated = client.restore().await? {
//!     client.login_with_credential(&google_id_token).await?;
//! }
//! let data: serde_json::Value = client.get_json("/data").await?;
//! ```
//!
//! Any number of concurrent requests failing with `401` share a single
//! `POST /auth/refresh`; each is then retried once with the new token.

mod config;
mod error;
mod session;

pub use config::ClientConfig;
pub use error::ClientError;
pub use session::{ApiRequest, SessionClient, SessionStatus};
