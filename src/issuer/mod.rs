//! Session issuer: Google sign-in, access/refresh token issuance and bearer
//! authentication for Axum.
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use backtime_auth::issuer::{IssuerConfig, auth_routes};
//! use backtime_auth::google::{GoogleClient, GoogleConfig};
//! use backtime_auth::store::MemoryStore;
//!
//! let config = IssuerConfig::from_env()?;
//! let google = GoogleClient::new(GoogleConfig::from_env()?);
//! let store = MemoryStore::new();
//!
//! let app = axum::Router::new()
//!     .merge(auth_routes(config, google, store));
//! ```
//!
//! Protected handlers take an [`AuthUser`] argument.

mod config;
mod cookies;
mod error;
mod extractor;
mod routes;
mod state;
mod traits;
mod types;

pub use config::IssuerConfig;
pub use error::AuthError;
pub use extractor::{AuthUser, bearer_token};
pub use routes::auth_routes;
pub use traits::{BoxError, DataStore, IdentityVerifier, UserStore};
pub use types::{Assertion, LoginUpdate, UserRecord, VerifiedIdentity};
