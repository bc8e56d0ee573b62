#![doc = include_str!("../README.md")]

#[cfg(feature = "issuer")]
pub mod api;
#[cfg(feature = "client")]
pub mod client;
pub mod error;
#[cfg(feature = "issuer")]
pub mod google;
#[cfg(feature = "issuer")]
pub mod grant;
#[cfg(feature = "issuer")]
pub mod issuer;
#[cfg(feature = "issuer")]
pub mod secret;
#[cfg(feature = "issuer")]
pub mod store;
#[cfg(feature = "issuer")]
pub mod token;
pub mod types;

// Re-exports for convenient access
pub use error::Error;
pub use types::{MessageBody, SessionResponse, Subject, UserProfile};

#[cfg(feature = "issuer")]
pub use api::data_routes;
#[cfg(feature = "client")]
pub use client::{ApiRequest, ClientConfig, ClientError, SessionClient, SessionStatus};
#[cfg(feature = "issuer")]
pub use google::{GoogleClient, GoogleConfig};
#[cfg(feature = "issuer")]
pub use issuer::{AuthError, AuthUser, IssuerConfig, auth_routes};
#[cfg(feature = "issuer")]
pub use store::MemoryStore;
#[cfg(feature = "issuer")]
pub use token::AccessTokenSigner;
