use std::future::Future;

use super::types::{Assertion, LoginUpdate, UserRecord, VerifiedIdentity};
use crate::error::Error;
use crate::types::{RefreshTokenHash, Subject};

pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Checks an external identity assertion.
///
/// Implemented by [`GoogleClient`](crate::google::GoogleClient). Tests plug in
/// a stub that accepts fixed credentials.
pub trait IdentityVerifier: Send + Sync + 'static {
    /// Verify the assertion and return the profile it proves.
    ///
    /// Must not have side effects on the user store: the issuer writes only
    /// after this returns `Ok`.
    fn verify(
        &self,
        assertion: &Assertion,
    ) -> impl Future<Output = Result<VerifiedIdentity, Error>> + Send;
}

/// Durable user records.
///
/// # Example
///
/// ```rust,ignore
/// impl UserStore for MyStore {
///     async fn find_by_refresh_hash(
///         &self,
///         hash: &RefreshTokenHash,
///     ) -> Result<Option<UserRecord>, BoxError> {
///         Ok(self.db.users().find_one(doc! { "refreshTokenHash": hash.as_str() }).await?)
///     }
///     // ...
/// }
/// ```
pub trait UserStore: Send + Sync + 'static {
    /// Insert or update the record for `login.profile.sub`.
    ///
    /// Overwrites the profile fields, `lastLoginAt` and the refresh token hash;
    /// sets `createdAt` only on insert; replaces the grant only when one is given.
    /// Returns the record as stored.
    fn upsert_login(
        &self,
        login: LoginUpdate,
    ) -> impl Future<Output = Result<UserRecord, BoxError>> + Send;

    /// Look up the record whose current refresh token hash is `hash`.
    fn find_by_refresh_hash(
        &self,
        hash: &RefreshTokenHash,
    ) -> impl Future<Output = Result<Option<UserRecord>, BoxError>> + Send;

    /// Look up a record by subject.
    fn find_by_subject(
        &self,
        sub: &Subject,
    ) -> impl Future<Output = Result<Option<UserRecord>, BoxError>> + Send;

    /// Replace `current` with `next`, only if `current` is still the stored hash.
    ///
    /// Returns `false` when no record holds `current` (already rotated or
    /// logged out).
    fn rotate_refresh_hash(
        &self,
        current: &RefreshTokenHash,
        next: &RefreshTokenHash,
    ) -> impl Future<Output = Result<bool, BoxError>> + Send;

    /// Remove `hash` from whichever record holds it (logout).
    ///
    /// Returns `false` when no record matched.
    fn clear_refresh_hash(
        &self,
        hash: &RefreshTokenHash,
    ) -> impl Future<Output = Result<bool, BoxError>> + Send;
}

/// Read side of the demo data served at `/data`.
pub trait DataStore: Send + Sync + 'static {
    /// Up to `limit` documents of the sales collection, as JSON.
    fn sample_sales(
        &self,
        limit: i64,
    ) -> impl Future<Output = Result<Vec<serde_json::Value>, BoxError>> + Send;
}
