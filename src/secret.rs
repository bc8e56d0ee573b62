use rand::RngCore;
use sha2::{Digest, Sha256};

use crate::types::RefreshTokenHash;

const REFRESH_TOKEN_BYTES: usize = 64;

/// Generates a fresh opaque refresh token.
///
/// Returns 64 random bytes as a 128-character lowercase hex string.
#[must_use]
pub fn generate_refresh_token() -> String {
    let mut bytes = [0u8; REFRESH_TOKEN_BYTES];
    rand::rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

/// Computes the stored form of a refresh token.
///
/// `hash = HEX(SHA256(token))`
#[must_use]
pub fn hash_refresh_token(token: &str) -> RefreshTokenHash {
    RefreshTokenHash(hex::encode(Sha256::digest(token.as_bytes())))
}
