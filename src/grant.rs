use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chacha20poly1305::aead::{Aead, KeyInit};
use chacha20poly1305::{ChaCha20Poly1305, Key, Nonce};
use rand::RngCore;

use crate::error::Error;
use crate::types::SealedGrant;

const NONCE_LEN: usize = 12;

/// Encrypts delegated Google grants before they reach the user store.
///
/// Sealed form: `BASE64URL(nonce || ciphertext)`, ChaCha20-Poly1305 with a
/// random 96-bit nonce per value.
#[derive(Clone)]
pub struct GrantCipher {
    key: [u8; 32],
}

impl std::fmt::Debug for GrantCipher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GrantCipher").finish_non_exhaustive()
    }
}

impl GrantCipher {
    #[must_use]
    pub fn new(key: [u8; 32]) -> Self {
        Self { key }
    }

    /// Random key, valid for the lifetime of the process only.
    #[must_use]
    pub fn generate() -> Self {
        let mut key = [0u8; 32];
        rand::rng().fill_bytes(&mut key);
        Self { key }
    }

    /// Parses a hex-encoded 32-byte key.
    ///
    /// # Errors
    ///
    /// Returns `Error::Crypto` if the hex is invalid or the key is not 32 bytes.
    pub fn from_hex(key_hex: &str) -> Result<Self, Error> {
        let bytes = hex::decode(key_hex.trim())
            .map_err(|e| Error::Crypto(format!("invalid hex: {e}")))?;
        let key: [u8; 32] = bytes.as_slice().try_into().map_err(|_| {
            Error::Crypto(format!("invalid key length: expected 32, got {}", bytes.len()))
        })?;
        Ok(Self { key })
    }

    /// # Errors
    ///
    /// Returns `Error::Crypto` if encryption fails.
    pub fn seal(&self, plaintext: &str) -> Result<SealedGrant, Error> {
        let cipher = ChaCha20Poly1305::new(Key::from_slice(&self.key));
        let mut nonce_bytes = [0u8; NONCE_LEN];
        rand::rng().fill_bytes(&mut nonce_bytes);

        let ciphertext = cipher
            .encrypt(Nonce::from_slice(&nonce_bytes), plaintext.as_bytes())
            .map_err(|_| Error::Crypto("encryption failed".into()))?;

        let mut payload = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        payload.extend_from_slice(&nonce_bytes);
        payload.extend_from_slice(&ciphertext);

        Ok(SealedGrant(URL_SAFE_NO_PAD.encode(payload)))
    }

    /// # Errors
    ///
    /// Returns `Error::Crypto` if the value is not valid base64url, is too
    /// short, was sealed with another key or was tampered with.
    pub fn open(&self, sealed: &SealedGrant) -> Result<String, Error> {
        let payload = URL_SAFE_NO_PAD
            .decode(&sealed.0)
            .map_err(|_| Error::Crypto("invalid ciphertext".into()))?;
        if payload.len() <= NONCE_LEN {
            return Err(Error::Crypto("invalid ciphertext".into()));
        }

        let (nonce_bytes, ciphertext) = payload.split_at(NONCE_LEN);
        let cipher = ChaCha20Poly1305::new(Key::from_slice(&self.key));
        let plaintext = cipher
            .decrypt(Nonce::from_slice(nonce_bytes), ciphertext)
            .map_err(|_| Error::Crypto("decryption failed".into()))?;

        String::from_utf8(plaintext).map_err(|_| Error::Crypto("grant is not UTF-8".into()))
    }
}
