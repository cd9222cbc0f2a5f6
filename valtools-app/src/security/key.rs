use data_encoding::{BASE64URL, BASE64URL_NOPAD};
use rand::rngs::OsRng;
use rand::TryRngCore;
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;
use zeroize::{Zeroize, ZeroizeOnDrop};

use super::token::TokenError;

/// Total key size in bytes.
pub const KEY_SIZE: usize = 32;

/// Size of each half (signing / encryption) in bytes.
const HALF_SIZE: usize = KEY_SIZE / 2;

/// The 32-byte shared secret behind every token.
///
/// Bytes 0..16 are the HMAC signing key, bytes 16..32 the AES-128 encryption
/// key. The value is zeroized on drop and never printed by `Debug`.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct KeyMaterial {
    bytes: [u8; KEY_SIZE],
}

impl KeyMaterial {
    pub fn from_bytes(bytes: [u8; KEY_SIZE]) -> Self {
        Self { bytes }
    }

    pub fn from_slice(slice: &[u8]) -> Result<Self, TokenError> {
        let bytes: [u8; KEY_SIZE] = slice
            .try_into()
            .map_err(|_| TokenError::InvalidKey("key must be 32 bytes"))?;
        Ok(Self { bytes })
    }

    /// Parse the URL-safe base64 text form deployment keys are shipped in.
    pub fn from_base64(text: &str) -> Result<Self, TokenError> {
        let text = text.trim();
        let decoded = BASE64URL
            .decode(text.as_bytes())
            .or_else(|_| BASE64URL_NOPAD.decode(text.as_bytes()))
            .map_err(|_| TokenError::InvalidKey("key is not valid url-safe base64"))?;
        Self::from_slice(&decoded)
    }

    pub fn to_base64(&self) -> String {
        BASE64URL.encode(&self.bytes)
    }

    /// Generate a fresh random key from the OS entropy source.
    pub fn generate() -> Result<Self, TokenError> {
        let mut bytes = [0u8; KEY_SIZE];
        OsRng
            .try_fill_bytes(&mut bytes)
            .map_err(|e| TokenError::CryptoUnavailable(format!("os rng: {}", e)))?;
        Ok(Self { bytes })
    }

    /// Derive a key from a password by hashing it with SHA-256.
    ///
    /// This is how Steam Guard admin and voucher keys are produced, so keys
    /// derived here interoperate with blobs written by the worker.
    pub fn derive_from_password(password: &str) -> Self {
        let digest = Sha256::digest(password.as_bytes());
        let mut bytes = [0u8; KEY_SIZE];
        bytes.copy_from_slice(&digest);
        Self { bytes }
    }

    pub fn signing_key(&self) -> &[u8] {
        &self.bytes[..HALF_SIZE]
    }

    pub fn encryption_key(&self) -> [u8; HALF_SIZE] {
        let mut key = [0u8; HALF_SIZE];
        key.copy_from_slice(&self.bytes[HALF_SIZE..]);
        key
    }
}

impl PartialEq for KeyMaterial {
    fn eq(&self, other: &Self) -> bool {
        self.bytes[..].ct_eq(&other.bytes[..]).into()
    }
}

impl Eq for KeyMaterial {}

impl std::fmt::Debug for KeyMaterial {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyMaterial")
            .field("bytes", &"[REDACTED]")
            .finish()
    }
}
