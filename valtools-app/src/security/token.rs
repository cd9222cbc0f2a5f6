//! Authenticated token codec.
//!
//! Token layout (Fernet-compatible):
//!
//! ```text
//! version (1) | timestamp (8, BE) | iv (16) | ciphertext (n * 16) | hmac (32)
//! ```
//!
//! The ciphertext is AES-128-CBC over PKCS#7-padded plaintext, and the HMAC is
//! SHA-256 over everything before it. Tokens travel as padded URL-safe base64.

use aes::cipher::{block_padding::Pkcs7, BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use chrono::{DateTime, Utc};
use data_encoding::{BASE64URL, BASE64URL_NOPAD};
use hmac::{Hmac, Mac};
use rand::rngs::OsRng;
use rand::TryRngCore;
use sha2::Sha256;
use subtle::ConstantTimeEq;
use thiserror::Error;

use super::key::KeyMaterial;

type Aes128CbcEnc = cbc::Encryptor<aes::Aes128>;
type Aes128CbcDec = cbc::Decryptor<aes::Aes128>;
type HmacSha256 = Hmac<Sha256>;

/// Format tag in the first byte of every token.
pub const TOKEN_VERSION: u8 = 0x80;

const TIMESTAMP_SIZE: usize = 8;
const IV_SIZE: usize = 16;
const TAG_SIZE: usize = 32;
const BLOCK_SIZE: usize = 16;

/// Offset of the IV (after version and timestamp).
const IV_OFFSET: usize = 1 + TIMESTAMP_SIZE;

/// Offset of the ciphertext.
const CIPHERTEXT_OFFSET: usize = IV_OFFSET + IV_SIZE;

/// Smallest structurally valid token: header plus tag, empty ciphertext.
pub const MIN_TOKEN_LEN: usize = CIPHERTEXT_OFFSET + TAG_SIZE;

/// Token codec failures.
///
/// Messages are deliberately generic: they never include key bytes or
/// fragments of the plaintext.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TokenError {
    #[error("Malformed token: {0}")]
    Malformed(&'static str),

    #[error("Token authentication failed")]
    AuthenticationFailed,

    #[error("Crypto primitive unavailable: {0}")]
    CryptoUnavailable(String),

    #[error("Invalid key: {0}")]
    InvalidKey(&'static str),
}

/// Encrypt `plaintext` into a raw token.
pub fn encode(plaintext: &[u8], key: &KeyMaterial) -> Result<Vec<u8>, TokenError> {
    let mut iv = [0u8; IV_SIZE];
    OsRng
        .try_fill_bytes(&mut iv)
        .map_err(|e| TokenError::CryptoUnavailable(format!("os rng: {}", e)))?;

    let timestamp = Utc::now().timestamp().max(0) as u64;
    encode_with(plaintext, key, timestamp, iv)
}

/// Encrypt `plaintext` into the URL-safe base64 transport form.
pub fn encode_text(plaintext: &[u8], key: &KeyMaterial) -> Result<String, TokenError> {
    Ok(BASE64URL.encode(&encode(plaintext, key)?))
}

fn encode_with(
    plaintext: &[u8],
    key: &KeyMaterial,
    timestamp: u64,
    iv: [u8; IV_SIZE],
) -> Result<Vec<u8>, TokenError> {
    let ciphertext = Aes128CbcEnc::new(&key.encryption_key().into(), &iv.into())
        .encrypt_padded_vec_mut::<Pkcs7>(plaintext);

    let mut token = Vec::with_capacity(MIN_TOKEN_LEN + ciphertext.len());
    token.push(TOKEN_VERSION);
    token.extend_from_slice(&timestamp.to_be_bytes());
    token.extend_from_slice(&iv);
    token.extend_from_slice(&ciphertext);

    let tag = compute_tag(key, &token)?;
    token.extend_from_slice(&tag);
    Ok(token)
}

/// Verify and decrypt a token given as raw bytes or as base64 text.
///
/// The tag is checked in constant time before any decryption happens.
pub fn decode(token: &[u8], key: &KeyMaterial) -> Result<Vec<u8>, TokenError> {
    let bytes = to_token_bytes(token)?;
    check_structure(&bytes)?;

    let (signed, tag) = bytes.split_at(bytes.len() - TAG_SIZE);
    let expected = compute_tag(key, signed)?;
    if !bool::from(expected[..].ct_eq(tag)) {
        return Err(TokenError::AuthenticationFailed);
    }

    if signed[0] != TOKEN_VERSION {
        return Err(TokenError::Malformed("unsupported version"));
    }

    let iv: [u8; IV_SIZE] = signed[IV_OFFSET..CIPHERTEXT_OFFSET]
        .try_into()
        .map_err(|_| TokenError::Malformed("truncated iv"))?;
    let ciphertext = &signed[CIPHERTEXT_OFFSET..];

    Aes128CbcDec::new(&key.encryption_key().into(), &iv.into())
        .decrypt_padded_vec_mut::<Pkcs7>(ciphertext)
        .map_err(|_| TokenError::Malformed("invalid padding"))
}

/// Creation time recorded in a structurally valid token. Does not authenticate.
pub fn token_timestamp(token: &[u8]) -> Result<DateTime<Utc>, TokenError> {
    let bytes = to_token_bytes(token)?;
    check_structure(&bytes)?;

    let raw: [u8; TIMESTAMP_SIZE] = bytes[1..IV_OFFSET]
        .try_into()
        .map_err(|_| TokenError::Malformed("truncated timestamp"))?;
    let secs = i64::try_from(u64::from_be_bytes(raw))
        .map_err(|_| TokenError::Malformed("timestamp out of range"))?;
    DateTime::from_timestamp(secs, 0).ok_or(TokenError::Malformed("timestamp out of range"))
}

fn compute_tag(key: &KeyMaterial, signed: &[u8]) -> Result<[u8; TAG_SIZE], TokenError> {
    let mut mac = <HmacSha256 as Mac>::new_from_slice(key.signing_key())
        .map_err(|e| TokenError::CryptoUnavailable(format!("hmac: {}", e)))?;
    mac.update(signed);
    Ok(mac.finalize().into_bytes().into())
}

fn check_structure(bytes: &[u8]) -> Result<(), TokenError> {
    if bytes.len() < MIN_TOKEN_LEN {
        return Err(TokenError::Malformed("token too short"));
    }
    if (bytes.len() - MIN_TOKEN_LEN) % BLOCK_SIZE != 0 {
        return Err(TokenError::Malformed("ciphertext is not block aligned"));
    }
    Ok(())
}

/// Raw tokens start with the version byte, which is never a base64 character;
/// anything else is treated as transport text.
fn to_token_bytes(input: &[u8]) -> Result<Vec<u8>, TokenError> {
    if input.first() == Some(&TOKEN_VERSION) {
        return Ok(input.to_vec());
    }

    let text = input.trim_ascii();
    BASE64URL
        .decode(text)
        .or_else(|_| BASE64URL_NOPAD.decode(text))
        .map_err(|_| TokenError::Malformed("not url-safe base64"))
}
