use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

/// Lower-case hex SHA-256 of `secret`, the admin verifier format stored in the vault.
pub fn hash_secret(secret: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(secret.as_bytes());
    hex::encode(hasher.finalize())
}

/// Check `candidate` against a stored verifier without an early-exit comparison.
pub fn verify_secret(candidate: &str, expected_hex: &str) -> bool {
    if expected_hex.is_empty() {
        return false;
    }
    let actual = hash_secret(candidate);
    let expected = expected_hex.to_ascii_lowercase();
    actual.as_bytes().ct_eq(expected.as_bytes()).into()
}
