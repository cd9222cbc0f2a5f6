//! Vault-specific error types for cloud sync operations.
//!
//! The important distinction here is between a remote store that has no
//! vault yet (not an error at all, `load` returns an empty payload) and a
//! vault that exists but cannot be fetched or decrypted (`Unavailable`).
//! Callers must never answer the latter by saving an empty vault.

use thiserror::Error;

use crate::security::TokenError;

/// Errors that can occur during vault sync operations.
#[derive(Error, Debug)]
pub enum VaultError {
    /// The remote vault could not be fetched, decrypted or parsed.
    #[error("Vault unavailable: {0}")]
    Unavailable(String),

    /// The remote store rejected or failed a write.
    #[error("Vault save failed: {0}")]
    SaveFailed(String),

    /// Token encoding failed while preparing a save.
    #[error("Vault encryption: {0}")]
    Token(#[from] TokenError),

    /// A serialization/deserialization error occurred.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The blob store client could not be configured.
    #[error("Blob store configuration error: {0}")]
    Config(String),
}

/// Result type alias for vault operations.
pub type VaultResult<T> = std::result::Result<T, VaultError>;

impl VaultError {
    /// Stable error code for programmatic handling by a front end.
    pub fn code(&self) -> &'static str {
        match self {
            VaultError::Unavailable(_) => "VAULT_UNAVAILABLE",
            VaultError::SaveFailed(_) => "SAVE_FAILED",
            VaultError::Token(_) => "ENCRYPTION_ERROR",
            VaultError::Serialization(_) => "SERIALIZATION_ERROR",
            VaultError::Config(_) => "CONFIG_ERROR",
        }
    }
}

impl serde::Serialize for VaultError {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        use serde::ser::SerializeStruct;

        let mut state = serializer.serialize_struct("VaultError", 2)?;
        state.serialize_field("code", self.code())?;
        state.serialize_field("message", &self.to_string())?;
        state.end()
    }
}
