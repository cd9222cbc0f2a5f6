use thiserror::Error;

use crate::security::TokenError;
use crate::vault::VaultError;
use crate::worker::WorkerError;

#[derive(Error, Debug)]
pub enum ValtoolsError {
    #[error(transparent)]
    Vault(#[from] VaultError),

    #[error(transparent)]
    Worker(#[from] WorkerError),

    #[error("Encryption error: {0}")]
    Token(#[from] TokenError),

    #[error("Settings error: {0}")]
    Settings(String),

    #[error("Admin login required")]
    AdminRequired,

    #[error("Vault has not been loaded")]
    NotLoaded,

    #[error("Account not found: {0}")]
    AccountNotFound(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ValtoolsError {
    pub fn code(&self) -> &'static str {
        match self {
            ValtoolsError::Vault(e) => e.code(),
            ValtoolsError::Worker(e) => e.code(),
            ValtoolsError::Token(_) => "ENCRYPTION_ERROR",
            ValtoolsError::Settings(_) => "SETTINGS_ERROR",
            ValtoolsError::AdminRequired => "ADMIN_REQUIRED",
            ValtoolsError::NotLoaded => "NOT_LOADED",
            ValtoolsError::AccountNotFound(_) => "ACCOUNT_NOT_FOUND",
            ValtoolsError::Serialization(_) => "SERIALIZATION_ERROR",
            ValtoolsError::Io(_) => "IO_ERROR",
        }
    }
}

impl serde::Serialize for ValtoolsError {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        use serde::ser::SerializeStruct;

        let mut state = serializer.serialize_struct("ValtoolsError", 2)?;
        state.serialize_field("code", self.code())?;
        state.serialize_field("message", &self.to_string())?;
        state.end()
    }
}

pub type Result<T> = std::result::Result<T, ValtoolsError>;
