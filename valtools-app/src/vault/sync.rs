//! VaultSyncClient - round-trips the vault through the token codec and the
//! remote blob store.
//!
//! Every save uploads the complete payload (last writer wins, no merge).
//! Network failures are not retried here; retrying is up to the caller.

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::security::{decode_token, encode_token_text, KeyMaterial};
use crate::vault::blob::BlobStore;
use crate::vault::error::{VaultError, VaultResult};
use crate::vault::payload::VaultPayload;

pub struct VaultSyncClient {
    store: Arc<dyn BlobStore>,
    key: KeyMaterial,
}

impl VaultSyncClient {
    pub fn new(store: Arc<dyn BlobStore>, key: KeyMaterial) -> Self {
        Self { store, key }
    }

    /// Fetch and decrypt the remote vault.
    ///
    /// An absent or empty blob yields an empty payload with no admin
    /// verifier. A blob that exists but cannot be decrypted or parsed is
    /// `Unavailable`, never an empty vault.
    pub async fn load(&self) -> VaultResult<VaultPayload> {
        let blob = self.store.get_latest().await.map_err(|e| match e {
            VaultError::Unavailable(_) => e,
            other => VaultError::Unavailable(other.to_string()),
        })?;

        let Some(token) = blob else {
            info!("Remote vault is empty, starting with a fresh payload");
            return Ok(VaultPayload::default());
        };

        let plaintext = decode_token(token.as_bytes(), &self.key).map_err(|e| {
            warn!("Stored vault token rejected: {}", e);
            VaultError::Unavailable(format!("stored vault could not be decrypted ({})", e))
        })?;

        let payload: VaultPayload = serde_json::from_slice(&plaintext).map_err(|e| {
            VaultError::Unavailable(format!("stored vault is not a valid payload: {}", e))
        })?;

        info!("Loaded vault with {} accounts", payload.accounts.len());
        Ok(payload)
    }

    /// Encrypt and upload the full payload, overwriting the remote blob.
    pub async fn save(&self, payload: &VaultPayload) -> VaultResult<()> {
        let plaintext = serde_json::to_vec(payload)?;
        let token = encode_token_text(&plaintext, &self.key)?;
        debug!("Encoded vault token ({} bytes)", token.len());

        self.store.put(&token).await?;
        info!("Saved vault with {} accounts", payload.accounts.len());
        Ok(())
    }
}
