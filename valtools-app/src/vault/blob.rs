//! Remote blob store holding the single encrypted vault token.
//!
//! The store is opaque to the rest of the crate: one blob, addressed by a
//! fixed identifier, with `get_latest` and `put`.

use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::vault::error::{VaultError, VaultResult};

/// Default JSON bin API root.
pub const DEFAULT_BLOB_BASE_URL: &str = "https://api.jsonbin.io/v3/b";

/// Header carrying the static access key.
const ACCESS_KEY_HEADER: &str = "X-Master-Key";

#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Latest stored token text, or `None` when nothing has been stored yet.
    async fn get_latest(&self) -> VaultResult<Option<String>>;

    /// Replace the stored blob with `token`.
    async fn put(&self, token: &str) -> VaultResult<()>;
}

#[derive(Debug, Serialize, Deserialize)]
struct BlobBody {
    #[serde(default)]
    payload: Option<String>,
}

#[derive(Debug, Deserialize)]
struct LatestResponse {
    #[serde(default)]
    record: Option<BlobBody>,
}

/// JSON bin backed store reached over plain HTTPS request/response calls.
#[derive(Debug, Clone)]
pub struct JsonBinStore {
    client: reqwest::Client,
    base_url: String,
    bin_id: String,
}

impl JsonBinStore {
    pub fn new(
        base_url: impl Into<String>,
        bin_id: impl Into<String>,
        access_key: &str,
    ) -> VaultResult<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(
            ACCESS_KEY_HEADER,
            HeaderValue::from_str(access_key)
                .map_err(|e| VaultError::Config(format!("invalid access key header value: {}", e)))?,
        );

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| VaultError::Config(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            bin_id: bin_id.into(),
        })
    }

    fn latest_url(&self) -> String {
        format!("{}/{}/latest", self.base_url, self.bin_id)
    }

    fn bin_url(&self) -> String {
        format!("{}/{}", self.base_url, self.bin_id)
    }
}

#[async_trait]
impl BlobStore for JsonBinStore {
    async fn get_latest(&self) -> VaultResult<Option<String>> {
        let response = self
            .client
            .get(self.latest_url())
            .send()
            .await
            .map_err(|e| VaultError::Unavailable(format!("request failed: {}", e)))?;

        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            debug!("Blob store has no bin yet");
            return Ok(None);
        }
        if !status.is_success() {
            return Err(VaultError::Unavailable(format!("HTTP {}", status.as_u16())));
        }

        let body: LatestResponse = response
            .json()
            .await
            .map_err(|e| VaultError::Unavailable(format!("unexpected response body: {}", e)))?;

        Ok(body
            .record
            .and_then(|record| record.payload)
            .filter(|payload| !payload.is_empty()))
    }

    async fn put(&self, token: &str) -> VaultResult<()> {
        let response = self
            .client
            .put(self.bin_url())
            .json(&BlobBody {
                payload: Some(token.to_string()),
            })
            .send()
            .await
            .map_err(|e| VaultError::SaveFailed(format!("request failed: {}", e)))?;

        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            Err(VaultError::SaveFailed(format!("HTTP {}", status.as_u16())))
        }
    }
}

/// Process-local store, for offline runs and tests.
#[derive(Debug, Default)]
pub struct MemoryBlobStore {
    blob: Mutex<Option<String>>,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_blob(blob: impl Into<String>) -> Self {
        Self {
            blob: Mutex::new(Some(blob.into())),
        }
    }

    fn lock(&self) -> VaultResult<std::sync::MutexGuard<'_, Option<String>>> {
        self.blob
            .lock()
            .map_err(|_| VaultError::Unavailable("memory store lock poisoned".into()))
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn get_latest(&self) -> VaultResult<Option<String>> {
        Ok(self.lock()?.clone().filter(|blob| !blob.is_empty()))
    }

    async fn put(&self, token: &str) -> VaultResult<()> {
        *self.lock()? = Some(token.to_string());
        Ok(())
    }
}
