//! Cloud vault: the decrypted account collection and its sync to the
//! remote blob store.

pub mod blob;
pub mod error;
pub mod payload;
pub mod sync;

pub use blob::{BlobStore, JsonBinStore, MemoryBlobStore, DEFAULT_BLOB_BASE_URL};
pub use error::{VaultError, VaultResult};
pub use payload::{AccountRecord, VaultPayload, DEFAULT_CATEGORY};
pub use sync::VaultSyncClient;
