pub mod commands;
pub mod error;
pub mod security;
pub mod state;
pub mod storage;
pub mod vault;
pub mod worker;

use std::path::Path;
use std::sync::Arc;

use tracing::info;
use tracing_subscriber::util::TryInitError;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

pub use error::{Result, ValtoolsError};
pub use state::AppState;

use security::KeyMaterial;
use storage::SettingsStore;
use vault::{BlobStore, JsonBinStore, VaultSyncClient};
use worker::{StatusEventBus, WorkerSupervisor};

/// Default log filter when `RUST_LOG` is unset.
pub const DEFAULT_LOG_FILTER: &str = "valtools_app_lib=debug";

/// Install the global tracing subscriber, logging to stderr so stdout stays
/// free for command output. `RUST_LOG` overrides `default_filter`.
///
/// Fails if a global subscriber is already installed.
pub fn init_tracing(default_filter: &str) -> std::result::Result<(), TryInitError> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .try_init()
}

/// Steam Guard worker supervisor configured from the settings in `data_dir`.
///
/// Needs neither the blob-store access key nor the shared vault key.
pub fn guard_supervisor(data_dir: &Path) -> Result<WorkerSupervisor> {
    let settings = SettingsStore::in_dir(data_dir).load()?;
    Ok(
        WorkerSupervisor::new(settings.guard_command(), StatusEventBus::new())
            .with_spool_threshold(settings.spool_threshold_bytes),
    )
}

/// Build the application context from the settings in `data_dir` and the
/// two secrets, which are never persisted.
pub fn init_state(data_dir: &Path, access_key: &str, shared_key: KeyMaterial) -> Result<AppState> {
    let settings_store = SettingsStore::in_dir(data_dir);
    let settings = settings_store.load()?;

    if settings.cloud.bin_id.is_empty() {
        return Err(ValtoolsError::Settings(format!(
            "cloud.bin_id is not set in {}",
            settings_store.path().display()
        )));
    }

    let store: Arc<dyn BlobStore> = Arc::new(JsonBinStore::new(
        settings.cloud.base_url.clone(),
        settings.cloud.bin_id.clone(),
        access_key,
    )?);
    info!("Using vault bin {}", settings.cloud.bin_id);

    let sync = VaultSyncClient::new(store, shared_key);
    Ok(AppState::new(settings_store, settings, sync))
}
