use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::debug;

use crate::error::{Result, ValtoolsError};
use crate::storage::{AppSettings, SettingsStore};
use crate::vault::{VaultPayload, VaultSyncClient};
use crate::worker::{StatusEventBus, WorkerSupervisor};

/// Everything the command surface operates on.
///
/// Worker commands are derived from the settings at construction time;
/// changes to `python_program` or `backend_dir` take effect on the next start.
pub struct AppState {
    pub settings_store: SettingsStore,
    pub settings: Arc<RwLock<AppSettings>>,
    /// `None` until the remote vault has been loaded successfully.
    pub vault: Arc<RwLock<Option<VaultPayload>>>,
    /// Set by a successful admin login, cleared on logout.
    pub admin_session: AtomicBool,
    pub sync: VaultSyncClient,
    /// Login-automation worker.
    pub injector: WorkerSupervisor,
    /// Steam Guard vault worker.
    pub guard: WorkerSupervisor,
    pub events: StatusEventBus,
}

impl AppState {
    pub fn new(settings_store: SettingsStore, settings: AppSettings, sync: VaultSyncClient) -> Self {
        let events = StatusEventBus::new();
        let injector = WorkerSupervisor::new(settings.injector_command(), events.clone())
            .with_spool_threshold(settings.spool_threshold_bytes);
        let guard = WorkerSupervisor::new(settings.guard_command(), events.clone())
            .with_spool_threshold(settings.spool_threshold_bytes);

        Self {
            settings_store,
            settings: Arc::new(RwLock::new(settings)),
            vault: Arc::new(RwLock::new(None)),
            admin_session: AtomicBool::new(false),
            sync,
            injector,
            guard,
            events,
        }
    }

    pub fn is_admin(&self) -> bool {
        self.admin_session.load(Ordering::SeqCst)
    }

    pub fn set_admin(&self, active: bool) {
        debug!("Admin session {}", if active { "opened" } else { "closed" });
        self.admin_session.store(active, Ordering::SeqCst);
    }

    pub fn require_admin(&self) -> Result<()> {
        if self.is_admin() {
            Ok(())
        } else {
            Err(ValtoolsError::AdminRequired)
        }
    }

    /// Snapshot of the loaded vault.
    pub async fn payload(&self) -> Result<VaultPayload> {
        self.vault
            .read()
            .await
            .clone()
            .ok_or(ValtoolsError::NotLoaded)
    }
}
