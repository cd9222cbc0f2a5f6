#![allow(dead_code)]

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use tempfile::TempDir;
use tokio::sync::broadcast;
use valtools_app_lib::security::KeyMaterial;
use valtools_app_lib::storage::{AppSettings, SettingsStore};
use valtools_app_lib::vault::{BlobStore, MemoryBlobStore, VaultSyncClient};
use valtools_app_lib::worker::{StatusEvent, StatusEventBus, WorkerCommand, WorkerSupervisor};
use valtools_app_lib::AppState;

pub const INJECTOR_SCRIPT: &str = "automation.py";
pub const GUARD_SCRIPT: &str = "steamguard_sync.py";

/// Supervisor running `sh -c <body>`. Inside the body `$0` is `--action`,
/// `$1` the action name, and the remaining arguments follow in order.
pub fn sh_worker(body: &str) -> WorkerSupervisor {
    WorkerSupervisor::new(
        WorkerCommand::new("sh").with_args(["-c", body]),
        StatusEventBus::new(),
    )
}

pub fn shared_key() -> KeyMaterial {
    KeyMaterial::from_bytes([7u8; 32])
}

/// Write a shell script under the name a worker script would have.
pub fn write_script(dir: &Path, name: &str, body: &str) {
    std::fs::write(dir.join(name), body).unwrap();
}

/// An `AppState` over an in-memory blob store whose workers are the shell
/// scripts found in the returned directory.
pub fn test_state(store: Arc<MemoryBlobStore>) -> (AppState, TempDir) {
    let dir = tempfile::tempdir().unwrap();
    write_script(dir.path(), INJECTOR_SCRIPT, "exit 0\n");
    write_script(dir.path(), GUARD_SCRIPT, "echo '{\"success\": true}'\n");

    let settings = AppSettings {
        python_program: "sh".into(),
        backend_dir: dir.path().to_path_buf(),
        steam_path: "/opt/steam/steam.sh".into(),
        ..AppSettings::default()
    };

    let store: Arc<dyn BlobStore> = store;
    let sync = VaultSyncClient::new(store, shared_key());
    let state = AppState::new(SettingsStore::in_dir(dir.path()), settings, sync);
    (state, dir)
}

pub async fn next_event(rx: &mut broadcast::Receiver<StatusEvent>) -> StatusEvent {
    tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("timed out waiting for status event")
        .expect("status channel closed")
}
