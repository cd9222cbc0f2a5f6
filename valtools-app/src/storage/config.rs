use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::error::{Result, ValtoolsError};
use crate::vault::DEFAULT_BLOB_BASE_URL;
use crate::worker::{WorkerCommand, DEFAULT_SPOOL_THRESHOLD};

const SETTINGS_FILE: &str = "settings.json";
const INJECTOR_SCRIPT: &str = "automation.py";
const GUARD_SCRIPT: &str = "steamguard_sync.py";

/// Remote vault location. The access key is a secret and is never stored here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CloudSettings {
    pub base_url: String,
    pub bin_id: String,
}

impl Default for CloudSettings {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BLOB_BASE_URL.to_string(),
            bin_id: String::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppSettings {
    pub steam_path: String,
    pub python_program: String,
    pub backend_dir: PathBuf,
    pub spool_threshold_bytes: usize,
    pub cloud: CloudSettings,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            steam_path: default_steam_path().to_string(),
            python_program: "python".to_string(),
            backend_dir: PathBuf::from("backend"),
            spool_threshold_bytes: DEFAULT_SPOOL_THRESHOLD,
            cloud: CloudSettings::default(),
        }
    }
}

fn default_steam_path() -> &'static str {
    if cfg!(windows) {
        "C:\\Program Files (x86)\\Steam\\steam.exe"
    } else {
        "steam"
    }
}

impl AppSettings {
    /// Command for the login-automation worker.
    pub fn injector_command(&self) -> WorkerCommand {
        self.script_command(INJECTOR_SCRIPT)
    }

    /// Command for the Steam Guard vault worker.
    pub fn guard_command(&self) -> WorkerCommand {
        self.script_command(GUARD_SCRIPT)
    }

    fn script_command(&self, script: &str) -> WorkerCommand {
        let script = self.backend_dir.join(script);
        WorkerCommand::new(&self.python_program).with_args([script.to_string_lossy()])
    }
}

/// Per-user data directory (`<platform data dir>/valtools`).
pub fn default_data_dir() -> Result<PathBuf> {
    dirs::data_dir()
        .map(|dir| dir.join("valtools"))
        .ok_or_else(|| ValtoolsError::Settings("No data directory on this platform".into()))
}

/// JSON settings file on disk.
#[derive(Debug, Clone)]
pub struct SettingsStore {
    path: PathBuf,
}

impl SettingsStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// `settings.json` inside `dir`.
    pub fn in_dir(dir: impl AsRef<Path>) -> Self {
        Self::new(dir.as_ref().join(SETTINGS_FILE))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Missing file means defaults. Missing fields fall back individually.
    pub fn load(&self) -> Result<AppSettings> {
        if !self.path.exists() {
            debug!("No settings at {}, using defaults", self.path.display());
            return Ok(AppSettings::default());
        }

        let content = std::fs::read_to_string(&self.path)?;
        let settings: AppSettings = serde_json::from_str(&content)?;
        Ok(settings)
    }

    pub fn save(&self, settings: &AppSettings) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = serde_json::to_string_pretty(settings)?;

        // Write atomically (write to temp file, then rename)
        let temp_path = self.path.with_extension("json.tmp");
        std::fs::write(&temp_path, content)?;
        std::fs::rename(&temp_path, &self.path)?;

        debug!("Saved settings to {}", self.path.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let store = SettingsStore::in_dir(dir.path());
        assert_eq!(store.load().unwrap(), AppSettings::default());
    }

    #[test]
    fn test_save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let store = SettingsStore::in_dir(dir.path().join("nested"));

        let mut settings = AppSettings::default();
        settings.steam_path = "/opt/steam/steam.sh".into();
        settings.cloud.bin_id = "abc123".into();
        settings.spool_threshold_bytes = 1024;

        store.save(&settings).unwrap();
        assert_eq!(store.load().unwrap(), settings);
        assert!(!store.path().with_extension("json.tmp").exists());
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let store = SettingsStore::in_dir(dir.path());
        std::fs::write(store.path(), r#"{"steam_path": "D:\\Steam\\steam.exe"}"#).unwrap();

        let settings = store.load().unwrap();
        assert_eq!(settings.steam_path, "D:\\Steam\\steam.exe");
        assert_eq!(settings.python_program, "python");
        assert_eq!(settings.cloud.base_url, DEFAULT_BLOB_BASE_URL);
    }

    #[test]
    fn test_corrupt_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let store = SettingsStore::in_dir(dir.path());
        std::fs::write(store.path(), "{not json").unwrap();
        assert!(matches!(store.load(), Err(ValtoolsError::Serialization(_))));
    }

    #[test]
    fn test_worker_commands_point_at_backend_scripts() {
        let settings = AppSettings {
            python_program: "python3".into(),
            backend_dir: PathBuf::from("/srv/backend"),
            ..AppSettings::default()
        };
        let guard = settings.guard_command();
        assert_eq!(guard.program, "python3");
        assert_eq!(guard.base_args, vec!["/srv/backend/steamguard_sync.py"]);
        assert!(settings.injector_command().base_args[0].ends_with("automation.py"));
    }
}
