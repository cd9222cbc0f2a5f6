mod config;

pub use config::{default_data_dir, AppSettings, CloudSettings, SettingsStore};
