//! Configuration loading from file system
//!
//! Handles locating and loading ~/.scriptdeck/config.json.

use std::path::{Path, PathBuf};
use tracing::{info, instrument, warn};

use super::defaults::{ACTIVE_PIDS_FILE_NAME, CONFIG_FILE_NAME, DEFAULT_DATA_DIR};
use super::store::{ConfigStore, JsonConfigStore};
use super::types::Config;

/// ~/.scriptdeck
pub fn data_dir() -> PathBuf {
    PathBuf::from(shellexpand::tilde(DEFAULT_DATA_DIR).as_ref())
}

/// ~/.scriptdeck/config.json
pub fn config_path() -> PathBuf {
    data_dir().join(CONFIG_FILE_NAME)
}

/// ~/.scriptdeck/active-pids.json
pub fn active_pids_path() -> PathBuf {
    data_dir().join(ACTIVE_PIDS_FILE_NAME)
}

/// Load configuration from ~/.scriptdeck/config.json
///
/// Returns Config::default() if the file is missing or unreadable.
#[instrument(name = "load_config")]
pub fn load_config() -> Config {
    load_config_from(&config_path())
}

/// Load configuration from `path`, falling back to defaults on any failure
pub fn load_config_from(path: &Path) -> Config {
    let mut store = JsonConfigStore::with_path(path.to_path_buf());
    if let Err(e) = store.load() {
        warn!(path = %path.display(), error = ?e, "Failed to load config, using defaults");
        return Config::default();
    }

    let config = Config::from_store(&store);
    info!(
        path = %path.display(),
        scripts_dir = %config.get_scripts_dir().display(),
        usb_volume = ?config.usb_volume,
        "Loaded config"
    );
    config
}
