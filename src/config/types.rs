//! Configuration type definitions
//!
//! This module contains all the struct definitions for configuration.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use tracing::warn;

use super::defaults::*;
use super::store::ConfigStore;
use crate::executor::RunnerConfig;

// ============================================
// INTERPRETER
// ============================================

/// Interpreter override
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InterpreterConfig {
    /// Interpreter binary (tilde is expanded)
    pub path: String,
    /// Flags placed before the script path (default: none)
    #[serde(default)]
    pub args: Vec<String>,
}

impl Default for InterpreterConfig {
    fn default() -> Self {
        InterpreterConfig {
            path: DEFAULT_INTERPRETER.to_string(),
            args: DEFAULT_INTERPRETER_ARGS.iter().map(|s| s.to_string()).collect(),
        }
    }
}

// ============================================
// MAIN CONFIG
// ============================================

/// Settings consumed by the execution subsystem.
///
/// Every field is optional; the `get_*` accessors apply defaults.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    /// Folder that relative script paths are resolved against
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scripts_dir: Option<String>,
    /// Mount point that `usb:` paths are resolved against
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usb_volume: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interpreter: Option<InterpreterConfig>,
    /// Elapsed-time refresh interval (default: 1000)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tick_interval_ms: Option<u64>,
    /// Output drain window after exit (default: 250)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub drain_timeout_ms: Option<u64>,
    /// Persist live PIDs for orphan cleanup (default: true)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub track_orphans: Option<bool>,
}

/// Read `key` from `store` as `T`, warning (and ignoring it) on a type mismatch
fn read_key<T: DeserializeOwned>(store: &dyn ConfigStore, key: &str) -> Option<T> {
    let value = store.get(key)?;
    match serde_json::from_value::<T>(value.clone()) {
        Ok(parsed) => Some(parsed),
        Err(e) => {
            warn!(key = key, error = %e, "Ignoring config value with unexpected type");
            None
        }
    }
}

impl Config {
    /// Build a config from the key-value store; missing or malformed keys fall back to defaults
    pub fn from_store(store: &dyn ConfigStore) -> Config {
        Config {
            scripts_dir: read_key(store, "scriptsDir"),
            usb_volume: read_key(store, "usbVolume"),
            interpreter: read_key(store, "interpreter"),
            tick_interval_ms: read_key(store, "tickIntervalMs"),
            drain_timeout_ms: read_key(store, "drainTimeoutMs"),
            track_orphans: read_key(store, "trackOrphans"),
        }
    }

    /// Returns the scripts folder with `~` expanded
    pub fn get_scripts_dir(&self) -> PathBuf {
        let raw = self.scripts_dir.as_deref().unwrap_or(DEFAULT_SCRIPTS_DIR);
        PathBuf::from(shellexpand::tilde(raw).as_ref())
    }

    /// Returns the USB mount point, if one is configured
    pub fn get_usb_volume(&self) -> Option<PathBuf> {
        self.usb_volume
            .as_deref()
            .map(|raw| PathBuf::from(shellexpand::tilde(raw).as_ref()))
    }

    pub fn get_interpreter(&self) -> InterpreterConfig {
        self.interpreter.clone().unwrap_or_default()
    }

    /// Returns the tick interval, never below [`MIN_TICK_INTERVAL_MS`]
    pub fn get_tick_interval(&self) -> Duration {
        let ms = self
            .tick_interval_ms
            .unwrap_or(DEFAULT_TICK_INTERVAL_MS)
            .max(MIN_TICK_INTERVAL_MS);
        Duration::from_millis(ms)
    }

    pub fn get_drain_timeout(&self) -> Duration {
        Duration::from_millis(self.drain_timeout_ms.unwrap_or(DEFAULT_DRAIN_TIMEOUT_MS))
    }

    pub fn get_track_orphans(&self) -> bool {
        self.track_orphans.unwrap_or(DEFAULT_TRACK_ORPHANS)
    }

    /// Launch settings for the process runner
    pub fn runner_config(&self) -> RunnerConfig {
        let interpreter = self.get_interpreter();
        RunnerConfig {
            interpreter: PathBuf::from(shellexpand::tilde(&interpreter.path).as_ref()),
            args: interpreter.args,
            drain_timeout: self.get_drain_timeout(),
        }
    }
}
