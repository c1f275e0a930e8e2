//! Script loading from file system
//!
//! This module provides functions for finding AppleScript files under the
//! configured scripts folder.

use std::path::Path;
use tracing::{debug, instrument, warn};

use glob::{glob, Pattern};

use crate::config::Config;
use crate::execution::ScriptDescriptor;

/// Compiled and source AppleScript
pub const SCRIPT_EXTENSIONS: &[&str] = &["scpt", "applescript"];

/// True for `.scpt` / `.applescript` paths (case-insensitive)
pub fn is_applescript(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| {
            SCRIPT_EXTENSIONS
                .iter()
                .any(|known| ext.eq_ignore_ascii_case(known))
        })
}

/// Reads scripts from the configured scripts folder
pub fn read_scripts(config: &Config) -> Vec<ScriptDescriptor> {
    read_scripts_from_dir(&config.get_scripts_dir())
}

/// Recursively collect AppleScript files under `dir`, sorted by name.
///
/// Returns empty vec if the directory doesn't exist or is inaccessible.
#[instrument(level = "debug", skip_all, fields(dir = %dir.display()))]
pub fn read_scripts_from_dir(dir: &Path) -> Vec<ScriptDescriptor> {
    if !dir.is_dir() {
        debug!("Scripts directory not found");
        return vec![];
    }

    let pattern = format!("{}/**/*", Pattern::escape(&dir.to_string_lossy()));
    let entries = match glob(&pattern) {
        Ok(entries) => entries,
        Err(e) => {
            warn!(error = %e, pattern = %pattern, "Failed to glob scripts directory");
            return vec![];
        }
    };

    let mut scripts: Vec<ScriptDescriptor> = entries
        .filter_map(|entry| match entry {
            Ok(path) => Some(path),
            Err(e) => {
                warn!(error = %e, "Skipping unreadable entry in scripts directory");
                None
            }
        })
        .filter(|path| path.is_file() && is_applescript(path))
        .map(|path| ScriptDescriptor::from_path(&path))
        .collect();

    // Sort by name, then path for scripts with the same name in different folders
    scripts.sort_by(|a, b| {
        a.name
            .to_lowercase()
            .cmp(&b.name.to_lowercase())
            .then_with(|| a.resolved_path.cmp(&b.resolved_path))
    });

    debug!(count = scripts.len(), "Loaded scripts");
    scripts
}
