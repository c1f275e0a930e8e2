//! Default configuration values
//!
//! All constants used throughout the config module are defined here.

/// Folder scanned for scripts when none is configured
pub const DEFAULT_SCRIPTS_DIR: &str = "~/Library/Scripts";

/// Interpreter used for every script
pub const DEFAULT_INTERPRETER: &str = "/usr/bin/osascript";

/// `-s o` sends script errors to stdout so they land in the transcript
pub const DEFAULT_INTERPRETER_ARGS: &[&str] = &["-s", "o"];

/// Elapsed-time refresh while something is running
pub const DEFAULT_TICK_INTERVAL_MS: u64 = 1000;

/// Smallest accepted tick interval
pub const MIN_TICK_INTERVAL_MS: u64 = 50;

/// Final output drain after process exit
pub const DEFAULT_DRAIN_TIMEOUT_MS: u64 = 250;

/// Persist live PIDs so a crashed session's children can be reaped
pub const DEFAULT_TRACK_ORPHANS: bool = true;

/// Prefix marking a path as relative to the USB volume
pub const USB_PATH_MARKER: &str = "usb:";

/// Application data directory
pub const DEFAULT_DATA_DIR: &str = "~/.scriptdeck";

/// Config file inside the data directory
pub const CONFIG_FILE_NAME: &str = "config.json";

/// Active-process file inside the data directory
pub const ACTIVE_PIDS_FILE_NAME: &str = "active-pids.json";
