//! Structured JSONL logging for tooling and human-readable stderr output.
//!
//! This module provides dual-output logging:
//! - **JSONL to file** (~/.scriptdeck/logs/script-deck.jsonl) - structured for machine parsing
//! - **Compact to stderr** - human-readable for developers
//!
//! # Usage
//!
//! ```rust,ignore
//! use script_deck::logging;
//!
//! // Initialize logging - MUST keep guard alive for duration of program
//! let _guard = logging::init();
//!
//! // Use tracing macros directly
//! tracing::info!(event_type = "app_start", "Application started");
//! ```
//!
//! # JSONL Output Format
//!
//! Each line is a valid JSON object:
//! ```json
//! {"timestamp":"2026-01-05T10:30:45.123Z","level":"INFO","target":"script_deck::execution::coordinator","fields":{"event_type":"script_event","execution_id":"7d0c…","action":"completed","duration_ms":42}}
//! ```

use std::fs::{self, File, OpenOptions};
use std::path::PathBuf;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

/// Guard that must be kept alive for the duration of the program.
/// Dropping this guard will flush and close the log file.
pub struct LoggingGuard {
    _file_guard: Option<WorkerGuard>,
}

/// Initialize the dual-output logging system.
///
/// Returns a guard that MUST be kept alive for the duration of the program.
/// If the log file can't be opened, only the stderr layer is installed.
pub fn init() -> LoggingGuard {
    let log_dir = get_log_dir();
    if let Err(e) = fs::create_dir_all(&log_dir) {
        eprintln!("[LOGGING] Failed to create log directory: {}", e);
    }

    let log_path = log_path();

    // Environment filter - default to info, allow override via RUST_LOG
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let file = match OpenOptions::new().create(true).append(true).open(&log_path) {
        Ok(file) => Some(file),
        Err(e) => {
            eprintln!("[LOGGING] Failed to open log file {}: {}", log_path.display(), e);
            None
        }
    };

    let (subscriber, file_guard) = build_subscriber(env_filter, file);
    let _ = subscriber.try_init();

    tracing::info!(
        event_type = "app_lifecycle",
        action = "started",
        log_path = %log_path.display(),
        "Application logging initialized"
    );

    LoggingGuard {
        _file_guard: file_guard,
    }
}

/// Filter + optional JSONL file layer + compact stderr layer
fn build_subscriber(
    env_filter: EnvFilter,
    file: Option<File>,
) -> (impl tracing::Subscriber + Send + Sync + 'static, Option<WorkerGuard>) {
    let (json_layer, file_guard) = match file {
        Some(file) => {
            // Non-blocking writer keeps runner threads from stalling on disk I/O
            let (non_blocking_file, file_guard) = tracing_appender::non_blocking(file);

            let json_layer = fmt::layer()
                .json()
                .with_writer(non_blocking_file)
                .with_timer(fmt::time::UtcTime::rfc_3339())
                .with_target(true)
                .with_level(true)
                .with_thread_ids(false)
                .with_thread_names(true)
                .with_file(false)
                .with_line_number(false)
                .with_span_events(FmtSpan::NONE);
            (Some(json_layer), Some(file_guard))
        }
        None => (None, None),
    };

    // Compact layer for stderr (human developers). stdout is reserved for command output.
    let pretty_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_ansi(true)
        .with_target(true)
        .with_level(true)
        .with_thread_ids(false)
        .compact();

    let subscriber = tracing_subscriber::registry()
        .with(env_filter)
        .with(json_layer)
        .with(pretty_layer);
    (subscriber, file_guard)
}

/// Get the log directory path (~/.scriptdeck/logs/)
fn get_log_dir() -> PathBuf {
    dirs::home_dir()
        .map(|h| h.join(".scriptdeck").join("logs"))
        .unwrap_or_else(|| std::env::temp_dir().join("script-deck-logs"))
}

/// Get the path to the JSONL log file
pub fn log_path() -> PathBuf {
    get_log_dir().join("script-deck.jsonl")
}

/// Category-tagged log line.
///
/// Prefer tracing macros with structured fields for anything new:
/// ```rust
/// tracing::info!(category = "EXEC", pid = 42, "Process spawned");
/// ```
pub fn log(category: &str, message: &str) {
    tracing::info!(category = category, "{}", message);
}

/// Log a script lifecycle event with structured fields
pub fn log_script_event(execution_id: &str, action: &str, duration_ms: Option<u64>, success: bool) {
    match duration_ms {
        Some(duration) => {
            tracing::info!(
                event_type = "script_event",
                execution_id = execution_id,
                action = action,
                duration_ms = duration,
                success = success,
                "Script {} {}",
                action,
                execution_id
            );
        }
        None => {
            tracing::info!(
                event_type = "script_event",
                execution_id = execution_id,
                action = action,
                success = success,
                "Script {} {}",
                action,
                execution_id
            );
        }
    }
}
