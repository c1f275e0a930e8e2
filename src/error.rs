use std::path::PathBuf;

use thiserror::Error;
use tracing::{error, warn};

/// Error severity for front-end display
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorSeverity {
    Warning,  // recoverable
    Error,    // operation failed
    Critical, // requires user action
}

/// Domain-specific errors for script execution
#[derive(Error, Debug)]
pub enum ScriptDeckError {
    #[error("Failed to launch '{interpreter}': {source}")]
    Launch {
        interpreter: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to wait for script process: {0}")]
    Wait(#[source] std::io::Error),

    #[error("Script not found: {}", .0.display())]
    ScriptNotFound(PathBuf),

    #[error("USB volume is not configured or not mounted (needed for '{0}')")]
    UsbVolumeUnavailable(String),
}

impl ScriptDeckError {
    pub fn severity(&self) -> ErrorSeverity {
        match self {
            Self::Launch { .. } => ErrorSeverity::Critical,
            Self::Wait(_) => ErrorSeverity::Error,
            Self::ScriptNotFound(_) => ErrorSeverity::Error,
            Self::UsbVolumeUnavailable(_) => ErrorSeverity::Warning,
        }
    }

    /// Text shown in a result transcript when this error ends a run
    pub fn user_message(&self) -> String {
        match self {
            Self::Launch { interpreter, source } => {
                format!("Could not start {}: {}", interpreter, source)
            }
            Self::Wait(e) => format!("Lost track of the script process: {}", e),
            Self::ScriptNotFound(path) => format!("Script not found at {}", path.display()),
            Self::UsbVolumeUnavailable(raw) => {
                format!("Connect the USB drive to run {}", raw)
            }
        }
    }
}

pub type Result<T> = std::result::Result<T, ScriptDeckError>;

/// Extension trait for silent error logging with caller location tracking.
/// Use when the operation is recoverable and the user doesn't need to know.
///
/// # Examples
///
/// ```ignore
/// use script_deck::error::ResultExt;
///
/// // Keep running with defaults if the config store can't be read
/// store.load().warn_on_err();
/// ```
pub trait ResultExt<T> {
    /// Log error with caller location and return None. Use for recoverable failures.
    fn log_err(self) -> Option<T>;
    /// Log as warning with caller location and return None. Use for expected failures.
    fn warn_on_err(self) -> Option<T>;
}

impl<T, E: std::fmt::Debug> ResultExt<T> for std::result::Result<T, E> {
    #[track_caller]
    fn log_err(self) -> Option<T> {
        match self {
            Ok(value) => Some(value),
            Err(error) => {
                let caller = std::panic::Location::caller();
                error!(
                    error = ?error,
                    file = caller.file(),
                    line = caller.line(),
                    "Operation failed"
                );
                None
            }
        }
    }

    #[track_caller]
    fn warn_on_err(self) -> Option<T> {
        match self {
            Ok(value) => Some(value),
            Err(error) => {
                let caller = std::panic::Location::caller();
                warn!(
                    error = ?error,
                    file = caller.file(),
                    line = caller.line(),
                    "Operation had warning"
                );
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_launch_error_mentions_interpreter() {
        let err = ScriptDeckError::Launch {
            interpreter: "/usr/bin/osascript".to_string(),
            source: std::io::Error::new(std::io::ErrorKind::NotFound, "not found"),
        };
        assert!(err.to_string().contains("/usr/bin/osascript"));
        assert!(err.user_message().contains("not found"));
        assert_eq!(err.severity(), ErrorSeverity::Critical);
    }

    #[test]
    fn test_usb_error_is_a_warning() {
        let err = ScriptDeckError::UsbVolumeUnavailable("usb:backup.scpt".to_string());
        assert_eq!(err.severity(), ErrorSeverity::Warning);
        assert!(err.user_message().contains("usb:backup.scpt"));
    }

    #[test]
    fn test_result_ext_returns_value_or_none() {
        let ok: std::result::Result<u32, String> = Ok(7);
        assert_eq!(ok.log_err(), Some(7));

        let err: std::result::Result<u32, String> = Err("boom".to_string());
        assert_eq!(err.warn_on_err(), None);
    }
}
