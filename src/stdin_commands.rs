//! External command handling via stdin.
//!
//! `script-deck serve` is driven by JSONL commands on stdin. This is the
//! headless stand-in for the buttons of a front end, and is what tests and
//! automation use.
//!
//! # Protocol
//!
//! Commands are sent as JSON objects, one per line (JSONL format):
//!
//! ```json
//! {"type": "run", "path": "~/Library/Scripts/hello.scpt"}
//! {"type": "run", "path": "usb:/Scripts/backup.scpt", "name": "Backup"}
//! {"type": "cancel", "id": "7d0c3a52-2f0e-4f7e-9c1a-8f1f9b7f6c11"}
//! {"type": "cancelAll"}
//! {"type": "select", "id": "7d0c3a52-2f0e-4f7e-9c1a-8f1f9b7f6c11"}
//! {"type": "remove", "id": "7d0c3a52-2f0e-4f7e-9c1a-8f1f9b7f6c11"}
//! {"type": "clearCompleted"}
//! {"type": "removeAll"}
//! {"type": "list"}
//! {"type": "quit"}
//! ```
//!
//! # Example Usage
//!
//! ```bash
//! echo '{"type": "run", "path": "/path/to/hello.applescript"}' | script-deck serve
//! ```

use std::io::BufRead;

use crate::execution::ExecutionId;
use crate::logging;

/// External commands accepted by `serve`
#[derive(Debug, Clone, PartialEq, serde::Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ExternalCommand {
    /// Run a script by (unresolved) path
    Run {
        path: String,
        /// Display name; defaults to the file stem
        #[serde(default)]
        name: Option<String>,
        /// Optional request ID for correlation in logs
        #[serde(default, rename = "requestId")]
        request_id: Option<String>,
    },
    /// Stop one execution
    Cancel { id: ExecutionId },
    /// Stop every running execution
    CancelAll,
    Select { id: ExecutionId },
    Remove { id: ExecutionId },
    /// Remove every finished execution
    ClearCompleted,
    RemoveAll,
    /// Print the current snapshot
    List,
    Quit,
}

/// Parse one JSONL line. Blank lines yield `None`.
pub fn parse_command(line: &str) -> Option<Result<ExternalCommand, serde_json::Error>> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }
    Some(serde_json::from_str(line))
}

/// Start a thread reading commands from stdin.
///
/// Returns an async_channel::Receiver; the main loop polls it between pumps.
pub fn start_stdin_listener() -> async_channel::Receiver<ExternalCommand> {
    spawn_command_listener(std::io::BufReader::new(std::io::stdin()))
}

/// Read JSONL commands from `reader` on a background thread until EOF
pub fn spawn_command_listener(
    reader: impl BufRead + Send + 'static,
) -> async_channel::Receiver<ExternalCommand> {
    // Bounded: commands arrive at human speed
    let (tx, rx) = async_channel::bounded(100);

    std::thread::spawn(move || {
        logging::log("STDIN", "External command listener started");

        for line in reader.lines() {
            let line = match line {
                Ok(line) => line,
                Err(e) => {
                    logging::log("STDIN", &format!("Error reading stdin: {}", e));
                    break;
                }
            };
            match parse_command(&line) {
                Some(Ok(cmd)) => {
                    logging::log("STDIN", &format!("Parsed command: {:?}", cmd));
                    // send_blocking is used since we're in a sync thread
                    if tx.send_blocking(cmd).is_err() {
                        logging::log("STDIN", "Command channel closed, exiting");
                        break;
                    }
                }
                Some(Err(e)) => {
                    logging::log("STDIN", &format!("Failed to parse command: {}", e));
                }
                None => {} // Empty line, ignore
            }
        }
        logging::log("STDIN", "External command listener exiting");
    });

    rx
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_external_command_run_deserialization() {
        let json = r#"{"type": "run", "path": "/path/to/hello.scpt"}"#;
        let cmd: ExternalCommand = serde_json::from_str(json).unwrap();
        match cmd {
            ExternalCommand::Run {
                path,
                name,
                request_id,
            } => {
                assert_eq!(path, "/path/to/hello.scpt");
                assert!(name.is_none());
                assert!(request_id.is_none());
            }
            _ => panic!("Expected Run command"),
        }
    }

    #[test]
    fn test_external_command_run_with_name_and_request_id() {
        let json = r#"{"type": "run", "path": "usb:/a.scpt", "name": "A", "requestId": "req-1"}"#;
        let cmd: ExternalCommand = serde_json::from_str(json).unwrap();
        assert_eq!(
            cmd,
            ExternalCommand::Run {
                path: "usb:/a.scpt".into(),
                name: Some("A".into()),
                request_id: Some("req-1".into()),
            }
        );
    }

    #[test]
    fn test_external_command_cancel_parses_identity() {
        let id = ExecutionId::new();
        let json = format!(r#"{{"type": "cancel", "id": "{}"}}"#, id);
        let cmd: ExternalCommand = serde_json::from_str(&json).unwrap();
        assert_eq!(cmd, ExternalCommand::Cancel { id });
    }

    #[test]
    fn test_external_command_unit_variants() {
        for (json, expected) in [
            (r#"{"type": "cancelAll"}"#, ExternalCommand::CancelAll),
            (r#"{"type": "clearCompleted"}"#, ExternalCommand::ClearCompleted),
            (r#"{"type": "removeAll"}"#, ExternalCommand::RemoveAll),
            (r#"{"type": "list"}"#, ExternalCommand::List),
            (r#"{"type": "quit"}"#, ExternalCommand::Quit),
        ] {
            assert_eq!(serde_json::from_str::<ExternalCommand>(json).unwrap(), expected);
        }
    }

    #[test]
    fn test_external_command_invalid_identity_fails() {
        let json = r#"{"type": "select", "id": "not-a-uuid"}"#;
        assert!(serde_json::from_str::<ExternalCommand>(json).is_err());
    }

    #[test]
    fn test_external_command_missing_required_field_fails() {
        let json = r#"{"type": "run"}"#;
        assert!(serde_json::from_str::<ExternalCommand>(json).is_err());
    }

    #[test]
    fn test_parse_command_skips_blank_lines() {
        assert!(parse_command("   ").is_none());
        assert!(matches!(parse_command("{\"type\":\"list\"}"), Some(Ok(ExternalCommand::List))));
        assert!(matches!(parse_command("garbage"), Some(Err(_))));
    }

    #[test]
    fn test_listener_forwards_valid_commands_until_eof() {
        let input = "{\"type\":\"list\"}\n\nnot json\n{\"type\":\"quit\"}\n";
        let rx = spawn_command_listener(Cursor::new(input.as_bytes().to_vec()));

        let received: Vec<ExternalCommand> = std::iter::from_fn(|| rx.recv_blocking().ok()).collect();

        assert_eq!(received, vec![ExternalCommand::List, ExternalCommand::Quit]);
    }
}
