use super::*;
use crate::cancellation::CancellationManager;
use crate::execution::{ExecutionId, ExecutionStatus, ScriptDescriptor};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tempfile::TempDir;

fn sh_runner() -> ProcessRunner {
    ProcessRunner::new(
        RunnerConfig {
            interpreter: PathBuf::from("/bin/sh"),
            args: Vec::new(),
            drain_timeout: Duration::from_millis(200),
        },
        Arc::new(CancellationManager::new()),
    )
}

fn write_script(dir: &TempDir, name: &str, body: &str) -> ScriptDescriptor {
    let path = dir.path().join(format!("{}.sh", name));
    std::fs::write(&path, body).unwrap();
    ScriptDescriptor::new(name, path)
}

#[test]
fn test_default_config_uses_osascript() {
    let config = RunnerConfig::default();
    assert_eq!(config.interpreter, PathBuf::from("/usr/bin/osascript"));
    assert_eq!(config.args, vec!["-s".to_string(), "o".to_string()]);
}

#[test]
fn test_signal_names() {
    assert_eq!(signal_to_name(15), "SIGTERM");
    assert_eq!(signal_to_name(9), "SIGKILL");
    assert_eq!(signal_to_name(99), "UNKNOWN");
}

#[test]
fn test_stream_event_terminal_flag() {
    let progress = runner::StreamEvent::progress("x".into());
    assert!(!progress.is_terminal());
    let done = runner::StreamEvent::terminal("x".into(), ExecutionStatus::Completed, chrono::Utc::now());
    assert!(done.is_terminal());
}

#[cfg(unix)]
mod unix {
    use super::*;

    #[test]
    fn test_stream_is_bound_to_identity() {
        let dir = TempDir::new().unwrap();
        let script = write_script(&dir, "noop", "exit 0\n");
        let id = ExecutionId::new();

        let stream = sh_runner().start(id, &script);

        assert_eq!(stream.id(), id);
    }

    #[test]
    fn test_progress_is_cumulative_and_terminal_is_last() {
        let dir = TempDir::new().unwrap();
        let script = write_script(
            &dir,
            "staged",
            "printf 'one\\n'\nsleep 0.2\nprintf 'two\\n'\n",
        );

        let events: Vec<StreamEvent> = sh_runner().start(ExecutionId::new(), &script).collect();

        let last = events.last().expect("terminal event");
        assert_eq!(last.status, Some(ExecutionStatus::Completed));
        assert!(last.end_time.is_some());
        assert_eq!(last.output, "one\ntwo\n");

        assert_eq!(events.iter().filter(|e| e.is_terminal()).count(), 1);
        let progress: Vec<&StreamEvent> = events.iter().filter(|e| !e.is_terminal()).collect();
        assert!(!progress.is_empty());
        assert_eq!(progress[0].output, "one\n");
        for pair in events.windows(2) {
            assert!(pair[1].output.starts_with(&pair[0].output));
        }
    }

    #[test]
    fn test_stderr_is_merged_into_transcript() {
        let dir = TempDir::new().unwrap();
        let script = write_script(&dir, "mixed", "echo out\necho err >&2\n");

        let terminal = sh_runner()
            .start(ExecutionId::new(), &script)
            .wait_for_terminal()
            .unwrap();

        assert_eq!(terminal.status, Some(ExecutionStatus::Completed));
        assert!(terminal.output.contains("out\n"));
        assert!(terminal.output.contains("err\n"));
    }

    #[test]
    fn test_silent_success_gets_placeholder_text() {
        let dir = TempDir::new().unwrap();
        let script = write_script(&dir, "silent", "exit 0\n");

        let terminal = sh_runner()
            .start(ExecutionId::new(), &script)
            .wait_for_terminal()
            .unwrap();

        assert_eq!(terminal.status, Some(ExecutionStatus::Completed));
        assert_eq!(terminal.output, "Script completed successfully.");
    }

    #[test]
    fn test_whitespace_only_output_is_kept_verbatim() {
        let dir = TempDir::new().unwrap();
        let script = write_script(&dir, "blank", "printf '  \\n'\n");

        let terminal = sh_runner()
            .start(ExecutionId::new(), &script)
            .wait_for_terminal()
            .unwrap();

        assert_eq!(terminal.status, Some(ExecutionStatus::Completed));
        assert_eq!(terminal.output, "  \n");
    }

    #[test]
    fn test_silent_failure_reports_exit_code() {
        let dir = TempDir::new().unwrap();
        let script = write_script(&dir, "fails", "exit 3\n");

        let terminal = sh_runner()
            .start(ExecutionId::new(), &script)
            .wait_for_terminal()
            .unwrap();

        assert_eq!(terminal.status, Some(ExecutionStatus::Failed));
        assert_eq!(terminal.output, "Script terminated with errors, code: 3");
    }

    #[test]
    fn test_failure_keeps_script_output() {
        let dir = TempDir::new().unwrap();
        let script = write_script(&dir, "noisy", "echo 'execution error: boom' >&2\nexit 1\n");

        let terminal = sh_runner()
            .start(ExecutionId::new(), &script)
            .wait_for_terminal()
            .unwrap();

        assert_eq!(terminal.status, Some(ExecutionStatus::Failed));
        assert_eq!(terminal.output, "execution error: boom\n");
    }

    #[test]
    fn test_launch_failure_is_a_single_failed_event() {
        let dir = TempDir::new().unwrap();
        let script = write_script(&dir, "any", "exit 0\n");
        let processes = Arc::new(CancellationManager::new());
        let runner = ProcessRunner::new(
            RunnerConfig {
                interpreter: dir.path().join("no-such-interpreter"),
                args: Vec::new(),
                drain_timeout: Duration::from_millis(50),
            },
            Arc::clone(&processes),
        );

        let events: Vec<StreamEvent> = runner.start(ExecutionId::new(), &script).collect();

        assert_eq!(events.len(), 1);
        assert_eq!(events[0].status, Some(ExecutionStatus::Failed));
        assert!(events[0].output.contains("Failed to launch"));
        assert_eq!(processes.active_count(), 0);
    }

    #[test]
    fn test_process_is_tracked_only_while_alive() {
        let dir = TempDir::new().unwrap();
        let script = write_script(&dir, "brief", "sleep 0.3\n");
        let runner = sh_runner();
        let id = ExecutionId::new();

        let stream = runner.start(id, &script);
        assert!(runner.processes().is_tracked(&id));

        stream.wait_for_terminal().unwrap();
        assert!(!runner.processes().is_tracked(&id));
    }

    #[test]
    fn test_terminated_process_fails_with_signal_text() {
        let dir = TempDir::new().unwrap();
        let script = write_script(&dir, "sleeper", "sleep 30\n");
        let runner = sh_runner();
        let id = ExecutionId::new();

        let stream = runner.start(id, &script);
        assert!(runner.processes().terminate(&id));
        let terminal = stream.wait_for_terminal().unwrap();

        assert_eq!(terminal.status, Some(ExecutionStatus::Failed));
        assert!(terminal.output.contains("SIGTERM"));
    }

    #[test]
    fn test_lingering_descendant_does_not_hold_up_terminal_event() {
        let dir = TempDir::new().unwrap();
        let script = write_script(&dir, "orphaning", "sleep 5 &\necho parent done\n");
        let runner = sh_runner();
        let started = Instant::now();

        let terminal = runner
            .start(ExecutionId::new(), &script)
            .wait_for_terminal()
            .unwrap();

        assert!(started.elapsed() < Duration::from_secs(3));
        assert_eq!(terminal.status, Some(ExecutionStatus::Completed));
        assert_eq!(terminal.output, "parent done\n");
    }

    #[test]
    fn test_concurrent_runs_do_not_cross_streams() {
        let dir = TempDir::new().unwrap();
        let runner = sh_runner();
        let fast = write_script(&dir, "fast", "echo fast\n");
        let slow = write_script(&dir, "slow", "sleep 0.3\necho slow\n");

        let slow_stream = runner.start(ExecutionId::new(), &slow);
        let fast_stream = runner.start(ExecutionId::new(), &fast);

        let fast_done = fast_stream.wait_for_terminal().unwrap();
        let slow_done = slow_stream.wait_for_terminal().unwrap();
        assert_eq!(fast_done.output, "fast\n");
        assert_eq!(slow_done.output, "slow\n");
    }
}
