//! Script process runner
//!
//! One call to [`ProcessRunner::start`] launches one interpreter process for
//! one script and streams its output back:
//! - stdout and stderr share a single pipe so interleaving is preserved
//! - a reader thread picks up every chunk as soon as it is readable and
//!   re-emits the whole transcript (never a diff)
//! - a wait thread blocks on process exit, drains what is left, and emits the
//!   single terminal event
//!
//! Events carry no identity of their own. The stream (or the caller's sink
//! closure) is bound to the identity passed to `start`, so an event can never
//! be filed under a different execution.

use crate::cancellation::CancellationManager;
use crate::config::defaults::{DEFAULT_DRAIN_TIMEOUT_MS, DEFAULT_INTERPRETER, DEFAULT_INTERPRETER_ARGS};
use crate::error::ScriptDeckError;
use crate::execution::{ExecutionId, ExecutionStatus, ScriptDescriptor};
use crate::logging;
use chrono::{DateTime, Utc};
use std::io::{self, PipeReader, Read};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, error, info, instrument, warn};

#[cfg(unix)]
use std::os::unix::process::{CommandExt, ExitStatusExt};

use super::output::SharedOutput;

/// Bytes requested per read on the output pipe
const READ_CHUNK_SIZE: usize = 8 * 1024;

/// One update from a running script
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamEvent {
    /// Entire transcript so far
    pub output: String,
    /// Set only on the terminal event
    pub status: Option<ExecutionStatus>,
    /// Set only on the terminal event
    pub end_time: Option<DateTime<Utc>>,
}

impl StreamEvent {
    pub(crate) fn progress(output: String) -> Self {
        Self {
            output,
            status: None,
            end_time: None,
        }
    }

    pub(crate) fn terminal(output: String, status: ExecutionStatus, end_time: DateTime<Utc>) -> Self {
        Self {
            output,
            status: Some(status),
            end_time: Some(end_time),
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_some_and(ExecutionStatus::is_terminal)
    }
}

type EventSink = Arc<dyn Fn(StreamEvent) + Send + Sync + 'static>;

/// Events of a single execution, bound to its identity at construction.
///
/// Iterating blocks until the next event and ends after the terminal one.
pub struct ExecutionStream {
    id: ExecutionId,
    events: async_channel::Receiver<StreamEvent>,
    finished: bool,
}

impl ExecutionStream {
    pub fn id(&self) -> ExecutionId {
        self.id
    }

    /// Block until the terminal event and return it
    pub fn wait_for_terminal(mut self) -> Option<StreamEvent> {
        self.find(StreamEvent::is_terminal)
    }
}

impl Iterator for ExecutionStream {
    type Item = StreamEvent;

    fn next(&mut self) -> Option<StreamEvent> {
        if self.finished {
            return None;
        }
        let event = self.events.recv_blocking().ok()?;
        self.finished = event.is_terminal();
        Some(event)
    }
}

/// How scripts are launched
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunnerConfig {
    /// Interpreter binary; the script path is appended as the last argument
    pub interpreter: PathBuf,
    /// Flags placed before the script path
    pub args: Vec<String>,
    /// How long to wait after exit for the reader to hit end-of-stream
    pub drain_timeout: Duration,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            interpreter: PathBuf::from(DEFAULT_INTERPRETER),
            args: DEFAULT_INTERPRETER_ARGS.iter().map(|s| s.to_string()).collect(),
            drain_timeout: Duration::from_millis(DEFAULT_DRAIN_TIMEOUT_MS),
        }
    }
}

/// Launches interpreter processes and streams their output
#[derive(Debug, Clone)]
pub struct ProcessRunner {
    config: RunnerConfig,
    processes: Arc<CancellationManager>,
}

impl ProcessRunner {
    pub fn new(config: RunnerConfig, processes: Arc<CancellationManager>) -> Self {
        Self { config, processes }
    }

    pub fn config(&self) -> &RunnerConfig {
        &self.config
    }

    /// Live process table this runner registers into
    pub fn processes(&self) -> &Arc<CancellationManager> {
        &self.processes
    }

    /// Launch `script` and return its event stream
    pub fn start(&self, id: ExecutionId, script: &ScriptDescriptor) -> ExecutionStream {
        let (tx, rx) = async_channel::unbounded();
        self.start_with(id, script, move |event| {
            // Only fails when the stream was dropped; the run continues regardless
            let _ = tx.send_blocking(event);
        });
        ExecutionStream {
            id,
            events: rx,
            finished: false,
        }
    }

    /// Launch `script`, delivering every event to `sink`.
    ///
    /// `sink` runs on the reader and wait threads. It is called in
    /// completeness order and never again after the terminal event.
    #[instrument(skip_all, fields(execution_id = %id, script = %script.name))]
    pub fn start_with<F>(&self, id: ExecutionId, script: &ScriptDescriptor, sink: F)
    where
        F: Fn(StreamEvent) + Send + Sync + 'static,
    {
        let sink: EventSink = Arc::new(sink);
        let script_path = script.resolved_path.display().to_string();

        let (child, pipe) = match self.spawn_interpreter(&script.resolved_path) {
            Ok(spawned) => spawned,
            Err(e) => {
                error!(error = %e, path = %script_path, "Script launch failed");
                logging::log_script_event(&id.to_string(), "launch_failed", None, false);
                sink(StreamEvent::terminal(
                    e.to_string(),
                    ExecutionStatus::Failed,
                    Utc::now(),
                ));
                return;
            }
        };

        let pid = child.id();
        self.processes.register(id, pid, &script_path);
        info!(pid = pid, path = %script_path, "Script process started");

        let shared = SharedOutput::new();
        let reader = spawn_output_reader(id, pipe, shared.clone(), Arc::clone(&sink));

        let processes = Arc::clone(&self.processes);
        let drain_timeout = self.config.drain_timeout;
        thread::spawn(move || {
            wait_for_exit(ExitWatch {
                id,
                pid,
                child,
                reader,
                shared,
                sink,
                processes,
                drain_timeout,
            })
        });
    }

    /// Spawn the interpreter with stdout and stderr merged onto one pipe
    fn spawn_interpreter(&self, script: &Path) -> Result<(Child, PipeReader), ScriptDeckError> {
        let interpreter = self.config.interpreter.display().to_string();
        let launch_error = |source: io::Error| ScriptDeckError::Launch {
            interpreter: interpreter.clone(),
            source,
        };

        let (reader, writer) = io::pipe().map_err(launch_error)?;
        let stderr_writer = writer.try_clone().map_err(launch_error)?;

        let mut command = Command::new(&self.config.interpreter);
        command
            .args(&self.config.args)
            .arg(script)
            .stdin(Stdio::null())
            .stdout(writer)
            .stderr(stderr_writer);

        // Own process group, so cancelling also reaches anything the script spawns
        #[cfg(unix)]
        command.process_group(0);

        debug!(interpreter = %interpreter, args = ?self.config.args, "Spawning interpreter");
        let child = command.spawn().map_err(launch_error)?;

        // The command still holds our copies of the write end; EOF is only
        // observable once they are closed.
        drop(command);

        Ok((child, reader))
    }
}

/// Read the merged pipe until end-of-stream, emitting the transcript per chunk.
///
/// End-of-stream only detaches the reader; exit status is the wait thread's job.
fn spawn_output_reader(
    id: ExecutionId,
    mut pipe: PipeReader,
    shared: SharedOutput,
    sink: EventSink,
) -> JoinHandle<()> {
    thread::spawn(move || {
        let mut chunk = vec![0u8; READ_CHUNK_SIZE];
        loop {
            match pipe.read(&mut chunk) {
                Ok(0) => {
                    debug!(execution_id = %id, "Output pipe reached end of stream");
                    break;
                }
                Ok(n) => {
                    // After the terminal event chunks are discarded, but the pipe
                    // keeps draining so a lingering descendant never blocks on it.
                    shared.append_and_emit(&chunk[..n], |text| {
                        sink(StreamEvent::progress(text.to_string()))
                    });
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    warn!(execution_id = %id, error = %e, "Output pipe read failed");
                    break;
                }
            }
        }
    })
}

struct ExitWatch {
    id: ExecutionId,
    pid: u32,
    child: Child,
    reader: JoinHandle<()>,
    shared: SharedOutput,
    sink: EventSink,
    processes: Arc<CancellationManager>,
    drain_timeout: Duration,
}

/// Body of the per-execution wait thread
fn wait_for_exit(watch: ExitWatch) {
    let ExitWatch {
        id,
        pid,
        mut child,
        reader,
        shared,
        sink,
        processes,
        drain_timeout,
    } = watch;
    let started = Instant::now();

    let waited = child.wait();
    let end_time = Utc::now();

    // Final drain: give the reader a bounded window to pick up buffered bytes
    if !wait_for_reader(&reader, drain_timeout) {
        debug!(
            execution_id = %id,
            "Output pipe still open after exit (held by a descendant); finishing with what was read"
        );
    }

    processes.unregister(&id, pid);

    let (status, summary) = match waited {
        Ok(exit) => {
            let status = status_for_exit(&exit);
            info!(execution_id = %id, pid = pid, exit = %describe_exit(&exit), "Script process exited");
            (status, Summary::Fallback(fallback_message(&exit)))
        }
        Err(e) => {
            error!(execution_id = %id, pid = pid, error = %e, "Waiting for script process failed");
            (
                ExecutionStatus::Failed,
                Summary::Append(ScriptDeckError::Wait(e).to_string()),
            )
        }
    };

    shared.finish_and_emit(|output| {
        let output = match summary {
            Summary::Fallback(message) if output.is_empty() => message,
            Summary::Fallback(_) => output,
            Summary::Append(message) if output.is_empty() => message,
            Summary::Append(message) => format!("{}\n{}", output, message),
        };
        sink(StreamEvent::terminal(output, status, end_time));
    });

    logging::log_script_event(
        &id.to_string(),
        if status == ExecutionStatus::Completed {
            "completed"
        } else {
            "failed"
        },
        Some(started.elapsed().as_millis() as u64),
        status == ExecutionStatus::Completed,
    );
}

enum Summary {
    /// Used only when the script printed nothing
    Fallback(String),
    /// Always added to the transcript
    Append(String),
}

/// Poll until the reader thread finishes or `timeout` passes
fn wait_for_reader(handle: &JoinHandle<()>, timeout: Duration) -> bool {
    let start = Instant::now();
    let poll_interval = Duration::from_millis(5);

    while start.elapsed() < timeout {
        if handle.is_finished() {
            return true;
        }
        thread::sleep(poll_interval);
    }
    handle.is_finished()
}

/// Exit code 0 is success; anything else, including death by signal, is failure
fn status_for_exit(exit: &ExitStatus) -> ExecutionStatus {
    if exit.success() {
        ExecutionStatus::Completed
    } else {
        ExecutionStatus::Failed
    }
}

/// Transcript used when a script finishes without printing anything
fn fallback_message(exit: &ExitStatus) -> String {
    if exit.success() {
        return "Script completed successfully.".to_string();
    }
    match exit.code() {
        Some(code) => format!("Script terminated with errors, code: {}", code),
        None => format!("Script terminated with errors, {}", describe_exit(exit)),
    }
}

fn describe_exit(exit: &ExitStatus) -> String {
    if let Some(code) = exit.code() {
        return format!("code: {}", code);
    }
    #[cfg(unix)]
    {
        if let Some(signal) = exit.signal() {
            return format!("signal: {} ({})", signal_to_name(signal), signal);
        }
    }
    "code: -1".to_string()
}

/// Human-readable name for the signals scripts usually die from
pub fn signal_to_name(signal: i32) -> &'static str {
    match signal {
        1 => "SIGHUP",
        2 => "SIGINT",
        3 => "SIGQUIT",
        4 => "SIGILL",
        6 => "SIGABRT",
        9 => "SIGKILL",
        11 => "SIGSEGV",
        13 => "SIGPIPE",
        14 => "SIGALRM",
        15 => "SIGTERM",
        _ => "UNKNOWN",
    }
}
