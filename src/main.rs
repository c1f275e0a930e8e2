//! script-deck: run AppleScript files concurrently and watch their output.

use std::collections::HashSet;
use std::io::Write;
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing::{error, info, warn};

use script_deck::cancellation::CancellationManager;
use script_deck::config::{self, Config};
use script_deck::execution::{
    format_elapsed, ExecutionCoordinator, ExecutionId, ExecutionRecord, ExecutionRegistry,
    ExecutionStatus,
};
use script_deck::logging;
use script_deck::scripts;
use script_deck::stdin_commands::{start_stdin_listener, ExternalCommand};

/// Main-loop wait between checks for stdin commands
const SERVE_POLL_INTERVAL: Duration = Duration::from_millis(50);
const RUN_POLL_INTERVAL: Duration = Duration::from_millis(250);

#[derive(Parser, Debug)]
#[command(name = "script-deck", version, about)]
struct Cli {
    /// Config file (default: ~/.scriptdeck/config.json)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List AppleScript files in DIR (default: the configured scripts folder)
    List { dir: Option<PathBuf> },
    /// Run scripts concurrently and print each transcript as it finishes
    Run {
        #[arg(required = true)]
        paths: Vec<String>,
    },
    /// Accept JSONL commands on stdin and print registry snapshots on stdout
    Serve,
    /// Terminate processes left running by a previous session
    Cleanup,
}

fn main() -> ExitCode {
    let _guard = logging::init();
    let cli = Cli::parse();

    match execute(cli) {
        Ok(code) => code,
        Err(e) => {
            error!(error = ?e, "script-deck failed");
            eprintln!("error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn execute(cli: Cli) -> Result<ExitCode> {
    let config = match &cli.config {
        Some(path) => config::load_config_from(path),
        None => config::load_config(),
    };

    match cli.command {
        Command::List { dir } => list(&config, dir),
        Command::Run { paths } => run(&config, &paths),
        Command::Serve => serve(&config),
        Command::Cleanup => {
            let manager = CancellationManager::with_pid_file(config::active_pids_path());
            let killed = manager.cleanup_orphans();
            println!("Terminated {} orphaned process(es)", killed);
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn list(config: &Config, dir: Option<PathBuf>) -> Result<ExitCode> {
    let dir = dir.unwrap_or_else(|| config.get_scripts_dir());
    let found = scripts::read_scripts_from_dir(&dir);
    if found.is_empty() {
        eprintln!("No AppleScript files in {}", dir.display());
    }

    let mut out = std::io::stdout().lock();
    for script in found {
        writeln!(out, "{}\t{}", script.name, script.resolved_path.display())
            .context("Failed to write script list")?;
    }
    Ok(ExitCode::SUCCESS)
}

/// Coordinator for this session, reaping leftovers from a crashed one first
fn start_coordinator(config: &Config) -> ExecutionCoordinator {
    let coordinator = ExecutionCoordinator::from_config(config);
    if config.get_track_orphans() {
        let killed = coordinator.processes().cleanup_orphans();
        if killed > 0 {
            warn!(killed, "Terminated processes left over from a previous session");
        }
    }
    coordinator
}

fn run(config: &Config, paths: &[String]) -> Result<ExitCode> {
    let mut coordinator = start_coordinator(config);
    let ids: Vec<ExecutionId> = paths
        .iter()
        .map(|path| coordinator.run_path(None, path))
        .collect();

    let mut printed: HashSet<ExecutionId> = HashSet::new();
    let mut failed = 0;
    let mut out = std::io::stdout().lock();

    while printed.len() < ids.len() {
        coordinator.pump(RUN_POLL_INTERVAL);

        for id in &ids {
            let Some(record) = coordinator.registry().get(id) else {
                continue;
            };
            if !record.status.is_terminal() || printed.contains(id) {
                continue;
            }
            if record.status == ExecutionStatus::Failed {
                failed += 1;
            }
            writeln!(
                out,
                "== {} [{}] {} ==\n{}",
                record.name,
                record.status,
                format_elapsed(record.elapsed()),
                record.output.trim_end()
            )
            .context("Failed to write script output")?;
            printed.insert(*id);
        }
    }

    info!(total = ids.len(), failed, "All scripts finished");
    Ok(if failed == 0 {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct RecordView<'a> {
    #[serde(flatten)]
    record: &'a ExecutionRecord,
    elapsed: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct Snapshot<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    revision: u64,
    running: usize,
    records: Vec<RecordView<'a>>,
}

fn print_snapshot(out: &mut impl Write, registry: &ExecutionRegistry) -> Result<()> {
    let snapshot = Snapshot {
        kind: "snapshot",
        revision: registry.revision(),
        running: registry.running_count(),
        records: registry
            .records()
            .iter()
            .map(|record| RecordView {
                record,
                elapsed: format_elapsed(record.elapsed()),
            })
            .collect(),
    };
    print_json(out, &snapshot)
}

fn print_json(out: &mut impl Write, value: &impl Serialize) -> Result<()> {
    let line = serde_json::to_string(value).context("Failed to serialize output line")?;
    writeln!(out, "{}", line).context("Failed to write to stdout")?;
    out.flush().context("Failed to flush stdout")
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct Started<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    id: ExecutionId,
    #[serde(skip_serializing_if = "Option::is_none")]
    request_id: Option<&'a str>,
}

/// Apply one command. Returns false when the session should end.
fn handle_command(
    coordinator: &mut ExecutionCoordinator,
    cmd: ExternalCommand,
    out: &mut impl Write,
) -> Result<bool> {
    match cmd {
        ExternalCommand::Run {
            path,
            name,
            request_id,
        } => {
            let id = coordinator.run_path(name.as_deref(), &path);
            info!(execution_id = %id, request_id = ?request_id, path = %path, "Run requested");
            print_json(out, &Started {
                kind: "started",
                id,
                request_id: request_id.as_deref(),
            })?;
        }
        ExternalCommand::Cancel { id } => {
            coordinator.cancel(&id);
        }
        ExternalCommand::CancelAll => {
            coordinator.cancel_all();
        }
        ExternalCommand::Select { id } => {
            coordinator.registry_mut().select(&id);
        }
        ExternalCommand::Remove { id } => {
            // A removed record can't be cancelled afterwards, so stop it now
            coordinator.cancel(&id);
            coordinator.registry_mut().remove(&id);
        }
        ExternalCommand::ClearCompleted => {
            coordinator.registry_mut().clear_terminal();
        }
        ExternalCommand::RemoveAll => {
            coordinator.cancel_all();
            coordinator.registry_mut().remove_all();
        }
        ExternalCommand::List => print_snapshot(out, coordinator.registry())?,
        ExternalCommand::Quit => return Ok(false),
    }
    Ok(true)
}

fn serve(config: &Config) -> Result<ExitCode> {
    let mut coordinator = start_coordinator(config);
    let commands = start_stdin_listener();
    info!("Serving JSONL commands on stdin");

    serve_session(&mut coordinator, &commands, &mut std::io::stdout())?;
    Ok(ExitCode::SUCCESS)
}

/// Run the command loop, then stop whatever is still running. Scripts never
/// outlive the session, even when writing to `out` fails.
fn serve_session(
    coordinator: &mut ExecutionCoordinator,
    commands: &async_channel::Receiver<ExternalCommand>,
    out: &mut impl Write,
) -> Result<()> {
    let served = serve_loop(coordinator, commands, out);
    coordinator.shutdown();
    served?;
    print_snapshot(out, coordinator.registry())
}

/// Pump and apply commands until quit, or until stdin closes and nothing is running
fn serve_loop(
    coordinator: &mut ExecutionCoordinator,
    commands: &async_channel::Receiver<ExternalCommand>,
    out: &mut impl Write,
) -> Result<()> {
    let mut last_revision = coordinator.registry().revision();

    loop {
        coordinator.pump(SERVE_POLL_INTERVAL);

        let mut keep_going = true;
        while let Ok(cmd) = commands.try_recv() {
            if !handle_command(coordinator, cmd, out)? {
                keep_going = false;
                break;
            }
        }

        // stdin closed: finish what is running, then exit
        let input_done = commands.is_closed() && commands.is_empty();
        if input_done && coordinator.registry().running_count() == 0 {
            keep_going = false;
        }

        let revision = coordinator.registry().revision();
        if revision != last_revision {
            print_snapshot(out, coordinator.registry())?;
            last_revision = revision;
        }

        if !keep_going {
            return Ok(());
        }
    }
}
