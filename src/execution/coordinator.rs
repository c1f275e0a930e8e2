//! Execution coordinator
//!
//! Owns the registry on the main thread and turns run / cancel requests into
//! registry and runner operations. Runner events come back through a sink
//! closure that captured the identity and launch sequence at launch time, so
//! an update can only ever be filed under the run that produced it.

use chrono::Utc;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, instrument, warn};

use super::dispatch::{MainQueue, MainThreadHandle, TickTimer};
use super::record::{ExecutionId, ExecutionStatus, ScriptDescriptor};
use super::registry::ExecutionRegistry;
use crate::cancellation::CancellationManager;
use crate::config::{active_pids_path, Config, ConfigStore};
use crate::error::ErrorSeverity;
use crate::executor::{ProcessRunner, StreamEvent};
use crate::logging;
use crate::resolve::{DefaultPathResolver, PathResolver};

/// Appended to the transcript of a run the user stopped
pub const STOPPED_BY_USER_NOTE: &str = "\nScript stopped by user";

pub struct ExecutionCoordinator {
    registry: ExecutionRegistry,
    queue: MainQueue,
    runner: ProcessRunner,
    resolver: Box<dyn PathResolver>,
    ticker: TickTimer,
    /// Last launch sequence handed out; only ever increases
    last_launch: u64,
}

impl std::fmt::Debug for ExecutionCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutionCoordinator")
            .field("registry", &self.registry)
            .field("runner", &self.runner)
            .field("tick_interval", &self.ticker.interval())
            .finish_non_exhaustive()
    }
}

impl ExecutionCoordinator {
    pub fn new(
        runner: ProcessRunner,
        resolver: Box<dyn PathResolver>,
        tick_interval: Duration,
    ) -> Self {
        Self {
            registry: ExecutionRegistry::new(),
            queue: MainQueue::new(),
            runner,
            resolver,
            ticker: TickTimer::new(tick_interval),
            last_launch: 0,
        }
    }

    /// Wire up runner, resolver and cancellation from `config`
    pub fn from_config(config: &Config) -> Self {
        let processes = if config.get_track_orphans() {
            CancellationManager::with_pid_file(active_pids_path())
        } else {
            CancellationManager::new()
        };
        let runner = ProcessRunner::new(config.runner_config(), Arc::new(processes));
        Self::new(
            runner,
            Box::new(DefaultPathResolver::from_config(config)),
            config.get_tick_interval(),
        )
    }

    pub fn from_store(store: &dyn ConfigStore) -> Self {
        Self::from_config(&Config::from_store(store))
    }

    pub fn registry(&self) -> &ExecutionRegistry {
        &self.registry
    }

    /// Selection, removal and observer management go straight to the registry
    pub fn registry_mut(&mut self) -> &mut ExecutionRegistry {
        &mut self.registry
    }

    pub fn processes(&self) -> &Arc<CancellationManager> {
        self.runner.processes()
    }

    /// Sender for work that must run against the registry
    pub fn main_thread(&self) -> MainThreadHandle {
        self.queue.handle()
    }

    /// Launch `script` under `id`. Returns immediately; output arrives via [`Self::pump`].
    ///
    /// Re-running an identity resets its record in place and stops any
    /// process still attached to the previous run.
    #[instrument(skip_all, fields(execution_id = %id, script = %script.name))]
    pub fn run(&mut self, script: &ScriptDescriptor, id: ExecutionId) {
        // Also covers a record removed while its process was still alive
        if self.processes().terminate(&id) {
            info!("Stopped previous run before re-running");
        }

        self.last_launch += 1;
        let launch = self.last_launch;
        let outcome = self.registry.upsert(id, &script.name, "");
        self.registry.stamp_launch(&id, launch);
        self.registry.select(&id);
        debug!(?outcome, launch, "Execution record ready");

        let main = self.queue.handle();
        self.runner.start_with(id, script, move |event| {
            let delivered = main.dispatch(move |registry| {
                apply_event(registry, id, launch, event);
            });
            if !delivered {
                debug!(execution_id = %id, "Main queue closed; dropping script event");
            }
        });
    }

    /// Resolve `raw_path`, mint a fresh identity and run it.
    ///
    /// A path that fails to resolve still gets a record: Failed, with the
    /// reason as its output.
    pub fn run_path(&mut self, name: Option<&str>, raw_path: &str) -> ExecutionId {
        let id = ExecutionId::new();
        match self.resolver.resolve(raw_path) {
            Ok(path) => {
                let script = match name {
                    Some(name) => ScriptDescriptor::new(name, path),
                    None => ScriptDescriptor::from_path(&path),
                };
                self.run(&script, id);
            }
            Err(e) => {
                match e.severity() {
                    ErrorSeverity::Warning => {
                        warn!(execution_id = %id, raw_path, error = %e, "Could not resolve script path")
                    }
                    _ => {
                        error!(execution_id = %id, raw_path, error = %e, "Could not resolve script path")
                    }
                }
                self.registry.upsert(id, name.unwrap_or(raw_path), "");
                self.registry.select(&id);
                self.registry.update(
                    &id,
                    e.user_message(),
                    Some(ExecutionStatus::Failed),
                    Some(Utc::now()),
                );
            }
        }
        id
    }

    /// Stop the run behind `id` and mark it Failed with a stop note.
    ///
    /// Returns true if a running record was stopped. The runner's own
    /// terminal event arrives later and is ignored.
    #[instrument(skip(self), fields(execution_id = %id))]
    pub fn cancel(&mut self, id: &ExecutionId) -> bool {
        let signalled = self.processes().terminate(id);

        let Some(record) = self.registry.get(id).filter(|r| r.is_running()) else {
            debug!(signalled, "Cancel found no running record");
            return false;
        };
        let output = format!("{}{}", record.output, STOPPED_BY_USER_NOTE);
        let elapsed_ms = record.elapsed().num_milliseconds().max(0) as u64;

        self.registry
            .update(id, output, Some(ExecutionStatus::Failed), Some(Utc::now()));
        info!(signalled, "Execution cancelled by user");
        logging::log_script_event(&id.to_string(), "cancelled", Some(elapsed_ms), false);
        true
    }

    /// Cancel every running record. Returns how many were stopped.
    pub fn cancel_all(&mut self) -> usize {
        let cancelled = self
            .registry
            .running_ids()
            .iter()
            .filter(|id| self.cancel(id))
            .count();
        // Anything still tracked has no running record left to update
        let stragglers = self.processes().terminate_all();
        if stragglers > 0 {
            debug!(stragglers, "Terminated untracked processes");
        }
        cancelled
    }

    /// Apply queued runner events, waiting up to `timeout` for the first one,
    /// and fire the tick when due. Returns how many events were applied.
    pub fn pump(&mut self, timeout: Duration) -> usize {
        let wait = timeout.min(self.ticker.until_next(Instant::now()));
        let applied = self.queue.wait_and_drain(&mut self.registry, wait);
        if self.ticker.fire_if_due(Instant::now()) {
            self.registry.tick();
        }
        applied
    }

    /// Pump until `done` holds for the registry or `timeout` passes
    pub fn pump_until(
        &mut self,
        timeout: Duration,
        mut done: impl FnMut(&ExecutionRegistry) -> bool,
    ) -> bool {
        let deadline = Instant::now() + timeout;
        loop {
            if done(&self.registry) {
                return true;
            }
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            self.pump(deadline - now);
        }
    }

    /// Stop everything still running
    pub fn shutdown(&mut self) -> usize {
        let cancelled = self.cancel_all();
        info!(cancelled, "Execution coordinator shut down");
        cancelled
    }
}

/// Main-thread half of the sink: file `event` under `id` unless the record
/// now belongs to a later launch (re-run, or removed and inserted again).
fn apply_event(registry: &mut ExecutionRegistry, id: ExecutionId, launch: u64, event: StreamEvent) {
    match registry.get(&id) {
        Some(record) if record.launch != launch => {
            debug!(
                execution_id = %id,
                event_launch = launch,
                current_launch = record.launch,
                "Dropping event from a superseded run"
            );
            return;
        }
        None => {
            debug!(execution_id = %id, "Record removed while its script was running; dropping event");
            return;
        }
        Some(_) => {}
    }
    registry.update(&id, event.output, event.status, event.end_time);
}

// Every test drives /bin/sh
#[cfg(all(test, unix))]
#[path = "coordinator_tests.rs"]
mod tests;
