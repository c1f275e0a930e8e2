//! Cancellation manager
//!
//! Tracks the live OS process behind each running execution, keyed by
//! [`ExecutionId`], so a run can be stopped by identity.
//!
//! This module provides:
//! - Thread-safe registration/unregistration around each process lifetime
//! - SIGTERM to the child's process group on cancel
//! - Bulk termination for shutdown
//! - Optional active-PID file and orphan cleanup on the next startup
//!
//! The table is touched from the main thread (cancel) and from each
//! execution's wait thread (unregister), so it sits behind its own lock.

use crate::error::ResultExt;
use crate::execution::ExecutionId;
use crate::logging;
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;
use sysinfo::{Pid, System};

// Unix-specific process control using libc
#[cfg(unix)]
mod unix_process {
    use libc::{c_int, pid_t};

    /// Send a signal to a process group (negative PID targets the group)
    pub fn signal_process_group(pgid: u32, signal: c_int) -> Result<(), &'static str> {
        // Safety: kill() is a plain syscall with no memory safety concerns
        let rc = unsafe { libc::kill(-(pgid as pid_t), signal) };
        if rc == 0 {
            Ok(())
        } else {
            let errno = std::io::Error::last_os_error().raw_os_error().unwrap_or(0);
            match errno {
                libc::ESRCH => Err("No such process group"),
                libc::EPERM => Err("Permission denied"),
                libc::EINVAL => Err("Invalid signal"),
                _ => Err("Unknown error"),
            }
        }
    }

    pub const SIGTERM: c_int = libc::SIGTERM;
}

/// A live process owned by one execution
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessInfo {
    pub id: ExecutionId,
    /// Process ID; also the process group ID since children lead their own group
    pub pid: u32,
    pub script_path: String,
    pub started_at: DateTime<Utc>,
}

/// Identity -> live process table
#[derive(Debug, Default)]
pub struct CancellationManager {
    active: RwLock<HashMap<ExecutionId, ProcessInfo>>,
    /// Where the active table is mirrored for orphan cleanup; None = memory only
    active_pids_path: Option<PathBuf>,
}

impl CancellationManager {
    /// In-memory manager with no PID file
    pub fn new() -> Self {
        Self::default()
    }

    /// Manager that mirrors the active table to `path` after every change
    pub fn with_pid_file(path: PathBuf) -> Self {
        Self {
            active: RwLock::new(HashMap::new()),
            active_pids_path: Some(path),
        }
    }

    /// Track a freshly spawned process.
    ///
    /// An identity can own only one live process. If a stale entry is still
    /// present it is terminated first.
    pub fn register(&self, id: ExecutionId, pid: u32, script_path: &str) {
        let info = ProcessInfo {
            id,
            pid,
            script_path: script_path.to_string(),
            started_at: Utc::now(),
        };

        logging::log(
            "PROC",
            &format!("Registering PID {} for execution {} ({})", pid, id, script_path),
        );

        let displaced = self.active.write().insert(id, info);
        if let Some(old) = displaced {
            if old.pid != pid {
                tracing::warn!(
                    execution_id = %id,
                    old_pid = old.pid,
                    new_pid = pid,
                    "Execution already owned a live process; terminating the old one"
                );
                signal_terminate(old.pid);
            }
        }

        self.persist_or_log();
    }

    /// Stop tracking `id` if it still points at `pid`.
    ///
    /// The pid check keeps a slow wait thread from a superseded run from
    /// evicting the entry of the run that replaced it.
    pub fn unregister(&self, id: &ExecutionId, pid: u32) -> bool {
        let removed = {
            let mut active = self.active.write();
            match active.get(id) {
                Some(info) if info.pid == pid => active.remove(id).is_some(),
                _ => false,
            }
        };

        if removed {
            logging::log(
                "PROC",
                &format!("Unregistered PID {} for execution {}", pid, id),
            );
            self.persist_or_log();
        }
        removed
    }

    /// Signal the process behind `id` and forget it. No-op if not tracked.
    pub fn terminate(&self, id: &ExecutionId) -> bool {
        let Some(info) = self.active.write().remove(id) else {
            tracing::debug!(execution_id = %id, "Terminate requested for untracked execution");
            return false;
        };

        logging::log(
            "PROC",
            &format!("Terminating PID {} for execution {}", info.pid, id),
        );
        signal_terminate(info.pid);
        self.persist_or_log();
        true
    }

    /// Signal every tracked process, then clear the table
    pub fn terminate_all(&self) -> usize {
        let processes: Vec<ProcessInfo> = self.active.write().drain().map(|(_, p)| p).collect();

        if processes.is_empty() {
            logging::log("PROC", "No active processes to terminate");
            return 0;
        }

        logging::log(
            "PROC",
            &format!("Terminating {} active process(es)", processes.len()),
        );
        for info in &processes {
            signal_terminate(info.pid);
        }

        if let Some(path) = &self.active_pids_path {
            if path.exists() {
                if let Err(e) = fs::remove_file(path) {
                    logging::log("PROC", &format!("Failed to remove active PIDs file: {}", e));
                }
            }
        }
        processes.len()
    }

    pub fn is_tracked(&self, id: &ExecutionId) -> bool {
        self.active.read().contains_key(id)
    }

    pub fn pid_of(&self, id: &ExecutionId) -> Option<u32> {
        self.active.read().get(id).map(|info| info.pid)
    }

    pub fn get_active_processes(&self) -> Vec<ProcessInfo> {
        self.active.read().values().cloned().collect()
    }

    pub fn active_count(&self) -> usize {
        self.active.read().len()
    }

    /// Check if a process is currently running
    pub fn is_process_running(&self, pid: u32) -> bool {
        let mut system = System::new();
        system.refresh_processes(sysinfo::ProcessesToUpdate::All, true);
        system.process(Pid::from_u32(pid)).is_some()
    }

    /// Terminate processes left behind by a previous session.
    ///
    /// Reads the PID file, signals any entry whose process still exists and
    /// removes the file. Returns the number of processes signalled.
    pub fn cleanup_orphans(&self) -> usize {
        let Some(path) = &self.active_pids_path else {
            return 0;
        };

        let orphans = match self.load_persisted_pids() {
            Ok(orphans) => orphans,
            Err(e) => {
                tracing::warn!(error = %e, "Could not read orphan PID file");
                Vec::new()
            }
        };
        if orphans.is_empty() {
            logging::log("PROC", "No orphaned processes found");
            return 0;
        }

        let mut killed = 0;
        for info in &orphans {
            if self.is_process_running(info.pid) {
                logging::log(
                    "PROC",
                    &format!(
                        "Terminating orphaned PID {} (script: {})",
                        info.pid, info.script_path
                    ),
                );
                signal_terminate(info.pid);
                killed += 1;
            } else {
                logging::log("PROC", &format!("Orphan PID {} already exited", info.pid));
            }
        }

        if let Err(e) = fs::remove_file(path) {
            logging::log("PROC", &format!("Failed to remove orphan PIDs file: {}", e));
        }
        killed
    }

    fn persist_or_log(&self) {
        self.persist_active_pids().warn_on_err();
    }

    /// Mirror the active table to disk (temp file + rename)
    fn persist_active_pids(&self) -> Result<()> {
        let Some(path) = &self.active_pids_path else {
            return Ok(());
        };

        let processes = self.get_active_processes();

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
        }

        let json = serde_json::to_string_pretty(&processes)
            .context("Failed to serialize active processes")?;
        let temp_path = path.with_extension("json.tmp");
        fs::write(&temp_path, json)
            .with_context(|| format!("Failed to write {}", temp_path.display()))?;
        fs::rename(&temp_path, path)
            .with_context(|| format!("Failed to rename temp file to {}", path.display()))?;
        Ok(())
    }

    fn load_persisted_pids(&self) -> Result<Vec<ProcessInfo>> {
        let Some(path) = &self.active_pids_path else {
            return Ok(Vec::new());
        };
        if !path.exists() {
            return Ok(Vec::new());
        }
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        serde_json::from_str(&contents).context("Failed to parse active PIDs JSON")
    }
}

/// Send SIGTERM to the process group led by `pid`
fn signal_terminate(pid: u32) {
    #[cfg(unix)]
    {
        use unix_process::{signal_process_group, SIGTERM};

        match signal_process_group(pid, SIGTERM) {
            Ok(()) => logging::log("PROC", &format!("SIGTERM sent to PGID {}", pid)),
            Err("No such process group") => {
                logging::log("PROC", &format!("Process group {} already exited", pid))
            }
            Err(e) => logging::log(
                "PROC",
                &format!("Failed to send SIGTERM to PGID {}: {}", pid, e),
            ),
        }
    }

    #[cfg(not(unix))]
    {
        logging::log(
            "PROC",
            &format!("Non-Unix platform: cannot signal process {}", pid),
        );
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn create_test_manager() -> (CancellationManager, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let manager = CancellationManager::with_pid_file(temp_dir.path().join("active-pids.json"));
        (manager, temp_dir)
    }

    // PIDs far above any real pid_max, so signalling them is a harmless ESRCH
    const FAKE_PID_A: u32 = 999_990_001;
    const FAKE_PID_B: u32 = 999_990_002;

    #[test]
    fn test_register_and_unregister() {
        let (manager, _temp_dir) = create_test_manager();
        let id = ExecutionId::new();

        manager.register(id, FAKE_PID_A, "/scripts/a.scpt");
        assert!(manager.is_tracked(&id));
        assert_eq!(manager.pid_of(&id), Some(FAKE_PID_A));

        assert!(manager.unregister(&id, FAKE_PID_A));
        assert!(!manager.is_tracked(&id));
        assert!(!manager.unregister(&id, FAKE_PID_A));
    }

    #[test]
    fn test_unregister_ignores_mismatched_pid() {
        let (manager, _temp_dir) = create_test_manager();
        let id = ExecutionId::new();

        manager.register(id, FAKE_PID_B, "/scripts/rerun.scpt");

        assert!(!manager.unregister(&id, FAKE_PID_A));
        assert_eq!(manager.pid_of(&id), Some(FAKE_PID_B));
    }

    #[test]
    fn test_register_replaces_stale_entry_for_same_identity() {
        let (manager, _temp_dir) = create_test_manager();
        let id = ExecutionId::new();

        manager.register(id, FAKE_PID_A, "/scripts/a.scpt");
        manager.register(id, FAKE_PID_B, "/scripts/a.scpt");

        assert_eq!(manager.active_count(), 1);
        assert_eq!(manager.pid_of(&id), Some(FAKE_PID_B));
    }

    #[test]
    fn test_terminate_removes_entry() {
        let (manager, _temp_dir) = create_test_manager();
        let id = ExecutionId::new();
        manager.register(id, FAKE_PID_A, "/scripts/a.scpt");

        assert!(manager.terminate(&id));
        assert!(!manager.is_tracked(&id));
        assert!(!manager.terminate(&id));
    }

    #[test]
    fn test_terminate_all_clears_tracking() {
        let (manager, temp_dir) = create_test_manager();
        manager.register(ExecutionId::new(), FAKE_PID_A, "/fake/one.scpt");
        manager.register(ExecutionId::new(), FAKE_PID_B, "/fake/two.scpt");
        assert_eq!(manager.active_count(), 2);

        assert_eq!(manager.terminate_all(), 2);

        assert_eq!(manager.active_count(), 0);
        assert!(!temp_dir.path().join("active-pids.json").exists());
        assert_eq!(manager.terminate_all(), 0);
    }

    #[test]
    fn test_active_table_is_persisted() {
        let (manager, _temp_dir) = create_test_manager();
        let a = ExecutionId::new();
        let b = ExecutionId::new();
        manager.register(a, FAKE_PID_A, "/test/a.scpt");
        manager.register(b, FAKE_PID_B, "/test/b.scpt");

        let loaded = manager.load_persisted_pids().unwrap();
        assert_eq!(loaded.len(), 2);
        assert!(loaded.iter().any(|p| p.id == a && p.pid == FAKE_PID_A));
        assert!(loaded.iter().any(|p| p.id == b && p.pid == FAKE_PID_B));
    }

    #[test]
    fn test_memory_only_manager_never_writes() {
        let manager = CancellationManager::new();
        manager.register(ExecutionId::new(), FAKE_PID_A, "/test/a.scpt");
        assert!(manager.load_persisted_pids().unwrap().is_empty());
        assert_eq!(manager.cleanup_orphans(), 0);
    }

    #[test]
    fn test_cleanup_orphans_with_no_file() {
        let (manager, _temp_dir) = create_test_manager();
        assert_eq!(manager.cleanup_orphans(), 0);
    }

    #[test]
    fn test_cleanup_orphans_skips_dead_processes_and_removes_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("active-pids.json");
        let stale = vec![ProcessInfo {
            id: ExecutionId::new(),
            pid: FAKE_PID_A,
            script_path: "/old/session.scpt".to_string(),
            started_at: Utc::now(),
        }];
        fs::write(&path, serde_json::to_string(&stale).unwrap()).unwrap();

        let manager = CancellationManager::with_pid_file(path.clone());
        assert_eq!(manager.cleanup_orphans(), 0);
        assert!(!path.exists());
    }

    #[test]
    fn test_is_process_running_current_process() {
        let manager = CancellationManager::new();
        assert!(manager.is_process_running(std::process::id()));
        assert!(!manager.is_process_running(u32::MAX - 1));
    }
}
