//! Execution identity, script descriptors and per-run records

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use uuid::Uuid;

/// Opaque token correlating one logical script launch across spawn,
/// streaming and registry storage.
///
/// Minted by the caller before any process exists. The runner only ever
/// echoes the identity it was handed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExecutionId(Uuid);

impl ExecutionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ExecutionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ExecutionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for ExecutionId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s.trim()).map(Self)
    }
}

/// A script ready to hand to the interpreter
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScriptDescriptor {
    /// Display name (file stem unless the caller supplied one)
    pub name: String,
    /// Absolute path, already resolved by the path resolver
    pub resolved_path: PathBuf,
}

impl ScriptDescriptor {
    pub fn new(name: impl Into<String>, resolved_path: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            resolved_path: resolved_path.into(),
        }
    }

    /// Descriptor named after the file stem of `path`
    pub fn from_path(path: &Path) -> Self {
        let name = path
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        Self::new(name, path)
    }
}

/// Lifecycle state of one execution.
///
/// Cancellation is reported as `Failed`; the transcript note is what tells
/// a user-stopped run apart from a script error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionStatus {
    Running,
    Completed,
    Failed,
}

impl ExecutionStatus {
    /// Completed or Failed: no further automatic transition happens
    pub fn is_terminal(self) -> bool {
        !matches!(self, Self::Running)
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Running => "Running",
            Self::Completed => "Completed",
            Self::Failed => "Failed",
        }
    }
}

impl fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Registry state for one identity
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionRecord {
    pub id: ExecutionId,
    pub name: String,
    /// Reset on every re-run
    pub start_time: DateTime<Utc>,
    /// Full transcript of the current run
    pub output: String,
    pub status: ExecutionStatus,
    pub end_time: Option<DateTime<Utc>>,
    pub is_selected: bool,
    /// How many times this identity has been launched into this record
    pub run_count: u32,
    /// Coordinator-wide launch sequence of the current run. Never reused, even
    /// after the record is removed and inserted again.
    #[serde(skip)]
    pub launch: u64,
}

impl ExecutionRecord {
    pub(crate) fn new(id: ExecutionId, name: String, initial_output: String) -> Self {
        Self {
            id,
            name,
            start_time: Utc::now(),
            output: initial_output,
            status: ExecutionStatus::Running,
            end_time: None,
            is_selected: false,
            run_count: 1,
            launch: 0,
        }
    }

    pub fn is_running(&self) -> bool {
        self.status == ExecutionStatus::Running
    }

    /// Elapsed time as observed at `now`.
    ///
    /// Running records measure up to `now`; terminal records are frozen at
    /// `end_time`. Never negative.
    pub fn elapsed_at(&self, now: DateTime<Utc>) -> Duration {
        let until = match (self.status, self.end_time) {
            (ExecutionStatus::Running, _) | (_, None) => now,
            (_, Some(end)) => end,
        };
        (until - self.start_time).max(Duration::zero())
    }

    pub fn elapsed(&self) -> Duration {
        self.elapsed_at(Utc::now())
    }
}

/// Format a duration as `MM:SS`, or `H:MM:SS` past the hour
pub fn format_elapsed(elapsed: Duration) -> String {
    let total = elapsed.num_seconds().max(0);
    let hours = total / 3600;
    let minutes = (total % 3600) / 60;
    let seconds = total % 60;
    if hours > 0 {
        format!("{}:{:02}:{:02}", hours, minutes, seconds)
    } else {
        format!("{:02}:{:02}", minutes, seconds)
    }
}
