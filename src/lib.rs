//! script-deck - concurrent AppleScript execution with live output
//!
//! This library provides the execution core behind a script launcher:
//! launching interpreter processes, streaming their merged output, and
//! tracking every run in a main-thread registry keyed by a stable identity.

pub mod cancellation;
pub mod config;
pub mod error;
pub mod execution;
pub mod executor;
pub mod logging;
pub mod resolve;
pub mod scripts;
pub mod stdin_commands;

pub use error::{ErrorSeverity, ResultExt, ScriptDeckError};
pub use execution::{
    ExecutionCoordinator, ExecutionId, ExecutionRecord, ExecutionRegistry, ExecutionStatus,
    ScriptDescriptor,
};
