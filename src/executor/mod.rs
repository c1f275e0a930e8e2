//! Script execution module
//!
//! This module handles launching interpreter processes:
//! - Merged stdout/stderr capture with incremental UTF-8 decoding
//! - Cumulative progress events and one terminal event per run
//! - Registration with the cancellation manager for the process lifetime

mod output;
mod runner;

pub use output::Utf8Accumulator;
pub use runner::{signal_to_name, ExecutionStream, ProcessRunner, RunnerConfig, StreamEvent};

#[cfg(test)]
#[path = "../executor_tests.rs"]
mod tests;
