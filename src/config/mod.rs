//! Configuration module - Application settings
//!
//! This module provides functionality for:
//! - Loading configuration from ~/.scriptdeck/config.json
//! - Default values for all settings
//! - The key-value store the execution subsystem reads settings from
//!
//! # Module Structure
//!
//! - `defaults` - All default constant values
//! - `types` - Configuration struct definitions
//! - `store` - `ConfigStore` trait and its JSON/in-memory implementations
//! - `loader` - File system locations and loading

pub mod defaults;
mod loader;
mod store;
mod types;

pub use loader::{active_pids_path, config_path, data_dir, load_config, load_config_from};
pub use store::{ConfigStore, JsonConfigStore, MemoryConfigStore};
pub use types::{Config, InterpreterConfig};

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
