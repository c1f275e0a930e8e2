//! Scripts module - AppleScript discovery
//!
//! Lists the `.scpt` and `.applescript` files a front end offers to run.

mod loader;

pub use loader::{is_applescript, read_scripts, read_scripts_from_dir, SCRIPT_EXTENSIONS};

#[cfg(test)]
#[path = "../scripts_tests.rs"]
mod tests;
