//! Key-value configuration store
//!
//! The execution subsystem reads settings only through [`ConfigStore`], never
//! from a global. [`JsonConfigStore`] backs it with a flat JSON object on disk.

use anyhow::{Context, Result};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info, instrument};

/// get / set / load / save over JSON values
pub trait ConfigStore {
    fn get(&self, key: &str) -> Option<&Value>;
    fn set(&mut self, key: &str, value: Value);
    fn load(&mut self) -> Result<()>;
    fn save(&mut self) -> Result<()>;
}

/// Store persisted as one JSON object
#[derive(Debug, Clone)]
pub struct JsonConfigStore {
    values: Map<String, Value>,
    file_path: PathBuf,
    /// Whether there are unsaved changes
    dirty: bool,
}

impl JsonConfigStore {
    pub fn with_path(path: PathBuf) -> Self {
        JsonConfigStore {
            values: Map::new(),
            file_path: path,
            dirty: false,
        }
    }

    pub fn path(&self) -> &Path {
        &self.file_path
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }
}

impl ConfigStore for JsonConfigStore {
    fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    fn set(&mut self, key: &str, value: Value) {
        if self.values.get(key) != Some(&value) {
            self.values.insert(key.to_string(), value);
            self.dirty = true;
        }
    }

    /// Missing file means an empty store
    #[instrument(name = "config_store_load", skip(self), fields(path = %self.file_path.display()))]
    fn load(&mut self) -> Result<()> {
        if !self.file_path.exists() {
            info!("Config file not found, starting empty");
            self.values.clear();
            self.dirty = false;
            return Ok(());
        }

        let content = std::fs::read_to_string(&self.file_path)
            .with_context(|| format!("Failed to read config file: {}", self.file_path.display()))?;

        let value: Value = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse config JSON: {}", self.file_path.display()))?;

        let Value::Object(values) = value else {
            anyhow::bail!(
                "Config file {} must contain a JSON object",
                self.file_path.display()
            );
        };

        info!(key_count = values.len(), "Loaded config store");
        self.values = values;
        self.dirty = false;
        Ok(())
    }

    /// Atomic write (temp file + rename); skipped when nothing changed
    #[instrument(name = "config_store_save", skip(self), fields(path = %self.file_path.display()))]
    fn save(&mut self) -> Result<()> {
        if !self.dirty {
            debug!("No changes to save");
            return Ok(());
        }

        if let Some(parent) = self.file_path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
        }

        let json = serde_json::to_string_pretty(&self.values)
            .context("Failed to serialize config store")?;

        let temp_path = self.file_path.with_extension("json.tmp");
        std::fs::write(&temp_path, &json).with_context(|| {
            format!("Failed to write temp config file: {}", temp_path.display())
        })?;
        std::fs::rename(&temp_path, &self.file_path).with_context(|| {
            format!("Failed to rename temp file to {}", self.file_path.display())
        })?;

        info!(key_count = self.values.len(), bytes = json.len(), "Saved config store (atomic)");
        self.dirty = false;
        Ok(())
    }
}

/// Non-persistent store for embedding and tests
#[derive(Debug, Clone, Default)]
pub struct MemoryConfigStore {
    values: HashMap<String, Value>,
}

impl MemoryConfigStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ConfigStore for MemoryConfigStore {
    fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    fn set(&mut self, key: &str, value: Value) {
        self.values.insert(key.to_string(), value);
    }

    fn load(&mut self) -> Result<()> {
        Ok(())
    }

    fn save(&mut self) -> Result<()> {
        Ok(())
    }
}
