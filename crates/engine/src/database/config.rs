//! Engine configuration via `driftkv.toml`
//!
//! Every field has a default, so an empty file is a valid config.
//! Values are validated eagerly on load.

use driftkv_core::{DriftError, Limits, Result, OPERATION_LIMIT};
use driftkv_storage::{MemoryStoreOptions, DEFAULT_WATCH_CAPACITY};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Conventional config file name.
pub const CONFIG_FILE_NAME: &str = "driftkv.toml";

/// Engine configuration loaded from `driftkv.toml`.
///
/// # Example
///
/// ```toml
/// operation_limit = 10
/// timestamps = false
/// watch_capacity = 1024
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DriftConfig {
    /// Write intents grouped into one atomic transaction.
    #[serde(default = "default_operation_limit")]
    pub operation_limit: usize,
    /// Default for entities that do not set `timestamps` themselves.
    #[serde(default)]
    pub timestamps: bool,
    /// Change notifications buffered per watcher by the in-memory store.
    #[serde(default = "default_watch_capacity")]
    pub watch_capacity: usize,
}

fn default_operation_limit() -> usize {
    OPERATION_LIMIT
}

fn default_watch_capacity() -> usize {
    DEFAULT_WATCH_CAPACITY
}

impl Default for DriftConfig {
    fn default() -> Self {
        Self {
            operation_limit: default_operation_limit(),
            timestamps: false,
            watch_capacity: default_watch_capacity(),
        }
    }
}

impl DriftConfig {
    /// Reject values the engine cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.operation_limit == 0 {
            return Err(DriftError::Config(
                "operation_limit must be at least 1".to_string(),
            ));
        }
        if self.watch_capacity == 0 {
            return Err(DriftError::Config(
                "watch_capacity must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Engine limits derived from this config.
    pub fn limits(&self) -> Limits {
        Limits {
            operation_limit: self.operation_limit,
            ..Limits::default()
        }
    }

    /// Options for an in-memory store matching this config.
    pub fn store_options(&self) -> MemoryStoreOptions {
        MemoryStoreOptions {
            watch_capacity: self.watch_capacity,
            ..MemoryStoreOptions::default()
        }
    }

    /// Returns the default config file content with comments.
    pub fn default_toml() -> &'static str {
        r#"# driftkv configuration
#
# Write intents grouped into one atomic transaction (default: 10).
# Records beyond this count are committed in further transactions;
# a failure in a later transaction does not undo earlier ones.
operation_limit = 10

# Stamp createdAt/updatedAt on entities that do not choose for themselves
# (default: false).
timestamps = false

# Change notifications buffered per watcher before it is resynchronised
# with a full snapshot (default: 1024).
watch_capacity = 1024
"#
    }

    /// Parse and validate config from a TOML string.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: DriftConfig = toml::from_str(content)
            .map_err(|e| DriftError::Config(format!("Failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate config from a file path.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            DriftError::Config(format!(
                "Failed to read config file '{}': {}",
                path.display(),
                e
            ))
        })?;
        Self::from_toml_str(&content)
    }

    /// Serialize this config to TOML and write it to the given path.
    pub fn write_to_file(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| DriftError::Config(format!("Failed to serialize config: {}", e)))?;
        std::fs::write(path, content).map_err(|e| {
            DriftError::Config(format!(
                "Failed to write config file '{}': {}",
                path.display(),
                e
            ))
        })
    }
}
