//! Pool configuration types

use std::path::Path;
use std::time::Duration;

use litepool_core::{LitepoolError, OpenOptions, Result, is_memory_path};
use serde::{Deserialize, Serialize};

const DEFAULT_MAX_SIZE: usize = 5;
const DEFAULT_TIMEOUT_MS: u64 = 5_000;
/// SQLite takes the busy timeout as a C `int` of milliseconds
const MAX_TIMEOUT_MS: u64 = i32::MAX as u64;

fn default_max_size() -> usize {
    DEFAULT_MAX_SIZE
}

fn default_timeout_ms() -> u64 {
    DEFAULT_TIMEOUT_MS
}

/// Configuration for a connection pool
///
/// Controls where connections point, how many may exist at once and how
/// long callers wait for one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolConfig {
    /// Database path; `:memory:` opens in-memory databases
    path: String,
    /// Maximum number of connections allowed in the pool
    #[serde(default = "default_max_size")]
    max_size: usize,
    /// Busy timeout for every connection, and how long `acquire` waits
    #[serde(default = "default_timeout_ms")]
    timeout_ms: u64,
    /// Open connections read-only
    #[serde(default)]
    readonly: bool,
    /// Refuse to create the database file when it does not exist
    #[serde(default)]
    file_must_exist: bool,
    /// Force in-memory databases; derived from `path` when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    memory: Option<bool>,
}

impl PoolConfig {
    /// Create a configuration for `path` with every other setting at its default
    ///
    /// Defaults:
    /// - max_size: 5
    /// - timeout: 5 seconds
    /// - readonly: false
    /// - file_must_exist: false
    /// - memory: whether `path` is `:memory:`
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            max_size: DEFAULT_MAX_SIZE,
            timeout_ms: DEFAULT_TIMEOUT_MS,
            readonly: false,
            file_must_exist: false,
            memory: None,
        }
    }

    /// Shorthand for a default configuration with only `readonly` set
    pub fn readonly(path: impl Into<String>, readonly: bool) -> Self {
        Self::new(path).with_readonly(readonly)
    }

    /// Shorthand for a default configuration with only `max_size` set
    ///
    /// # Panics
    ///
    /// Panics if `max_size` is 0.
    pub fn sized(path: impl Into<String>, max_size: usize) -> Self {
        Self::new(path).with_max_size(max_size)
    }

    /// Parse a configuration from TOML
    pub fn from_toml_str(source: &str) -> Result<Self> {
        let config: Self = toml::from_str(source)
            .map_err(|e| LitepoolError::Configuration(format!("Invalid pool config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Load a configuration from a TOML file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        tracing::debug!(path = %path.display(), "loading pool config");
        let source = std::fs::read_to_string(path)?;
        Self::from_toml_str(&source)
    }

    /// Check invariants that serde cannot enforce
    pub fn validate(&self) -> Result<()> {
        if self.max_size == 0 {
            return Err(LitepoolError::Configuration(
                "max_size must be greater than 0".into(),
            ));
        }
        if self.timeout_ms > MAX_TIMEOUT_MS {
            return Err(LitepoolError::Configuration(format!(
                "timeout_ms must be at most {}, got {}",
                MAX_TIMEOUT_MS, self.timeout_ms
            )));
        }
        if self.path.is_empty() && !self.is_memory() {
            return Err(LitepoolError::Configuration(
                "path must not be empty".into(),
            ));
        }
        Ok(())
    }

    /// Set the maximum number of connections
    ///
    /// # Panics
    ///
    /// Panics if `max_size` is 0.
    pub fn with_max_size(mut self, max_size: usize) -> Self {
        assert!(
            max_size > 0,
            "max_size must be greater than 0, got {}",
            max_size
        );
        self.max_size = max_size;
        self
    }

    /// Set the busy/acquire timeout in milliseconds
    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }

    /// Open connections read-only
    pub fn with_readonly(mut self, readonly: bool) -> Self {
        self.readonly = readonly;
        self
    }

    /// Refuse to create a missing database file
    pub fn with_file_must_exist(mut self, file_must_exist: bool) -> Self {
        self.file_must_exist = file_must_exist;
        self
    }

    /// Force (or forbid) in-memory databases regardless of `path`
    pub fn with_memory(mut self, memory: bool) -> Self {
        self.memory = Some(memory);
        self
    }

    /// Get the database path
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Get the maximum pool size
    pub fn max_size(&self) -> usize {
        self.max_size
    }

    /// Get the timeout as a Duration
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn is_readonly(&self) -> bool {
        self.readonly
    }

    pub fn file_must_exist(&self) -> bool {
        self.file_must_exist
    }

    /// Whether connections open in-memory databases
    pub fn is_memory(&self) -> bool {
        self.memory.unwrap_or_else(|| is_memory_path(&self.path))
    }

    /// Driver options derived from this configuration (without a verbose callback)
    pub fn open_options(&self) -> OpenOptions {
        OpenOptions {
            readonly: self.readonly,
            file_must_exist: self.file_must_exist,
            memory: self.is_memory(),
            busy_timeout: self.timeout(),
            verbose: None,
        }
    }
}
