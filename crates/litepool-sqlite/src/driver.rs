//! SQLite driver implementation

use litepool_core::{DatabaseDriver, OpenOptions, Result};

use crate::SqliteConnection;

/// SQLite database driver
#[derive(Debug, Clone)]
pub struct SqliteDriver {
    wal: bool,
}

impl SqliteDriver {
    /// Create a new SQLite driver instance
    pub fn new() -> Self {
        tracing::debug!("SQLite driver initialized");
        Self { wal: true }
    }

    /// Enable or disable WAL journaling for writable file databases
    ///
    /// Enabled by default.
    pub fn with_wal(mut self, wal: bool) -> Self {
        self.wal = wal;
        self
    }
}

impl Default for SqliteDriver {
    fn default() -> Self {
        Self::new()
    }
}

impl DatabaseDriver for SqliteDriver {
    type Connection = SqliteConnection;

    fn name(&self) -> &'static str {
        "sqlite"
    }

    #[tracing::instrument(skip(self, options))]
    fn open(&self, path: &str, options: &OpenOptions) -> Result<SqliteConnection> {
        SqliteConnection::open_with(path, options, self.wal).inspect_err(|e| {
            tracing::error!(error = %e, "failed to connect to SQLite database");
        })
    }
}
