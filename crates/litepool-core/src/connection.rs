//! Connection trait and the options used to open one

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::Result;

/// Callback invoked with every SQL string a connection executes.
pub type VerboseFn = Arc<dyn Fn(&str) + Send + Sync>;

/// A physical database connection as seen by the pool.
///
/// The pool never interprets SQL. Apart from the handle lifecycle it only
/// ever issues `exec("ROLLBACK")` on a connection returned mid-transaction.
/// Drivers add their own query surface on the concrete type.
pub trait Connection: Send + 'static {
    /// Whether the underlying handle is still usable
    fn is_open(&self) -> bool;

    /// Whether the connection is inside an uncommitted transaction
    fn in_transaction(&self) -> bool;

    /// Execute one or more SQL statements, discarding any rows
    fn exec(&mut self, sql: &str) -> Result<()>;

    /// Close the underlying handle
    ///
    /// Closing an already closed connection is a no-op.
    fn close(&mut self) -> Result<()>;
}

/// Settings forwarded to the driver for every new connection
#[derive(Clone, Default)]
pub struct OpenOptions {
    /// Open the database read-only
    pub readonly: bool,
    /// Fail instead of creating the database file when it is missing
    pub file_must_exist: bool,
    /// Open an in-memory database instead of a file
    pub memory: bool,
    /// How long a statement waits on a locked database before failing
    pub busy_timeout: Duration,
    /// Called with every SQL string executed on the connection
    pub verbose: Option<VerboseFn>,
}

impl OpenOptions {
    /// Report a statement to the verbose callback, if any
    pub fn trace(&self, sql: &str) {
        if let Some(verbose) = &self.verbose {
            verbose(sql);
        }
    }
}

impl fmt::Debug for OpenOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OpenOptions")
            .field("readonly", &self.readonly)
            .field("file_must_exist", &self.file_must_exist)
            .field("memory", &self.memory)
            .field("busy_timeout", &self.busy_timeout)
            .field("verbose", &self.verbose.is_some())
            .finish()
    }
}

/// Whether a database path names an in-memory database.
///
/// Both SQLite's `:memory:` and the shorter `:memory` spelling are accepted.
pub fn is_memory_path(path: &str) -> bool {
    path == ":memory:" || path == ":memory"
}
