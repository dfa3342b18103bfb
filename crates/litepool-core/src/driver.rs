//! Database driver trait definition

use crate::{Connection, OpenOptions, Result};

/// Factory for physical connections
///
/// Opening happens synchronously; a pool calls `open` at most once per
/// connection it creates and never while holding its own lock.
pub trait DatabaseDriver: Send + Sync + 'static {
    /// Connection type produced by this driver
    type Connection: Connection;

    /// Get the driver name (e.g., "sqlite")
    fn name(&self) -> &'static str;

    /// Open a new connection to the database at `path`
    fn open(&self, path: &str, options: &OpenOptions) -> Result<Self::Connection>;
}

impl<D: DatabaseDriver> DatabaseDriver for std::sync::Arc<D> {
    type Connection = D::Connection;

    fn name(&self) -> &'static str {
        (**self).name()
    }

    fn open(&self, path: &str, options: &OpenOptions) -> Result<Self::Connection> {
        (**self).open(path, options)
    }
}
