//! Error types for litepool

use std::time::Duration;

use thiserror::Error;

/// Core error type for litepool operations
#[derive(Error, Debug)]
pub enum LitepoolError {
    #[error("Pool closed")]
    PoolClosed,

    #[error("Timed out waiting for connection (timeout: {0:?})")]
    AcquireTimeout(Duration),

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Query error: {0}")]
    Query(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl LitepoolError {
    /// Whether the error came from the pool itself rather than the driver.
    pub fn is_pool_error(&self) -> bool {
        matches!(self, Self::PoolClosed | Self::AcquireTimeout(_))
    }
}

/// Result type alias for litepool operations
pub type Result<T> = std::result::Result<T, LitepoolError>;
