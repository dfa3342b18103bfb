//! litepool - a bounded pool of reusable database connections
//!
//! This crate caps the number of open connections to a database, lends them
//! out one borrower at a time and takes them back on release, rolling back
//! anything the borrower left uncommitted.

pub mod pool;

pub use litepool_core::{
    Connection, DatabaseDriver, LitepoolError, OpenOptions, QueryResult, Result, Row,
    StatementResult, Value,
};
pub use pool::{ConnectionHook, ConnectionId, Pool, PoolBuilder, PoolConfig, PoolStats, PooledConnection};
