//! Bounded connection pooling
//!
//! The pool opens connections lazily up to a configured maximum, lends each
//! one to a single borrower at a time and queues callers once every
//! connection is on loan.
//!
//! # Example
//!
//! ```no_run
//! use litepool::{Pool, PoolConfig};
//! use litepool_sqlite::{SqliteConnection, SqliteDriver};
//!
//! async fn run() -> litepool::Result<()> {
//!     let config = PoolConfig::sized("./example.db", 5).with_timeout_ms(5000);
//!
//!     let pool = Pool::builder(config, SqliteDriver::new())
//!         .on_connection_created(|conn: &mut SqliteConnection| {
//!             conn.execute_batch("ATTACH DATABASE 'log.db' AS log")
//!         })
//!         .build()?;
//!     let conn = pool.acquire().await?;
//!     conn.execute_batch("CREATE TABLE IF NOT EXISTS log.request (url TEXT)")?;
//!     conn.release();
//!     Ok(())
//! }
//! ```

mod config;
mod connection;
mod pool;
mod stats;


pub use config::PoolConfig;
pub use connection::{ConnectionId, PooledConnection};
pub use pool::{ConnectionHook, Pool, PoolBuilder};
pub use stats::PoolStats;
