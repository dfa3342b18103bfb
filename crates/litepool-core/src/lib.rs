//! litepool core - abstractions shared by the pool and its drivers
//!
//! This crate defines the contract between the connection pool and the
//! database engine underneath it:
//!
//! - `DatabaseDriver` - opens new physical connections
//! - `Connection` - the handful of operations the pool needs on a handle
//! - `OpenOptions` - per-connection settings forwarded to the driver
//! - Common types like `Value`, `Row`, `QueryResult`

mod connection;
mod driver;
mod error;
mod types;

pub use connection::*;
pub use driver::*;
pub use error::*;
pub use types::*;
