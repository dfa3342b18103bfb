//! Pool statistics types

use serde::{Deserialize, Serialize};

/// Snapshot of a pool's current state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PoolStats {
    /// Connections tracked by the pool (idle + in use)
    total: usize,
    /// Connections parked in the pool, ready to lend
    idle: usize,
    /// Connections currently on loan
    in_use: usize,
    /// `acquire` calls waiting for a connection
    waiting: usize,
    /// Whether `close` has been called
    closed: bool,
}

impl PoolStats {
    pub(crate) fn new(idle: usize, in_use: usize, waiting: usize, closed: bool) -> Self {
        Self {
            total: idle + in_use,
            idle,
            in_use,
            waiting,
            closed,
        }
    }

    /// Get the total number of connections
    pub fn total(&self) -> usize {
        self.total
    }

    /// Get the number of idle connections
    pub fn idle(&self) -> usize {
        self.idle
    }

    /// Get the number of connections on loan
    pub fn in_use(&self) -> usize {
        self.in_use
    }

    /// Get the number of waiting requests
    pub fn waiting(&self) -> usize {
        self.waiting
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Fraction of tracked connections that are on loan (0.0 to 1.0)
    ///
    /// Returns 0.0 if total is 0 to avoid division by zero.
    pub fn utilization(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            self.in_use as f64 / self.total as f64
        }
    }

    /// Check if every tracked connection is on loan
    pub fn is_full(&self) -> bool {
        self.idle == 0 && self.total > 0
    }
}
