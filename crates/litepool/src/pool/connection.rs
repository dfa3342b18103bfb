//! Connections lent out by the pool

use std::fmt;
use std::ops::{Deref, DerefMut};
use std::sync::Arc;

use litepool_core::DatabaseDriver;

use super::pool::SharedPool;

/// Identifier of a physical connection, unique within its pool
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(pub(crate) u64);

impl ConnectionId {
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A connection borrowed from the pool
///
/// The borrower owns the connection exclusively until `release` is called
/// or the value is dropped, whichever comes first. Releasing rolls back any
/// open transaction and hands the connection to the next waiter, or closes
/// it if the pool has been closed in the meantime.
pub struct PooledConnection<D: DatabaseDriver> {
    id: ConnectionId,
    connection: Option<D::Connection>,
    pool: Arc<SharedPool<D>>,
}

impl<D: DatabaseDriver> PooledConnection<D> {
    pub(crate) fn new(id: ConnectionId, connection: D::Connection, pool: Arc<SharedPool<D>>) -> Self {
        Self {
            id,
            connection: Some(connection),
            pool,
        }
    }

    /// Stable identifier of the underlying physical connection
    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// Return the connection to the pool
    ///
    /// Equivalent to dropping the value; spelled out for call sites that want
    /// the hand-back to be visible.
    pub fn release(mut self) {
        if let Some(connection) = self.connection.take() {
            self.pool.release(self.id, connection);
        }
    }

    /// Take the raw connection out without returning it to the pool
    pub(crate) fn detach(&mut self) -> Option<D::Connection> {
        self.connection.take()
    }
}

impl<D: DatabaseDriver> Deref for PooledConnection<D> {
    type Target = D::Connection;

    fn deref(&self) -> &Self::Target {
        self.connection.as_ref().expect("connection taken")
    }
}

impl<D: DatabaseDriver> DerefMut for PooledConnection<D> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.connection.as_mut().expect("connection taken")
    }
}

impl<D: DatabaseDriver> Drop for PooledConnection<D> {
    fn drop(&mut self) {
        if let Some(connection) = self.connection.take() {
            self.pool.release(self.id, connection);
        }
    }
}

impl<D: DatabaseDriver> fmt::Debug for PooledConnection<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PooledConnection")
            .field("id", &self.id)
            .field("attached", &self.connection.is_some())
            .finish()
    }
}

/// Capacity reserved for a connection that has not been opened yet
///
/// Dropping an unfulfilled reservation frees the slot again.
pub(crate) struct SlotReservation<D: DatabaseDriver> {
    id: ConnectionId,
    pool: Arc<SharedPool<D>>,
    armed: bool,
}

impl<D: DatabaseDriver> SlotReservation<D> {
    pub(crate) fn new(id: ConnectionId, pool: Arc<SharedPool<D>>) -> Self {
        Self {
            id,
            pool,
            armed: true,
        }
    }

    pub(crate) fn id(&self) -> ConnectionId {
        self.id
    }

    /// Attach a freshly opened connection to the reserved slot
    pub(crate) fn fulfill(mut self, connection: D::Connection) -> PooledConnection<D> {
        self.armed = false;
        PooledConnection::new(self.id, connection, self.pool.clone())
    }

    /// Give up the reservation without touching pool state
    ///
    /// The caller is responsible for removing the slot.
    pub(crate) fn disarm(mut self) -> ConnectionId {
        self.armed = false;
        self.id
    }
}

impl<D: DatabaseDriver> Drop for SlotReservation<D> {
    fn drop(&mut self) {
        if self.armed {
            self.pool.discard(self.id);
        }
    }
}
