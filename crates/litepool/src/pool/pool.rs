//! Connection pool implementation

use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;

use litepool_core::{Connection, DatabaseDriver, LitepoolError, OpenOptions, Result};
use parking_lot::Mutex;
use tokio::sync::oneshot;

use super::config::PoolConfig;
use super::connection::{ConnectionId, PooledConnection, SlotReservation};
use super::stats::PoolStats;

/// Hook run once on every newly opened connection, before it is lent out
pub type ConnectionHook<C> = Arc<dyn Fn(&mut C) -> Result<()> + Send + Sync>;

enum SlotState<C> {
    /// Parked in the pool, ready to lend
    Idle(C),
    /// On loan, or reserved while its connection is being opened
    InUse,
}

/// One tracked physical connection.
///
/// Closed connections are removed from the pool, so a slot is never
/// "available but not open".
struct Slot<C> {
    id: ConnectionId,
    state: SlotState<C>,
}

impl<C> Slot<C> {
    fn checkout(&mut self) -> Option<C> {
        match std::mem::replace(&mut self.state, SlotState::InUse) {
            SlotState::Idle(conn) => Some(conn),
            SlotState::InUse => None,
        }
    }

    fn is_idle(&self) -> bool {
        matches!(self.state, SlotState::Idle(_))
    }
}

/// What a waiter is handed when it is woken
pub(crate) enum Grant<D: DatabaseDriver> {
    /// A released connection, passed on directly
    Connection(PooledConnection<D>),
    /// Freed capacity; the waiter opens the connection itself
    Slot(SlotReservation<D>),
}

enum Checkout<D: DatabaseDriver> {
    Ready(Grant<D>),
    Wait(oneshot::Receiver<Grant<D>>),
}

struct PoolState<D: DatabaseDriver> {
    /// Tracked connections in creation order
    slots: Vec<Slot<D::Connection>>,
    /// Suspended `acquire` calls, oldest first
    waiters: VecDeque<oneshot::Sender<Grant<D>>>,
    closed: bool,
    next_id: u64,
}

impl<D: DatabaseDriver> PoolState<D> {
    fn reserve(&mut self) -> ConnectionId {
        let id = ConnectionId(self.next_id);
        self.next_id += 1;
        self.slots.push(Slot {
            id,
            state: SlotState::InUse,
        });
        id
    }

    fn remove(&mut self, id: ConnectionId) {
        self.slots.retain(|slot| slot.id != id);
    }

    fn next_waiter(&mut self) -> Option<oneshot::Sender<Grant<D>>> {
        while let Some(waiter) = self.waiters.pop_front() {
            if !waiter.is_closed() {
                return Some(waiter);
            }
        }
        None
    }

    fn live_waiters(&self) -> usize {
        self.waiters.iter().filter(|w| !w.is_closed()).count()
    }

    /// Put a grant nobody is waiting for back into pool state.
    ///
    /// Returns a connection the caller must close once the lock is released.
    fn settle(&mut self, grant: Grant<D>) -> Option<(ConnectionId, D::Connection)> {
        match grant {
            Grant::Connection(mut pooled) => {
                let id = pooled.id();
                let conn = pooled.detach()?;
                if self.closed {
                    self.remove(id);
                    return Some((id, conn));
                }
                match self.slots.iter_mut().find(|slot| slot.id == id) {
                    Some(slot) => {
                        slot.state = SlotState::Idle(conn);
                        None
                    }
                    None => Some((id, conn)),
                }
            }
            Grant::Slot(reservation) => {
                let id = reservation.disarm();
                self.remove(id);
                None
            }
        }
    }
}

pub(crate) struct SharedPool<D: DatabaseDriver> {
    config: PoolConfig,
    driver: D,
    open_options: OpenOptions,
    on_connection_created: Option<ConnectionHook<D::Connection>>,
    state: Mutex<PoolState<D>>,
}

impl<D: DatabaseDriver> SharedPool<D> {
    /// Steps 1 and 2 of an `acquire`, under the caller's lock
    ///
    /// 1. Claim the oldest idle connection that is still open
    /// 2. Otherwise reserve a slot if under `max_size`
    fn claim(self: &Arc<Self>, state: &mut PoolState<D>) -> Result<Option<Grant<D>>> {
        if state.closed {
            return Err(LitepoolError::PoolClosed);
        }

        state
            .slots
            .retain(|slot| !matches!(&slot.state, SlotState::Idle(conn) if !conn.is_open()));

        let claimed = state
            .slots
            .iter_mut()
            .find_map(|slot| slot.checkout().map(|conn| (slot.id, conn)));
        if let Some((id, conn)) = claimed {
            tracing::debug!(connection_id = %id, "reusing idle connection");
            return Ok(Some(Grant::Connection(PooledConnection::new(
                id,
                conn,
                self.clone(),
            ))));
        }

        if state.slots.len() < self.config.max_size() {
            let id = state.reserve();
            return Ok(Some(Grant::Slot(SlotReservation::new(id, self.clone()))));
        }

        Ok(None)
    }

    /// Claim a connection or queue a waiter, without releasing the lock in between
    fn checkout(self: &Arc<Self>) -> Result<Checkout<D>> {
        let mut state = self.state.lock();
        if let Some(grant) = self.claim(&mut state)? {
            return Ok(Checkout::Ready(grant));
        }

        let (tx, rx) = oneshot::channel();
        state.waiters.retain(|w| !w.is_closed());
        state.waiters.push_back(tx);
        tracing::debug!(
            waiting = state.waiters.len(),
            max_size = self.config.max_size(),
            "pool saturated, waiting for a connection"
        );
        Ok(Checkout::Wait(rx))
    }

    fn try_checkout(self: &Arc<Self>) -> Result<Option<Grant<D>>> {
        let mut state = self.state.lock();
        self.claim(&mut state)
    }

    async fn wait(&self, mut rx: oneshot::Receiver<Grant<D>>) -> Result<Grant<D>> {
        let timeout = self.config.timeout();
        let outcome = tokio::time::timeout(timeout, &mut rx).await;
        let grant = match outcome {
            Ok(Ok(grant)) => grant,
            // sender dropped: the pool was closed while we waited
            Ok(Err(_)) => return Err(LitepoolError::PoolClosed),
            Err(_) => {
                rx.close();
                match rx.try_recv() {
                    Ok(grant) => {
                        tracing::debug!("handoff arrived together with the acquire timeout");
                        grant
                    }
                    Err(_) => {
                        tracing::debug!(?timeout, "timed out waiting for a connection");
                        return Err(LitepoolError::AcquireTimeout(timeout));
                    }
                }
            }
        };

        // a release can pop this waiter before `close` and send after it;
        // dropping the grant then closes the connection or frees its slot
        let closed = self.state.lock().closed;
        if closed {
            tracing::debug!("handoff arrived after pool close, returning it");
            drop(grant);
            return Err(LitepoolError::PoolClosed);
        }
        Ok(grant)
    }

    fn fulfill(self: &Arc<Self>, grant: Grant<D>) -> Result<PooledConnection<D>> {
        match grant {
            Grant::Connection(conn) => Ok(conn),
            Grant::Slot(reservation) => self.connect(reservation),
        }
    }

    /// Open a connection for a reserved slot and run the creation hook on it
    ///
    /// On failure the reservation is dropped, which frees the slot.
    fn connect(&self, reservation: SlotReservation<D>) -> Result<PooledConnection<D>> {
        let id = reservation.id();
        let mut conn = self.driver.open(self.config.path(), &self.open_options)?;

        if let Some(hook) = &self.on_connection_created
            && let Err(e) = hook(&mut conn)
        {
            tracing::warn!(connection_id = %id, error = %e, "connection hook failed");
            close_connection(id, conn);
            return Err(e);
        }

        tracing::info!(
            connection_id = %id,
            driver = self.driver.name(),
            path = %self.config.path(),
            "connection created"
        );
        Ok(reservation.fulfill(conn))
    }

    /// Take back a connection from its borrower
    pub(crate) fn release(self: &Arc<Self>, id: ConnectionId, mut conn: D::Connection) {
        if conn.is_open() && conn.in_transaction() {
            tracing::debug!(connection_id = %id, "rolling back open transaction on release");
            if let Err(e) = conn.exec("ROLLBACK") {
                tracing::warn!(connection_id = %id, error = %e, "rollback failed, discarding connection");
                close_connection(id, conn);
                self.discard(id);
                return;
            }
        }

        if !conn.is_open() {
            tracing::debug!(connection_id = %id, "released connection is no longer open");
            self.discard(id);
            return;
        }

        self.dispatch(Grant::Connection(PooledConnection::new(id, conn, self.clone())));
    }

    /// Forget a slot whose connection is gone and offer the capacity to a waiter
    pub(crate) fn discard(self: &Arc<Self>, id: ConnectionId) {
        let reservation = {
            let mut state = self.state.lock();
            state.remove(id);
            if state.closed
                || state.live_waiters() == 0
                || state.slots.len() >= self.config.max_size()
            {
                return;
            }
            SlotReservation::new(state.reserve(), self.clone())
        };
        self.dispatch(Grant::Slot(reservation));
    }

    /// Hand a grant to the oldest live waiter, or settle it back into the pool
    ///
    /// Sends happen outside the lock; a send bounces back if its waiter gave up
    /// in the meantime and the next waiter is tried.
    fn dispatch(&self, mut grant: Grant<D>) {
        loop {
            let waiter = {
                let mut state = self.state.lock();
                let waiter = if state.closed {
                    None
                } else {
                    state.next_waiter()
                };
                match waiter {
                    Some(waiter) => waiter,
                    None => {
                        let leftover = state.settle(grant);
                        drop(state);
                        if let Some((id, conn)) = leftover {
                            close_connection(id, conn);
                        }
                        return;
                    }
                }
            };

            match waiter.send(grant) {
                Ok(()) => {
                    tracing::debug!("handed off to waiting acquire");
                    return;
                }
                Err(returned) => grant = returned,
            }
        }
    }
}

fn close_connection<C: Connection>(id: ConnectionId, mut conn: C) {
    match conn.close() {
        Ok(()) => tracing::debug!(connection_id = %id, "connection closed"),
        Err(e) => tracing::warn!(connection_id = %id, error = %e, "failed to close connection"),
    }
}

/// A bounded pool of database connections
///
/// Connections are opened lazily, up to `max_size`. When every connection is
/// on loan, `acquire` waits up to the configured timeout; waiters are served
/// in arrival order, each released connection going straight to the oldest
/// one. Cloning a `Pool` yields another handle to the same pool.
pub struct Pool<D: DatabaseDriver> {
    shared: Arc<SharedPool<D>>,
}

impl<D: DatabaseDriver> Pool<D> {
    /// Create a pool with no hooks
    ///
    /// No connection is opened until the first `acquire`.
    pub fn new(config: PoolConfig, driver: D) -> Result<Self> {
        Self::builder(config, driver).build()
    }

    /// Start building a pool with a verbose callback or creation hook
    pub fn builder(config: PoolConfig, driver: D) -> PoolBuilder<D> {
        PoolBuilder {
            config,
            driver,
            verbose: None,
            on_connection_created: None,
        }
    }

    /// Get a connection from the pool
    ///
    /// This will:
    /// 1. Reuse the oldest idle connection, if any
    /// 2. If none is idle and the pool is under `max_size`, open a new one
    /// 3. Otherwise wait for a release, failing after the configured timeout
    ///
    /// Fails immediately with [`LitepoolError::PoolClosed`] after `close`. A
    /// waiter that is handed a connection after `close` has run gives it back
    /// and fails with `PoolClosed` too.
    /// Driver and hook errors from opening a connection are returned as-is.
    pub async fn acquire(&self) -> Result<PooledConnection<D>> {
        let grant = match self.shared.checkout()? {
            Checkout::Ready(grant) => grant,
            Checkout::Wait(rx) => self.shared.wait(rx).await?,
        };
        self.shared.fulfill(grant)
    }

    /// Get a connection without waiting
    ///
    /// Returns `Ok(None)` when every connection is on loan and the pool is full.
    pub fn try_acquire(&self) -> Result<Option<PooledConnection<D>>> {
        match self.shared.try_checkout()? {
            Some(grant) => self.shared.fulfill(grant).map(Some),
            None => Ok(None),
        }
    }

    /// Close the pool
    ///
    /// Idle connections are closed right away. Connections on loan are closed
    /// when their borrowers release them. Pending and future `acquire` calls
    /// fail with [`LitepoolError::PoolClosed`]. Calling `close` again is a
    /// no-op.
    pub fn close(&self) {
        let (idle, waiters) = {
            let mut state = self.shared.state.lock();
            if state.closed {
                return;
            }
            state.closed = true;

            let (idle, in_use): (Vec<_>, Vec<_>) = std::mem::take(&mut state.slots)
                .into_iter()
                .partition(|slot| slot.is_idle());
            state.slots = in_use;
            (idle, std::mem::take(&mut state.waiters))
        };

        tracing::info!(
            path = %self.shared.config.path(),
            idle = idle.len(),
            waiting = waiters.len(),
            "closing pool"
        );

        // dropping the senders fails every pending acquire
        drop(waiters);
        for mut slot in idle {
            if let Some(conn) = slot.checkout() {
                close_connection(slot.id, conn);
            }
        }
    }

    pub fn is_closed(&self) -> bool {
        self.shared.state.lock().closed
    }

    /// Get current pool statistics
    pub fn stats(&self) -> PoolStats {
        let state = self.shared.state.lock();
        let idle = state.slots.iter().filter(|slot| slot.is_idle()).count();
        PoolStats::new(
            idle,
            state.slots.len() - idle,
            state.live_waiters(),
            state.closed,
        )
    }

    /// Get the pool configuration
    pub fn config(&self) -> &PoolConfig {
        &self.shared.config
    }
}

impl<D: DatabaseDriver> Clone for Pool<D> {
    fn clone(&self) -> Self {
        Self {
            shared: self.shared.clone(),
        }
    }
}

impl<D: DatabaseDriver> fmt::Debug for Pool<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pool")
            .field("driver", &self.shared.driver.name())
            .field("config", &self.shared.config)
            .field("stats", &self.stats())
            .finish()
    }
}

/// Builder for a [`Pool`] with callbacks that cannot live in [`PoolConfig`]
pub struct PoolBuilder<D: DatabaseDriver> {
    config: PoolConfig,
    driver: D,
    verbose: Option<litepool_core::VerboseFn>,
    on_connection_created: Option<ConnectionHook<D::Connection>>,
}

impl<D: DatabaseDriver> PoolBuilder<D> {
    /// Call `callback` with every SQL string executed by pooled connections
    pub fn verbose<F>(mut self, callback: F) -> Self
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        self.verbose = Some(Arc::new(callback));
        self
    }

    /// Run `hook` once on every newly opened connection, before it is returned
    ///
    /// The hook gets the raw connection and may run setup SQL on it, e.g.
    /// `ATTACH DATABASE`. An error from the hook closes the connection and is
    /// returned from the `acquire` that created it.
    pub fn on_connection_created<F>(mut self, hook: F) -> Self
    where
        F: Fn(&mut D::Connection) -> Result<()> + Send + Sync + 'static,
    {
        self.on_connection_created = Some(Arc::new(hook));
        self
    }

    /// Validate the configuration and create the pool
    pub fn build(self) -> Result<Pool<D>> {
        self.config.validate()?;

        let mut open_options = self.config.open_options();
        open_options.verbose = self.verbose;

        tracing::debug!(
            driver = self.driver.name(),
            path = %self.config.path(),
            max_size = self.config.max_size(),
            "connection pool created"
        );
        Ok(Pool {
            shared: Arc::new(SharedPool {
                config: self.config,
                driver: self.driver,
                open_options,
                on_connection_created: self.on_connection_created,
                state: Mutex::new(PoolState {
                    slots: Vec::new(),
                    waiters: VecDeque::new(),
                    closed: false,
                    next_id: 1,
                }),
            }),
        })
    }
}
