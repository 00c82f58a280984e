use std::collections::{HashSet, VecDeque};
use std::fmt;
use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tokio::sync::{Semaphore, TryAcquireError};
use tracing::{debug, info, warn};

use super::ConnectionManager;
use crate::error::{BoxError, PoolError};
use crate::utils::metrics::{self, Metrics};

static NEXT_POOL_ID: AtomicU64 = AtomicU64::new(1);

/// Stable identity of one pooled connection, assigned at initialization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HandleId(u64);

impl HandleId {
    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for HandleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifecycle {
    Uninitialized,
    Initializing,
    Ready,
    Closed,
}

impl fmt::Display for Lifecycle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Lifecycle::Uninitialized => "uninitialized",
            Lifecycle::Initializing => "initializing",
            Lifecycle::Ready => "ready",
            Lifecycle::Closed => "closed",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolStatus {
    pub state: Lifecycle,
    pub capacity: usize,
    pub idle: usize,
    pub in_use: usize,
    pub waiting: usize,
}

struct Slots<C> {
    state: Lifecycle,
    idle: VecDeque<(HandleId, C)>,
    on_loan: HashSet<HandleId>,
}

struct Shared<M: ConnectionManager> {
    id: u64,
    capacity: usize,
    release_delay: Option<Duration>,
    manager: M,
    // Holds exactly one permit per connection sitting in `slots.idle`.
    gate: Semaphore,
    slots: Mutex<Slots<M::Connection>>,
    metrics: Metrics,
}

impl<M: ConnectionManager> Shared<M> {
    fn checkout(self: &Arc<Self>) -> Result<Handle<M>, PoolError> {
        let mut slots = self.slots.lock();
        match slots.state {
            Lifecycle::Ready => {}
            Lifecycle::Closed => return Err(PoolError::PoolClosed),
            state => {
                return Err(PoolError::InvalidState {
                    operation: "acquire",
                    state,
                })
            }
        }
        // A permit is only ever granted for a connection already in `idle`.
        let Some((id, conn)) = slots.idle.pop_front() else {
            return Err(PoolError::InvalidState {
                operation: "acquire",
                state: Lifecycle::Ready,
            });
        };
        slots.on_loan.insert(id);
        let (idle, in_use) = (slots.idle.len(), slots.on_loan.len());
        drop(slots);

        self.metrics.increment_counter(metrics::ACQUIRED);
        self.metrics.set_gauge(metrics::IDLE, idle);
        self.metrics.set_gauge(metrics::IN_USE, in_use);
        debug!(
            handle = %id,
            idle,
            waiting = self.metrics.get_gauge(metrics::WAITING),
            "connection acquired"
        );

        Ok(Handle {
            id,
            pool_id: self.id,
            conn: Some(conn),
            pool: Arc::downgrade(self),
        })
    }

    fn checkin(&self, id: HandleId, conn: M::Connection) -> Result<(), PoolError> {
        let mut slots = self.slots.lock();
        let was_on_loan = slots.on_loan.remove(&id);
        match slots.state {
            Lifecycle::Ready if was_on_loan => {
                slots.idle.push_back((id, conn));
                let (idle, in_use) = (slots.idle.len(), slots.on_loan.len());
                drop(slots);
                self.gate.add_permits(1);

                self.metrics.increment_counter(metrics::RELEASED);
                self.metrics.set_gauge(metrics::IDLE, idle);
                self.metrics.set_gauge(metrics::IN_USE, in_use);
                debug!(
                    handle = %id,
                    idle,
                    waiting = self.metrics.get_gauge(metrics::WAITING),
                    "connection released"
                );
                Ok(())
            }
            Lifecycle::Ready => {
                drop(slots);
                self.discard(id, conn);
                Err(PoolError::InvalidHandle(id))
            }
            state => {
                let in_use = slots.on_loan.len();
                drop(slots);
                self.metrics.set_gauge(metrics::IN_USE, in_use);
                self.discard(id, conn);
                Err(PoolError::InvalidState {
                    operation: "release",
                    state,
                })
            }
        }
    }

    fn discard(&self, id: HandleId, conn: M::Connection) {
        if let Err(err) = self.manager.close(conn) {
            warn!(handle = %id, error = %err, "failed to close connection");
        }
    }
}

/// Decrements the waiting gauge when a blocked acquire finishes or is dropped.
struct WaitGuard<'a> {
    metrics: &'a Metrics,
}

impl<'a> WaitGuard<'a> {
    fn enter(registry: &'a Metrics) -> (Self, usize) {
        let waiting = registry.increment_gauge(metrics::WAITING);
        (WaitGuard { metrics: registry }, waiting)
    }
}

impl Drop for WaitGuard<'_> {
    fn drop(&mut self) {
        self.metrics.decrement_gauge(metrics::WAITING);
    }
}

/// A connection on loan from a [`ConnectionPool`].
///
/// Give it back with [`ConnectionPool::release`]. A handle that is dropped
/// instead goes straight back to the idle queue, or is closed if the pool
/// has shut down.
pub struct Handle<M: ConnectionManager> {
    id: HandleId,
    pool_id: u64,
    conn: Option<M::Connection>,
    pool: Weak<Shared<M>>,
}

impl<M: ConnectionManager> Handle<M> {
    pub fn id(&self) -> HandleId {
        self.id
    }
}

impl<M: ConnectionManager> Deref for Handle<M> {
    type Target = M::Connection;

    fn deref(&self) -> &Self::Target {
        self.conn.as_ref().expect("connection present until release")
    }
}

impl<M: ConnectionManager> DerefMut for Handle<M> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.conn.as_mut().expect("connection present until release")
    }
}

impl<M: ConnectionManager> fmt::Debug for Handle<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Handle")
            .field("id", &self.id)
            .field("pool_id", &self.pool_id)
            .finish_non_exhaustive()
    }
}

impl<M: ConnectionManager> Drop for Handle<M> {
    fn drop(&mut self) {
        let Some(conn) = self.conn.take() else {
            return;
        };
        let Some(shared) = self.pool.upgrade() else {
            return;
        };
        shared.metrics.increment_counter(metrics::DROPPED_UNRELEASED);
        match shared.checkin(self.id, conn) {
            Ok(()) => warn!(handle = %self.id, "handle dropped without release, returned to pool"),
            Err(err) => debug!(handle = %self.id, error = %err, "dropped handle closed"),
        }
    }
}

/// A fixed-size pool of exclusively-owned connections.
///
/// Cloning is cheap and every clone refers to the same pool. The owner calls
/// [`initialize`](Self::initialize) once before use and
/// [`shutdown`](Self::shutdown) after every handle has been released.
pub struct ConnectionPool<M: ConnectionManager> {
    shared: Arc<Shared<M>>,
}

impl<M: ConnectionManager> Clone for ConnectionPool<M> {
    fn clone(&self) -> Self {
        ConnectionPool {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<M: ConnectionManager> fmt::Debug for ConnectionPool<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionPool")
            .field("descriptor", &self.shared.manager.descriptor())
            .field("status", &self.status())
            .finish()
    }
}

impl<M: ConnectionManager> ConnectionPool<M> {
    /// Panics if `capacity` is 0.
    pub fn new(capacity: usize, manager: M) -> Self {
        Self::with_release_delay(capacity, manager, None)
    }

    /// `release_delay` postpones every explicit release, which makes queuing
    /// visible in demos and tests. Production pools leave it unset.
    pub fn with_release_delay(
        capacity: usize,
        manager: M,
        release_delay: Option<Duration>,
    ) -> Self {
        assert!(capacity > 0, "pool capacity must be > 0");
        ConnectionPool {
            shared: Arc::new(Shared {
                id: NEXT_POOL_ID.fetch_add(1, Ordering::Relaxed),
                capacity,
                release_delay,
                manager,
                gate: Semaphore::new(0),
                slots: Mutex::new(Slots {
                    state: Lifecycle::Uninitialized,
                    idle: VecDeque::with_capacity(capacity),
                    on_loan: HashSet::with_capacity(capacity),
                }),
                metrics: Metrics::new(),
            }),
        }
    }

    pub fn capacity(&self) -> usize {
        self.shared.capacity
    }

    pub fn manager(&self) -> &M {
        &self.shared.manager
    }

    pub fn metrics(&self) -> &Metrics {
        &self.shared.metrics
    }

    pub fn state(&self) -> Lifecycle {
        self.shared.slots.lock().state
    }

    pub fn status(&self) -> PoolStatus {
        let slots = self.shared.slots.lock();
        PoolStatus {
            state: slots.state,
            capacity: self.shared.capacity,
            idle: slots.idle.len(),
            in_use: slots.on_loan.len(),
            waiting: self.shared.metrics.get_gauge(metrics::WAITING),
        }
    }

    /// Opens `capacity` connections. Any failure closes the connections
    /// created so far and leaves the pool closed.
    pub async fn initialize(&self) -> Result<(), PoolError> {
        {
            let mut slots = self.shared.slots.lock();
            if slots.state != Lifecycle::Uninitialized {
                return Err(PoolError::InvalidState {
                    operation: "initialize",
                    state: slots.state,
                });
            }
            slots.state = Lifecycle::Initializing;
        }

        let capacity = self.shared.capacity;
        let mut created = Vec::with_capacity(capacity);
        for index in 0..capacity {
            match self.shared.manager.connect() {
                Ok(conn) => created.push(conn),
                Err(err) => {
                    warn!(
                        index,
                        capacity,
                        error = %err,
                        "connection creation failed, closing pool"
                    );
                    self.abandon(created);
                    return Err(PoolError::Initialization {
                        index,
                        capacity,
                        source: Box::new(err),
                    });
                }
            }
        }

        {
            let mut slots = self.shared.slots.lock();
            if slots.state != Lifecycle::Initializing {
                // shut down while we were connecting
                drop(slots);
                self.abandon(created);
                return Err(PoolError::PoolClosed);
            }
            slots.idle.extend(
                created
                    .into_iter()
                    .enumerate()
                    .map(|(i, conn)| (HandleId(i as u64), conn)),
            );
            slots.state = Lifecycle::Ready;
        }
        self.shared.gate.add_permits(capacity);
        self.shared.metrics.set_gauge(metrics::IDLE, capacity);
        self.shared.metrics.set_gauge(metrics::IN_USE, 0);

        info!(
            capacity,
            descriptor = %self.shared.manager.descriptor(),
            "connection pool ready"
        );
        Ok(())
    }

    fn abandon(&self, created: Vec<M::Connection>) {
        for (i, conn) in created.into_iter().enumerate() {
            self.shared.discard(HandleId(i as u64), conn);
        }
        self.shared.slots.lock().state = Lifecycle::Closed;
        self.shared.gate.close();
    }

    fn ensure_acquirable(&self) -> Result<(), PoolError> {
        match self.shared.slots.lock().state {
            Lifecycle::Ready => Ok(()),
            Lifecycle::Closed => Err(PoolError::PoolClosed),
            state => Err(PoolError::InvalidState {
                operation: "acquire",
                state,
            }),
        }
    }

    /// Waits until a connection is idle and takes it. Waiters are served in
    /// arrival order. Dropping the returned future gives up the place in
    /// line without consuming anything.
    pub async fn acquire(&self) -> Result<Handle<M>, PoolError> {
        self.ensure_acquirable()?;

        let permit = match self.shared.gate.try_acquire() {
            Ok(permit) => permit,
            Err(TryAcquireError::Closed) => return Err(PoolError::PoolClosed),
            Err(TryAcquireError::NoPermits) => {
                let started = Instant::now();
                let (_waiting, waiting) = WaitGuard::enter(&self.shared.metrics);
                debug!(waiting, "no idle connection, waiting");

                let permit = self
                    .shared
                    .gate
                    .acquire()
                    .await
                    .map_err(|_| PoolError::PoolClosed)?;
                self.shared.metrics.update_histogram(
                    metrics::WAIT_MS,
                    started.elapsed().as_secs_f64() * 1000.0,
                );
                permit
            }
        };
        permit.forget();

        self.shared.checkout()
    }

    /// Like [`acquire`](Self::acquire) but gives up after `timeout`.
    pub async fn acquire_timeout(&self, timeout: Duration) -> Result<Handle<M>, PoolError> {
        match tokio::time::timeout(timeout, self.acquire()).await {
            Ok(result) => result,
            Err(_) => {
                self.shared.metrics.increment_counter(metrics::TIMEOUTS);
                Err(PoolError::Timeout(timeout))
            }
        }
    }

    /// Takes an idle connection if one is available right now.
    pub fn try_acquire(&self) -> Result<Option<Handle<M>>, PoolError> {
        self.ensure_acquirable()?;

        match self.shared.gate.try_acquire() {
            Ok(permit) => {
                permit.forget();
                self.shared.checkout().map(Some)
            }
            Err(TryAcquireError::NoPermits) => Ok(None),
            Err(TryAcquireError::Closed) => Err(PoolError::PoolClosed),
        }
    }

    /// Returns `handle` to the idle queue and wakes at most one waiter.
    ///
    /// Any pending transaction must be committed by the caller first. After
    /// shutdown the connection is closed and `InvalidState` is returned.
    pub async fn release(&self, mut handle: Handle<M>) -> Result<(), PoolError> {
        if handle.pool_id != self.shared.id {
            return Err(PoolError::InvalidHandle(handle.id));
        }

        if let Some(delay) = self.shared.release_delay {
            if self.state() == Lifecycle::Ready {
                debug!(handle = %handle.id, ?delay, "delaying release");
                tokio::time::sleep(delay).await;
            }
        }

        let id = handle.id;
        let conn = handle.conn.take().ok_or(PoolError::InvalidHandle(id))?;
        self.shared.checkin(id, conn)
    }

    /// Acquires a connection, runs `f` on it and releases it, also when `f`
    /// fails. An error from `f` takes precedence over a release error.
    pub async fn with_connection<T, E, F>(&self, f: F) -> Result<T, E>
    where
        F: FnOnce(&mut M::Connection) -> Result<T, E>,
        E: From<PoolError>,
    {
        let mut handle = self.acquire().await?;
        let outcome = f(&mut *handle);
        let released = self.release(handle).await;
        let value = outcome?;
        released?;
        Ok(value)
    }

    /// Closes every idle connection and rejects further acquires. Blocked
    /// acquires wake up with `PoolClosed`. Connections still on loan are not
    /// waited for; they are closed when they come back.
    ///
    /// Calling this more than once is a no-op.
    pub async fn shutdown(&self) -> Result<(), PoolError> {
        let (previous, drained, in_use) = {
            let mut slots = self.shared.slots.lock();
            let previous = std::mem::replace(&mut slots.state, Lifecycle::Closed);
            let drained: Vec<_> = slots.idle.drain(..).collect();
            (previous, drained, slots.on_loan.len())
        };
        self.shared.gate.close();

        if previous == Lifecycle::Closed {
            debug!("connection pool already closed");
            return Ok(());
        }
        if in_use > 0 {
            warn!(in_use, "shutting down with connections still on loan");
        }

        let total = drained.len();
        let mut failed = 0;
        let mut first_error: Option<BoxError> = None;
        for (id, conn) in drained {
            if let Err(err) = self.shared.manager.close(conn) {
                warn!(handle = %id, error = %err, "failed to close connection");
                failed += 1;
                if first_error.is_none() {
                    first_error = Some(Box::new(err));
                }
            }
        }
        self.shared.metrics.set_gauge(metrics::IDLE, 0);

        info!(closed = total - failed, failed, "connection pool closed");
        match first_error {
            Some(source) => Err(PoolError::Close { failed, source }),
            None => Ok(()),
        }
    }
}
