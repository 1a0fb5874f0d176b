//! Bounded connection pool over raw SQLite connections.
//!
//! The pool is an explicitly constructed lifecycle object: callers create it,
//! initialize it with a `min`/`max` bound, inject it where connections are
//! needed, and close it at shutdown. There is no global state.
//!
//! # Design Decisions
//!
//! - **`std::sync::Mutex` for the free list**: bookkeeping is held for a few
//!   pointer moves only, never across an await, so a synchronous lock is
//!   both correct and lets the RAII guard return connections from `Drop`
//!   without spawning a task.
//! - **Generation counter**: `close()` bumps nothing but resets lifecycle;
//!   `initialize()` bumps the generation. A handle lent before a close is
//!   recognized as stale on return and dropped instead of re-entering the
//!   free list of a newer pool incarnation.
//! - **Fail-fast exhaustion**: `acquire()` never waits for capacity. When
//!   the free list is empty and `open == max`, the caller gets
//!   `StoreError::PoolExhausted` immediately. Retry/backoff is caller
//!   policy, see [`crate::retry`].
//! - **Dirty handles are discarded**: a connection returned while still
//!   inside a transaction would poison the next borrower, so the pool drops
//!   it and decrements the open count instead of pooling it.

use crate::error::{StoreError, StoreResult};
use sqlx::sqlite::{SqliteConnectOptions, SqliteConnection};
use sqlx::{ConnectOptions, Connection};
use std::ops::{Deref, DerefMut};
use std::sync::{Arc, Mutex};
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Lifecycle {
    Uninitialized,
    Initialized,
}

#[derive(Debug)]
struct PoolState {
    lifecycle: Lifecycle,
    /// Free connections, ready to lend.
    idle: Vec<SqliteConnection>,
    /// Connections alive in this generation: idle plus lent out.
    open: usize,
    max: u32,
    generation: u64,
}

/// Bounded pool of SQLite connections with an explicit lifecycle.
///
/// `initialize` is idempotent, `acquire` is non-blocking, and `close` resets
/// the pool so a later `initialize` starts fresh. All methods are safe to
/// call from many tasks at once.
pub struct ConnectionPool {
    connect_options: SqliteConnectOptions,
    state: Mutex<PoolState>,
}

impl std::fmt::Debug for ConnectionPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock().unwrap();
        f.debug_struct("ConnectionPool")
            .field("lifecycle", &state.lifecycle)
            .field("idle", &state.idle.len())
            .field("open", &state.open)
            .field("max", &state.max)
            .field("generation", &state.generation)
            .finish()
    }
}

impl ConnectionPool {
    /// Create a new, uninitialized pool for the given connect options.
    pub fn new(connect_options: SqliteConnectOptions) -> Self {
        Self {
            connect_options,
            state: Mutex::new(PoolState {
                lifecycle: Lifecycle::Uninitialized,
                idle: Vec::new(),
                open: 0,
                max: 0,
                generation: 0,
            }),
        }
    }

    /// Initialize the pool: eagerly open `min` connections, allow growth up
    /// to `max`.
    ///
    /// Idempotent - calling this while the pool is already initialized is a
    /// no-op and does not create a second set of connections.
    pub async fn initialize(&self, min: u32, max: u32) -> StoreResult<()> {
        if max == 0 {
            return Err(StoreError::validation(
                "max connections must be greater than zero",
            ));
        }
        if min > max {
            return Err(StoreError::validation(format!(
                "min connections ({}) cannot exceed max connections ({})",
                min, max
            )));
        }

        let generation = {
            let mut state = self.state.lock().unwrap();
            if state.lifecycle == Lifecycle::Initialized {
                debug!("pool already initialized, ignoring");
                return Ok(());
            }
            state.lifecycle = Lifecycle::Initialized;
            state.max = max;
            state.open = 0;
            state.generation += 1;
            state.generation
        };

        // Warm up the minimum set outside the lock. A failure here unwinds
        // the whole initialization so the caller can try again.
        for _ in 0..min {
            let conn = match self.connect().await {
                Ok(conn) => conn,
                Err(e) => {
                    self.unwind_initialize(generation).await;
                    return Err(e);
                }
            };
            let mut state = self.state.lock().unwrap();
            if state.generation != generation || state.lifecycle != Lifecycle::Initialized {
                // Pool was closed while warming up; this connection belongs
                // to a dead generation.
                drop(state);
                drop(conn);
                return Ok(());
            }
            state.idle.push(conn);
            state.open += 1;
        }

        info!(min, max, "connection pool initialized");
        Ok(())
    }

    /// Acquire one free connection, exclusively owned until released.
    ///
    /// Fails immediately with `PoolExhausted` when no connection is free and
    /// the pool is at `max` - backpressure is reported, never waited out.
    pub async fn acquire(self: &Arc<Self>) -> StoreResult<PooledConnection> {
        enum Next {
            Ready(SqliteConnection, u64),
            Grow(u64),
        }

        let next = {
            let mut state = self.state.lock().unwrap();
            if state.lifecycle != Lifecycle::Initialized {
                return Err(StoreError::PoolNotInitialized);
            }
            if let Some(conn) = state.idle.pop() {
                Next::Ready(conn, state.generation)
            } else if state.open < state.max as usize {
                // Reserve the slot before connecting so concurrent acquires
                // cannot overshoot max while we are off the lock.
                state.open += 1;
                Next::Grow(state.generation)
            } else {
                return Err(StoreError::pool_exhausted(state.max));
            }
        };

        match next {
            Next::Ready(conn, generation) => {
                Ok(PooledConnection::new(conn, Arc::clone(self), generation))
            }
            Next::Grow(generation) => match self.connect().await {
                Ok(conn) => {
                    debug!("opened additional pooled connection");
                    Ok(PooledConnection::new(conn, Arc::clone(self), generation))
                }
                Err(e) => {
                    let mut state = self.state.lock().unwrap();
                    if state.generation == generation {
                        state.open = state.open.saturating_sub(1);
                    }
                    Err(e)
                }
            },
        }
    }

    /// Close every free connection and reset the lifecycle to uninitialized.
    ///
    /// In-flight borrowers keep their handles until they finish; those
    /// handles are recognized as stale when returned and dropped rather than
    /// pooled. A subsequent `initialize` starts a fresh generation.
    pub async fn close(&self) {
        let drained: Vec<SqliteConnection> = {
            let mut state = self.state.lock().unwrap();
            state.lifecycle = Lifecycle::Uninitialized;
            state.open = 0;
            state.idle.drain(..).collect()
        }; // Lock released here - connections close outside it

        for conn in drained {
            if let Err(e) = conn.close().await {
                warn!(error = %e, "error closing pooled connection");
            }
        }
        info!("connection pool closed");
    }

    /// Number of free connections currently in the pool.
    pub fn free_count(&self) -> usize {
        self.state.lock().unwrap().idle.len()
    }

    /// Number of connections alive in this generation (free plus lent).
    pub fn open_count(&self) -> usize {
        self.state.lock().unwrap().open
    }

    /// Whether the pool is currently initialized.
    pub fn is_initialized(&self) -> bool {
        self.state.lock().unwrap().lifecycle == Lifecycle::Initialized
    }

    /// The configured upper bound, 0 before initialization.
    pub fn max_connections(&self) -> u32 {
        self.state.lock().unwrap().max
    }

    async fn connect(&self) -> StoreResult<SqliteConnection> {
        self.connect_options.connect().await.map_err(|e| {
            StoreError::connection(
                format!("Failed to open connection: {}", e),
                "Check the database file path and permissions",
            )
        })
    }

    /// Roll back a failed initialization: drop whatever was warmed up and
    /// return to the uninitialized state.
    async fn unwind_initialize(&self, generation: u64) {
        let drained: Vec<SqliteConnection> = {
            let mut state = self.state.lock().unwrap();
            if state.generation != generation {
                return;
            }
            state.lifecycle = Lifecycle::Uninitialized;
            state.open = 0;
            state.idle.drain(..).collect()
        };
        for conn in drained {
            let _ = conn.close().await;
        }
    }

    /// Take a connection back from a guard. Runs synchronously so it can be
    /// called from `Drop`.
    fn return_connection(&self, conn: SqliteConnection, generation: u64, dirty: bool) {
        let mut state = self.state.lock().unwrap();
        let stale =
            state.lifecycle != Lifecycle::Initialized || state.generation != generation;
        if stale {
            // Pool was closed (or reinitialized) while this one was lent.
            drop(state);
            drop(conn);
            return;
        }
        if dirty {
            // Still inside a transaction - poisonous to the next borrower.
            state.open = state.open.saturating_sub(1);
            drop(state);
            drop(conn);
            warn!("discarding connection returned with an open transaction");
        } else {
            state.idle.push(conn);
        }
    }
}

/// RAII guard for a borrowed connection.
///
/// Derefs to the underlying `SqliteConnection`. Returned to the pool exactly
/// once: explicitly via [`PooledConnection::release`] or on `Drop`. The
/// return is synchronous, so the release-on-every-exit-path guarantee holds
/// even when the borrowing future is dropped.
pub struct PooledConnection {
    conn: Option<SqliteConnection>,
    pool: Arc<ConnectionPool>,
    generation: u64,
    dirty: bool,
}

impl std::fmt::Debug for PooledConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PooledConnection")
            .field("generation", &self.generation)
            .field("dirty", &self.dirty)
            .finish_non_exhaustive()
    }
}

impl PooledConnection {
    fn new(conn: SqliteConnection, pool: Arc<ConnectionPool>, generation: u64) -> Self {
        Self {
            conn: Some(conn),
            pool,
            generation,
            dirty: false,
        }
    }

    /// Explicitly return the connection to the pool (equivalent to drop).
    pub fn release(self) {
        drop(self);
    }

    /// Mark the connection as holding an open transaction. A dirty handle is
    /// discarded on return instead of pooled.
    pub(crate) fn mark_dirty(&mut self) {
        self.dirty = true;
    }

    /// Mark the transaction as finished; the handle pools normally again.
    pub(crate) fn mark_clean(&mut self) {
        self.dirty = false;
    }
}

impl Deref for PooledConnection {
    type Target = SqliteConnection;

    fn deref(&self) -> &Self::Target {
        // Only None after the guard has been consumed by Drop.
        self.conn.as_ref().expect("connection already returned")
    }
}

impl DerefMut for PooledConnection {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.conn.as_mut().expect("connection already returned")
    }
}

impl Drop for PooledConnection {
    fn drop(&mut self) {
        if let Some(conn) = self.conn.take() {
            self.pool.return_connection(conn, self.generation, self.dirty);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn memory_pool() -> Arc<ConnectionPool> {
        Arc::new(ConnectionPool::new(SqliteConnectOptions::new()))
    }

    #[tokio::test]
    async fn test_new_pool_is_uninitialized() {
        let pool = memory_pool();
        assert!(!pool.is_initialized());
        assert_eq!(pool.free_count(), 0);
        assert_eq!(pool.open_count(), 0);
        assert_eq!(pool.max_connections(), 0);
    }

    #[tokio::test]
    async fn test_acquire_before_initialize_fails() {
        let pool = memory_pool();
        let result = pool.acquire().await;
        assert!(matches!(result, Err(StoreError::PoolNotInitialized)));
    }

    #[tokio::test]
    async fn test_initialize_rejects_bad_bounds() {
        let pool = memory_pool();
        assert!(matches!(
            pool.initialize(0, 0).await,
            Err(StoreError::Validation { .. })
        ));
        assert!(matches!(
            pool.initialize(5, 2).await,
            Err(StoreError::Validation { .. })
        ));
        assert!(!pool.is_initialized());
    }

    #[tokio::test]
    async fn test_initialize_is_idempotent() {
        let pool = memory_pool();
        pool.initialize(2, 4).await.unwrap();
        assert_eq!(pool.free_count(), 2);
        assert_eq!(pool.open_count(), 2);

        // Second call is a no-op: no second set of connections.
        pool.initialize(2, 4).await.unwrap();
        assert_eq!(pool.free_count(), 2);
        assert_eq!(pool.open_count(), 2);
    }

    #[tokio::test]
    async fn test_close_resets_and_allows_reinitialize() {
        let pool = memory_pool();
        pool.initialize(1, 2).await.unwrap();
        pool.close().await;
        assert!(!pool.is_initialized());
        assert!(matches!(
            pool.acquire().await,
            Err(StoreError::PoolNotInitialized)
        ));

        pool.initialize(1, 2).await.unwrap();
        assert_eq!(pool.free_count(), 1);
    }

    #[tokio::test]
    async fn test_stale_handle_dropped_after_close() {
        let pool = memory_pool();
        pool.initialize(1, 2).await.unwrap();
        let handle = pool.acquire().await.unwrap();

        pool.close().await;
        pool.initialize(1, 2).await.unwrap();
        let free_before = pool.free_count();

        // Handle from the old generation must not re-enter the new free list.
        handle.release();
        assert_eq!(pool.free_count(), free_before);
    }

    #[tokio::test]
    async fn test_dirty_handle_is_discarded() {
        let pool = memory_pool();
        pool.initialize(1, 2).await.unwrap();

        let mut handle = pool.acquire().await.unwrap();
        handle.mark_dirty();
        handle.release();

        assert_eq!(pool.free_count(), 0);
        // Open count dropped so a replacement can be opened on demand.
        assert_eq!(pool.open_count(), 0);
        assert!(pool.acquire().await.is_ok());
    }
}
