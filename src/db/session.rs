//! Scoped unit of work: one connection, one transaction, guaranteed return.
//!
//! [`run`] borrows exactly one connection from the pool, wraps the body in a
//! transaction, and returns the connection on every exit path - success,
//! body failure, even a failing commit. Read-only work passes
//! `commit = false` and is rolled back at the end (nothing to persist).
//!
//! Mutating sessions open with `BEGIN IMMEDIATE` so the write lock is taken
//! up front: concurrent writers queue on SQLite's busy timeout instead of
//! failing a deferred-to-write upgrade mid-transaction. Read-only sessions
//! stay deferred and are never blocked by an in-flight writer (WAL snapshot).

use crate::db::pool::ConnectionPool;
use crate::error::{StoreError, StoreResult};
use futures_util::future::BoxFuture;
use sqlx::sqlite::SqliteConnection;
use std::sync::Arc;
use tracing::{debug, warn};

/// Run `body` against one pooled connection inside a transaction.
///
/// 1. Acquire a connection (fails fast on exhaustion).
/// 2. `BEGIN IMMEDIATE` when `commit`, deferred `BEGIN` otherwise.
/// 3. Execute the body.
/// 4. `COMMIT` on success when `commit` is set; `ROLLBACK` otherwise.
/// 5. Return the connection to the pool unconditionally (RAII guard).
///
/// The body signature mirrors `sqlx::Connection::transaction`: callers write
/// `|conn| Box::pin(async move { ... })`.
pub async fn run<T, F>(pool: &Arc<ConnectionPool>, commit: bool, body: F) -> StoreResult<T>
where
    F: for<'c> FnOnce(&'c mut SqliteConnection) -> BoxFuture<'c, StoreResult<T>>,
{
    let mut conn = pool.acquire().await?;

    let begin = if commit { "BEGIN IMMEDIATE" } else { "BEGIN" };
    sqlx::query(begin)
        .execute(&mut *conn)
        .await
        .map_err(StoreError::from)?;
    conn.mark_dirty();

    match body(&mut conn).await {
        Ok(value) => {
            let end = if commit { "COMMIT" } else { "ROLLBACK" };
            match sqlx::query(end).execute(&mut *conn).await {
                Ok(_) => {
                    conn.mark_clean();
                    Ok(value)
                }
                Err(e) => {
                    if commit {
                        // Commit failed; try to leave the connection usable.
                        match sqlx::query("ROLLBACK").execute(&mut *conn).await {
                            Ok(_) => conn.mark_clean(),
                            Err(re) => warn!(error = %re, "rollback after failed commit failed"),
                        }
                    }
                    Err(e.into())
                }
            }
        }
        Err(e) => {
            debug!(error = %e, "unit of work failed, rolling back");
            match sqlx::query("ROLLBACK").execute(&mut *conn).await {
                Ok(_) => conn.mark_clean(),
                Err(re) => warn!(error = %re, "rollback after unit of work failure failed"),
            }
            Err(e)
        }
    } // conn drops here on every path, returning to the pool
}
