//! Integration tests for the scoped unit of work: transaction semantics and
//! the guaranteed connection return.

use occ_store::db::{ConnectionPool, session};
use occ_store::error::{StoreError, StoreResult};
use sqlx::Row;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

async fn test_pool(dir: &TempDir) -> Arc<ConnectionPool> {
    let options = SqliteConnectOptions::new()
        .filename(dir.path().join("test.db"))
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .busy_timeout(Duration::from_secs(5));
    let pool = Arc::new(ConnectionPool::new(options));
    pool.initialize(1, 2).await.unwrap();
    pool
}

async fn create_table(pool: &Arc<ConnectionPool>) {
    session::run(pool, true, |conn| {
        Box::pin(async move {
            sqlx::query("CREATE TABLE IF NOT EXISTS notes (id INTEGER PRIMARY KEY, body TEXT NOT NULL)")
                .execute(&mut *conn)
                .await?;
            Ok(())
        })
    })
    .await
    .unwrap();
}

async fn count_notes(pool: &Arc<ConnectionPool>) -> i64 {
    session::run(pool, false, |conn| {
        Box::pin(async move {
            let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM notes")
                .fetch_one(&mut *conn)
                .await?;
            Ok(count)
        })
    })
    .await
    .unwrap()
}

#[tokio::test]
async fn test_committed_writes_persist() {
    let dir = tempfile::tempdir().unwrap();
    let pool = test_pool(&dir).await;
    create_table(&pool).await;

    session::run(&pool, true, |conn| {
        Box::pin(async move {
            sqlx::query("INSERT INTO notes (body) VALUES (?)")
                .bind("hello")
                .execute(&mut *conn)
                .await?;
            Ok(())
        })
    })
    .await
    .unwrap();

    assert_eq!(count_notes(&pool).await, 1);
}

#[tokio::test]
async fn test_read_only_session_discards_writes() {
    let dir = tempfile::tempdir().unwrap();
    let pool = test_pool(&dir).await;
    create_table(&pool).await;

    // A write smuggled into a read-only session is rolled back at the end.
    session::run(&pool, false, |conn| {
        Box::pin(async move {
            sqlx::query("INSERT INTO notes (body) VALUES (?)")
                .bind("should vanish")
                .execute(&mut *conn)
                .await?;
            Ok(())
        })
    })
    .await
    .unwrap();

    assert_eq!(count_notes(&pool).await, 0);
}

#[tokio::test]
async fn test_body_failure_rolls_back() {
    let dir = tempfile::tempdir().unwrap();
    let pool = test_pool(&dir).await;
    create_table(&pool).await;

    let result: StoreResult<()> = session::run(&pool, true, |conn| {
        Box::pin(async move {
            sqlx::query("INSERT INTO notes (body) VALUES (?)")
                .bind("half-done")
                .execute(&mut *conn)
                .await?;
            Err(StoreError::internal("something downstream broke"))
        })
    })
    .await;

    assert!(matches!(result, Err(StoreError::Internal { .. })));
    assert_eq!(count_notes(&pool).await, 0);
}

#[tokio::test]
async fn test_connection_returned_on_every_path() {
    let dir = tempfile::tempdir().unwrap();
    let pool = test_pool(&dir).await;
    create_table(&pool).await;
    let free_before = pool.free_count();

    // Success path.
    session::run(&pool, true, |conn| {
        Box::pin(async move {
            sqlx::query("INSERT INTO notes (body) VALUES ('a')")
                .execute(&mut *conn)
                .await?;
            Ok(())
        })
    })
    .await
    .unwrap();
    assert_eq!(pool.free_count(), free_before);

    // Body failure.
    let _: StoreResult<()> = session::run(&pool, true, |conn| {
        Box::pin(async move {
            sqlx::query("SELECT * FROM no_such_table")
                .fetch_all(&mut *conn)
                .await?;
            Ok(())
        })
    })
    .await;
    assert_eq!(pool.free_count(), free_before);

    // Read-only path.
    let _ = count_notes(&pool).await;
    assert_eq!(pool.free_count(), free_before);
}

#[tokio::test]
async fn test_failing_commit_propagates_and_frees_the_slot() {
    let dir = tempfile::tempdir().unwrap();
    let pool = test_pool(&dir).await;
    create_table(&pool).await;
    assert_eq!(pool.free_count(), 1);

    // The body commits on its own, so the session's outer COMMIT has no
    // transaction left to finish and fails.
    let result: StoreResult<()> = session::run(&pool, true, |conn| {
        Box::pin(async move {
            sqlx::query("INSERT INTO notes (body) VALUES ('early')")
                .execute(&mut *conn)
                .await?;
            sqlx::query("COMMIT").execute(&mut *conn).await?;
            Ok(())
        })
    })
    .await;

    assert!(matches!(result, Err(StoreError::Database { .. })));

    // The handle came back mid-protocol and was discarded rather than
    // pooled; its slot is freed so capacity recovers on demand.
    assert_eq!(pool.free_count(), 0);
    assert_eq!(pool.open_count(), 0);
    let replacement = pool.acquire().await.unwrap();
    replacement.release();
    assert_eq!(pool.free_count(), 1);
}

#[tokio::test]
async fn test_sessions_see_each_others_committed_data() {
    let dir = tempfile::tempdir().unwrap();
    let pool = test_pool(&dir).await;
    create_table(&pool).await;

    session::run(&pool, true, |conn| {
        Box::pin(async move {
            sqlx::query("INSERT INTO notes (body) VALUES ('one'), ('two')")
                .execute(&mut *conn)
                .await?;
            Ok(())
        })
    })
    .await
    .unwrap();

    let bodies: Vec<String> = session::run(&pool, false, |conn| {
        Box::pin(async move {
            let rows = sqlx::query("SELECT body FROM notes ORDER BY id")
                .fetch_all(&mut *conn)
                .await?;
            rows.iter()
                .map(|row| row.try_get::<String, _>(0).map_err(StoreError::from))
                .collect()
        })
    })
    .await
    .unwrap();

    assert_eq!(bodies, vec!["one".to_string(), "two".to_string()]);
}
