//! Versioned record store: CRUD for products with optimistic concurrency
//! control on update.
//!
//! Every operation is one scoped unit of work; the store holds no state
//! between calls. The update is a single conditional statement -
//! `WHERE id = ? AND version = ?` with `version = version + 1` in the SET
//! clause - so the read-think-write race collapses into one server-side
//! test-and-set. Of two writers submitting the same pre-update version,
//! exactly one matches a row; the other sees zero rows and reports conflict.
//! No row lock is held between a caller's read and its write.

use crate::db::pool::ConnectionPool;
use crate::db::session;
use crate::db::statements::StatementLoader;
use crate::error::{StoreError, StoreResult};
use crate::models::{NewProduct, Product};
use chrono::Utc;
use std::sync::Arc;
use tracing::debug;

/// Entity key used when loading statements.
pub const ENTITY: &str = "products";

/// CRUD operations for one entity type over the pooled unit of work.
#[derive(Debug, Clone)]
pub struct ProductStore {
    pool: Arc<ConnectionPool>,
    statements: Arc<StatementLoader>,
}

impl ProductStore {
    /// Create a store over the given pool and statement source.
    pub fn new(pool: Arc<ConnectionPool>, statements: Arc<StatementLoader>) -> Self {
        Self { pool, statements }
    }

    /// The pool this store draws connections from.
    pub fn pool(&self) -> &Arc<ConnectionPool> {
        &self.pool
    }

    /// Create the products table if it does not exist yet.
    pub async fn init_schema(&self) -> StoreResult<()> {
        let sql = self.statements.load(ENTITY, "schema")?;
        session::run(&self.pool, true, move |conn| {
            Box::pin(async move {
                sqlx::query(&sql)
                    .execute(&mut *conn)
                    .await
                    .map_err(StoreError::from)?;
                Ok(())
            })
        })
        .await
    }

    /// Insert a new product with `version = 0` and fresh timestamps.
    ///
    /// No conflict is possible on insert; this succeeds or fails fatally.
    pub async fn create(&self, draft: NewProduct) -> StoreResult<Product> {
        let sql = self.statements.load(ENTITY, "create")?;
        let now = Utc::now();
        let created = session::run(&self.pool, true, move |conn| {
            Box::pin(async move {
                let row = sqlx::query(&sql)
                    .bind(&draft.name)
                    .bind(&draft.description)
                    .bind(draft.price)
                    .bind(draft.stock_quantity)
                    .bind(now)
                    .bind(now)
                    .fetch_one(&mut *conn)
                    .await
                    .map_err(StoreError::from)?;
                Product::from_row(&row)
            })
        })
        .await?;

        debug!(id = created.id, "product created");
        Ok(created)
    }

    /// Look up a single product; `None` when no row matches.
    pub async fn find_by_id(&self, id: i64) -> StoreResult<Option<Product>> {
        let sql = self.statements.load(ENTITY, "find_by_id")?;
        session::run(&self.pool, false, move |conn| {
            Box::pin(async move {
                let row = sqlx::query(&sql)
                    .bind(id)
                    .fetch_optional(&mut *conn)
                    .await
                    .map_err(StoreError::from)?;
                row.map(|r| Product::from_row(&r)).transpose()
            })
        })
        .await
    }

    /// List products ordered by id ascending, paginated by limit/offset.
    pub async fn find_all(&self, limit: i64, offset: i64) -> StoreResult<Vec<Product>> {
        let sql = self.statements.load(ENTITY, "find_all")?;
        session::run(&self.pool, false, move |conn| {
            Box::pin(async move {
                let rows = sqlx::query(&sql)
                    .bind(limit)
                    .bind(offset)
                    .fetch_all(&mut *conn)
                    .await
                    .map_err(StoreError::from)?;
                rows.iter().map(Product::from_row).collect()
            })
        })
        .await
    }

    /// Conditionally update a product against its submitted version.
    ///
    /// The statement matches `id` AND the stored version; on a match it
    /// bumps the version by exactly 1, stamps `updated_at`, and returns the
    /// fresh row from the same write. Zero rows matched means a concurrent
    /// writer already advanced the version (or the row is gone): the result
    /// is `None` - a conflict signal, not an error.
    pub async fn update(&self, product: &Product) -> StoreResult<Option<Product>> {
        let sql = self.statements.load(ENTITY, "update")?;
        let now = Utc::now();
        let submitted = product.clone();
        let updated = session::run(&self.pool, true, move |conn| {
            Box::pin(async move {
                let row = sqlx::query(&sql)
                    .bind(&submitted.name)
                    .bind(&submitted.description)
                    .bind(submitted.price)
                    .bind(submitted.stock_quantity)
                    .bind(now)
                    .bind(submitted.id)
                    .bind(submitted.version)
                    .fetch_optional(&mut *conn)
                    .await
                    .map_err(StoreError::from)?;
                row.map(|r| Product::from_row(&r)).transpose()
            })
        })
        .await?;

        match &updated {
            Some(p) => debug!(id = p.id, version = p.version, "product updated"),
            None => debug!(
                id = product.id,
                submitted_version = product.version,
                "update matched zero rows (version conflict)"
            ),
        }
        Ok(updated)
    }

    /// Delete a product by id; `true` when a row was actually removed.
    pub async fn delete(&self, id: i64) -> StoreResult<bool> {
        let sql = self.statements.load(ENTITY, "delete")?;
        let removed = session::run(&self.pool, true, move |conn| {
            Box::pin(async move {
                let result = sqlx::query(&sql)
                    .bind(id)
                    .execute(&mut *conn)
                    .await
                    .map_err(StoreError::from)?;
                Ok(result.rows_affected() > 0)
            })
        })
        .await?;

        debug!(id, removed, "product delete");
        Ok(removed)
    }

    /// Total number of product rows.
    pub async fn count(&self) -> StoreResult<i64> {
        let sql = self.statements.load(ENTITY, "count")?;
        session::run(&self.pool, false, move |conn| {
            Box::pin(async move {
                sqlx::query_scalar::<_, i64>(&sql)
                    .fetch_one(&mut *conn)
                    .await
                    .map_err(StoreError::from)
            })
        })
        .await
    }
}
