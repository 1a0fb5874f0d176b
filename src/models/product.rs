//! The product entity record.
//!
//! Two fields are system-managed and never set by callers: `version` starts
//! at 0 and increments by exactly 1 on every successful update (the
//! compare-and-swap key), and `created_at`/`updated_at` are stamped by the
//! store.

use crate::error::{StoreError, StoreResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::Row;
use sqlx::sqlite::SqliteRow;

/// A fully populated product row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Product {
    pub id: i64,
    pub name: String,
    pub description: Option<String>,
    pub price: f64,
    pub stock_quantity: i64,
    /// Monotonic version stamp; the expected value is the update predicate.
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Caller-supplied fields for creating a product. Identity, version, and
/// timestamps are assigned by the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewProduct {
    pub name: String,
    pub description: Option<String>,
    pub price: f64,
    pub stock_quantity: i64,
}

impl Product {
    /// Column order shared by every statement that returns product rows.
    pub const COLUMNS: usize = 8;

    /// Decode a product from a row, positionally and order-checked.
    ///
    /// The column count is verified up front and every column decode carries
    /// its index, so a statement whose shape drifts from the expected
    /// (id, name, description, price, stock_quantity, version, created_at,
    /// updated_at) fails with a precise `Decode` error instead of silently
    /// mapping fields to the wrong positions.
    pub fn from_row(row: &SqliteRow) -> StoreResult<Self> {
        if row.len() != Self::COLUMNS {
            return Err(StoreError::decode(
                0,
                format!("expected {} columns, got {}", Self::COLUMNS, row.len()),
            ));
        }
        Ok(Self {
            id: column(row, 0)?,
            name: column(row, 1)?,
            description: column(row, 2)?,
            price: column(row, 3)?,
            stock_quantity: column(row, 4)?,
            version: column(row, 5)?,
            created_at: column(row, 6)?,
            updated_at: column(row, 7)?,
        })
    }
}

fn column<'r, T>(row: &'r SqliteRow, index: usize) -> StoreResult<T>
where
    T: sqlx::Decode<'r, sqlx::Sqlite> + sqlx::Type<sqlx::Sqlite>,
{
    row.try_get::<T, _>(index)
        .map_err(|e| StoreError::decode(index, e.to_string()))
}
