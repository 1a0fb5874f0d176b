//! Invariant-checking service over the product store.
//!
//! Validates business invariants (price and stock can never be negative)
//! before any connection is acquired, delegates to the store, and translates
//! storage outcomes into caller-facing results. The service performs no I/O
//! of its own and holds no state: it is purely a validation and translation
//! layer.
//!
//! Callers one layer up can always tell the three non-success outcomes
//! apart: a conflict (retry after a re-read), an absence (stop), and a
//! validation error (fix the input).

use crate::error::{StoreError, StoreResult};
use crate::models::{NewProduct, Product};
use crate::store::ProductStore;

/// Result of an update attempt. Conflict is an expected outcome of normal
/// concurrent operation, so it is a value here rather than an error.
#[derive(Debug, Clone, PartialEq)]
pub enum UpdateOutcome {
    /// The conditional write matched; here is the fresh row.
    Updated(Product),
    /// Zero rows matched: a concurrent writer advanced the version, or the
    /// record no longer exists.
    Conflict { id: i64, submitted_version: i64 },
}

impl UpdateOutcome {
    /// Whether this outcome carries an updated record.
    pub fn is_updated(&self) -> bool {
        matches!(self, Self::Updated(_))
    }

    /// The updated record, if the write won.
    pub fn updated(self) -> Option<Product> {
        match self {
            Self::Updated(product) => Some(product),
            Self::Conflict { .. } => None,
        }
    }
}

/// Service layer for product business logic.
#[derive(Debug, Clone)]
pub struct ProductService {
    store: ProductStore,
}

impl ProductService {
    pub fn new(store: ProductStore) -> Self {
        Self { store }
    }

    /// Create a new product after validating its fields.
    pub async fn create_product(
        &self,
        name: impl Into<String>,
        description: Option<String>,
        price: f64,
        stock_quantity: i64,
    ) -> StoreResult<Product> {
        validate_fields(price, stock_quantity)?;
        self.store
            .create(NewProduct {
                name: name.into(),
                description,
                price,
                stock_quantity,
            })
            .await
    }

    /// Get a product by id; `None` when absent.
    pub async fn get_product(&self, id: i64) -> StoreResult<Option<Product>> {
        self.store.find_by_id(id).await
    }

    /// List products with pagination, ordered by id.
    pub async fn get_all_products(&self, limit: i64, offset: i64) -> StoreResult<Vec<Product>> {
        self.store.find_all(limit, offset).await
    }

    /// Attempt a versioned update.
    ///
    /// Field validation happens before any connection is acquired. The
    /// submitted `version` must be the one the caller last read; a stale
    /// version yields [`UpdateOutcome::Conflict`].
    pub async fn update_product(
        &self,
        id: i64,
        name: impl Into<String>,
        description: Option<String>,
        price: f64,
        stock_quantity: i64,
        version: i64,
    ) -> StoreResult<UpdateOutcome> {
        validate_fields(price, stock_quantity)?;
        let submitted = Product {
            id,
            name: name.into(),
            description,
            price,
            stock_quantity,
            version,
            // Timestamps are system-managed; the update statement never
            // reads these two fields.
            created_at: chrono::Utc::now(),
            updated_at: chrono::Utc::now(),
        };
        match self.store.update(&submitted).await? {
            Some(product) => Ok(UpdateOutcome::Updated(product)),
            None => Ok(UpdateOutcome::Conflict {
                id,
                submitted_version: version,
            }),
        }
    }

    /// Delete a product; `true` when a row was removed.
    pub async fn delete_product(&self, id: i64) -> StoreResult<bool> {
        self.store.delete(id).await
    }

    /// Total number of products.
    pub async fn total_count(&self) -> StoreResult<i64> {
        self.store.count().await
    }
}

/// Domain invariants, re-checked here even though the outer boundary also
/// validates: the service must stay correct when invoked from anywhere.
fn validate_fields(price: f64, stock_quantity: i64) -> StoreResult<()> {
    if !price.is_finite() {
        return Err(StoreError::validation("Price must be a finite number"));
    }
    if price < 0.0 {
        return Err(StoreError::validation("Price cannot be negative"));
    }
    if stock_quantity < 0 {
        return Err(StoreError::validation("Stock quantity cannot be negative"));
    }
    Ok(())
}
