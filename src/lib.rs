//! Versioned record store with optimistic concurrency control.
//!
//! Many independent callers read and write the same logical records
//! concurrently, without lost updates and without held row locks. Two pieces
//! carry that guarantee: a bounded pool of reusable connections with a
//! strict acquire/release discipline, and a version-stamped conditional
//! update that turns the read-think-write race into a single atomic
//! test-and-set.

pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod retry;
pub mod service;
pub mod store;

pub use config::Config;
pub use db::{ConnectionPool, StatementLoader};
pub use error::{StoreError, StoreResult};
pub use models::{NewProduct, Product};
pub use service::{ProductService, UpdateOutcome};
pub use store::ProductStore;
