//! Database layer: bounded connection pool, scoped units of work, and
//! statement loading.
//!
//! Layering matches the data path: the store runs each operation through
//! [`session::run`], which borrows exactly one connection from the
//! [`pool::ConnectionPool`] and guarantees transactional use and return.

pub mod pool;
pub mod session;
pub mod statements;

pub use pool::{ConnectionPool, PooledConnection};
pub use statements::StatementLoader;
