//! Error types for the versioned record store.
//!
//! All failures are expressed through `StoreError` using `thiserror`. Two
//! outcomes that look like errors deliberately are not: a read that finds
//! nothing returns `Option::None`, and a conditional update that matches zero
//! rows reports a conflict value. Both are ordinary results of concurrent
//! operation, not failures.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Validation failed: {message}")]
    Validation { message: String },

    #[error("Pool exhausted: all {max} connections are in use")]
    PoolExhausted { max: u32 },

    #[error("Pool is not initialized")]
    PoolNotInitialized,

    #[error("Connection failed: {message}")]
    Connection { message: String, suggestion: String },

    #[error("Database error: {message}")]
    Database {
        message: String,
        /// e.g., "SQLITE_BUSY" when the write lock could not be taken
        code: Option<String>,
        suggestion: String,
    },

    #[error("Row decode failed at column {column}: {message}")]
    Decode { column: usize, message: String },

    #[error("Statement not available for {entity}.{operation}: {message}")]
    Statement {
        entity: String,
        operation: String,
        message: String,
    },

    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl StoreError {
    /// Create a validation error for caller input that violates an invariant.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    /// Create a pool exhaustion error (capacity backpressure signal).
    pub fn pool_exhausted(max: u32) -> Self {
        Self::PoolExhausted { max }
    }

    /// Create a connection error with a helpful suggestion.
    pub fn connection(message: impl Into<String>, suggestion: impl Into<String>) -> Self {
        Self::Connection {
            message: message.into(),
            suggestion: suggestion.into(),
        }
    }

    /// Create a database error with optional engine error code.
    pub fn database(
        message: impl Into<String>,
        code: Option<String>,
        suggestion: impl Into<String>,
    ) -> Self {
        Self::Database {
            message: message.into(),
            code,
            suggestion: suggestion.into(),
        }
    }

    /// Create a row decode error for the given column index.
    pub fn decode(column: usize, message: impl Into<String>) -> Self {
        Self::Decode {
            column,
            message: message.into(),
        }
    }

    /// Create a statement loading error.
    pub fn statement(
        entity: impl Into<String>,
        operation: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::Statement {
            entity: entity.into(),
            operation: operation.into(),
            message: message.into(),
        }
    }

    /// Create an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Get the suggestion for this error, if available.
    pub fn suggestion(&self) -> Option<&str> {
        match self {
            Self::Connection { suggestion, .. } => Some(suggestion),
            Self::Database { suggestion, .. } => Some(suggestion),
            _ => None,
        }
    }

    /// Check if this error is worth retrying with backoff.
    ///
    /// Pool exhaustion and connection failures are transient by nature;
    /// everything else either needs fixed input or operator attention.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::PoolExhausted { .. } | Self::Connection { .. })
    }
}

/// Convert sqlx errors to StoreError.
impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::Configuration(msg) => {
                StoreError::connection(msg.to_string(), "Check the database URL format")
            }
            sqlx::Error::Database(db_err) => {
                let code = db_err.code().map(|c| c.to_string());
                StoreError::database(
                    db_err.message(),
                    code,
                    "Check the SQL statement and referenced objects",
                )
            }
            sqlx::Error::Io(io_err) => StoreError::connection(
                format!("I/O error: {}", io_err),
                "Check that the database file is accessible",
            ),
            sqlx::Error::Protocol(msg) => StoreError::connection(
                format!("Protocol error: {}", msg),
                "Check database engine compatibility",
            ),
            sqlx::Error::RowNotFound => StoreError::database(
                "No rows returned",
                None,
                "Verify the query conditions match existing data",
            ),
            sqlx::Error::ColumnNotFound(col) => {
                StoreError::internal(format!("Column not found: {}", col))
            }
            sqlx::Error::ColumnIndexOutOfBounds { index, len } => StoreError::decode(
                index,
                format!("column index out of bounds (row has {} columns)", len),
            ),
            // sqlx names the column here instead of indexing it.
            sqlx::Error::ColumnDecode { index, source } => {
                StoreError::internal(format!("Decode failed for column {}: {}", index, source))
            }
            sqlx::Error::Decode(source) => StoreError::decode(0, source.to_string()),
            sqlx::Error::PoolClosed => {
                StoreError::connection("Connection pool is closed", "Reinitialize the pool")
            }
            sqlx::Error::WorkerCrashed => StoreError::internal("Database worker crashed"),
            _ => StoreError::internal(format!("Unknown database error: {}", err)),
        }
    }
}

/// Result type alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;
