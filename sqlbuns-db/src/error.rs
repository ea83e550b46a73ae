//! Error types for database access.

use thiserror::Error;

/// Result type alias for database operations.
pub type DbResult<T> = Result<T, DbError>;

/// Errors surfaced by a [`crate::Database`] implementation.
#[derive(Debug, Error)]
pub enum DbError {
    /// Failed to establish or check out a connection.
    #[error("connection error: {0}")]
    Connection(String),

    /// A query or statement failed.
    #[error("query failed: {0}")]
    Query(String),

    /// A transaction could not be started, committed, or rolled back.
    #[error("transaction error: {0}")]
    Transaction(String),
}

impl DbError {
    /// Create a connection error.
    pub fn connection(msg: impl Into<String>) -> Self {
        Self::Connection(msg.into())
    }

    /// Create a query error.
    pub fn query(msg: impl Into<String>) -> Self {
        Self::Query(msg.into())
    }

    /// Create a transaction error.
    pub fn transaction(msg: impl Into<String>) -> Self {
        Self::Transaction(msg.into())
    }
}
