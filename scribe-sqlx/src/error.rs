//! Error types for SQLx source operations.

use thiserror::Error;

/// Result type alias for SQLx source operations.
pub type SqlxResult<T> = Result<T, SqlxError>;

/// Errors that can occur while driving an instrumented SQLx source.
#[derive(Error, Debug)]
pub enum SqlxError {
    /// SQLx database error
    #[error("Database error: {0}")]
    Sqlx(#[from] sqlx::Error),

    /// Connection error
    #[error("Connection error: {0}")]
    Connection(String),

    /// The transaction handle no longer owns an open transaction, either
    /// because it was committed/rolled back or because the leak detector
    /// force-rolled it back.
    #[error("Transaction already closed")]
    TransactionClosed,
}

impl SqlxError {
    /// Create a connection error.
    pub fn connection(msg: impl Into<String>) -> Self {
        Self::Connection(msg.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let error = SqlxError::connection("refused");
        assert_eq!(error.to_string(), "Connection error: refused");
        assert_eq!(
            SqlxError::TransactionClosed.to_string(),
            "Transaction already closed"
        );
    }
}
