//! Error types for the interceptor.

use thiserror::Error;

/// Result type for interceptor operations.
pub type InterceptResult<T> = Result<T, InterceptError>;

/// Fatal errors surfaced by the interceptor.
#[derive(Error, Debug)]
pub enum InterceptError {
    /// One or more transactions were left open at the end of the request.
    ///
    /// The transactions have already been rolled back and the log line
    /// dispatched; this error replaces the response so the defect reaches
    /// the host's top-level error handler instead of being masked.
    #[error("Uncommitted transactions found")]
    UncommittedTransactions {
        /// Connection names that carried a leaked transaction.
        connections: Vec<String>,
    },
}

impl InterceptError {
    /// Connection names involved, if the error carries any.
    pub fn connections(&self) -> &[String] {
        match self {
            Self::UncommittedTransactions { connections } => connections,
        }
    }
}

/// Failure to attach a listener to a data source.
///
/// Attach failures degrade capture for the affected source; they are traced
/// and swallowed, never surfaced to the request.
#[derive(Error, Debug)]
pub enum AttachError {
    /// The client does not expose an event hook.
    #[error("listener not supported: {0}")]
    Unsupported(String),

    /// The client rejected the listener.
    #[error("listener attach failed: {0}")]
    Failed(String),
}

/// Configuration loading errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// The TOML document could not be parsed into a config.
    #[error("invalid interceptor config: {0}")]
    Parse(#[from] toml::de::Error),
}
