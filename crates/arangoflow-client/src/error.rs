//! Error types for the client layer.
//!
//! The variants mirror the phases of a pipeline invocation: configuration
//! errors fail before any connection attempt, connection errors fail the
//! acquisition, query setup errors abort before any result is produced, and
//! mid-stream errors occur after results have started flowing. Callers use
//! [`ClientError::is_setup`] to decide whether partially produced output has
//! to be discarded.

use thiserror::Error;

/// Result alias for client operations.
pub type ClientResult<T> = Result<T, ClientError>;

/// Errors produced by the client layer.
#[derive(Debug, Error)]
pub enum ClientError {
    /// Invalid configuration (malformed host list, missing credential).
    /// Raised at construction time, before any connection attempt.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// The coordinator could not be reached or rejected the connection.
    #[error("connection failed: {0}")]
    Connection(String),

    /// The query was rejected before producing any result (bad syntax,
    /// unknown collection, permission denied).
    #[error("query setup failed: {0}")]
    QuerySetup(String),

    /// The result stream failed after it started (network drop while
    /// iterating, malformed continuation batch).
    #[error("result stream failed: {0}")]
    MidStream(String),

    /// The database rejected a write operation.
    #[error("write rejected: {0}")]
    Rejected(String),

    /// The connection handle was used after release.
    #[error("connection handle already released")]
    Closed,
}

impl ClientError {
    /// Returns `true` if the error occurred before any result was produced.
    ///
    /// Setup errors and mid-stream errors demand different recovery: a setup
    /// error aborts with nothing to clean up, a mid-stream error may leave
    /// partially produced output behind.
    #[must_use]
    pub fn is_setup(&self) -> bool {
        matches!(
            self,
            Self::Configuration(_) | Self::Connection(_) | Self::QuerySetup(_) | Self::Closed
        )
    }
}
