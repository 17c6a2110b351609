//! Connector error types.
//!
//! [`ConnectorError`] covers the pipeline-side failure modes and wraps
//! [`ClientError`] for everything raised at the database boundary. Codec
//! failures are handled like mid-stream failures by the pipeline driver:
//! partial output produced before the error is discarded.

use arangoflow_client::ClientError;
use thiserror::Error;

/// Result alias for connector operations.
pub type ConnectorResult<T> = Result<T, ConnectorError>;

/// Errors raised by the connector layer.
#[derive(Debug, Error)]
pub enum ConnectorError {
    /// Error from the database client layer.
    #[error(transparent)]
    Client(#[from] ClientError),

    /// Document/record shape mismatch during conversion.
    #[error("codec error: {0}")]
    Codec(String),

    /// The configured key path selected a null value, or a value that cannot
    /// be a document key.
    #[error("key extraction failed: {0}")]
    KeyExtraction(String),

    /// The record reader collaborator failed.
    #[error("record read error: {0}")]
    RecordRead(String),

    /// The record writer collaborator failed.
    #[error("record write error: {0}")]
    RecordWrite(String),

    /// A lookup was invoked without a required coordinate key.
    #[error("missing required coordinate '{0}'")]
    MissingCoordinate(String),

    /// An attribute expression could not be resolved.
    #[error("expression error: {0}")]
    Expression(String),

    /// Invalid pipeline configuration.
    #[error("configuration error: {0}")]
    Configuration(String),
}

impl ConnectorError {
    /// Returns `true` if the error occurred before any output was produced,
    /// in which case there is no partial output to discard.
    #[must_use]
    pub fn is_setup(&self) -> bool {
        match self {
            Self::Client(inner) => inner.is_setup(),
            Self::MissingCoordinate(_) | Self::Expression(_) | Self::Configuration(_) => true,
            Self::Codec(_) | Self::KeyExtraction(_) | Self::RecordRead(_) | Self::RecordWrite(_) => {
                false
            }
        }
    }
}
