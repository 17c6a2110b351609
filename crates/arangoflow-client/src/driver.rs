//! The narrow async boundary to the database.
//!
//! [`DatabaseDriver`] is everything the pipeline layer knows about the
//! database: execute a parameterized query and get back a lazy
//! [`DocumentCursor`], or insert a single document. The HTTP implementation
//! lives in [`crate::http`]; a scriptable in-memory implementation for tests
//! lives in [`crate::memory`].

use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::document::Document;
use crate::error::ClientResult;

/// Lazy, forward-only stream of query result items.
///
/// Items are fetched from the network incrementally as the consumer advances;
/// the full result set is never materialized. Failures while advancing
/// surface as [`ClientError::MidStream`](crate::ClientError::MidStream),
/// distinct from the setup errors raised by
/// [`DatabaseDriver::query`].
#[async_trait]
pub trait DocumentCursor: Send + std::fmt::Debug {
    /// Advances the cursor and returns the next result item, or `None` when
    /// the result set is exhausted.
    ///
    /// Result items are raw JSON values: usually objects, but aggregation
    /// queries may yield bare numbers or strings.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::MidStream`](crate::ClientError::MidStream) if
    /// the stream fails after setup.
    async fn next(&mut self) -> ClientResult<Option<Value>>;
}

/// Async database driver boundary.
///
/// Parameter placeholders in queries are evaluated server-side: bind
/// parameters are passed as a mapping and never concatenated into the query
/// string.
#[async_trait]
pub trait DatabaseDriver: Send + Sync {
    /// Executes a query against a database and returns a lazy cursor over the
    /// results.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::QuerySetup`](crate::ClientError::QuerySetup)
    /// for errors detected before any result is produced (bad syntax, unknown
    /// collection) and
    /// [`ClientError::Connection`](crate::ClientError::Connection) when the
    /// coordinator is unreachable.
    async fn query(
        &self,
        database: &str,
        query: &str,
        bind_vars: &Map<String, Value>,
    ) -> ClientResult<Box<dyn DocumentCursor>>;

    /// Inserts a single document into a collection.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Rejected`](crate::ClientError::Rejected) if the
    /// database refuses the write, or
    /// [`ClientError::Connection`](crate::ClientError::Connection) on
    /// transport failure.
    async fn insert(&self, database: &str, collection: &str, document: &Document)
        -> ClientResult<()>;

    /// Shuts the transport down. Safe to call more than once, and callable
    /// from synchronous cleanup paths.
    fn close(&self);
}
