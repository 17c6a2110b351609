//! Single-document point lookups for record enrichment.
//!
//! [`ArangoLookupService`] is the narrow, single-document variant of the
//! query path: a coordinate map (plus an optional string context) merges into
//! the query's bind parameters, the query runs once, and at most the first
//! resulting document comes back as a typed record. The declared
//! [`required_keys`](ArangoLookupService::required_keys) let the host
//! validate caller coordinates up front; a missing required key fails before
//! any network call. The connection is always released, even for this
//! at-most-one-row path.

use std::collections::HashMap;
use std::sync::Arc;

use arangoflow_client::{ConnectionFactory, ConnectionHandle, Document};
use serde_json::{Map, Value};
use tracing::{debug, error};

use crate::error::{ConnectorError, ConnectorResult};
use crate::pipeline::SchemaSource;
use crate::record::codec::to_record;
use crate::record::schema::RecordSchema;
use crate::record::Record;

/// Coordinate key holding the query text when none is configured.
const QUERY_KEY: &str = "query";

/// Lookup configuration.
#[derive(Debug, Clone)]
pub struct LookupConfig {
    /// Database to query.
    pub database: String,
    /// Fixed query text. When `None`, callers must pass the query through
    /// the `query` coordinate.
    pub query: Option<String>,
    /// Schema for returned records.
    pub schema: SchemaSource,
}

/// Lookup service backed by an AQL query.
pub struct ArangoLookupService {
    connections: Arc<dyn ConnectionFactory>,
    config: LookupConfig,
}

impl ArangoLookupService {
    /// Creates a lookup service.
    ///
    /// # Errors
    ///
    /// Returns [`ConnectorError::Configuration`] if the database name is
    /// empty or a configured query is empty.
    pub fn new(connections: Arc<dyn ConnectionFactory>, config: LookupConfig) -> ConnectorResult<Self> {
        if config.database.is_empty() {
            return Err(ConnectorError::Configuration(
                "database name is required".into(),
            ));
        }
        if matches!(&config.query, Some(q) if q.is_empty()) {
            return Err(ConnectorError::Configuration(
                "configured query must not be empty".into(),
            ));
        }
        Ok(Self {
            connections,
            config,
        })
    }

    /// The coordinate keys every call must supply.
    ///
    /// Empty when the query is configured on the service; otherwise the
    /// `query` coordinate is required.
    #[must_use]
    pub fn required_keys(&self) -> Vec<&'static str> {
        if self.config.query.is_some() {
            Vec::new()
        } else {
            vec![QUERY_KEY]
        }
    }

    /// Looks up at most one record with no additional context.
    ///
    /// # Errors
    ///
    /// See [`lookup_with_context`](Self::lookup_with_context).
    pub async fn lookup(&self, coordinates: &Map<String, Value>) -> ConnectorResult<Option<Record>> {
        self.lookup_with_context(coordinates, &HashMap::new()).await
    }

    /// Looks up at most one record.
    ///
    /// Coordinates and context merge into the query's bind parameters, with
    /// context entries winning on collision. An empty result set yields
    /// `Ok(None)`; so does a first result that is not a document.
    ///
    /// # Errors
    ///
    /// Returns [`ConnectorError::MissingCoordinate`], before any network
    /// call, when a required key is absent, and propagates query and codec
    /// failures otherwise. The connection is released on every path.
    pub async fn lookup_with_context(
        &self,
        coordinates: &Map<String, Value>,
        context: &HashMap<String, String>,
    ) -> ConnectorResult<Option<Record>> {
        for key in self.required_keys() {
            if !coordinates.contains_key(key) {
                return Err(ConnectorError::MissingCoordinate(key.to_string()));
            }
        }

        let (query, bind_vars) = self.prepare(coordinates, context)?;

        let handle = self.connections.connect()?;
        let result = self.first_record(&handle, &query, &bind_vars).await;
        handle.release();
        result
    }

    /// Splits the coordinates into query text and bind parameters.
    fn prepare(
        &self,
        coordinates: &Map<String, Value>,
        context: &HashMap<String, String>,
    ) -> ConnectorResult<(String, Map<String, Value>)> {
        let mut bind_vars = coordinates.clone();

        let query = match &self.config.query {
            Some(query) => query.clone(),
            None => match bind_vars.remove(QUERY_KEY) {
                Some(Value::String(query)) => query,
                Some(_) => {
                    return Err(ConnectorError::Configuration(
                        "the 'query' coordinate must be a string".into(),
                    ));
                }
                None => return Err(ConnectorError::MissingCoordinate(QUERY_KEY.to_string())),
            },
        };

        for (key, value) in context {
            bind_vars.insert(key.clone(), Value::String(value.clone()));
        }

        Ok((query, bind_vars))
    }

    async fn first_record(
        &self,
        handle: &ConnectionHandle,
        query: &str,
        bind_vars: &Map<String, Value>,
    ) -> ConnectorResult<Option<Record>> {
        let mut cursor = handle
            .query(&self.config.database, query, bind_vars)
            .await
            .inspect_err(|e| error!(error = %e, "lookup query failed"))?;

        let Some(item) = cursor.next().await? else {
            debug!("lookup matched no documents");
            return Ok(None);
        };

        // Only document results become records; a scalar first result is
        // treated as no match.
        let Value::Object(fields) = item else {
            return Ok(None);
        };
        let document = Document::from_fields(fields);
        let schema = match &self.config.schema {
            SchemaSource::Provided(schema) => Arc::clone(schema),
            SchemaSource::Infer => RecordSchema::infer(&document),
        };
        to_record(&document, &schema).map(Some)
    }
}

impl std::fmt::Debug for ArangoLookupService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ArangoLookupService")
            .field("database", &self.config.database)
            .field("fixed_query", &self.config.query.is_some())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arangoflow_client::memory::InMemoryDriver;
    use serde_json::json;

    const LOOKUP_QUERY: &str = "FOR d IN c FILTER d.id == @id RETURN d";

    fn service(driver: &Arc<InMemoryDriver>, query: Option<&str>) -> ArangoLookupService {
        ArangoLookupService::new(
            Arc::new(Arc::clone(driver)),
            LookupConfig {
                database: "db".into(),
                query: query.map(ToString::to_string),
                schema: SchemaSource::Infer,
            },
        )
        .unwrap()
    }

    fn coordinates(pairs: &[(&str, Value)]) -> Map<String, Value> {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), v.clone()))
            .collect()
    }

    #[tokio::test]
    async fn test_lookup_returns_first_record() {
        let driver = Arc::new(InMemoryDriver::new());
        driver.script_query(
            LOOKUP_QUERY,
            vec![json!({"id": "a", "v": 1}), json!({"id": "a", "v": 2})],
        );

        let service = service(&driver, Some(LOOKUP_QUERY));
        let record = service
            .lookup(&coordinates(&[("id", json!("a"))]))
            .await
            .unwrap()
            .unwrap();

        assert_eq!(record.get("v"), Some(&json!(1)));
        assert_eq!(driver.close_count(), 1);
    }

    #[tokio::test]
    async fn test_empty_result_is_none() {
        let driver = Arc::new(InMemoryDriver::new());
        let service = service(&driver, Some(LOOKUP_QUERY));

        let result = service.lookup(&coordinates(&[])).await.unwrap();
        assert!(result.is_none());
        assert_eq!(driver.close_count(), 1);
    }

    #[tokio::test]
    async fn test_query_coordinate_supplies_query() {
        let driver = Arc::new(InMemoryDriver::new());
        driver.script_query("FOR d IN c RETURN d", vec![json!({"x": 1})]);

        let service = service(&driver, None);
        assert_eq!(service.required_keys(), vec!["query"]);

        let record = service
            .lookup(&coordinates(&[
                ("query", json!("FOR d IN c RETURN d")),
                ("limit", json!(1)),
            ]))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(record.get("x"), Some(&json!(1)));

        // The query coordinate is not passed through as a bind parameter.
        let executed = driver.executed_queries();
        assert!(!executed[0].bind_vars.contains_key("query"));
        assert!(executed[0].bind_vars.contains_key("limit"));
    }

    #[tokio::test]
    async fn test_missing_required_key_fails_before_network() {
        let driver = Arc::new(InMemoryDriver::new());
        let service = service(&driver, None);

        let err = service
            .lookup(&coordinates(&[("id", json!("a"))]))
            .await
            .unwrap_err();
        assert!(matches!(err, ConnectorError::MissingCoordinate(_)));
        assert!(driver.executed_queries().is_empty());
        assert_eq!(driver.close_count(), 0);
    }

    #[tokio::test]
    async fn test_context_overrides_coordinates() {
        let driver = Arc::new(InMemoryDriver::new());
        let service = service(&driver, Some(LOOKUP_QUERY));

        let mut context = HashMap::new();
        context.insert("id".to_string(), "from-context".to_string());
        service
            .lookup_with_context(&coordinates(&[("id", json!("from-coords"))]), &context)
            .await
            .unwrap();

        let executed = driver.executed_queries();
        assert_eq!(executed[0].bind_vars.get("id"), Some(&json!("from-context")));
    }

    #[tokio::test]
    async fn test_scalar_first_result_is_none() {
        let driver = Arc::new(InMemoryDriver::new());
        driver.script_query(LOOKUP_QUERY, vec![json!(42)]);

        let service = service(&driver, Some(LOOKUP_QUERY));
        let result = service.lookup(&coordinates(&[])).await.unwrap();
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn test_failed_query_still_releases() {
        let driver = Arc::new(InMemoryDriver::new());
        driver.fail_query_setup(LOOKUP_QUERY, "unknown collection");

        let service = service(&driver, Some(LOOKUP_QUERY));
        let err = service.lookup(&coordinates(&[])).await.unwrap_err();
        assert!(matches!(err, ConnectorError::Client(_)));
        assert_eq!(driver.close_count(), 1);
    }

    #[test]
    fn test_empty_database_rejected() {
        let driver = Arc::new(InMemoryDriver::new());
        let result = ArangoLookupService::new(
            Arc::new(driver),
            LookupConfig {
                database: String::new(),
                query: None,
                schema: SchemaSource::Infer,
            },
        );
        assert!(result.is_err());
    }
}
