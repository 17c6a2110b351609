//! HTTP driver for the ArangoDB cursor and document APIs.
//!
//! Implements [`DatabaseDriver`] over `reqwest`. Queries go through the
//! cursor API (`POST /_db/{db}/_api/cursor`) and stream batches lazily via
//! cursor continuation, so result sets larger than memory are consumed
//! incrementally. Coordinator selection follows the configured load-balancing
//! mode, and the full cluster topology can be discovered lazily from the seed
//! hosts (`GET /_api/cluster/endpoints`).

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use rand::Rng;
use serde::Deserialize;
use serde_json::{Map, Value};
use tokio::sync::OnceCell;
use tracing::{debug, warn};

use crate::config::{ClientConfig, Credentials, Endpoint, LoadBalancing, WireProtocol};
use crate::document::Document;
use crate::driver::{DatabaseDriver, DocumentCursor};
use crate::error::{ClientError, ClientResult};

/// Cursor batch size used when the configuration does not set one.
const DEFAULT_BATCH_SIZE: u32 = 1000;

/// [`DatabaseDriver`] implementation over the ArangoDB HTTP API.
pub struct HttpDriver {
    http: reqwest::Client,
    config: Arc<ClientConfig>,
    /// Known coordinators; grows when topology discovery runs.
    endpoints: RwLock<Vec<Endpoint>>,
    /// Round-robin position.
    next_endpoint: AtomicUsize,
    /// One-shot guard for lazy topology discovery.
    discovery: OnceCell<()>,
}

impl HttpDriver {
    /// Builds a driver from the shared configuration. Cheap: no network I/O
    /// happens until the first operation.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Configuration`] if the configured protocol is
    /// not HTTP/JSON or the TLS material is invalid, and
    /// [`ClientError::Connection`] if the HTTP client cannot be constructed.
    pub fn new(config: Arc<ClientConfig>) -> ClientResult<Self> {
        match config.protocol {
            None | Some(WireProtocol::HttpJson) => {}
            Some(other) => {
                return Err(ClientError::Configuration(format!(
                    "protocol {other:?} is not supported by the HTTP driver; use 'http_json'"
                )));
            }
        }

        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = config.timeout {
            builder = builder.timeout(timeout).connect_timeout(timeout);
        }
        if let Some(ttl) = config.connection_ttl {
            builder = builder.pool_idle_timeout(ttl);
        }
        if let Some(max) = config.max_connections {
            builder = builder.pool_max_idle_per_host(max);
        }
        if let Some(tls) = &config.tls {
            if let Some(pem) = &tls.ca_certificate_pem {
                let cert = reqwest::Certificate::from_pem(pem.as_bytes()).map_err(|e| {
                    ClientError::Configuration(format!("invalid CA certificate: {e}"))
                })?;
                builder = builder.add_root_certificate(cert);
            }
            if tls.accept_invalid_certs {
                builder = builder.danger_accept_invalid_certs(true);
            }
        }

        let http = builder
            .build()
            .map_err(|e| ClientError::Connection(format!("failed to build HTTP client: {e}")))?;

        let endpoints = config.endpoints.clone();
        Ok(Self {
            http,
            config,
            endpoints: RwLock::new(endpoints),
            next_endpoint: AtomicUsize::new(0),
            discovery: OnceCell::new(),
        })
    }

    /// URL scheme implied by the TLS settings.
    fn scheme(&self) -> &'static str {
        match &self.config.tls {
            Some(tls) if tls.enabled => "https",
            _ => "http",
        }
    }

    /// Base URL of one coordinator.
    fn base_url(&self, endpoint: &Endpoint) -> String {
        format!("{}://{}", self.scheme(), endpoint)
    }

    /// Picks a coordinator according to the load-balancing mode.
    fn select_base(&self) -> String {
        let endpoints = self.endpoints.read();
        let index = match self.config.load_balancing {
            LoadBalancing::None => 0,
            LoadBalancing::RoundRobin => {
                self.next_endpoint.fetch_add(1, Ordering::Relaxed) % endpoints.len()
            }
            LoadBalancing::Random => rand::thread_rng().gen_range(0..endpoints.len()),
        };
        self.base_url(&endpoints[index])
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        apply_auth(request, self.config.auth.as_ref())
    }

    /// Discovers the full cluster topology from the seed hosts, at most once
    /// per driver. Discovery failure is not fatal: the seed list keeps
    /// working, so it degrades with a warning.
    async fn ensure_host_list(&self) {
        if !self.config.acquire_host_list {
            return;
        }
        self.discovery
            .get_or_init(|| async {
                match self.discover_endpoints().await {
                    Ok(discovered) if !discovered.is_empty() => {
                        debug!(count = discovered.len(), "discovered cluster endpoints");
                        *self.endpoints.write() = discovered;
                    }
                    Ok(_) => {}
                    Err(e) => {
                        warn!(error = %e, "cluster endpoint discovery failed, using seed hosts");
                    }
                }
            })
            .await;
    }

    async fn discover_endpoints(&self) -> ClientResult<Vec<Endpoint>> {
        let base = {
            let endpoints = self.endpoints.read();
            self.base_url(&endpoints[0])
        };
        let url = format!("{base}/_api/cluster/endpoints");
        let response = self
            .authorize(self.http.get(&url))
            .send()
            .await
            .map_err(|e| ClientError::Connection(e.to_string()))?;
        if !response.status().is_success() {
            return Err(ClientError::Connection(format!(
                "endpoint discovery returned {}",
                response.status()
            )));
        }
        let body: ClusterEndpointsResponse = response
            .json()
            .await
            .map_err(|e| ClientError::Connection(e.to_string()))?;
        Ok(body
            .endpoints
            .iter()
            .filter_map(|e| parse_cluster_endpoint(&e.endpoint))
            .collect())
    }
}

#[async_trait]
impl DatabaseDriver for HttpDriver {
    async fn query(
        &self,
        database: &str,
        query: &str,
        bind_vars: &Map<String, Value>,
    ) -> ClientResult<Box<dyn DocumentCursor>> {
        self.ensure_host_list().await;
        let base = self.select_base();
        let url = format!("{base}/_db/{database}/_api/cursor");

        let mut body = Map::new();
        body.insert("query".to_string(), Value::String(query.to_string()));
        body.insert(
            "batchSize".to_string(),
            Value::from(self.config.chunk_size.unwrap_or(DEFAULT_BATCH_SIZE)),
        );
        if !bind_vars.is_empty() {
            body.insert("bindVars".to_string(), Value::Object(bind_vars.clone()));
        }

        let response = self
            .authorize(self.http.post(&url))
            .json(&Value::Object(body))
            .send()
            .await
            .map_err(|e| ClientError::Connection(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(setup_error(status, response).await);
        }

        let batch: CursorResponse = response
            .json()
            .await
            .map_err(|e| ClientError::QuerySetup(format!("malformed cursor response: {e}")))?;

        Ok(Box::new(HttpCursor {
            http: self.http.clone(),
            base,
            database: database.to_string(),
            auth: self.config.auth.clone(),
            buffered: batch.result.into(),
            cursor_id: batch.id,
            has_more: batch.has_more,
        }))
    }

    async fn insert(
        &self,
        database: &str,
        collection: &str,
        document: &Document,
    ) -> ClientResult<()> {
        self.ensure_host_list().await;
        let base = self.select_base();
        let url = format!("{base}/_db/{database}/_api/document/{collection}");

        let response = self
            .authorize(self.http.post(&url))
            .json(&document.to_value())
            .send()
            .await
            .map_err(|e| ClientError::Connection(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }
        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
            return Err(ClientError::Connection(format!(
                "authentication rejected ({status})"
            )));
        }
        Err(ClientError::Rejected(error_message(status, response).await))
    }

    fn close(&self) {
        // reqwest tears its pool down when the client is dropped; nothing to
        // flush here. The method exists so the handle's release discipline is
        // uniform across drivers.
    }
}

impl std::fmt::Debug for HttpDriver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpDriver")
            .field("endpoints", &self.endpoints.read().len())
            .field("load_balancing", &self.config.load_balancing)
            .finish_non_exhaustive()
    }
}

/// Lazy cursor over one query's results.
///
/// Holds the coordinator that created the cursor (cursors are
/// endpoint-affine) and refills its buffer one batch at a time. Abandoned
/// server-side cursors expire via the server's cursor TTL.
#[derive(Debug)]
struct HttpCursor {
    http: reqwest::Client,
    base: String,
    database: String,
    auth: Option<Credentials>,
    buffered: VecDeque<Value>,
    cursor_id: Option<String>,
    has_more: bool,
}

#[async_trait]
impl DocumentCursor for HttpCursor {
    async fn next(&mut self) -> ClientResult<Option<Value>> {
        if let Some(item) = self.buffered.pop_front() {
            return Ok(Some(item));
        }
        if !self.has_more {
            return Ok(None);
        }

        let id = self
            .cursor_id
            .as_deref()
            .ok_or_else(|| ClientError::MidStream("continuation without cursor id".into()))?;
        let url = format!("{}/_db/{}/_api/cursor/{id}", self.base, self.database);

        let response = apply_auth(self.http.put(&url), self.auth.as_ref())
            .send()
            .await
            .map_err(|e| ClientError::MidStream(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ClientError::MidStream(error_message(status, response).await));
        }

        let batch: CursorResponse = response
            .json()
            .await
            .map_err(|e| ClientError::MidStream(format!("malformed cursor batch: {e}")))?;

        self.buffered = batch.result.into();
        self.has_more = batch.has_more;
        Ok(self.buffered.pop_front())
    }
}

fn apply_auth(
    request: reqwest::RequestBuilder,
    auth: Option<&Credentials>,
) -> reqwest::RequestBuilder {
    match auth {
        Some(creds) => request.basic_auth(&creds.username, Some(&creds.password)),
        None => request,
    }
}

/// Classifies an unsuccessful query-setup response.
async fn setup_error(status: reqwest::StatusCode, response: reqwest::Response) -> ClientError {
    if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
        return ClientError::Connection(format!("authentication rejected ({status})"));
    }
    if status.is_server_error() {
        return ClientError::Connection(error_message(status, response).await);
    }
    ClientError::QuerySetup(error_message(status, response).await)
}

/// Extracts the server's error message, falling back to the HTTP status.
async fn error_message(status: reqwest::StatusCode, response: reqwest::Response) -> String {
    match response.json::<ArangoErrorBody>().await {
        Ok(body) if !body.error_message.is_empty() => {
            format!("{} (status {status})", body.error_message)
        }
        _ => format!("request failed with status {status}"),
    }
}

/// Parses a cluster endpoint entry such as `tcp://db1:8529`.
fn parse_cluster_endpoint(raw: &str) -> Option<Endpoint> {
    let rest = raw
        .strip_prefix("tcp://")
        .or_else(|| raw.strip_prefix("ssl://"))
        .or_else(|| raw.strip_prefix("http://"))
        .or_else(|| raw.strip_prefix("https://"))?;
    let (host, port) = rest.rsplit_once(':')?;
    let port: u16 = port.parse().ok()?;
    if host.is_empty() {
        return None;
    }
    Some(Endpoint {
        host: host.to_string(),
        port,
    })
}

#[derive(Debug, Deserialize)]
struct CursorResponse {
    #[serde(default)]
    result: Vec<Value>,
    #[serde(default, rename = "hasMore")]
    has_more: bool,
    #[serde(default)]
    id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ArangoErrorBody {
    #[serde(default, rename = "errorMessage")]
    error_message: String,
}

#[derive(Debug, Deserialize)]
struct ClusterEndpointsResponse {
    #[serde(default)]
    endpoints: Vec<ClusterEndpointEntry>,
}

#[derive(Debug, Deserialize)]
struct ClusterEndpointEntry {
    endpoint: String,
}
