//! The pipeline invocation driver.
//!
//! Each invocation walks `ACQUIRE → EXECUTE → STREAM → COMMIT`, with a
//! transition to `FAIL` possible from any state and `RELEASE` reached on
//! every path (the connection handle releases itself even when the invocation
//! future is cancelled). Processing modes are the closed set of
//! [`PipelineMode`] variants sharing the same contract rather than an
//! inheritance hierarchy:
//!
//! - **`QueryStream`** emits one `success` flow unit per result document and
//!   routes the trigger to `original` on exhaustion. Stream failures follow
//!   the configured [`StreamFailurePolicy`].
//! - **`QueryRecord`** serializes the whole result set through a record
//!   writer into a single `success` flow unit; the schema is supplied or
//!   inferred once from the first document.
//! - **`Ingest`** reads the triggering unit's content as records, extracts
//!   each document key through the configured record path, and issues
//!   single-document inserts; the whole invocation fails on the first bad
//!   record.
//!
//! Outputs are held pending and only transferred at commit, so an invocation
//! that fails or is interrupted never leaves a half-produced unit on the
//! `success` outcome.

use std::sync::atomic::Ordering;
use std::sync::Arc;

use arangoflow_client::{ConnectionFactory, ConnectionHandle, Document};
use serde_json::Map;
use tracing::{debug, error};

use crate::error::{ConnectorError, ConnectorResult};
use crate::expression;
use crate::flow::{FlowSession, FlowUnit, Outcome};
use crate::metrics::PipelineMetrics;
use crate::record::codec::{to_document, to_record};
use crate::record::io::{RecordReaderFactory, RecordWriterFactory};
use crate::record::path::RecordPathCache;
use crate::record::schema::RecordSchema;

/// Capacity of the shared compiled record-path cache.
const PATH_CACHE_CAPACITY: usize = 25;

/// What to do with output already produced when a query stream fails
/// mid-way.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StreamFailurePolicy {
    /// Discard (remove) every flow unit created this invocation and route
    /// the trigger to `failure`. The canonical policy.
    #[default]
    DiscardPartial,
    /// Keep prior output on `success` and roll the trigger back to the host
    /// for redelivery. Downstream consumers must tolerate duplicates.
    KeepPartial,
}

/// How the record-mode output schema is obtained.
#[derive(Clone)]
pub enum SchemaSource {
    /// Use this schema for every record.
    Provided(Arc<RecordSchema>),
    /// Infer the schema once from the first result document.
    Infer,
}

impl std::fmt::Debug for SchemaSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Provided(schema) => write!(f, "Provided({} fields)", schema.fields().len()),
            Self::Infer => write!(f, "Infer"),
        }
    }
}

/// Static pipeline configuration.
///
/// `database`, `collection`, `query`, and the ingest key path may contain
/// `${attribute}` placeholders resolved against the triggering flow unit.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Target database name.
    pub database: String,
    /// Target collection name (ingest mode).
    pub collection: Option<String>,
    /// AQL query text (query modes).
    pub query: Option<String>,
    /// Whether the key field stays in the document properties after key
    /// extraction (ingest mode).
    pub include_key_field: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            database: String::new(),
            collection: None,
            query: None,
            include_key_field: true,
        }
    }
}

/// The processing mode of one pipeline driver.
pub enum PipelineMode {
    /// One output flow unit per result document.
    QueryStream {
        /// Failure policy for partially produced output.
        failure_policy: StreamFailurePolicy,
    },
    /// The whole result set serialized into one output flow unit.
    QueryRecord {
        /// Writer for the output record set.
        writer_factory: Arc<dyn RecordWriterFactory>,
        /// Output schema source.
        schema: SchemaSource,
    },
    /// Record ingest: input records become single-document inserts.
    Ingest {
        /// Reader for the input flow unit's content.
        reader_factory: Arc<dyn RecordReaderFactory>,
        /// Record path selecting each document's key.
        key_path: String,
    },
}

impl std::fmt::Debug for PipelineMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::QueryStream { failure_policy } => f
                .debug_struct("QueryStream")
                .field("failure_policy", failure_policy)
                .finish(),
            Self::QueryRecord { schema, .. } => f
                .debug_struct("QueryRecord")
                .field("schema", schema)
                .finish_non_exhaustive(),
            Self::Ingest { key_path, .. } => f
                .debug_struct("Ingest")
                .field("key_path", key_path)
                .finish_non_exhaustive(),
        }
    }
}

/// Summary of one invocation.
#[derive(Debug, Default)]
pub struct RunReport {
    /// Flow units transferred to `success`.
    pub emitted: usize,
    /// Records read from the input flow unit (ingest mode).
    pub records_read: usize,
    /// The error that was routed, if the invocation failed.
    pub error: Option<ConnectorError>,
}

impl RunReport {
    /// Returns `true` if the invocation completed without routing a failure.
    #[must_use]
    pub fn succeeded(&self) -> bool {
        self.error.is_none()
    }
}

/// Per-invocation templates after attribute-expression resolution.
struct Resolved {
    database: String,
    query: Option<String>,
    collection: Option<String>,
    key_path: Option<String>,
}

/// Drives pipeline invocations for one configured mode.
///
/// The driver holds no per-invocation state; invocations on separate tasks
/// may run concurrently, sharing only the immutable configuration and the
/// bounded compiled-path cache.
pub struct PipelineDriver {
    connections: Arc<dyn ConnectionFactory>,
    config: PipelineConfig,
    mode: PipelineMode,
    paths: Arc<RecordPathCache>,
    metrics: Arc<PipelineMetrics>,
}

impl PipelineDriver {
    /// Creates a driver, validating that the configuration matches the mode.
    ///
    /// # Errors
    ///
    /// Returns [`ConnectorError::Configuration`] when a mode-required setting
    /// is missing.
    pub fn new(
        connections: Arc<dyn ConnectionFactory>,
        config: PipelineConfig,
        mode: PipelineMode,
    ) -> ConnectorResult<Self> {
        if config.database.is_empty() {
            return Err(ConnectorError::Configuration(
                "database name is required".into(),
            ));
        }
        match &mode {
            PipelineMode::QueryStream { .. } | PipelineMode::QueryRecord { .. } => {
                if config.query.as_deref().unwrap_or_default().is_empty() {
                    return Err(ConnectorError::Configuration(
                        "query text is required in query mode".into(),
                    ));
                }
            }
            PipelineMode::Ingest { key_path, .. } => {
                if config.collection.as_deref().unwrap_or_default().is_empty() {
                    return Err(ConnectorError::Configuration(
                        "collection name is required in ingest mode".into(),
                    ));
                }
                if key_path.is_empty() {
                    return Err(ConnectorError::Configuration(
                        "key record path is required in ingest mode".into(),
                    ));
                }
            }
        }
        Ok(Self {
            connections,
            config,
            mode,
            paths: Arc::new(RecordPathCache::new(PATH_CACHE_CAPACITY)),
            metrics: Arc::new(PipelineMetrics::new()),
        })
    }

    /// Shares a compiled-path cache across drivers.
    #[must_use]
    pub fn with_path_cache(mut self, paths: Arc<RecordPathCache>) -> Self {
        self.paths = paths;
        self
    }

    /// The driver's metrics.
    #[must_use]
    pub fn metrics(&self) -> &Arc<PipelineMetrics> {
        &self.metrics
    }

    /// Runs one invocation against a session.
    ///
    /// Execution and streaming failures are routed to the `failure` outcome
    /// internally and reported through [`RunReport::error`]; the invocation
    /// itself still returns `Ok`.
    ///
    /// # Errors
    ///
    /// Returns an error only for failures that precede any output
    /// (unresolvable expressions, connection acquisition), in which case
    /// the trigger is rolled back and the host owns the retry policy.
    pub async fn run(&self, session: &mut dyn FlowSession) -> ConnectorResult<RunReport> {
        self.metrics.invocations_total.fetch_add(1, Ordering::Relaxed);

        let trigger = session.get();
        if matches!(self.mode, PipelineMode::Ingest { .. }) && trigger.is_none() {
            // Ingest requires input; an empty queue is not an invocation.
            return Ok(RunReport::default());
        }

        let resolved = match self.resolve_templates(trigger.as_ref()) {
            Ok(resolved) => resolved,
            Err(e) => return self.abort(session, trigger, e),
        };

        let handle = match self.connections.connect() {
            Ok(handle) => handle,
            Err(e) => return self.abort(session, trigger, e.into()),
        };

        let report = match &self.mode {
            PipelineMode::QueryStream { failure_policy } => {
                self.run_query_stream(&handle, session, trigger, &resolved, *failure_policy)
                    .await
            }
            PipelineMode::QueryRecord {
                writer_factory,
                schema,
            } => {
                self.run_query_record(
                    &handle,
                    session,
                    trigger,
                    &resolved,
                    writer_factory.as_ref(),
                    schema,
                )
                .await
            }
            PipelineMode::Ingest { reader_factory, .. } => match trigger {
                Some(trigger) => {
                    self.run_ingest(&handle, session, trigger, &resolved, reader_factory.as_ref())
                        .await
                }
                // Checked at entry; kept total instead of panicking.
                None => RunReport::default(),
            },
        };
        handle.release();

        self.metrics
            .units_out_total
            .fetch_add(report.emitted as u64, Ordering::Relaxed);
        self.metrics
            .records_in_total
            .fetch_add(report.records_read as u64, Ordering::Relaxed);
        if report.error.is_some() {
            self.metrics.failures_total.fetch_add(1, Ordering::Relaxed);
        }
        Ok(report)
    }

    /// Resolves every template the mode needs against the trigger's
    /// attributes.
    fn resolve_templates(&self, trigger: Option<&FlowUnit>) -> ConnectorResult<Resolved> {
        let attributes = trigger.map(FlowUnit::attributes);
        let database = expression::resolve_opt(&self.config.database, attributes)?;
        let query = match &self.config.query {
            Some(template) => Some(expression::resolve_opt(template, attributes)?),
            None => None,
        };
        let collection = match &self.config.collection {
            Some(template) => Some(expression::resolve_opt(template, attributes)?),
            None => None,
        };
        let key_path = match &self.mode {
            PipelineMode::Ingest { key_path, .. } => {
                Some(expression::resolve_opt(key_path, attributes)?)
            }
            _ => None,
        };
        Ok(Resolved {
            database,
            query,
            collection,
            key_path,
        })
    }

    /// Fails the invocation before any output was produced: the trigger goes
    /// back to the host queue and the error surfaces to the caller.
    fn abort(
        &self,
        session: &mut dyn FlowSession,
        trigger: Option<FlowUnit>,
        error: ConnectorError,
    ) -> ConnectorResult<RunReport> {
        self.metrics.failures_total.fetch_add(1, Ordering::Relaxed);
        if let Some(unit) = trigger {
            session.rollback(unit);
        }
        Err(error)
    }

    async fn run_query_stream(
        &self,
        handle: &ConnectionHandle,
        session: &mut dyn FlowSession,
        trigger: Option<FlowUnit>,
        resolved: &Resolved,
        policy: StreamFailurePolicy,
    ) -> RunReport {
        let query = resolved.query.as_deref().unwrap_or_default();
        let mut pending: Vec<FlowUnit> = Vec::new();
        let outcome = stream_documents(
            handle,
            session,
            trigger.as_ref(),
            &resolved.database,
            query,
            &mut pending,
        )
        .await;
        let produced = pending.len();

        match outcome {
            Ok(()) => {
                for unit in pending {
                    session.transfer(unit, Outcome::Success);
                }
                if let Some(unit) = trigger {
                    session.transfer(unit, Outcome::Original);
                }
                debug!(emitted = produced, "query stream complete");
                RunReport {
                    emitted: produced,
                    ..RunReport::default()
                }
            }
            Err(e) => {
                error!(error = %e, "query failed");
                match policy {
                    StreamFailurePolicy::DiscardPartial => {
                        for unit in pending {
                            session.remove(unit);
                        }
                        if let Some(unit) = trigger {
                            session.transfer(unit, Outcome::Failure);
                        }
                        RunReport {
                            error: Some(e),
                            ..RunReport::default()
                        }
                    }
                    StreamFailurePolicy::KeepPartial => {
                        for unit in pending {
                            session.transfer(unit, Outcome::Success);
                        }
                        if let Some(unit) = trigger {
                            session.rollback(unit);
                        }
                        RunReport {
                            emitted: produced,
                            records_read: 0,
                            error: Some(e),
                        }
                    }
                }
            }
        }
    }

    async fn run_query_record(
        &self,
        handle: &ConnectionHandle,
        session: &mut dyn FlowSession,
        trigger: Option<FlowUnit>,
        resolved: &Resolved,
        writer_factory: &dyn RecordWriterFactory,
        schema: &SchemaSource,
    ) -> RunReport {
        let query = resolved.query.as_deref().unwrap_or_default();
        let mut output = session.create(trigger.as_ref());

        match collect_record_set(handle, &resolved.database, query, writer_factory, schema).await {
            Ok(bytes) => {
                output.set_content(bytes.into());
                session.transfer(output, Outcome::Success);
                if let Some(unit) = trigger {
                    session.transfer(unit, Outcome::Original);
                }
                RunReport {
                    emitted: 1,
                    ..RunReport::default()
                }
            }
            Err(e) => {
                error!(error = %e, "record query failed");
                session.remove(output);
                if let Some(unit) = trigger {
                    session.transfer(unit, Outcome::Failure);
                }
                RunReport {
                    error: Some(e),
                    ..RunReport::default()
                }
            }
        }
    }

    async fn run_ingest(
        &self,
        handle: &ConnectionHandle,
        session: &mut dyn FlowSession,
        trigger: FlowUnit,
        resolved: &Resolved,
        reader_factory: &dyn RecordReaderFactory,
    ) -> RunReport {
        let output = session.create(Some(&trigger));

        match self
            .ingest_records(handle, &trigger, resolved, reader_factory)
            .await
        {
            Ok(count) => {
                session.transfer(output, Outcome::Success);
                session.transfer(trigger, Outcome::Original);
                debug!(records = count, "record ingest complete");
                RunReport {
                    emitted: 1,
                    records_read: count,
                    error: None,
                }
            }
            Err(e) => {
                // Inserts issued before the failure are not rolled back; the
                // failure routing reports the whole invocation as failed and
                // nothing is claimed committed.
                error!(error = %e, "record ingest failed");
                session.remove(output);
                session.transfer(trigger, Outcome::Failure);
                RunReport {
                    error: Some(e),
                    ..RunReport::default()
                }
            }
        }
    }

    async fn ingest_records(
        &self,
        handle: &ConnectionHandle,
        trigger: &FlowUnit,
        resolved: &Resolved,
        reader_factory: &dyn RecordReaderFactory,
    ) -> ConnectorResult<usize> {
        let key_path = resolved.key_path.as_deref().unwrap_or_default();
        let path = self.paths.get_compiled(key_path)?;
        let collection = resolved.collection.as_deref().unwrap_or_default();

        let mut reader = reader_factory.create_reader(trigger.content().clone())?;
        let mut inserted = 0usize;
        while let Some(record) = reader.next_record()? {
            let document = to_document(&record, Some(path.as_ref()), self.config.include_key_field)?;
            handle
                .insert(&resolved.database, collection, &document)
                .await?;
            inserted += 1;
            self.metrics.inserts_total.fetch_add(1, Ordering::Relaxed);
        }
        Ok(inserted)
    }
}

impl std::fmt::Debug for PipelineDriver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipelineDriver")
            .field("config", &self.config)
            .field("mode", &self.mode)
            .finish_non_exhaustive()
    }
}

/// Streams query results into pending output units, one per document.
async fn stream_documents(
    handle: &ConnectionHandle,
    session: &mut dyn FlowSession,
    parent: Option<&FlowUnit>,
    database: &str,
    query: &str,
    pending: &mut Vec<FlowUnit>,
) -> ConnectorResult<()> {
    let mut cursor = handle.query(database, query, &Map::new()).await?;
    while let Some(item) = cursor.next().await? {
        let document = Document::from_value(item);
        let content = serde_json::to_vec(&document.to_value())
            .map_err(|e| ConnectorError::Codec(e.to_string()))?;
        let mut unit = session.create(parent);
        unit.set_content(content.into());
        pending.push(unit);
    }
    Ok(())
}

/// Runs a query and serializes the whole result set through a record writer.
///
/// With [`SchemaSource::Infer`] the schema comes from the first document and
/// is reused for every following record; an empty result set serializes as an
/// empty record set under an empty schema.
async fn collect_record_set(
    handle: &ConnectionHandle,
    database: &str,
    query: &str,
    writer_factory: &dyn RecordWriterFactory,
    schema: &SchemaSource,
) -> ConnectorResult<Vec<u8>> {
    let mut cursor = handle.query(database, query, &Map::new()).await?;

    let mut first_document = None;
    let schema = match schema {
        SchemaSource::Provided(schema) => Arc::clone(schema),
        SchemaSource::Infer => match cursor.next().await? {
            Some(item) => {
                let document = Document::from_value(item);
                let schema = RecordSchema::infer(&document);
                first_document = Some(document);
                schema
            }
            None => Arc::new(RecordSchema::empty()),
        },
    };

    let mut writer = writer_factory.create_writer(Arc::clone(&schema))?;
    writer.begin()?;
    if let Some(document) = first_document {
        writer.write(&to_record(&document, &schema)?)?;
    }
    while let Some(item) = cursor.next().await? {
        let document = Document::from_value(item);
        writer.write(&to_record(&document, &schema)?)?;
    }
    writer.finish()
}
