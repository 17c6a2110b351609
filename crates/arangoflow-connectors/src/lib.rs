//! # arangoflow connectors
//!
//! Pipeline components that move data between a record-oriented data-flow
//! host and an ArangoDB cluster:
//!
//! - [`record`]: typed record model, schema inference, and the bidirectional
//!   document ↔ record codec, plus the record reader/writer boundary
//! - [`flow`]: the flow-unit and session boundary to the host, with the three
//!   named outcomes (`success`, `failure`, `original`)
//! - [`pipeline`]: the invocation driver: acquire a connection, execute a
//!   query or record ingest, stream results, route outcomes, and release the
//!   connection on every path
//! - [`lookup`]: single-document point lookups keyed by a coordinate map
//! - [`expression`]: `${attribute}` placeholder resolution against a
//!   triggering flow unit
//! - [`metrics`]: lock-free invocation counters

#![deny(missing_docs)]
#![warn(clippy::all, clippy::pedantic)]

pub mod error;
pub mod expression;
pub mod flow;
pub mod lookup;
pub mod metrics;
pub mod pipeline;
pub mod record;

pub use error::{ConnectorError, ConnectorResult};
pub use flow::{FlowSession, FlowUnit, MemorySession, Outcome};
pub use pipeline::{
    PipelineConfig, PipelineDriver, PipelineMode, RunReport, SchemaSource, StreamFailurePolicy,
};
