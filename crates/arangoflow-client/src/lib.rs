//! # arangoflow client
//!
//! Client layer for talking to an ArangoDB cluster from the arangoflow
//! connector suite. Provides:
//!
//! - [`ClientConfig`]: immutable connection configuration parsed from a flat
//!   option map (coordinator hosts, load balancing, authentication, protocol,
//!   timeouts, TLS)
//! - [`ConnectionProvider`]: cheap per-invocation construction of
//!   [`ConnectionHandle`]s with idempotent release
//! - [`DatabaseDriver`] / [`DocumentCursor`]: the narrow async boundary to the
//!   database. AQL queries stream results lazily through a forward-only
//!   cursor; single-document inserts go through the same handle
//! - [`HttpDriver`](http::HttpDriver): driver implementation over the ArangoDB
//!   HTTP cursor API
//! - [`InMemoryDriver`](memory::InMemoryDriver): scriptable driver for tests
//!   and local development

#![deny(missing_docs)]
#![warn(clippy::all, clippy::pedantic)]

pub mod config;
pub mod document;
pub mod driver;
pub mod error;
pub mod http;
pub mod memory;
pub mod provider;

pub use config::{
    ClientConfig, ConnectionOptions, Credentials, Endpoint, LoadBalancing, TlsConfig, WireProtocol,
};
pub use document::Document;
pub use driver::{DatabaseDriver, DocumentCursor};
pub use error::{ClientError, ClientResult};
pub use provider::{ConnectionFactory, ConnectionHandle, ConnectionProvider};
