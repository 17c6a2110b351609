//! In-memory driver for tests and local development.
//!
//! [`InMemoryDriver`] implements [`DatabaseDriver`] against process-local
//! state: query results are scripted per query text, inserts land in an
//! in-memory collection map, and failures can be injected at setup time,
//! mid-stream after N items, or per inserted key. Release behavior is
//! observable through [`InMemoryDriver::close_count`].

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{Map, Value};

use crate::document::Document;
use crate::driver::{DatabaseDriver, DocumentCursor};
use crate::error::{ClientError, ClientResult};
use crate::provider::{ConnectionFactory, ConnectionHandle};

/// Scripted behavior for one query text.
#[derive(Debug, Clone, Default)]
struct QueryScript {
    items: Vec<Value>,
    fail_setup: Option<String>,
    /// Fail with a mid-stream error after this many items were served.
    fail_after: Option<(usize, String)>,
}

/// A query execution observed by the driver, for assertions.
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutedQuery {
    /// Database name the query ran against.
    pub database: String,
    /// Query text.
    pub query: String,
    /// Bind parameters passed with the query.
    pub bind_vars: Map<String, Value>,
}

#[derive(Default)]
struct DriverState {
    scripts: HashMap<String, QueryScript>,
    collections: HashMap<(String, String), Vec<Document>>,
    reject_keys: HashSet<String>,
    executed: Vec<ExecutedQuery>,
}

/// Scriptable in-memory [`DatabaseDriver`].
#[derive(Default)]
pub struct InMemoryDriver {
    state: Mutex<DriverState>,
    close_count: AtomicUsize,
}

impl InMemoryDriver {
    /// Creates an empty driver.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Scripts the result items for a query text.
    pub fn script_query(&self, query: impl Into<String>, items: Vec<Value>) {
        let mut state = self.state.lock();
        state.scripts.entry(query.into()).or_default().items = items;
    }

    /// Makes a query fail at setup with the given message.
    pub fn fail_query_setup(&self, query: impl Into<String>, message: impl Into<String>) {
        let mut state = self.state.lock();
        state.scripts.entry(query.into()).or_default().fail_setup = Some(message.into());
    }

    /// Makes a query's cursor fail mid-stream after serving `after` items.
    pub fn fail_query_after(
        &self,
        query: impl Into<String>,
        after: usize,
        message: impl Into<String>,
    ) {
        let mut state = self.state.lock();
        state.scripts.entry(query.into()).or_default().fail_after = Some((after, message.into()));
    }

    /// Makes inserts of documents with the given key fail.
    pub fn reject_insert_key(&self, key: impl Into<String>) {
        self.state.lock().reject_keys.insert(key.into());
    }

    /// Returns the documents inserted into a collection, in insertion order.
    #[must_use]
    pub fn documents(&self, database: &str, collection: &str) -> Vec<Document> {
        self.state
            .lock()
            .collections
            .get(&(database.to_string(), collection.to_string()))
            .cloned()
            .unwrap_or_default()
    }

    /// Returns every query executed so far.
    #[must_use]
    pub fn executed_queries(&self) -> Vec<ExecutedQuery> {
        self.state.lock().executed.clone()
    }

    /// Returns how many times [`DatabaseDriver::close`] has been called.
    #[must_use]
    pub fn close_count(&self) -> usize {
        self.close_count.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DatabaseDriver for InMemoryDriver {
    async fn query(
        &self,
        database: &str,
        query: &str,
        bind_vars: &Map<String, Value>,
    ) -> ClientResult<Box<dyn DocumentCursor>> {
        let script = {
            let mut state = self.state.lock();
            state.executed.push(ExecutedQuery {
                database: database.to_string(),
                query: query.to_string(),
                bind_vars: bind_vars.clone(),
            });
            state.scripts.get(query).cloned().unwrap_or_default()
        };

        if let Some(message) = script.fail_setup {
            return Err(ClientError::QuerySetup(message));
        }

        Ok(Box::new(InMemoryCursor {
            remaining: script.items.into(),
            fail_after: script.fail_after,
            served: 0,
        }))
    }

    async fn insert(
        &self,
        database: &str,
        collection: &str,
        document: &Document,
    ) -> ClientResult<()> {
        let mut state = self.state.lock();
        if let Some(key) = document.key() {
            if state.reject_keys.contains(key) {
                return Err(ClientError::Rejected(format!(
                    "unique constraint violated for key '{key}'"
                )));
            }
        }
        state
            .collections
            .entry((database.to_string(), collection.to_string()))
            .or_default()
            .push(document.clone());
        Ok(())
    }

    fn close(&self) {
        self.close_count.fetch_add(1, Ordering::SeqCst);
    }
}

impl ConnectionFactory for Arc<InMemoryDriver> {
    fn connect(&self) -> ClientResult<ConnectionHandle> {
        Ok(ConnectionHandle::new(
            Arc::clone(self) as Arc<dyn DatabaseDriver>
        ))
    }
}

impl std::fmt::Debug for InMemoryDriver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("InMemoryDriver")
            .field("scripts", &state.scripts.len())
            .field("collections", &state.collections.len())
            .field("executed", &state.executed.len())
            .finish_non_exhaustive()
    }
}

#[derive(Debug)]
struct InMemoryCursor {
    remaining: VecDeque<Value>,
    fail_after: Option<(usize, String)>,
    served: usize,
}

#[async_trait]
impl DocumentCursor for InMemoryCursor {
    async fn next(&mut self) -> ClientResult<Option<Value>> {
        if let Some((after, message)) = &self.fail_after {
            if self.served >= *after {
                return Err(ClientError::MidStream(message.clone()));
            }
        }
        match self.remaining.pop_front() {
            Some(item) => {
                self.served += 1;
                Ok(Some(item))
            }
            None => Ok(None),
        }
    }
}
