//! Record path expressions and the shared compiled-path cache.
//!
//! A record path is a `/`-separated field selector (`/id`, `/meta/key`)
//! evaluated against a [`Record`]. Compiled paths are cached in a
//! fixed-capacity, least-recently-used cache shared across pipeline
//! invocations; concurrent lookups and inserts are safe and no ordering is
//! guaranteed across entries.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::Value;

use super::Record;
use crate::error::{ConnectorError, ConnectorResult};

/// A compiled record path expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordPath {
    raw: String,
    segments: Vec<String>,
}

impl RecordPath {
    /// Compiles a path expression.
    ///
    /// # Errors
    ///
    /// Returns [`ConnectorError::Configuration`] unless the expression starts
    /// with `/` and every segment is non-empty.
    pub fn compile(expression: &str) -> ConnectorResult<Self> {
        let Some(rest) = expression.strip_prefix('/') else {
            return Err(ConnectorError::Configuration(format!(
                "record path '{expression}' must start with '/'"
            )));
        };
        if rest.is_empty() {
            return Err(ConnectorError::Configuration(
                "record path must select a field".into(),
            ));
        }
        let segments: Vec<String> = rest.split('/').map(ToString::to_string).collect();
        if segments.iter().any(String::is_empty) {
            return Err(ConnectorError::Configuration(format!(
                "record path '{expression}' contains an empty segment"
            )));
        }
        Ok(Self {
            raw: expression.to_string(),
            segments,
        })
    }

    /// The original expression text.
    #[must_use]
    pub fn raw(&self) -> &str {
        &self.raw
    }

    /// The first path segment.
    #[must_use]
    pub fn head(&self) -> &str {
        &self.segments[0]
    }

    /// Returns `true` if the path selects a top-level field.
    #[must_use]
    pub fn is_root_field(&self) -> bool {
        self.segments.len() == 1
    }

    /// Evaluates the path against a record.
    ///
    /// Returns `None` when the path selects nothing and `Some(Value::Null)`
    /// when it selects a field whose value is null. Callers that need a
    /// document key must treat these differently.
    #[must_use]
    pub fn evaluate<'a>(&self, record: &'a Record) -> Option<&'a Value> {
        let mut current = record.get(self.head())?;
        for segment in &self.segments[1..] {
            match current {
                Value::Object(map) => current = map.get(segment)?,
                _ => return None,
            }
        }
        Some(current)
    }
}

/// Fixed-capacity LRU cache of compiled record paths, keyed by expression
/// text.
pub struct RecordPathCache {
    capacity: usize,
    inner: Mutex<CacheState>,
}

#[derive(Default)]
struct CacheState {
    compiled: HashMap<String, Arc<RecordPath>>,
    /// Access order, least recently used first.
    order: Vec<String>,
}

impl RecordPathCache {
    /// Creates a cache bounded to `capacity` entries.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            inner: Mutex::new(CacheState::default()),
        }
    }

    /// Returns the compiled path for an expression, compiling and caching it
    /// on first use.
    ///
    /// # Errors
    ///
    /// Propagates [`RecordPath::compile`] errors; failed compilations are not
    /// cached.
    pub fn get_compiled(&self, expression: &str) -> ConnectorResult<Arc<RecordPath>> {
        let mut state = self.inner.lock();

        if let Some(path) = state.compiled.get(expression).cloned() {
            touch(&mut state.order, expression);
            return Ok(path);
        }

        let path = Arc::new(RecordPath::compile(expression)?);
        if state.compiled.len() >= self.capacity {
            let evicted = state.order.remove(0);
            state.compiled.remove(&evicted);
        }
        state.compiled.insert(expression.to_string(), Arc::clone(&path));
        state.order.push(expression.to_string());
        Ok(path)
    }

    /// Current number of cached entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.lock().compiled.len()
    }

    /// Returns `true` if nothing is cached.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl std::fmt::Debug for RecordPathCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecordPathCache")
            .field("entries", &self.len())
            .field("capacity", &self.capacity)
            .finish()
    }
}

/// Moves `key` to the most-recently-used position.
fn touch(order: &mut Vec<String>, key: &str) {
    if let Some(position) = order.iter().position(|entry| entry == key) {
        let entry = order.remove(position);
        order.push(entry);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::schema::RecordSchema;
    use arangoflow_client::Document;
    use serde_json::json;
    use std::sync::Arc as StdArc;

    fn record(value: serde_json::Value) -> Record {
        let document = Document::from_value(value);
        let schema = RecordSchema::infer(&document);
        crate::record::codec::to_record(&document, &schema).unwrap()
    }

    #[test]
    fn test_compile_rejects_malformed_paths() {
        assert!(RecordPath::compile("id").is_err());
        assert!(RecordPath::compile("/").is_err());
        assert!(RecordPath::compile("/a//b").is_err());
        assert!(RecordPath::compile("").is_err());
    }

    #[test]
    fn test_evaluate_root_field() {
        let path = RecordPath::compile("/id").unwrap();
        let rec = record(json!({"id": "a"}));
        assert_eq!(path.evaluate(&rec), Some(&json!("a")));
        assert!(path.is_root_field());
    }

    #[test]
    fn test_evaluate_nested_field() {
        let path = RecordPath::compile("/meta/key").unwrap();
        let rec = record(json!({"meta": {"key": "x"}}));
        assert_eq!(path.evaluate(&rec), Some(&json!("x")));
        assert!(!path.is_root_field());
    }

    #[test]
    fn test_evaluate_absent_vs_null() {
        let rec = record(json!({"id": null}));
        assert_eq!(
            RecordPath::compile("/id").unwrap().evaluate(&rec),
            Some(&Value::Null)
        );
        assert_eq!(RecordPath::compile("/other").unwrap().evaluate(&rec), None);
    }

    #[test]
    fn test_evaluate_through_scalar_selects_nothing() {
        let rec = record(json!({"id": "a"}));
        assert_eq!(RecordPath::compile("/id/sub").unwrap().evaluate(&rec), None);
    }

    #[test]
    fn cache_hit_returns_same_compilation() {
        let cache = RecordPathCache::new(4);
        let first = cache.get_compiled("/id").unwrap();
        let second = cache.get_compiled("/id").unwrap();
        assert!(StdArc::ptr_eq(&first, &second));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn cache_evicts_least_recently_used() {
        let cache = RecordPathCache::new(2);
        cache.get_compiled("/a").unwrap();
        cache.get_compiled("/b").unwrap();
        // Touch /a so /b becomes the eviction candidate.
        cache.get_compiled("/a").unwrap();
        cache.get_compiled("/c").unwrap();

        assert_eq!(cache.len(), 2);
        let a_again = cache.get_compiled("/a").unwrap();
        assert_eq!(a_again.raw(), "/a");
        // /b was evicted; recompiling it grows a fresh entry and evicts /c.
        cache.get_compiled("/b").unwrap();
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn cache_does_not_store_failures() {
        let cache = RecordPathCache::new(2);
        assert!(cache.get_compiled("bad").is_err());
        assert!(cache.is_empty());
    }
}
