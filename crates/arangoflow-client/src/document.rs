//! The untyped document representation.
//!
//! A [`Document`] is a string-keyed map of dynamically typed values plus an
//! optional key that identifies it within a collection. Documents sit on the
//! database side of the codec boundary; the typed [`Record`] representation
//! lives in the connectors crate.

use serde_json::{Map, Value};

/// Reserved members the database attaches to every stored document.
const META_KEY: &str = "_key";
const META_ID: &str = "_id";
const META_REV: &str = "_rev";

/// An untyped database document: field map plus optional key.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Document {
    key: Option<String>,
    fields: Map<String, Value>,
}

impl Document {
    /// Creates an empty document without a key.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a document from an existing field map.
    #[must_use]
    pub fn from_fields(fields: Map<String, Value>) -> Self {
        Self { key: None, fields }
    }

    /// Builds a document from a raw query result item.
    ///
    /// Result items are not guaranteed to be documents: an aggregation query
    /// may return a bare number or string. The mapping is:
    ///
    /// - object → field map; a string `_key` member becomes the document key
    ///   and the `_id`/`_rev` bookkeeping members are dropped
    /// - number → `{"result": <number>}`
    /// - null → `{"result": null}`
    /// - anything else → `{"result": <string form>}`
    #[must_use]
    pub fn from_value(value: Value) -> Self {
        match value {
            Value::Object(mut fields) => {
                let key = match fields.remove(META_KEY) {
                    Some(Value::String(k)) => Some(k),
                    Some(other) => {
                        // Non-string keys never come from the server; keep the
                        // member rather than lose data.
                        fields.insert(META_KEY.to_string(), other);
                        None
                    }
                    None => None,
                };
                fields.remove(META_ID);
                fields.remove(META_REV);
                Self { key, fields }
            }
            Value::Number(n) => {
                let mut fields = Map::new();
                fields.insert("result".to_string(), Value::Number(n));
                Self { key: None, fields }
            }
            Value::Null => {
                let mut fields = Map::new();
                fields.insert("result".to_string(), Value::Null);
                Self { key: None, fields }
            }
            Value::String(s) => {
                let mut fields = Map::new();
                fields.insert("result".to_string(), Value::String(s));
                Self { key: None, fields }
            }
            other => {
                let mut fields = Map::new();
                fields.insert("result".to_string(), Value::String(other.to_string()));
                Self { key: None, fields }
            }
        }
    }

    /// Returns the document key, if any.
    #[must_use]
    pub fn key(&self) -> Option<&str> {
        self.key.as_deref()
    }

    /// Sets the document key.
    pub fn set_key(&mut self, key: impl Into<String>) {
        self.key = Some(key.into());
    }

    /// Returns the field map.
    #[must_use]
    pub fn fields(&self) -> &Map<String, Value> {
        &self.fields
    }

    /// Returns a field value by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }

    /// Inserts a field value.
    pub fn insert(&mut self, name: impl Into<String>, value: Value) {
        self.fields.insert(name.into(), value);
    }

    /// Serializes the document to a JSON value, re-attaching the key as
    /// `_key` when present. This is the wire shape used for inserts and for
    /// flow unit content.
    #[must_use]
    pub fn to_value(&self) -> Value {
        let mut fields = self.fields.clone();
        if let Some(key) = &self.key {
            fields.insert(META_KEY.to_string(), Value::String(key.clone()));
        }
        Value::Object(fields)
    }
}
