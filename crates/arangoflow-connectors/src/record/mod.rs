//! Typed record model and the document ↔ record codec.
//!
//! A [`Record`] is a typed instance of a [`RecordSchema`]: a mapping from
//! field name to dynamically typed value, bound to an ordered field list.
//! Conversion with the untyped [`Document`](arangoflow_client::Document)
//! representation is handled by [`codec`]; schemas are supplied externally or
//! inferred once per run from a sample document.

pub mod codec;
pub mod io;
pub mod path;
pub mod schema;

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::{Map, Value};

pub use codec::{to_document, to_record};
pub use io::{
    JsonRecordReaderFactory, JsonRecordSetWriterFactory, RecordReader, RecordReaderFactory,
    RecordWriter, RecordWriterFactory,
};
pub use path::{RecordPath, RecordPathCache};
pub use schema::{FieldType, RecordField, RecordSchema};

/// A value with no backing entry in a record. Fields declared by the schema
/// but absent from the value map read as null.
static NULL: Value = Value::Null;

/// A typed record: a schema plus a field-name → value mapping.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    schema: Arc<RecordSchema>,
    values: HashMap<String, Value>,
}

impl Record {
    /// Creates a record over a schema and value map.
    #[must_use]
    pub fn new(schema: Arc<RecordSchema>, values: HashMap<String, Value>) -> Self {
        Self { schema, values }
    }

    /// The record's schema.
    #[must_use]
    pub fn schema(&self) -> &Arc<RecordSchema> {
        &self.schema
    }

    /// Returns a field value. Fields declared by the schema but never set
    /// read as null; fields outside the schema read as `None`.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Value> {
        match self.values.get(name) {
            Some(value) => Some(value),
            None if self.schema.field(name).is_some() => Some(&NULL),
            None => None,
        }
    }

    /// Sets a field value.
    pub fn set(&mut self, name: impl Into<String>, value: Value) {
        self.values.insert(name.into(), value);
    }

    /// Iterates `(field name, value)` pairs in schema order, yielding null
    /// for absent fields.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.schema
            .fields()
            .iter()
            .map(|field| (field.name.as_str(), self.values.get(&field.name).unwrap_or(&NULL)))
    }

    /// Flattens the record into a JSON object in schema order, including
    /// null-valued fields.
    #[must_use]
    pub fn to_json_object(&self) -> Map<String, Value> {
        let mut object = Map::new();
        for (name, value) in self.iter() {
            object.insert(name.to_string(), value.clone());
        }
        object
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn schema() -> Arc<RecordSchema> {
        Arc::new(RecordSchema::new(vec![
            RecordField::new("id", FieldType::String),
            RecordField::new("count", FieldType::Long),
        ]))
    }

    #[test]
    fn test_declared_but_unset_field_reads_null() {
        let record = Record::new(schema(), HashMap::new());
        assert_eq!(record.get("id"), Some(&Value::Null));
        assert_eq!(record.get("missing"), None);
    }

    #[test]
    fn test_iter_follows_schema_order() {
        let mut values = HashMap::new();
        values.insert("count".to_string(), json!(3));
        values.insert("id".to_string(), json!("a"));
        let record = Record::new(schema(), values);

        let names: Vec<&str> = record.iter().map(|(name, _)| name).collect();
        assert_eq!(names, vec!["id", "count"]);
    }

    #[test]
    fn test_to_json_object_includes_nulls() {
        let mut values = HashMap::new();
        values.insert("id".to_string(), json!("a"));
        let record = Record::new(schema(), values);

        let object = record.to_json_object();
        assert_eq!(object.get("id"), Some(&json!("a")));
        assert_eq!(object.get("count"), Some(&Value::Null));
    }
}
