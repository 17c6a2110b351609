//! Record schemas and one-shot schema inference.
//!
//! A [`RecordSchema`] is an ordered sequence of named, typed fields. Schemas
//! come from one of two places: supplied externally by the host, or inferred
//! from a single representative document via [`RecordSchema::infer`]. The
//! inference is one-shot by design: a run that infers its schema uses the
//! same schema for every record it produces, so the output structure is
//! uniform.

use std::sync::Arc;

use arangoflow_client::Document;
use serde_json::{Map, Value};

/// The type of a record field.
///
/// All fields are nullable: a document database provides no presence
/// guarantee, and the codec maps absent fields to null rather than erroring.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldType {
    /// Boolean.
    Boolean,
    /// 64-bit integer.
    Long,
    /// 64-bit float.
    Double,
    /// UTF-8 string.
    String,
    /// Nested record with its own schema.
    Record(Arc<RecordSchema>),
    /// Homogeneous sequence of the element type.
    Array(Box<FieldType>),
    /// Unconstrained; used when a sample gives no type evidence (null).
    Any,
}

/// A named, typed field.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordField {
    /// Field name.
    pub name: String,
    /// Field type.
    pub field_type: FieldType,
}

impl RecordField {
    /// Creates a field.
    #[must_use]
    pub fn new(name: impl Into<String>, field_type: FieldType) -> Self {
        Self {
            name: name.into(),
            field_type,
        }
    }
}

/// An ordered sequence of record fields.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RecordSchema {
    fields: Vec<RecordField>,
}

impl RecordSchema {
    /// Creates a schema from a field list.
    #[must_use]
    pub fn new(fields: Vec<RecordField>) -> Self {
        Self { fields }
    }

    /// Creates a schema with no fields.
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    /// The ordered field list.
    #[must_use]
    pub fn fields(&self) -> &[RecordField] {
        &self.fields
    }

    /// Looks a field up by name.
    #[must_use]
    pub fn field(&self, name: &str) -> Option<&RecordField> {
        self.fields.iter().find(|field| field.name == name)
    }

    /// Returns `true` if the schema declares no fields.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Infers a schema from one representative document's shape.
    ///
    /// Integers infer as [`FieldType::Long`], other numbers as
    /// [`FieldType::Double`], nested objects recurse into nested record
    /// schemas, arrays take their first element's type, and null values give
    /// [`FieldType::Any`].
    #[must_use]
    pub fn infer(document: &Document) -> Arc<Self> {
        Arc::new(Self::infer_from_map(document.fields()))
    }

    fn infer_from_map(map: &Map<String, Value>) -> Self {
        let fields = map
            .iter()
            .map(|(name, value)| RecordField::new(name.clone(), infer_field_type(value)))
            .collect();
        Self { fields }
    }
}

/// Infers the [`FieldType`] of one JSON value.
#[must_use]
pub fn infer_field_type(value: &Value) -> FieldType {
    match value {
        Value::Bool(_) => FieldType::Boolean,
        Value::Number(n) if n.is_i64() || n.is_u64() => FieldType::Long,
        Value::Number(_) => FieldType::Double,
        Value::String(_) => FieldType::String,
        Value::Object(map) => FieldType::Record(Arc::new(RecordSchema::infer_from_map(map))),
        Value::Array(items) => {
            let element = items.first().map_or(FieldType::Any, infer_field_type);
            FieldType::Array(Box::new(element))
        }
        Value::Null => FieldType::Any,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc(value: Value) -> Document {
        Document::from_value(value)
    }

    #[test]
    fn test_infer_scalar_types() {
        let schema = RecordSchema::infer(&doc(json!({
            "name": "a",
            "count": 3,
            "ratio": 0.5,
            "active": true,
            "note": null
        })));

        assert_eq!(schema.field("name").unwrap().field_type, FieldType::String);
        assert_eq!(schema.field("count").unwrap().field_type, FieldType::Long);
        assert_eq!(schema.field("ratio").unwrap().field_type, FieldType::Double);
        assert_eq!(
            schema.field("active").unwrap().field_type,
            FieldType::Boolean
        );
        assert_eq!(schema.field("note").unwrap().field_type, FieldType::Any);
    }

    #[test]
    fn test_infer_nested_record() {
        let schema = RecordSchema::infer(&doc(json!({
            "address": {"city": "x", "zip": 12345}
        })));

        match &schema.field("address").unwrap().field_type {
            FieldType::Record(nested) => {
                assert_eq!(nested.field("city").unwrap().field_type, FieldType::String);
                assert_eq!(nested.field("zip").unwrap().field_type, FieldType::Long);
            }
            other => panic!("expected nested record, got {other:?}"),
        }
    }

    #[test]
    fn test_infer_array_takes_first_element_type() {
        let schema = RecordSchema::infer(&doc(json!({"tags": ["a", "b"], "empty": []})));

        assert_eq!(
            schema.field("tags").unwrap().field_type,
            FieldType::Array(Box::new(FieldType::String))
        );
        assert_eq!(
            schema.field("empty").unwrap().field_type,
            FieldType::Array(Box::new(FieldType::Any))
        );
    }

    #[test]
    fn test_infer_preserves_document_field_order() {
        let schema = RecordSchema::infer(&doc(json!({"b": 1, "a": 2})));
        let names: Vec<&str> = schema.fields().iter().map(|f| f.name.as_str()).collect();
        // serde_json maps are sorted by key; the schema mirrors the document's
        // own iteration order.
        assert_eq!(names, vec!["a", "b"]);
    }

    #[test]
    fn test_empty_schema() {
        let schema = RecordSchema::empty();
        assert!(schema.is_empty());
        assert!(schema.field("x").is_none());
    }
}
