//! Bidirectional document ↔ record conversion.
//!
//! `Document → Record` requires a schema (supplied or inferred); fields the
//! schema declares but the document lacks become null, never an error.
//! `Record → Document` is schema-free flattening, optionally extracting the
//! document key through a [`RecordPath`]. A selected key that is present but
//! null fails, because a document cannot have a null key.

use std::collections::HashMap;
use std::sync::Arc;

use arangoflow_client::Document;
use serde_json::{Map, Value};

use super::path::RecordPath;
use super::schema::{FieldType, RecordSchema};
use super::Record;
use crate::error::{ConnectorError, ConnectorResult};

/// Converts a document into a typed record under the given schema.
///
/// # Errors
///
/// Returns [`ConnectorError::Codec`] when a present value cannot be coerced
/// to its declared field type (shape mismatch). Absent fields never error.
pub fn to_record(document: &Document, schema: &Arc<RecordSchema>) -> ConnectorResult<Record> {
    let mut values = HashMap::new();
    for field in schema.fields() {
        let value = match document.get(&field.name) {
            None => Value::Null,
            Some(raw) => coerce(raw.clone(), &field.field_type, &field.name)?,
        };
        values.insert(field.name.clone(), value);
    }
    Ok(Record::new(Arc::clone(schema), values))
}

/// Flattens a record into a document.
///
/// When `key_path` selects a field, its value becomes the document key; the
/// key field itself is kept in or dropped from the document properties per
/// `include_key_field` (dropping applies to top-level selections). A key path
/// that selects nothing yields a keyless document and the database assigns
/// one.
///
/// # Errors
///
/// Returns [`ConnectorError::KeyExtraction`] if the selected key value is
/// null or not a scalar.
pub fn to_document(
    record: &Record,
    key_path: Option<&RecordPath>,
    include_key_field: bool,
) -> ConnectorResult<Document> {
    let mut key: Option<String> = None;
    let mut excluded_field: Option<&str> = None;

    if let Some(path) = key_path {
        match path.evaluate(record) {
            Some(Value::Null) => {
                return Err(ConnectorError::KeyExtraction(format!(
                    "no record value for key field '{}'",
                    path.raw()
                )));
            }
            Some(value) => {
                key = Some(key_string(value, path)?);
                if !include_key_field && path.is_root_field() {
                    excluded_field = Some(path.head());
                }
            }
            None => {}
        }
    }

    let mut fields = Map::new();
    for (name, value) in record.iter() {
        if excluded_field == Some(name) {
            continue;
        }
        fields.insert(name.to_string(), value.clone());
    }

    let mut document = Document::from_fields(fields);
    if let Some(key) = key {
        document.set_key(key);
    }
    Ok(document)
}

/// Coerces a value to a field type, recursing into nested records and
/// arrays.
fn coerce(value: Value, field_type: &FieldType, field: &str) -> ConnectorResult<Value> {
    if value.is_null() {
        return Ok(Value::Null);
    }
    match field_type {
        FieldType::Any => Ok(value),
        FieldType::Boolean => match value {
            Value::Bool(_) => Ok(value),
            other => Err(mismatch(field, "boolean", &other)),
        },
        FieldType::Long => match &value {
            Value::Number(n) if n.is_i64() || n.is_u64() => Ok(value),
            other => Err(mismatch(field, "long", other)),
        },
        FieldType::Double => match &value {
            Value::Number(_) => Ok(value),
            other => Err(mismatch(field, "double", other)),
        },
        FieldType::String => match value {
            Value::String(_) => Ok(value),
            Value::Number(n) => Ok(Value::String(n.to_string())),
            Value::Bool(b) => Ok(Value::String(b.to_string())),
            other => Err(mismatch(field, "string", &other)),
        },
        FieldType::Record(nested) => match value {
            Value::Object(map) => {
                let mut out = Map::new();
                for nested_field in nested.fields() {
                    let nested_value = match map.get(&nested_field.name) {
                        None => Value::Null,
                        Some(raw) => coerce(
                            raw.clone(),
                            &nested_field.field_type,
                            &format!("{field}.{}", nested_field.name),
                        )?,
                    };
                    out.insert(nested_field.name.clone(), nested_value);
                }
                Ok(Value::Object(out))
            }
            other => Err(mismatch(field, "record", &other)),
        },
        FieldType::Array(element) => match value {
            Value::Array(items) => {
                let coerced: ConnectorResult<Vec<Value>> = items
                    .into_iter()
                    .map(|item| coerce(item, element, field))
                    .collect();
                Ok(Value::Array(coerced?))
            }
            other => Err(mismatch(field, "array", &other)),
        },
    }
}

fn mismatch(field: &str, expected: &str, value: &Value) -> ConnectorError {
    ConnectorError::Codec(format!(
        "field '{field}' expected {expected}, got {}",
        type_name(value)
    ))
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Renders a scalar key value as the document key string.
fn key_string(value: &Value, path: &RecordPath) -> ConnectorResult<String> {
    match value {
        Value::String(s) => Ok(s.clone()),
        Value::Number(n) => Ok(n.to_string()),
        Value::Bool(b) => Ok(b.to_string()),
        other => Err(ConnectorError::KeyExtraction(format!(
            "key field '{}' must be a scalar, got {}",
            path.raw(),
            type_name(other)
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::schema::RecordField;
    use serde_json::json;

    fn doc(value: Value) -> Document {
        Document::from_value(value)
    }

    #[test]
    fn test_round_trip_on_schema_fields() {
        let original = doc(json!({
            "id": "a1",
            "count": 7,
            "ratio": 1.5,
            "active": false,
            "address": {"city": "x", "zip": 99}
        }));
        let schema = RecordSchema::infer(&original);
        let record = to_record(&original, &schema).unwrap();
        let back = to_document(&record, None, true).unwrap();

        for field in schema.fields() {
            assert_eq!(back.get(&field.name), original.get(&field.name));
        }
    }

    #[test]
    fn test_absent_field_becomes_null() {
        let schema = Arc::new(RecordSchema::new(vec![
            RecordField::new("present", FieldType::Long),
            RecordField::new("missing", FieldType::String),
        ]));
        let record = to_record(&doc(json!({"present": 1})), &schema).unwrap();
        assert_eq!(record.get("missing"), Some(&Value::Null));
    }

    #[test]
    fn test_shape_mismatch_is_codec_error() {
        let schema = Arc::new(RecordSchema::new(vec![RecordField::new(
            "x",
            FieldType::Long,
        )]));
        let err = to_record(&doc(json!({"x": {"nested": true}})), &schema).unwrap_err();
        assert!(matches!(err, ConnectorError::Codec(_)));
    }

    #[test]
    fn test_scalars_coerce_to_string() {
        let schema = Arc::new(RecordSchema::new(vec![RecordField::new(
            "x",
            FieldType::String,
        )]));
        let record = to_record(&doc(json!({"x": 42})), &schema).unwrap();
        assert_eq!(record.get("x"), Some(&json!("42")));
    }

    #[test]
    fn test_key_extracted_from_path() {
        let original = doc(json!({"id": "k-1", "v": 2}));
        let schema = RecordSchema::infer(&original);
        let record = to_record(&original, &schema).unwrap();
        let path = RecordPath::compile("/id").unwrap();

        let document = to_document(&record, Some(&path), true).unwrap();
        assert_eq!(document.key(), Some("k-1"));
        assert_eq!(document.get("id"), Some(&json!("k-1")));
    }

    #[test]
    fn test_key_field_excluded_when_configured() {
        let original = doc(json!({"id": "k-1", "v": 2}));
        let schema = RecordSchema::infer(&original);
        let record = to_record(&original, &schema).unwrap();
        let path = RecordPath::compile("/id").unwrap();

        let document = to_document(&record, Some(&path), false).unwrap();
        assert_eq!(document.key(), Some("k-1"));
        assert!(document.get("id").is_none());
        assert_eq!(document.get("v"), Some(&json!(2)));
    }

    #[test]
    fn test_null_key_fails() {
        let original = doc(json!({"id": null, "v": 2}));
        let schema = RecordSchema::infer(&original);
        let record = to_record(&original, &schema).unwrap();
        let path = RecordPath::compile("/id").unwrap();

        let err = to_document(&record, Some(&path), true).unwrap_err();
        assert!(matches!(err, ConnectorError::KeyExtraction(_)));
    }

    #[test]
    fn test_numeric_key_stringified() {
        let original = doc(json!({"id": 17}));
        let schema = RecordSchema::infer(&original);
        let record = to_record(&original, &schema).unwrap();
        let path = RecordPath::compile("/id").unwrap();

        let document = to_document(&record, Some(&path), true).unwrap();
        assert_eq!(document.key(), Some("17"));
    }

    #[test]
    fn test_absent_key_field_yields_keyless_document() {
        let original = doc(json!({"v": 2}));
        let schema = RecordSchema::infer(&original);
        let record = to_record(&original, &schema).unwrap();
        let path = RecordPath::compile("/id").unwrap();

        let document = to_document(&record, Some(&path), true).unwrap();
        assert!(document.key().is_none());
    }

    #[test]
    fn test_nested_key_path() {
        let original = doc(json!({"meta": {"key": "deep"}, "v": 1}));
        let schema = RecordSchema::infer(&original);
        let record = to_record(&original, &schema).unwrap();
        let path = RecordPath::compile("/meta/key").unwrap();

        let document = to_document(&record, Some(&path), true).unwrap();
        assert_eq!(document.key(), Some("deep"));
        // Nested selections never drop fields.
        assert!(document.get("meta").is_some());
    }

    #[test]
    fn test_array_elements_coerced() {
        let schema = Arc::new(RecordSchema::new(vec![RecordField::new(
            "tags",
            FieldType::Array(Box::new(FieldType::String)),
        )]));
        let record = to_record(&doc(json!({"tags": ["a", 1]})), &schema).unwrap();
        assert_eq!(record.get("tags"), Some(&json!(["a", "1"])));
    }
}
