//! The record reader/writer boundary.
//!
//! Ingest reads a flow unit's byte content as a sequence of typed records
//! through a [`RecordReader`]; record-oriented query output serializes a
//! record sequence through a [`RecordWriter`] (`begin` / `write` / `finish`).
//! Both are host collaborators behind factory traits; JSON implementations
//! ship here and double as the defaults.

use std::collections::VecDeque;
use std::sync::Arc;

use bytes::Bytes;
use serde_json::Value;

use super::codec::to_record;
use super::schema::RecordSchema;
use super::Record;
use crate::error::{ConnectorError, ConnectorResult};
use arangoflow_client::Document;

/// Pull-based reader over a flow unit's record content.
pub trait RecordReader: Send {
    /// Returns the next record, or `None` at end of input.
    ///
    /// # Errors
    ///
    /// Returns [`ConnectorError::RecordRead`] on malformed input.
    fn next_record(&mut self) -> ConnectorResult<Option<Record>>;
}

/// Creates readers over flow-unit content.
pub trait RecordReaderFactory: Send + Sync {
    /// Creates a reader for one flow unit's byte content.
    ///
    /// # Errors
    ///
    /// Returns [`ConnectorError::RecordRead`] if the content cannot be opened
    /// as record input.
    fn create_reader(&self, content: Bytes) -> ConnectorResult<Box<dyn RecordReader>>;
}

/// Push-based writer for a record sequence.
pub trait RecordWriter: Send {
    /// Starts the record set.
    ///
    /// # Errors
    ///
    /// Returns [`ConnectorError::RecordWrite`] on serialization failure.
    fn begin(&mut self) -> ConnectorResult<()>;

    /// Writes one record.
    ///
    /// # Errors
    ///
    /// Returns [`ConnectorError::RecordWrite`] on serialization failure or if
    /// called before [`begin`](Self::begin).
    fn write(&mut self, record: &Record) -> ConnectorResult<()>;

    /// Finishes the record set and returns the serialized bytes.
    ///
    /// # Errors
    ///
    /// Returns [`ConnectorError::RecordWrite`] if called before
    /// [`begin`](Self::begin).
    fn finish(&mut self) -> ConnectorResult<Vec<u8>>;
}

/// Creates writers bound to an output schema.
pub trait RecordWriterFactory: Send + Sync {
    /// Creates a writer for a record set with the given schema.
    ///
    /// # Errors
    ///
    /// Returns [`ConnectorError::RecordWrite`] if the schema cannot be
    /// written in this format.
    fn create_writer(&self, schema: Arc<RecordSchema>) -> ConnectorResult<Box<dyn RecordWriter>>;
}

// ── JSON lines reader ───────────────────────────────────────────────

/// Reader factory for JSON-lines content (one JSON object per line).
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonRecordReaderFactory;

impl RecordReaderFactory for JsonRecordReaderFactory {
    fn create_reader(&self, content: Bytes) -> ConnectorResult<Box<dyn RecordReader>> {
        let text = String::from_utf8(content.to_vec())
            .map_err(|e| ConnectorError::RecordRead(format!("content is not UTF-8: {e}")))?;
        let lines: VecDeque<String> = text
            .lines()
            .filter(|line| !line.trim().is_empty())
            .map(ToString::to_string)
            .collect();
        Ok(Box::new(JsonRecordReader {
            lines,
            schema: None,
        }))
    }
}

/// JSON-lines [`RecordReader`].
///
/// The schema is inferred once from the first object and reused for every
/// following record, so a batch reads out with uniform structure.
struct JsonRecordReader {
    lines: VecDeque<String>,
    schema: Option<Arc<RecordSchema>>,
}

impl RecordReader for JsonRecordReader {
    fn next_record(&mut self) -> ConnectorResult<Option<Record>> {
        let Some(line) = self.lines.pop_front() else {
            return Ok(None);
        };
        let value: Value = serde_json::from_str(&line)
            .map_err(|e| ConnectorError::RecordRead(format!("malformed JSON record: {e}")))?;
        let Value::Object(map) = value else {
            return Err(ConnectorError::RecordRead(
                "record input must be a JSON object per line".into(),
            ));
        };

        let document = Document::from_fields(map);
        let schema = match &self.schema {
            Some(schema) => Arc::clone(schema),
            None => {
                let schema = RecordSchema::infer(&document);
                self.schema = Some(Arc::clone(&schema));
                schema
            }
        };
        to_record(&document, &schema).map(Some)
    }
}

// ── JSON record-set writer ──────────────────────────────────────────

/// Writer factory producing a JSON array of objects.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonRecordSetWriterFactory;

impl RecordWriterFactory for JsonRecordSetWriterFactory {
    fn create_writer(&self, schema: Arc<RecordSchema>) -> ConnectorResult<Box<dyn RecordWriter>> {
        Ok(Box::new(JsonRecordSetWriter {
            schema,
            buffer: Vec::new(),
            began: false,
            written: 0,
        }))
    }
}

/// Serializes a record set as one JSON array.
struct JsonRecordSetWriter {
    #[allow(dead_code)]
    schema: Arc<RecordSchema>,
    buffer: Vec<u8>,
    began: bool,
    written: usize,
}

impl RecordWriter for JsonRecordSetWriter {
    fn begin(&mut self) -> ConnectorResult<()> {
        self.buffer.push(b'[');
        self.began = true;
        Ok(())
    }

    fn write(&mut self, record: &Record) -> ConnectorResult<()> {
        if !self.began {
            return Err(ConnectorError::RecordWrite(
                "write called before begin".into(),
            ));
        }
        if self.written > 0 {
            self.buffer.push(b',');
        }
        let bytes = serde_json::to_vec(&Value::Object(record.to_json_object()))
            .map_err(|e| ConnectorError::RecordWrite(e.to_string()))?;
        self.buffer.extend_from_slice(&bytes);
        self.written += 1;
        Ok(())
    }

    fn finish(&mut self) -> ConnectorResult<Vec<u8>> {
        if !self.began {
            return Err(ConnectorError::RecordWrite(
                "finish called before begin".into(),
            ));
        }
        self.buffer.push(b']');
        Ok(std::mem::take(&mut self.buffer))
    }
}
