//! JSON to columnar conversion
//!
//! Two input shapes arrive from the API:
//!
//! - an array of flat objects (market listings), one row per element
//! - a single nested object (coin details, global stats), one row
//!
//! Ingestion metadata is merged into each row before anything else, so it
//! survives sanitization. Nested documents are sanitized: nulls and empty
//! objects cannot be written as Parquet structs. The schema is inferred from
//! the rows themselves.

use chrono::{DateTime, Local, SecondsFormat};
use coinlake_common::types::Dataset;
use polars::prelude::{DataFrame, JsonFormat, JsonReader, SerReader};
use serde_json::{Map, Value};
use std::io::Cursor;
use tracing::debug;

use crate::error::TableError;

/// Ingestion metadata merged into every row
#[derive(Debug, Clone)]
pub struct Metadata {
    ingested_at: DateTime<Local>,
    fields: Vec<(&'static str, String)>,
}

impl Metadata {
    pub fn new(dataset: Dataset, endpoint: &str, ingested_at: DateTime<Local>) -> Self {
        Self {
            ingested_at,
            fields: vec![
                (
                    "_ingestion_timestamp",
                    ingested_at.to_rfc3339_opts(SecondsFormat::Micros, false),
                ),
                ("_data_source", dataset.data_source().to_string()),
                ("_endpoint", endpoint.to_string()),
            ],
        }
    }

    pub fn for_markets(vs_currency: &str, ingested_at: DateTime<Local>) -> Self {
        Self::new(Dataset::Markets, "/coins/markets", ingested_at).with("_vs_currency", vs_currency)
    }

    pub fn for_coin_details(coin_id: &str, requested_name: &str, ingested_at: DateTime<Local>) -> Self {
        Self::new(Dataset::CoinDetails, &format!("/coins/{}", coin_id), ingested_at)
            .with("_coin_id", coin_id)
            .with("_requested_name", requested_name)
    }

    pub fn for_global(ingested_at: DateTime<Local>) -> Self {
        Self::new(Dataset::Global, "/global", ingested_at)
    }

    pub fn with(mut self, name: &'static str, value: impl Into<String>) -> Self {
        self.fields.push((name, value.into()));
        self
    }

    pub fn ingested_at(&self) -> DateTime<Local> {
        self.ingested_at
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(key, _)| *key == name)
            .map(|(_, value)| value.as_str())
    }

    pub fn names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.fields.iter().map(|(name, _)| *name)
    }

    fn merge_into(&self, record: &mut Map<String, Value>) {
        for (name, value) in &self.fields {
            record.insert((*name).to_string(), Value::String(value.clone()));
        }
    }
}

/// Build a columnar table from an API response body.
///
/// Arrays become one row per element and are not sanitized; a single
/// object becomes one sanitized row.
pub fn build(body: Value, metadata: &Metadata) -> Result<DataFrame, TableError> {
    match body {
        Value::Array(items) => build_records(items, metadata),
        Value::Object(document) => build_document(document, metadata),
        other => Err(TableError::Malformed(kind_of(&other).to_string())),
    }
}

pub fn build_records(items: Vec<Value>, metadata: &Metadata) -> Result<DataFrame, TableError> {
    if items.is_empty() {
        return Err(TableError::Empty);
    }

    let rows = items
        .into_iter()
        .enumerate()
        .map(|(index, item)| match item {
            Value::Object(mut record) => {
                metadata.merge_into(&mut record);
                Ok(Value::Object(record))
            },
            other => Err(TableError::NotAnObject {
                index,
                kind: kind_of(&other).to_string(),
            }),
        })
        .collect::<Result<Vec<_>, _>>()?;

    to_frame(&rows)
}

pub fn build_document(mut document: Map<String, Value>, metadata: &Metadata) -> Result<DataFrame, TableError> {
    if document.is_empty() {
        return Err(TableError::Empty);
    }

    metadata.merge_into(&mut document);
    let row = sanitize(Value::Object(document));

    to_frame(std::slice::from_ref(&row))
}

/// Drop nulls and empty objects at every depth.
///
/// Children are cleaned first, so an object that only held nulls is removed
/// from its parent too. Empty arrays and scalars are kept as they are.
pub fn sanitize(value: Value) -> Value {
    match value {
        Value::Object(map) => Value::Object(
            map.into_iter()
                .map(|(key, value)| (key, sanitize(value)))
                .filter(|(_, value)| !is_void(value))
                .collect(),
        ),
        Value::Array(items) => Value::Array(items.into_iter().map(sanitize).filter(|v| !is_void(v)).collect()),
        scalar => scalar,
    }
}

fn is_void(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Object(map) => map.is_empty(),
        _ => false,
    }
}

/// Schema is inferred over every row, so optional fields missing from the
/// first records still get a column.
fn to_frame(rows: &[Value]) -> Result<DataFrame, TableError> {
    let mut rows = rows.to_vec();
    rows.iter_mut().for_each(widen_unsigned);
    let encoded = serde_json::to_vec(&rows)?;

    let frame = JsonReader::new(Cursor::new(encoded))
        .with_json_format(JsonFormat::Json)
        .infer_schema_len(None)
        .finish()?;

    if frame.height() != rows.len() {
        return Err(TableError::RowCount {
            expected: rows.len(),
            got: frame.height(),
        });
    }

    debug!(rows = frame.height(), columns = frame.width(), "Inferred schema");
    Ok(frame)
}

/// Integers above `i64::MAX` become floats; the reader would null them.
fn widen_unsigned(value: &mut Value) {
    match value {
        Value::Number(number) if number.as_i64().is_none() => {
            if let Some(wide) = number.as_u64() {
                if let Some(float) = serde_json::Number::from_f64(wide as f64) {
                    *number = float;
                }
            }
        },
        Value::Array(items) => items.iter_mut().for_each(widen_unsigned),
        Value::Object(map) => map.values_mut().for_each(widen_unsigned),
        _ => {},
    }
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
