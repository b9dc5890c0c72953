/// Row Shapes Module
///
/// Values read from a result set, the buffered row-handle that walks them,
/// and the three shapes a fetched row can be materialized into.

use crate::core::{DbError, Result};
use rusqlite::types::ValueRef;
use serde::de::DeserializeOwned;
use std::fmt;
use std::str::FromStr;

/// A single column value as returned by the driver.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
    Blob(Vec<u8>),
}

impl Value {
    /// Returns `true` for SQL NULL
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Integer(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Renders the value as a mapping key.
    ///
    /// NULL becomes the empty string, blobs are decoded lossily.
    pub fn as_key(&self) -> String {
        match self {
            Value::Null => String::new(),
            Value::Integer(i) => i.to_string(),
            Value::Real(f) => f.to_string(),
            Value::Text(s) => s.clone(),
            Value::Blob(b) => String::from_utf8_lossy(b).into_owned(),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "NULL"),
            Value::Integer(i) => write!(f, "{}", i),
            Value::Real(r) => write!(f, "{}", r),
            Value::Text(s) => write!(f, "{}", s),
            Value::Blob(b) => write!(f, "<BLOB: {} bytes>", b.len()),
        }
    }
}

impl From<ValueRef<'_>> for Value {
    fn from(value: ValueRef<'_>) -> Self {
        match value {
            ValueRef::Null => Value::Null,
            ValueRef::Integer(i) => Value::Integer(i),
            ValueRef::Real(f) => Value::Real(f),
            ValueRef::Text(t) => Value::Text(String::from_utf8_lossy(t).into_owned()),
            ValueRef::Blob(b) => Value::Blob(b.to_vec()),
        }
    }
}

impl From<&Value> for serde_json::Value {
    fn from(value: &Value) -> Self {
        match value {
            Value::Null => serde_json::Value::Null,
            Value::Integer(i) => serde_json::Value::from(*i),
            // Non-finite reals have no JSON form
            Value::Real(f) => serde_json::Number::from_f64(*f)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            Value::Text(s) => serde_json::Value::String(s.clone()),
            Value::Blob(b) => serde_json::Value::from(b.clone()),
        }
    }
}

/// How fetched rows are materialized.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ResultMode {
    /// Column name to value mapping
    #[default]
    Assoc,
    /// Values in column order
    Positional,
    /// Object with one field per column
    Record,
}

impl ResultMode {
    /// Builds a row of this shape from the handle's columns and one row of values.
    pub fn materialize(self, columns: &[String], values: Vec<Value>) -> FetchedRow {
        match self {
            ResultMode::Assoc => FetchedRow::Assoc(AssocRow::new(columns.to_vec(), values)),
            ResultMode::Positional => FetchedRow::Positional(values),
            ResultMode::Record => FetchedRow::Record(Record::new(columns, &values)),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ResultMode::Assoc => "assoc",
            ResultMode::Positional => "array",
            ResultMode::Record => "object",
        }
    }
}

impl FromStr for ResultMode {
    type Err = DbError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "assoc" => Ok(ResultMode::Assoc),
            "array" | "positional" => Ok(ResultMode::Positional),
            "object" | "record" => Ok(ResultMode::Record),
            other => Err(DbError::Config(format!(
                "unknown result mode '{}', expected one of: assoc, array, object",
                other
            ))),
        }
    }
}

impl fmt::Display for ResultMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Row keyed by column name.
///
/// Column order is preserved. When a result has duplicate column names, the
/// rightmost column wins on lookup.
#[derive(Debug, Clone, PartialEq)]
pub struct AssocRow {
    columns: Vec<String>,
    values: Vec<Value>,
}

impl AssocRow {
    pub fn new(columns: Vec<String>, values: Vec<Value>) -> Self {
        AssocRow { columns, values }
    }

    pub fn get(&self, column: &str) -> Option<&Value> {
        self.columns
            .iter()
            .rposition(|c| c == column)
            .and_then(|i| self.values.get(i))
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.columns.iter().map(String::as_str).zip(self.values.iter())
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn into_values(self) -> Vec<Value> {
        self.values
    }
}

/// Row as an object with one field per column.
///
/// Fields keep the result's column order.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    fields: serde_json::Map<String, serde_json::Value>,
}

impl Record {
    fn new(columns: &[String], values: &[Value]) -> Self {
        let fields = columns
            .iter()
            .zip(values)
            .map(|(name, value)| (name.clone(), serde_json::Value::from(value)))
            .collect();
        Record { fields }
    }

    pub fn field(&self, name: &str) -> Option<&serde_json::Value> {
        self.fields.get(name)
    }

    pub fn fields(&self) -> &serde_json::Map<String, serde_json::Value> {
        &self.fields
    }

    /// Decodes the record into a caller-defined type.
    pub fn deserialize<T: DeserializeOwned>(&self) -> Result<T> {
        Ok(serde_json::from_value(serde_json::Value::Object(
            self.fields.clone(),
        ))?)
    }

    pub fn into_json(self) -> serde_json::Value {
        serde_json::Value::Object(self.fields)
    }
}

/// A fetched row in one of the three shapes.
#[derive(Debug, Clone, PartialEq)]
pub enum FetchedRow {
    Assoc(AssocRow),
    Positional(Vec<Value>),
    Record(Record),
}

impl FetchedRow {
    pub fn as_assoc(&self) -> Option<&AssocRow> {
        match self {
            FetchedRow::Assoc(row) => Some(row),
            _ => None,
        }
    }

    pub fn as_positional(&self) -> Option<&[Value]> {
        match self {
            FetchedRow::Positional(values) => Some(values),
            _ => None,
        }
    }

    pub fn as_record(&self) -> Option<&Record> {
        match self {
            FetchedRow::Record(record) => Some(record),
            _ => None,
        }
    }

    /// Column lookup for the named shapes.
    ///
    /// Record fields come back converted to [`Value`]; positional rows have
    /// no names and always return `None`.
    pub fn get(&self, column: &str) -> Option<Value> {
        match self {
            FetchedRow::Assoc(row) => row.get(column).cloned(),
            FetchedRow::Positional(_) => None,
            FetchedRow::Record(record) => record.field(column).map(json_to_value),
        }
    }

    /// Number of columns in the row
    pub fn len(&self) -> usize {
        match self {
            FetchedRow::Assoc(row) => row.len(),
            FetchedRow::Positional(values) => values.len(),
            FetchedRow::Record(record) => record.fields.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn json_to_value(json: &serde_json::Value) -> Value {
    match json {
        serde_json::Value::Null => Value::Null,
        serde_json::Value::Number(n) => n
            .as_i64()
            .map(Value::Integer)
            .or_else(|| n.as_f64().map(Value::Real))
            .unwrap_or(Value::Null),
        serde_json::Value::String(s) => Value::Text(s.clone()),
        serde_json::Value::Array(items) => Value::Blob(
            items
                .iter()
                .filter_map(|b| b.as_u64().and_then(|b| u8::try_from(b).ok()))
                .collect(),
        ),
        serde_json::Value::Bool(b) => Value::Integer(i64::from(*b)),
        serde_json::Value::Object(_) => Value::Text(json.to_string()),
    }
}

/// Buffered cursor over a row-producing statement's result set.
#[derive(Debug, Clone, PartialEq)]
pub struct RowSet {
    columns: Vec<String>,
    rows: Vec<Vec<Value>>,
    position: usize,
}

impl RowSet {
    pub fn new(columns: Vec<String>, rows: Vec<Vec<Value>>) -> Self {
        RowSet {
            columns,
            rows,
            position: 0,
        }
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Total rows produced by the statement
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Rows not yet consumed
    pub fn remaining(&self) -> usize {
        self.rows.len() - self.position
    }

    /// Advances the cursor and materializes the row in the given shape.
    pub fn next_row(&mut self, mode: ResultMode) -> Option<FetchedRow> {
        let values = self.rows.get(self.position)?.clone();
        self.position += 1;
        Some(mode.materialize(&self.columns, values))
    }

    /// Moves the cursor back to the first row
    pub fn rewind(&mut self) {
        self.position = 0;
    }
}
