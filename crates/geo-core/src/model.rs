//! Typed rendition of the rows returned by the embedded engine.
//!
//! Every value carries the variant matching its declared column type so the
//! transformation and table code can match on it instead of coercing through
//! strings.

use std::fmt;

use base64::Engine as _;
use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Serialize, Serializer};
use serde_json::Value as JsonValue;
use thiserror::Error;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
/// Declared type of a result column, collapsed to the families this crate cares about.
pub enum ColumnType {
    Null,
    Boolean,
    Integer,
    Float,
    Decimal,
    Text,
    Blob,
    Date,
    Time,
    Timestamp,
    Interval,
    /// Lists, structs, maps and other composite engine types.
    Nested,
    Other,
}

impl ColumnType {
    pub fn label(self) -> &'static str {
        match self {
            ColumnType::Null => "null",
            ColumnType::Boolean => "boolean",
            ColumnType::Integer => "integer",
            ColumnType::Float => "float",
            ColumnType::Decimal => "decimal",
            ColumnType::Text => "text",
            ColumnType::Blob => "blob",
            ColumnType::Date => "date",
            ColumnType::Time => "time",
            ColumnType::Timestamp => "timestamp",
            ColumnType::Interval => "interval",
            ColumnType::Nested => "nested",
            ColumnType::Other => "other",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
/// Name and declared type of one column of a result set.
pub struct ColumnDescriptor {
    pub name: String,
    #[serde(rename = "type")]
    pub column_type: ColumnType,
}

impl ColumnDescriptor {
    pub fn new(name: impl Into<String>, column_type: ColumnType) -> Self {
        Self {
            name: name.into(),
            column_type,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
/// A single cell value.
pub enum ScalarValue {
    Null,
    Boolean(bool),
    Integer(i64),
    /// 128-bit and unsigned 64-bit integers that do not fit an `i64`.
    HugeInteger(i128),
    Float(f64),
    /// Fixed-point decimals kept in their canonical text form.
    Decimal(String),
    Text(String),
    Blob(Vec<u8>),
    Date(NaiveDate),
    Time(NaiveTime),
    Timestamp(NaiveDateTime),
    Interval {
        months: i32,
        days: i32,
        micros: i64,
    },
    /// One cell of a list, struct, map or union column.
    Nested(JsonValue),
    /// Engine values without a native variant, in the adapter's text form.
    Other(String),
}

impl ScalarValue {
    pub fn is_null(&self) -> bool {
        matches!(self, ScalarValue::Null)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            ScalarValue::Text(text) => Some(text),
            _ => None,
        }
    }

    /// Type family this value belongs to.
    pub fn column_type(&self) -> ColumnType {
        match self {
            ScalarValue::Null => ColumnType::Null,
            ScalarValue::Boolean(_) => ColumnType::Boolean,
            ScalarValue::Integer(_) | ScalarValue::HugeInteger(_) => ColumnType::Integer,
            ScalarValue::Float(_) => ColumnType::Float,
            ScalarValue::Decimal(_) => ColumnType::Decimal,
            ScalarValue::Text(_) => ColumnType::Text,
            ScalarValue::Blob(_) => ColumnType::Blob,
            ScalarValue::Date(_) => ColumnType::Date,
            ScalarValue::Time(_) => ColumnType::Time,
            ScalarValue::Timestamp(_) => ColumnType::Timestamp,
            ScalarValue::Interval { .. } => ColumnType::Interval,
            ScalarValue::Nested(_) => ColumnType::Nested,
            ScalarValue::Other(_) => ColumnType::Other,
        }
    }

    /// JSON form used for feature properties and API payloads.
    pub fn to_json(&self) -> JsonValue {
        match self {
            ScalarValue::Null => JsonValue::Null,
            ScalarValue::Boolean(b) => JsonValue::Bool(*b),
            ScalarValue::Integer(i) => JsonValue::Number((*i).into()),
            ScalarValue::HugeInteger(i) => match i64::try_from(*i) {
                Ok(n) => JsonValue::Number(n.into()),
                Err(_) => JsonValue::String(i.to_string()),
            },
            // NaN and infinities have no JSON representation.
            ScalarValue::Float(f) => serde_json::Number::from_f64(*f)
                .map(JsonValue::Number)
                .unwrap_or(JsonValue::Null),
            ScalarValue::Blob(bytes) => {
                JsonValue::String(base64::engine::general_purpose::STANDARD.encode(bytes))
            }
            ScalarValue::Nested(value) => value.clone(),
            other => JsonValue::String(other.to_string()),
        }
    }
}

impl fmt::Display for ScalarValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScalarValue::Null => f.write_str("null"),
            ScalarValue::Boolean(b) => write!(f, "{b}"),
            ScalarValue::Integer(i) => write!(f, "{i}"),
            ScalarValue::HugeInteger(i) => write!(f, "{i}"),
            ScalarValue::Float(v) => write!(f, "{v}"),
            ScalarValue::Decimal(text) | ScalarValue::Text(text) | ScalarValue::Other(text) => {
                f.write_str(text)
            }
            ScalarValue::Blob(bytes) => {
                f.write_str(&base64::engine::general_purpose::STANDARD.encode(bytes))
            }
            ScalarValue::Date(date) => write!(f, "{}", date.format("%Y-%m-%d")),
            ScalarValue::Time(time) => write!(f, "{}", time.format("%H:%M:%S%.f")),
            ScalarValue::Timestamp(ts) => write!(f, "{}", ts.format("%Y-%m-%d %H:%M:%S%.f")),
            ScalarValue::Interval {
                months,
                days,
                micros,
            } => write_interval(f, *months, *days, *micros),
            ScalarValue::Nested(value) => write!(f, "{value}"),
        }
    }
}

/// ISO 8601 duration, e.g. `P1Y2M3DT4.5S`; only non-zero parts are written.
fn write_interval(f: &mut fmt::Formatter<'_>, months: i32, days: i32, micros: i64) -> fmt::Result {
    if months == 0 && days == 0 && micros == 0 {
        return f.write_str("PT0S");
    }
    f.write_str("P")?;
    let (years, months) = (months / 12, months % 12);
    if years != 0 {
        write!(f, "{years}Y")?;
    }
    if months != 0 {
        write!(f, "{months}M")?;
    }
    if days != 0 {
        write!(f, "{days}D")?;
    }
    if micros != 0 {
        let sign = if micros < 0 { "-" } else { "" };
        let micros = micros.unsigned_abs();
        let (hours, rest) = (micros / 3_600_000_000, micros % 3_600_000_000);
        let (minutes, rest) = (rest / 60_000_000, rest % 60_000_000);
        let (seconds, fraction) = (rest / 1_000_000, rest % 1_000_000);
        f.write_str("T")?;
        if hours != 0 {
            write!(f, "{sign}{hours}H")?;
        }
        if minutes != 0 {
            write!(f, "{sign}{minutes}M")?;
        }
        if seconds != 0 || fraction != 0 {
            write!(f, "{sign}{seconds}")?;
            if fraction != 0 {
                let digits = format!("{fraction:06}");
                write!(f, ".{}", digits.trim_end_matches('0'))?;
            }
            f.write_str("S")?;
        }
    }
    Ok(())
}

impl Serialize for ScalarValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_json().serialize(serializer)
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SchemaError {
    #[error("row {row} has {found} values but the result declares {expected} columns")]
    RowWidth {
        row: usize,
        expected: usize,
        found: usize,
    },
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
/// Ordered columns and rows exactly as the engine produced them.
pub struct ColumnarResult {
    columns: Vec<ColumnDescriptor>,
    rows: Vec<Vec<ScalarValue>>,
}

impl ColumnarResult {
    /// Build a result, rejecting rows whose width disagrees with the schema.
    pub fn new(
        columns: Vec<ColumnDescriptor>,
        rows: Vec<Vec<ScalarValue>>,
    ) -> Result<Self, SchemaError> {
        if let Some((row, values)) = rows
            .iter()
            .enumerate()
            .find(|(_, values)| values.len() != columns.len())
        {
            return Err(SchemaError::RowWidth {
                row,
                expected: columns.len(),
                found: values.len(),
            });
        }
        Ok(Self { columns, rows })
    }

    pub fn columns(&self) -> &[ColumnDescriptor] {
        &self.columns
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|column| column.name == name)
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn rows(&self) -> impl ExactSizeIterator<Item = RowView<'_>> {
        self.rows.iter().map(|values| RowView {
            columns: &self.columns,
            values,
        })
    }
}

#[derive(Clone, Copy, Debug)]
/// Borrowed view of one row that resolves values by column name.
pub struct RowView<'a> {
    columns: &'a [ColumnDescriptor],
    values: &'a [ScalarValue],
}

impl<'a> RowView<'a> {
    pub fn get(&self, name: &str) -> Option<&'a ScalarValue> {
        self.columns
            .iter()
            .position(|column| column.name == name)
            .map(|index| &self.values[index])
    }

    pub fn values(&self) -> &'a [ScalarValue] {
        self.values
    }

    /// `(column name, value)` pairs in schema order.
    pub fn iter(&self) -> impl Iterator<Item = (&'a str, &'a ScalarValue)> + use<'a> {
        self.columns
            .iter()
            .map(|column| column.name.as_str())
            .zip(self.values.iter())
    }
}
