//! DuckDB backend.
//!
//! The primary connection opened at instantiation owns the database; each
//! session is a clone of it sharing the same catalog. Registered files are
//! written to the scratch directory, which every session adds to its
//! `file_search_path` so SQL can refer to them by bare name. Dropping the
//! database removes what registration wrote.

use std::{
    fs,
    path::{Path, PathBuf},
    sync::Arc,
};

use chrono::{DateTime, NaiveTime, TimeDelta};
use duckdb::arrow::datatypes::DataType;
use duckdb::types::{TimeUnit, Value, ValueRef};
use geo_core::{ColumnDescriptor, ColumnType, ColumnarResult, ScalarValue};
use serde_json::Value as JsonValue;
use tempfile::TempDir;
use tracing::warn;

use crate::config::DatabaseLocation;
use crate::driver::{Database, Distribution, Driver, Interrupt, Session};
use crate::error::BackendError;

#[derive(Clone, Copy, Debug, Default)]
pub struct DuckDbDriver;

impl Driver for DuckDbDriver {
    type Database = DuckDbDatabase;

    fn name(&self) -> &'static str {
        "duckdb"
    }

    fn instantiate(&self, distribution: &Distribution) -> Result<DuckDbDatabase, BackendError> {
        let mut config = duckdb::Config::default().threads(distribution.threads as i64)?;
        if let Some(limit) = &distribution.memory_limit {
            config = config.max_memory(limit)?;
        }

        let primary = match &distribution.database {
            DatabaseLocation::InMemory => duckdb::Connection::open_in_memory_with_flags(config)?,
            DatabaseLocation::File(path) => duckdb::Connection::open_with_flags(path, config)?,
        };

        let scratch = match &distribution.scratch_dir {
            Some(dir) => ScratchDir::Provided {
                dir: dir.clone(),
                written: Vec::new(),
            },
            None => ScratchDir::Owned(tempfile::Builder::new().prefix("geosql-").tempdir()?),
        };

        Ok(DuckDbDatabase {
            primary,
            scratch,
            search_path_active: false,
        })
    }
}

/// Where registered files go. An owned temp dir disappears with the database;
/// in a caller's directory only the files registration wrote are removed.
enum ScratchDir {
    Owned(TempDir),
    Provided { dir: PathBuf, written: Vec<PathBuf> },
}

impl ScratchDir {
    fn path(&self) -> &Path {
        match self {
            ScratchDir::Owned(dir) => dir.path(),
            ScratchDir::Provided { dir, .. } => dir,
        }
    }
}

impl Drop for ScratchDir {
    fn drop(&mut self) {
        if let ScratchDir::Provided { written, .. } = self {
            for path in written.drain(..) {
                if let Err(err) = fs::remove_file(&path) {
                    warn!("Failed to remove registered file {}: {err}", path.display());
                }
            }
        }
    }
}

pub struct DuckDbDatabase {
    primary: duckdb::Connection,
    scratch: ScratchDir,
    search_path_active: bool,
}

impl DuckDbDatabase {
    fn scratch_dir(&self) -> &Path {
        self.scratch.path()
    }

    fn search_path_directive(&self) -> String {
        let dir = self.scratch_dir().to_string_lossy().replace('\'', "''");
        format!("SET file_search_path = '{dir}'")
    }
}

impl Database for DuckDbDatabase {
    type Session = DuckDbSession;

    fn connect(&mut self) -> Result<DuckDbSession, BackendError> {
        let conn = self.primary.try_clone()?;
        if self.search_path_active {
            conn.execute_batch(&self.search_path_directive())?;
        }
        Ok(DuckDbSession { conn })
    }

    fn register_file(&mut self, name: &str, bytes: &[u8]) -> Result<PathBuf, BackendError> {
        if name.is_empty() || name == "." || name == ".." || name.contains(['/', '\\']) {
            return Err(BackendError::new(format!(
                "registered file name {name:?} must be a bare file name"
            )));
        }
        fs::create_dir_all(self.scratch_dir())?;
        let path = self.scratch_dir().join(name);
        fs::write(&path, bytes)?;
        if let ScratchDir::Provided { written, .. } = &mut self.scratch {
            if !written.contains(&path) {
                written.push(path.clone());
            }
        }

        self.primary.execute_batch(&self.search_path_directive())?;
        self.search_path_active = true;
        Ok(path)
    }
}

pub struct DuckDbSession {
    conn: duckdb::Connection,
}

impl Session for DuckDbSession {
    fn execute(&mut self, sql: &str) -> Result<(), BackendError> {
        self.conn.execute_batch(sql)?;
        Ok(())
    }

    fn query(&mut self, sql: &str) -> Result<ColumnarResult, BackendError> {
        let mut stmt = self.conn.prepare(sql)?;
        let mut rows = stmt.query([])?;

        // Column metadata is only reachable once `rows` releases the statement,
        // so the width is probed on the first row.
        let mut width: Option<usize> = None;
        let mut values = Vec::new();
        while let Some(row) = rows.next()? {
            let mut cells = Vec::with_capacity(width.unwrap_or(0));
            for index in 0.. {
                if width.is_some_and(|w| index >= w) {
                    break;
                }
                match row.get_ref(index) {
                    Ok(value) => cells.push(scalar_from_ref(value)),
                    Err(_) => break,
                }
            }
            width.get_or_insert(cells.len());
            values.push(cells);
        }
        drop(rows);

        let columns = stmt
            .column_names()
            .into_iter()
            .enumerate()
            .map(|(index, name)| {
                ColumnDescriptor::new(name, column_type(&stmt.column_type(index)))
            })
            .collect();

        ColumnarResult::new(columns, values).map_err(|err| BackendError::new(err.to_string()))
    }

    fn interrupt_handle(&self) -> Arc<dyn Interrupt> {
        self.conn.interrupt_handle()
    }

    fn close(self) -> Result<(), BackendError> {
        self.conn.close().map_err(|(_, err)| BackendError::from(err))
    }
}

impl Interrupt for duckdb::InterruptHandle {
    fn interrupt(&self) {
        duckdb::InterruptHandle::interrupt(self);
    }
}

fn column_type(data_type: &DataType) -> ColumnType {
    match data_type {
        DataType::Null => ColumnType::Null,
        DataType::Boolean => ColumnType::Boolean,
        DataType::Int8
        | DataType::Int16
        | DataType::Int32
        | DataType::Int64
        | DataType::UInt8
        | DataType::UInt16
        | DataType::UInt32
        | DataType::UInt64 => ColumnType::Integer,
        DataType::Float16 | DataType::Float32 | DataType::Float64 => ColumnType::Float,
        DataType::Decimal32(..)
        | DataType::Decimal64(..)
        | DataType::Decimal128(..)
        | DataType::Decimal256(..) => ColumnType::Decimal,
        // Enums arrive dictionary-encoded.
        DataType::Utf8 | DataType::LargeUtf8 | DataType::Dictionary(..) => ColumnType::Text,
        DataType::Binary | DataType::LargeBinary | DataType::FixedSizeBinary(_) => {
            ColumnType::Blob
        }
        DataType::Date32 | DataType::Date64 => ColumnType::Date,
        DataType::Time32(_) | DataType::Time64(_) => ColumnType::Time,
        DataType::Timestamp(..) => ColumnType::Timestamp,
        DataType::Interval(_) | DataType::Duration(_) => ColumnType::Interval,
        DataType::List(_)
        | DataType::LargeList(_)
        | DataType::FixedSizeList(..)
        | DataType::Struct(_)
        | DataType::Map(..)
        | DataType::Union(..) => ColumnType::Nested,
        _ => ColumnType::Other,
    }
}

fn to_micros(unit: TimeUnit, value: i64) -> i64 {
    match unit {
        TimeUnit::Second => value.saturating_mul(1_000_000),
        TimeUnit::Millisecond => value.saturating_mul(1_000),
        TimeUnit::Microsecond => value,
        TimeUnit::Nanosecond => value / 1_000,
    }
}

fn scalar_from_ref(value: ValueRef<'_>) -> ScalarValue {
    match value {
        ValueRef::Null => ScalarValue::Null,
        ValueRef::Boolean(b) => ScalarValue::Boolean(b),
        ValueRef::TinyInt(i) => ScalarValue::Integer(i.into()),
        ValueRef::SmallInt(i) => ScalarValue::Integer(i.into()),
        ValueRef::Int(i) => ScalarValue::Integer(i.into()),
        ValueRef::BigInt(i) => ScalarValue::Integer(i),
        ValueRef::HugeInt(i) => i64::try_from(i)
            .map(ScalarValue::Integer)
            .unwrap_or(ScalarValue::HugeInteger(i)),
        ValueRef::UTinyInt(i) => ScalarValue::Integer(i.into()),
        ValueRef::USmallInt(i) => ScalarValue::Integer(i.into()),
        ValueRef::UInt(i) => ScalarValue::Integer(i.into()),
        ValueRef::UBigInt(i) => i64::try_from(i)
            .map(ScalarValue::Integer)
            .unwrap_or(ScalarValue::HugeInteger(i128::from(i))),
        ValueRef::Float(f) => ScalarValue::Float(f.into()),
        ValueRef::Double(f) => ScalarValue::Float(f),
        ValueRef::Decimal(d) => ScalarValue::Decimal(d.to_string()),
        ValueRef::Text(bytes) => ScalarValue::Text(String::from_utf8_lossy(bytes).into_owned()),
        ValueRef::Blob(bytes) | ValueRef::Geometry(bytes) => ScalarValue::Blob(bytes.to_vec()),
        ValueRef::UHugeInt(i) => i128::try_from(i)
            .map(ScalarValue::HugeInteger)
            .unwrap_or_else(|_| ScalarValue::Other(i.to_string())),
        ValueRef::Date32(days) => DateTime::UNIX_EPOCH
            .date_naive()
            .checked_add_signed(TimeDelta::days(days.into()))
            .map(ScalarValue::Date)
            .unwrap_or_else(|| ScalarValue::Other(format!("date {days}"))),
        ValueRef::Time64(unit, value) => {
            let micros = to_micros(unit, value);
            NaiveTime::from_num_seconds_from_midnight_opt(
                (micros / 1_000_000) as u32,
                ((micros % 1_000_000) * 1_000) as u32,
            )
            .map(ScalarValue::Time)
            .unwrap_or_else(|| ScalarValue::Other(format!("time {micros}us")))
        }
        ValueRef::Timestamp(unit, value) => {
            let micros = to_micros(unit, value);
            DateTime::from_timestamp_micros(micros)
                .map(|ts| ScalarValue::Timestamp(ts.naive_utc()))
                .unwrap_or_else(|| ScalarValue::Other(format!("timestamp {micros}us")))
        }
        ValueRef::Interval {
            months,
            days,
            nanos,
        } => ScalarValue::Interval {
            months,
            days,
            micros: nanos / 1_000,
        },
        ValueRef::Enum(..) => match value.as_str() {
            Ok(label) => ScalarValue::Text(label.to_string()),
            Err(_) => ScalarValue::Null,
        },
        ValueRef::List(..)
        | ValueRef::Struct(..)
        | ValueRef::Array(..)
        | ValueRef::Map(..)
        | ValueRef::Union(..) => ScalarValue::Nested(json_from_value(&value.to_owned())),
        other => ScalarValue::Other(other.data_type().to_string()),
    }
}

/// Owned composite value to JSON; leaves go through [`scalar_from_ref`].
fn json_from_value(value: &Value) -> JsonValue {
    match value {
        Value::List(items) | Value::Array(items) => {
            JsonValue::Array(items.iter().map(json_from_value).collect())
        }
        Value::Struct(fields) => JsonValue::Object(
            fields
                .iter()
                .map(|(name, field)| (name.clone(), json_from_value(field)))
                .collect(),
        ),
        Value::Map(entries) => JsonValue::Object(
            entries
                .iter()
                .map(|(key, entry)| (map_key(key), json_from_value(entry)))
                .collect(),
        ),
        Value::Union(inner) => json_from_value(inner),
        Value::Enum(label) => JsonValue::String(label.clone()),
        leaf => scalar_from_ref(ValueRef::from(leaf)).to_json(),
    }
}

fn map_key(key: &Value) -> String {
    match json_from_value(key) {
        JsonValue::String(text) => text,
        other => other.to_string(),
    }
}
