//! # Storage Module
//!
//! Persistence of decoded telemetry.
//!
//! This module handles:
//! - The fixed table layout (one table per sensor kind, debug text, nodes)
//! - Row statements handed to a [`RelationalStore`]
//! - Mapping a decoded envelope onto rows ([`mapper::StorageMapper`])
//! - A rotating JSON-lines backend ([`jsonl::JsonlStore`])

pub mod jsonl;
pub mod mapper;

use std::fmt;

use serde::Serialize;

use crate::error::StoreError;

/// Placeholder identifier for nodes that never announced one
pub const UNDEFINED_IDENTIFIER: &str = "Undefined";

/// Destination tables
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Table {
    #[serde(rename = "sensorHeart")]
    SensorHeart,
    #[serde(rename = "sensorTemperature")]
    SensorTemperature,
    #[serde(rename = "sensorAccelerometer")]
    SensorAccelerometer,
    #[serde(rename = "sensorGPS")]
    SensorGps,
    #[serde(rename = "sensorGPSDecimal")]
    SensorGpsDecimal,
    #[serde(rename = "debugMessages")]
    DebugMessages,
    #[serde(rename = "monitoringNodes")]
    MonitoringNodes,
}

const SENSOR_KEY: [&str; 3] = ["addr64", "timestamp", "offset_ms"];

impl Table {
    pub const ALL: [Table; 7] = [
        Table::SensorHeart,
        Table::SensorTemperature,
        Table::SensorAccelerometer,
        Table::SensorGps,
        Table::SensorGpsDecimal,
        Table::DebugMessages,
        Table::MonitoringNodes,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Table::SensorHeart => "sensorHeart",
            Table::SensorTemperature => "sensorTemperature",
            Table::SensorAccelerometer => "sensorAccelerometer",
            Table::SensorGps => "sensorGPS",
            Table::SensorGpsDecimal => "sensorGPSDecimal",
            Table::DebugMessages => "debugMessages",
            Table::MonitoringNodes => "monitoringNodes",
        }
    }

    /// Column names in insertion order
    pub fn columns(self) -> Vec<&'static str> {
        let extra: &[&str] = match self {
            Table::SensorHeart => &["bpm"],
            Table::SensorTemperature => &["temp"],
            Table::SensorAccelerometer => &["x", "y", "z"],
            Table::SensorGps => &[
                "lat_h",
                "lat_min",
                "lat_s",
                "lat_north",
                "long_h",
                "long_min",
                "long_s",
                "long_west",
                "valid_pos_fix",
            ],
            Table::SensorGpsDecimal => &["latitude", "longitude"],
            Table::DebugMessages => return vec!["addr64", "timestamp", "message"],
            Table::MonitoringNodes => return vec!["addr64", "addr16", "identifier"],
        };
        SENSOR_KEY.iter().chain(extra).copied().collect()
    }

    /// `CREATE TABLE IF NOT EXISTS` statement for SQL backends
    pub fn create_sql(self) -> String {
        let columns = match self {
            Table::SensorHeart => "bpm INT",
            Table::SensorTemperature => "temp DOUBLE",
            Table::SensorAccelerometer => "x INT, y INT, z INT",
            Table::SensorGps => {
                "lat_h INT, lat_min INT, lat_s INT, lat_north BOOL, \
                 long_h INT, long_min INT, long_s INT, long_west BOOL, valid_pos_fix BOOL"
            }
            Table::SensorGpsDecimal => "latitude REAL, longitude REAL",
            Table::DebugMessages => {
                return format!(
                    "CREATE TABLE IF NOT EXISTS {} (addr64 UNSIGNED BIGINT, timestamp BIGINT, message TEXT)",
                    self.name()
                )
            }
            Table::MonitoringNodes => {
                return format!(
                    "CREATE TABLE IF NOT EXISTS {} (addr64 UNSIGNED BIGINT UNIQUE, addr16 UNSIGNED INT, identifier VARCHAR(20))",
                    self.name()
                )
            }
        };
        format!(
            "CREATE TABLE IF NOT EXISTS {} (addr64 UNSIGNED BIGINT, timestamp BIGINT, offset_ms INT, {})",
            self.name(),
            columns
        )
    }
}

impl fmt::Display for Table {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A single column value
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum SqlValue {
    Integer(i64),
    Unsigned(u64),
    Real(f64),
    Bool(bool),
    Text(String),
}

impl SqlValue {
    /// SQL literal for this value
    pub fn to_sql(&self) -> String {
        match self {
            SqlValue::Integer(v) => v.to_string(),
            SqlValue::Unsigned(v) => v.to_string(),
            SqlValue::Real(v) if v.is_finite() => v.to_string(),
            SqlValue::Real(_) => "NULL".to_string(),
            SqlValue::Bool(v) => u8::from(*v).to_string(),
            SqlValue::Text(v) => format!("'{}'", v.replace('\'', "''")),
        }
    }
}

impl From<i64> for SqlValue {
    fn from(v: i64) -> Self {
        SqlValue::Integer(v)
    }
}

impl From<u64> for SqlValue {
    fn from(v: u64) -> Self {
        SqlValue::Unsigned(v)
    }
}

impl From<u8> for SqlValue {
    fn from(v: u8) -> Self {
        SqlValue::Integer(v.into())
    }
}

impl From<i16> for SqlValue {
    fn from(v: i16) -> Self {
        SqlValue::Integer(v.into())
    }
}

impl From<u16> for SqlValue {
    fn from(v: u16) -> Self {
        SqlValue::Integer(v.into())
    }
}

impl From<f64> for SqlValue {
    fn from(v: f64) -> Self {
        SqlValue::Real(v)
    }
}

impl From<bool> for SqlValue {
    fn from(v: bool) -> Self {
        SqlValue::Bool(v)
    }
}

impl From<&str> for SqlValue {
    fn from(v: &str) -> Self {
        SqlValue::Text(v.to_string())
    }
}

impl From<String> for SqlValue {
    fn from(v: String) -> Self {
        SqlValue::Text(v)
    }
}

/// Statement kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StatementKind {
    /// Append a row
    Insert,
    /// Insert, replacing any row with the same unique key
    Upsert,
}

/// One row write against a table
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Statement {
    pub kind: StatementKind,
    pub table: Table,
    pub values: Vec<SqlValue>,
}

impl Statement {
    pub fn insert(table: Table, values: Vec<SqlValue>) -> Self {
        Self {
            kind: StatementKind::Insert,
            table,
            values,
        }
    }

    pub fn upsert(table: Table, values: Vec<SqlValue>) -> Self {
        Self {
            kind: StatementKind::Upsert,
            table,
            values,
        }
    }

    /// Render as SQL text
    ///
    /// # Examples
    ///
    /// ```
    /// use equine_telemetry::storage::{Statement, Table};
    ///
    /// let stmt = Statement::insert(
    ///     Table::SensorHeart,
    ///     vec![1u64.into(), 990i64.into(), 0i64.into(), 72u8.into()],
    /// );
    /// assert_eq!(stmt.to_sql(), "INSERT INTO sensorHeart VALUES(1, 990, 0, 72)");
    /// ```
    pub fn to_sql(&self) -> String {
        let verb = match self.kind {
            StatementKind::Insert => "INSERT INTO",
            StatementKind::Upsert => "INSERT OR REPLACE INTO",
        };
        let values: Vec<String> = self.values.iter().map(SqlValue::to_sql).collect();
        format!("{} {} VALUES({})", verb, self.table, values.join(", "))
    }

    /// Column name paired with each value
    pub fn row(&self) -> impl Iterator<Item = (&'static str, &SqlValue)> {
        self.table.columns().into_iter().zip(self.values.iter())
    }
}

/// Relational persistence backend
///
/// Implementations execute one statement at a time; the mapper decides what
/// to do when one fails.
#[cfg_attr(test, mockall::automock)]
pub trait RelationalStore: Send {
    /// Execute a single statement
    fn execute(&mut self, statement: &Statement) -> Result<(), StoreError>;

    /// Flush and release the backend; later `execute` calls fail
    fn close(&mut self) -> Result<(), StoreError>;
}
