//! Relational store interface
//!
//! The pipeline talks to the database only through [`JobStore`]. Two
//! implementations exist: [`PgStore`] for PostgreSQL and [`MemoryStore`],
//! which backs `--dry-run` and the test suite.

use async_trait::async_trait;
use chrono::NaiveDateTime;
use thiserror::Error;

use crate::schema::{ColumnSpec, TableSchema};

mod memory;
mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

/// Store operation errors
#[derive(Error, Debug)]
pub enum StoreError {
    /// SQL query or connection error
    #[error("Database query failed: {0}")]
    Sqlx(#[from] sqlx::Error),

    /// An insert that must return a generated key returned nothing
    #[error("Insert into '{table}' returned no identifier")]
    MissingIdentifier { table: String },

    #[error("Table '{0}' does not exist")]
    UnknownTable(String),

    #[error("Column '{column}' does not exist in table '{table}'")]
    UnknownColumn { table: String, column: String },

    /// Write refused by the store
    #[error("Write rejected: {0}")]
    Rejected(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// A single typed cell value
#[derive(Debug, Clone, PartialEq)]
pub enum ColumnValue {
    Null,
    Text(String),
    Float(f64),
    Int(i64),
    Bool(bool),
    Timestamp(NaiveDateTime),
    Json(serde_json::Value),
}

impl ColumnValue {
    pub fn is_null(&self) -> bool {
        matches!(self, ColumnValue::Null)
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            ColumnValue::Int(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            ColumnValue::Text(v) => Some(v),
            _ => None,
        }
    }
}

impl From<String> for ColumnValue {
    fn from(value: String) -> Self {
        ColumnValue::Text(value)
    }
}

impl From<&str> for ColumnValue {
    fn from(value: &str) -> Self {
        ColumnValue::Text(value.to_string())
    }
}

impl From<f64> for ColumnValue {
    fn from(value: f64) -> Self {
        ColumnValue::Float(value)
    }
}

impl From<i64> for ColumnValue {
    fn from(value: i64) -> Self {
        ColumnValue::Int(value)
    }
}

impl From<bool> for ColumnValue {
    fn from(value: bool) -> Self {
        ColumnValue::Bool(value)
    }
}

impl From<NaiveDateTime> for ColumnValue {
    fn from(value: NaiveDateTime) -> Self {
        ColumnValue::Timestamp(value)
    }
}

impl From<serde_json::Value> for ColumnValue {
    fn from(value: serde_json::Value) -> Self {
        ColumnValue::Json(value)
    }
}

impl<T: Into<ColumnValue>> From<Option<T>> for ColumnValue {
    fn from(value: Option<T>) -> Self {
        value.map_or(ColumnValue::Null, Into::into)
    }
}

/// Ordered column -> value mapping for one table row
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Row {
    values: Vec<(String, ColumnValue)>,
}

impl Row {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder form of [`Row::set`]
    pub fn with(mut self, column: impl Into<String>, value: impl Into<ColumnValue>) -> Self {
        self.set(column, value);
        self
    }

    /// Set a column, replacing any earlier value while keeping its position
    pub fn set(&mut self, column: impl Into<String>, value: impl Into<ColumnValue>) {
        let column = column.into();
        let value = value.into();
        match self.values.iter_mut().find(|(name, _)| *name == column) {
            Some((_, existing)) => *existing = value,
            None => self.values.push((column, value)),
        }
    }

    pub fn get(&self, column: &str) -> Option<&ColumnValue> {
        self.values
            .iter()
            .find(|(name, _)| name == column)
            .map(|(_, value)| value)
    }

    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.values.iter().map(|(name, _)| name.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &ColumnValue)> {
        self.values.iter().map(|(name, value)| (name.as_str(), value))
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Keep only columns accepted by `keep`; returns the names that were dropped
    pub fn retain_columns(&mut self, mut keep: impl FnMut(&str) -> bool) -> Vec<String> {
        let mut dropped = Vec::new();
        self.values.retain(|(name, _)| {
            let kept = keep(name);
            if !kept {
                dropped.push(name.clone());
            }
            kept
        });
        dropped
    }
}

/// Query/DDL capability the persistence layer needs from a relational store
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Cheap round trip proving the store is reachable
    async fn ping(&self) -> StoreResult<()>;

    /// Create the table if it does not exist yet
    async fn create_table(&self, schema: &TableSchema) -> StoreResult<()>;

    /// Column names of `table` as they currently exist, in table order
    async fn live_columns(&self, table: &str) -> StoreResult<Vec<String>>;

    /// Add a nullable column; a no-op if it already exists
    async fn add_column(&self, table: &str, column: &ColumnSpec) -> StoreResult<()>;

    /// Insert one row, returning the value of `returning` when requested
    async fn insert(&self, table: &str, row: &Row, returning: Option<&str>) -> StoreResult<Option<i64>>;

    /// Update rows where `key_column = key`; returns the number of rows touched
    async fn update(&self, table: &str, row: &Row, key_column: &str, key: i64) -> StoreResult<u64>;

    async fn exists(&self, table: &str, key_column: &str, key: i64) -> StoreResult<bool>;
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_row_set_replaces_in_place() {
        let mut row = Row::new().with("status", "PENDING").with("job_id", 3_i64);
        row.set("status", "COMPLETED");

        assert_eq!(row.len(), 2);
        assert_eq!(row.columns().collect::<Vec<_>>(), vec!["status", "job_id"]);
        assert_eq!(row.get("status").and_then(|v| v.as_text()), Some("COMPLETED"));
    }

    #[test]
    fn test_optional_values_become_null() {
        let row = Row::new()
            .with("fermi_energy", None::<f64>)
            .with("total_energy", Some(-123.456));

        assert!(row.get("fermi_energy").unwrap().is_null());
        assert_eq!(row.get("total_energy"), Some(&ColumnValue::Float(-123.456)));
    }

    #[test]
    fn test_retain_columns_reports_dropped() {
        let mut row = Row::new()
            .with("user_id", "u1")
            .with("brand_new_field", 1.0)
            .with("sys_name", "si");

        let dropped = row.retain_columns(|c| c != "brand_new_field");
        assert_eq!(dropped, vec!["brand_new_field".to_string()]);
        assert_eq!(row.columns().collect::<Vec<_>>(), vec!["user_id", "sys_name"]);
    }
}
