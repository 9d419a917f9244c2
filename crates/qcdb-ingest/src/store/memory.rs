//! In-process store
//!
//! Behaves like a strict relational store for the operations the pipeline
//! uses: unknown tables and columns are rejected, serial keys are generated
//! on insert. Used by `--dry-run` and by tests, which can also inject write
//! failures.

use std::collections::{BTreeMap, HashSet};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;

use super::{ColumnValue, JobStore, Row, StoreError, StoreResult};
use crate::schema::{ColumnSpec, ColumnType, TableSchema};

#[derive(Debug, Default)]
struct MemoryTable {
    columns: Vec<String>,
    serial_columns: Vec<String>,
    next_serial: i64,
    rows: Vec<Row>,
}

impl MemoryTable {
    fn check_columns(&self, table: &str, row: &Row) -> StoreResult<()> {
        match row.columns().find(|c| !self.columns.iter().any(|name| name == c)) {
            Some(column) => Err(StoreError::UnknownColumn {
                table: table.to_string(),
                column: column.to_string(),
            }),
            None => Ok(()),
        }
    }

    fn matches(row: &Row, key_column: &str, key: i64) -> bool {
        row.get(key_column).and_then(ColumnValue::as_int) == Some(key)
    }
}

#[derive(Debug, Default)]
struct MemoryState {
    tables: BTreeMap<String, MemoryTable>,
    rejected_inserts: HashSet<String>,
    rejected_updates: HashSet<String>,
    withheld_identifiers: HashSet<String>,
}

impl MemoryState {
    fn table(&self, name: &str) -> StoreResult<&MemoryTable> {
        self.tables
            .get(name)
            .ok_or_else(|| StoreError::UnknownTable(name.to_string()))
    }

    fn table_mut(&mut self, name: &str) -> StoreResult<&mut MemoryTable> {
        self.tables
            .get_mut(name)
            .ok_or_else(|| StoreError::UnknownTable(name.to_string()))
    }
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<MemoryState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Make every insert into `table` fail with [`StoreError::Rejected`]
    pub fn reject_inserts_into(&self, table: &str) {
        self.state().rejected_inserts.insert(table.to_string());
    }

    /// Make every update of `table` fail with [`StoreError::Rejected`]
    pub fn reject_updates_of(&self, table: &str) {
        self.state().rejected_updates.insert(table.to_string());
    }

    /// Accept inserts into `table` but never return the generated key
    pub fn withhold_identifiers_from(&self, table: &str) {
        self.state().withheld_identifiers.insert(table.to_string());
    }

    /// Lift all injected failures
    pub fn clear_failures(&self) {
        let mut state = self.state();
        state.rejected_inserts.clear();
        state.rejected_updates.clear();
        state.withheld_identifiers.clear();
    }

    pub fn rows(&self, table: &str) -> Vec<Row> {
        self.state()
            .tables
            .get(table)
            .map(|t| t.rows.clone())
            .unwrap_or_default()
    }

    pub fn row_count(&self, table: &str) -> usize {
        self.state().tables.get(table).map_or(0, |t| t.rows.len())
    }

    /// Rows of `table` whose `key_column` equals `key`
    pub fn rows_where(&self, table: &str, key_column: &str, key: i64) -> Vec<Row> {
        self.rows(table)
            .into_iter()
            .filter(|row| MemoryTable::matches(row, key_column, key))
            .collect()
    }
}

#[async_trait]
impl JobStore for MemoryStore {
    async fn ping(&self) -> StoreResult<()> {
        Ok(())
    }

    async fn create_table(&self, schema: &TableSchema) -> StoreResult<()> {
        let mut state = self.state();
        if state.tables.contains_key(&schema.name) {
            return Ok(());
        }

        let table = MemoryTable {
            columns: schema.columns.iter().map(|c| c.name.to_string()).collect(),
            serial_columns: schema
                .columns
                .iter()
                .filter(|c| c.ty == ColumnType::Serial)
                .map(|c| c.name.to_string())
                .collect(),
            next_serial: 1,
            rows: Vec::new(),
        };
        state.tables.insert(schema.name.clone(), table);
        Ok(())
    }

    async fn live_columns(&self, table: &str) -> StoreResult<Vec<String>> {
        Ok(self.state().table(table)?.columns.clone())
    }

    async fn add_column(&self, table: &str, column: &ColumnSpec) -> StoreResult<()> {
        let mut state = self.state();
        let target = state.table_mut(table)?;
        if !target.columns.iter().any(|name| name == column.name) {
            target.columns.push(column.name.to_string());
        }
        Ok(())
    }

    async fn insert(&self, table: &str, row: &Row, returning: Option<&str>) -> StoreResult<Option<i64>> {
        let mut state = self.state();
        if state.rejected_inserts.contains(table) {
            return Err(StoreError::Rejected(format!("insert into {table} refused")));
        }
        let withhold = state.withheld_identifiers.contains(table);

        let target = state.table_mut(table)?;
        target.check_columns(table, row)?;

        let mut stored = row.clone();
        let serial = target.next_serial;
        let mut used_serial = false;
        for column in &target.serial_columns {
            if stored.get(column).map_or(true, ColumnValue::is_null) {
                stored.set(column.clone(), serial);
                used_serial = true;
            }
        }
        if used_serial {
            target.next_serial += 1;
        }

        let id = returning.and_then(|column| stored.get(column).and_then(ColumnValue::as_int));
        target.rows.push(stored);

        if withhold {
            return Ok(None);
        }
        Ok(id)
    }

    async fn update(&self, table: &str, row: &Row, key_column: &str, key: i64) -> StoreResult<u64> {
        let mut state = self.state();
        if state.rejected_updates.contains(table) {
            return Err(StoreError::Rejected(format!("update of {table} refused")));
        }

        let target = state.table_mut(table)?;
        target.check_columns(table, row)?;

        let mut touched = 0;
        for existing in target
            .rows
            .iter_mut()
            .filter(|r| MemoryTable::matches(r, key_column, key))
        {
            for (column, value) in row.iter() {
                existing.set(column, value.clone());
            }
            touched += 1;
        }
        Ok(touched)
    }

    async fn exists(&self, table: &str, key_column: &str, key: i64) -> StoreResult<bool> {
        let state = self.state();
        let target = state.table(table)?;
        Ok(target
            .rows
            .iter()
            .any(|r| MemoryTable::matches(r, key_column, key)))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::schema::{jobs_schema, status_schema};
    use qcdb_common::Package;

    #[tokio::test]
    async fn test_insert_generates_serial_ids() {
        let store = MemoryStore::new();
        store.create_table(&jobs_schema(Package::Orca)).await.unwrap();

        let row = Row::new()
            .with("package", "ORCA")
            .with("user_id", "u1")
            .with("sys_name", "h2o");
        let first = store.insert("orca_jobs", &row, Some("job_id")).await.unwrap();
        let second = store.insert("orca_jobs", &row, Some("job_id")).await.unwrap();

        assert_eq!(first, Some(1));
        assert_eq!(second, Some(2));
        assert_eq!(store.row_count("orca_jobs"), 2);
    }

    #[tokio::test]
    async fn test_unknown_column_rejected() {
        let store = MemoryStore::new();
        store.create_table(&status_schema(Package::Vasp)).await.unwrap();

        let row = Row::new().with("job_id", 1_i64).with("status", "RUNNING").with("eta", 5_i64);
        let err = store.insert("vasp_job_status", &row, None).await.unwrap_err();
        assert!(matches!(err, StoreError::UnknownColumn { ref column, .. } if column == "eta"));
    }

    #[tokio::test]
    async fn test_unknown_table_rejected() {
        let store = MemoryStore::new();
        let err = store.live_columns("qe_jobs").await.unwrap_err();
        assert!(matches!(err, StoreError::UnknownTable(_)));
    }

    #[tokio::test]
    async fn test_update_and_exists() {
        let store = MemoryStore::new();
        store.create_table(&status_schema(Package::Orca)).await.unwrap();
        store
            .insert(
                "orca_job_status",
                &Row::new().with("job_id", 7_i64).with("status", "RUNNING"),
                Some("id"),
            )
            .await
            .unwrap();

        assert!(store.exists("orca_job_status", "job_id", 7).await.unwrap());
        assert!(!store.exists("orca_job_status", "job_id", 8).await.unwrap());

        let touched = store
            .update(
                "orca_job_status",
                &Row::new().with("status", "COMPLETED"),
                "job_id",
                7,
            )
            .await
            .unwrap();
        assert_eq!(touched, 1);

        let rows = store.rows_where("orca_job_status", "job_id", 7);
        assert_eq!(rows[0].get("status").and_then(|v| v.as_text()), Some("COMPLETED"));
    }

    #[tokio::test]
    async fn test_injected_failures() {
        let store = MemoryStore::new();
        store.create_table(&jobs_schema(Package::Vasp)).await.unwrap();
        let row = Row::new().with("package", "vasp");

        store.withhold_identifiers_from("vasp_jobs");
        assert_eq!(store.insert("vasp_jobs", &row, Some("job_id")).await.unwrap(), None);

        store.reject_inserts_into("vasp_jobs");
        assert!(matches!(
            store.insert("vasp_jobs", &row, Some("job_id")).await,
            Err(StoreError::Rejected(_))
        ));

        store.clear_failures();
        assert!(store.insert("vasp_jobs", &row, Some("job_id")).await.unwrap().is_some());
    }
}
