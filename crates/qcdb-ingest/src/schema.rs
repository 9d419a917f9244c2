//! Table definitions and additive schema reconciliation
//!
//! Each package owns two tables, `<prefix>_jobs` and `<prefix>_job_status`.
//! Their expected columns are declared here as data. At startup
//! [`migrate`] creates missing tables and adds missing columns; it never
//! drops, renames or retypes anything already present.

use qcdb_common::Package;
use tracing::{debug, info};

use crate::store::{JobStore, Row, StoreResult};

/// Column types used by the ingestion tables
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
    Serial,
    Integer,
    Float,
    Text,
    Timestamp,
    Boolean,
    Json,
}

impl ColumnType {
    pub fn sql(self) -> &'static str {
        match self {
            ColumnType::Serial => "SERIAL",
            ColumnType::Integer => "INTEGER",
            ColumnType::Float => "DOUBLE PRECISION",
            ColumnType::Text => "TEXT",
            ColumnType::Timestamp => "TIMESTAMP",
            ColumnType::Boolean => "BOOLEAN",
            ColumnType::Json => "JSONB",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnSpec {
    pub name: &'static str,
    pub ty: ColumnType,
    pub not_null: bool,
    /// `table(column)` this column references
    pub references: Option<String>,
}

impl ColumnSpec {
    pub fn new(name: &'static str, ty: ColumnType) -> Self {
        Self {
            name,
            ty,
            not_null: false,
            references: None,
        }
    }

    pub fn not_null(mut self) -> Self {
        self.not_null = true;
        self
    }

    pub fn references(mut self, table: &str, column: &str) -> Self {
        self.references = Some(format!("{}({})", quote_ident(table), quote_ident(column)));
        self
    }

    /// Definition used inside `CREATE TABLE`
    pub fn create_definition(&self, primary_key: bool) -> String {
        let mut sql = format!("{} {}", quote_ident(self.name), self.ty.sql());
        if primary_key {
            sql.push_str(" PRIMARY KEY");
        } else if self.not_null {
            sql.push_str(" NOT NULL");
        }
        if let Some(ref target) = self.references {
            sql.push_str(" REFERENCES ");
            sql.push_str(target);
        }
        sql
    }

    /// Definition used by `ALTER TABLE .. ADD COLUMN`; added columns are always nullable
    pub fn add_definition(&self) -> String {
        let mut sql = format!("{} {}", quote_ident(self.name), self.ty.sql());
        if let Some(ref target) = self.references {
            sql.push_str(" REFERENCES ");
            sql.push_str(target);
        }
        sql
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableSchema {
    pub name: String,
    pub primary_key: &'static str,
    pub columns: Vec<ColumnSpec>,
}

impl TableSchema {
    pub fn column_names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.columns.iter().map(|c| c.name)
    }

    pub fn create_sql(&self) -> String {
        let definitions: Vec<String> = self
            .columns
            .iter()
            .map(|c| c.create_definition(c.name == self.primary_key))
            .collect();
        format!(
            "CREATE TABLE IF NOT EXISTS {} ({})",
            quote_ident(&self.name),
            definitions.join(", ")
        )
    }
}

/// Double-quote an SQL identifier
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

pub fn jobs_table(package: Package) -> String {
    format!("{}_jobs", package.table_prefix())
}

pub fn status_table(package: Package) -> String {
    format!("{}_job_status", package.table_prefix())
}

/// Expected layout of `<prefix>_jobs`
pub fn jobs_schema(package: Package) -> TableSchema {
    use ColumnType::*;

    let mut columns = vec![
        ColumnSpec::new("job_id", Serial),
        ColumnSpec::new("package", Text).not_null(),
        ColumnSpec::new("user_id", Text).not_null(),
        ColumnSpec::new("sys_name", Text).not_null(),
        ColumnSpec::new("description", Text),
        ColumnSpec::new("updated_at", Timestamp),
        ColumnSpec::new("created_at", Timestamp),
        ColumnSpec::new("completed_at", Timestamp),
    ];

    let package_columns = match package {
        Package::Espresso => vec![
            ColumnSpec::new("energy_cutoff", Float),
            ColumnSpec::new("lattice_param", Float),
            ColumnSpec::new("num_atomic_types", Integer),
            ColumnSpec::new("kohn_sham_states", Integer),
            ColumnSpec::new("total_energy", Float),
            ColumnSpec::new("fermi_energy", Float),
            ColumnSpec::new("pseudopotentials", Json),
            ColumnSpec::new("crystal_coord", Json),
            ColumnSpec::new("scf_conv", Boolean),
        ],
        Package::Vasp => vec![
            ColumnSpec::new("encut", Float),
            ColumnSpec::new("num_atoms", Integer),
            ColumnSpec::new("basis_vec", Json),
            ColumnSpec::new("kpoints", Json),
            ColumnSpec::new("xcorr", Text),
            ColumnSpec::new("pseudopot", Json),
            ColumnSpec::new("efermi", Float),
            ColumnSpec::new("toten", Json),
        ],
        Package::Orca => vec![
            ColumnSpec::new("final_energy", Float),
            ColumnSpec::new("scf_conv", Boolean),
            ColumnSpec::new("spin_up_orbitals", Json),
            ColumnSpec::new("spin_down_orbitals", Json),
            ColumnSpec::new("vibrational_frequencies", Json),
            ColumnSpec::new("ir_spectrum", Json),
        ],
    };
    columns.extend(package_columns);

    TableSchema {
        name: jobs_table(package),
        primary_key: "job_id",
        columns,
    }
}

/// Expected layout of `<prefix>_job_status`
pub fn status_schema(package: Package) -> TableSchema {
    use ColumnType::*;

    let jobs = jobs_table(package);
    TableSchema {
        name: status_table(package),
        primary_key: "id",
        columns: vec![
            ColumnSpec::new("id", Serial),
            ColumnSpec::new("job_id", Integer).not_null().references(&jobs, "job_id"),
            ColumnSpec::new("user_id", Text),
            ColumnSpec::new("package", Text),
            ColumnSpec::new("status", Text).not_null(),
            ColumnSpec::new("output_file", Text),
            ColumnSpec::new("secondary_file", Text),
            ColumnSpec::new("created_at", Timestamp),
            ColumnSpec::new("updated_at", Timestamp),
        ],
    }
}

/// Startup migration list for one package, in dependency order
pub fn migrations(package: Package) -> Vec<TableSchema> {
    vec![jobs_schema(package), status_schema(package)]
}

/// Add every expected column missing from the live table
///
/// Returns the names of the columns that were added. A second run with the
/// same schema adds nothing.
pub async fn reconcile(store: &dyn JobStore, schema: &TableSchema) -> StoreResult<Vec<&'static str>> {
    let live = store.live_columns(&schema.name).await?;
    let mut added = Vec::new();

    for column in &schema.columns {
        if live.iter().any(|name| name == column.name) {
            continue;
        }
        store.add_column(&schema.name, column).await?;
        info!(
            table = %schema.name,
            column = column.name,
            column_type = column.ty.sql(),
            "Added missing column"
        );
        added.push(column.name);
    }

    if added.is_empty() {
        debug!(table = %schema.name, "Schema up to date");
    }

    Ok(added)
}

/// Summary of one [`migrate`] run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MigrationReport {
    /// (table, column) pairs added by this run
    pub added: Vec<(String, &'static str)>,
}

/// Apply the migration list for `package`: create tables, then reconcile columns
pub async fn migrate(store: &dyn JobStore, package: Package) -> StoreResult<MigrationReport> {
    let mut report = MigrationReport::default();

    for schema in migrations(package) {
        store.create_table(&schema).await?;
        for column in reconcile(store, &schema).await? {
            report.added.push((schema.name.clone(), column));
        }
    }

    Ok(report)
}

/// Drop every column of `row` that is not in `live`; returns the dropped names
pub fn filter_to_existing(row: &mut Row, live: &[String]) -> Vec<String> {
    row.retain_columns(|column| live.iter().any(|name| name == column))
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    #[test]
    fn test_create_sql_shapes() {
        let sql = status_schema(Package::Orca).create_sql();
        assert!(sql.starts_with("CREATE TABLE IF NOT EXISTS \"orca_job_status\""));
        assert!(sql.contains("\"id\" SERIAL PRIMARY KEY"));
        assert!(sql.contains("\"job_id\" INTEGER NOT NULL REFERENCES \"orca_jobs\"(\"job_id\")"));
    }

    #[test]
    fn test_added_columns_are_nullable() {
        let column = ColumnSpec::new("package", ColumnType::Text).not_null();
        assert_eq!(column.add_definition(), "\"package\" TEXT");
    }

    #[test]
    fn test_jobs_schema_per_package() {
        let qe: Vec<_> = jobs_schema(Package::Espresso).column_names().collect();
        assert!(qe.contains(&"scf_conv"));
        assert!(qe.contains(&"crystal_coord"));

        let vasp: Vec<_> = jobs_schema(Package::Vasp).column_names().collect();
        assert!(vasp.contains(&"toten"));
        assert!(!vasp.contains(&"scf_conv"));
    }

    #[test]
    fn test_quote_ident_escapes() {
        assert_eq!(quote_ident("odd\"name"), "\"odd\"\"name\"");
    }

    #[tokio::test]
    async fn test_reconcile_adds_only_missing_columns() {
        let store = MemoryStore::new();
        let mut stale = jobs_schema(Package::Espresso);
        stale.columns.retain(|c| c.name != "fermi_energy" && c.name != "scf_conv");
        store.create_table(&stale).await.unwrap();

        let added = reconcile(&store, &jobs_schema(Package::Espresso)).await.unwrap();
        assert_eq!(added, vec!["fermi_energy", "scf_conv"]);

        let again = reconcile(&store, &jobs_schema(Package::Espresso)).await.unwrap();
        assert!(again.is_empty());
    }

    #[tokio::test]
    async fn test_migrate_creates_both_tables() {
        let store = MemoryStore::new();
        let report = migrate(&store, Package::Vasp).await.unwrap();
        assert!(report.added.is_empty());

        let live = store.live_columns("vasp_job_status").await.unwrap();
        assert!(live.contains(&"secondary_file".to_string()));
    }

    #[test]
    fn test_filter_to_existing() {
        let mut row = Row::new().with("user_id", "u1").with("future_field", 2.0);
        let dropped = filter_to_existing(&mut row, &["user_id".to_string()]);
        assert_eq!(dropped, vec!["future_field".to_string()]);
        assert_eq!(row.len(), 1);
    }
}
