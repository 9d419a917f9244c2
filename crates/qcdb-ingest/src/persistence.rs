//! Job and job-status persistence
//!
//! Jobs are insert-only: every ingestion creates a new row and gets a fresh
//! `job_id`. Status rows are upserted on `job_id` so a job never has more
//! than one. Rows are filtered to the live column set before every write.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{NaiveDateTime, Utc};
use qcdb_common::{JobStatusState, NormalizedRecord, Package, PackageResults};
use serde::Serialize;
use tracing::{info, warn};

use crate::error::{IngestError, IngestResult};
use crate::monitor::TransitionObserver;
use crate::schema::{filter_to_existing, jobs_table, status_table};
use crate::store::{ColumnValue, JobStore, Row, StoreError};

/// Desired state of a job's status row
#[derive(Debug, Clone, PartialEq)]
pub struct StatusRecord {
    pub job_id: i64,
    pub user_id: String,
    pub status: JobStatusState,
    pub output_file: String,
    pub secondary_file: Option<String>,
    pub recorded_at: NaiveDateTime,
}

/// Whether an upsert created the status row or updated it in place
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Inserted,
    Updated,
}

fn json_column<T: Serialize>(value: Option<&T>) -> qcdb_common::Result<ColumnValue> {
    Ok(match value {
        Some(v) => ColumnValue::Json(serde_json::to_value(v)?),
        None => ColumnValue::Null,
    })
}

/// Map a normalized record onto the columns of `<prefix>_jobs`
pub fn job_row(record: &NormalizedRecord, updated_at: NaiveDateTime) -> qcdb_common::Result<Row> {
    let mut row = Row::new()
        .with("package", record.package().label())
        .with("user_id", record.identity.user_id.as_str())
        .with("sys_name", record.identity.sys_name.as_str())
        .with("description", record.identity.description.clone())
        .with("updated_at", updated_at)
        .with("created_at", record.created_at)
        .with("completed_at", record.completed_at);

    match &record.results {
        PackageResults::Espresso(r) => {
            row.set("energy_cutoff", r.energy_cutoff);
            row.set("lattice_param", r.lattice_param);
            row.set("num_atomic_types", r.num_atomic_types);
            row.set("kohn_sham_states", r.kohn_sham_states);
            row.set("total_energy", r.total_energy);
            row.set("fermi_energy", r.fermi_energy);
            row.set("pseudopotentials", json_column(r.pseudopotentials.as_ref())?);
            row.set("crystal_coord", json_column(r.crystal_axes.as_ref())?);
            row.set("scf_conv", r.scf_converged);
        },
        PackageResults::Vasp(r) => {
            row.set("encut", r.encut);
            row.set("num_atoms", r.num_atoms);
            row.set("basis_vec", json_column(r.basis_vectors.as_ref())?);
            row.set("kpoints", json_column(r.kpoints.as_ref())?);
            row.set("xcorr", r.xc_functional.clone());
            row.set("pseudopot", json_column(r.pseudopotentials.as_ref())?);
            row.set("efermi", r.fermi_energy);
            row.set("toten", json_column(r.total_energies.as_ref())?);
        },
        PackageResults::Orca(r) => {
            row.set("final_energy", r.final_energy);
            row.set("scf_conv", r.scf_converged);
            row.set(
                "spin_up_orbitals",
                json_column(r.orbitals.as_ref().map(|o| &o.spin_up))?,
            );
            row.set(
                "spin_down_orbitals",
                json_column(r.orbitals.as_ref().map(|o| &o.spin_down))?,
            );
            row.set(
                "vibrational_frequencies",
                json_column(r.vibrational_frequencies.as_ref())?,
            );
            row.set("ir_spectrum", json_column(r.ir_spectrum.as_ref())?);
        },
    }

    Ok(row)
}

/// Writes jobs and statuses of one package through a [`JobStore`]
#[derive(Clone)]
pub struct JobRepository {
    store: Arc<dyn JobStore>,
    package: Package,
    jobs_table: String,
    status_table: String,
}

impl JobRepository {
    pub fn new(store: Arc<dyn JobStore>, package: Package) -> Self {
        Self {
            store,
            package,
            jobs_table: jobs_table(package),
            status_table: status_table(package),
        }
    }

    pub fn package(&self) -> Package {
        self.package
    }

    pub fn jobs_table(&self) -> &str {
        &self.jobs_table
    }

    pub fn status_table(&self) -> &str {
        &self.status_table
    }

    /// Filter `row` to the columns `table` has right now
    async fn storable(&self, table: &str, mut row: Row) -> IngestResult<Row> {
        let live = self
            .store
            .live_columns(table)
            .await
            .map_err(|e| IngestError::persistence(table, "inspect columns", e))?;

        let dropped = filter_to_existing(&mut row, &live);
        if !dropped.is_empty() {
            warn!(table, dropped = ?dropped, "Columns missing from live schema, values not stored");
        }
        Ok(row)
    }

    /// Insert a new job row and return its generated `job_id`
    pub async fn insert_job(&self, record: &NormalizedRecord, updated_at: NaiveDateTime) -> IngestResult<i64> {
        let row = job_row(record, updated_at)?;
        let row = self.storable(&self.jobs_table, row).await?;

        let job_id = self
            .store
            .insert(&self.jobs_table, &row, Some("job_id"))
            .await
            .map_err(|e| IngestError::persistence(&self.jobs_table, "insert", e))?
            .ok_or_else(|| {
                IngestError::persistence(
                    &self.jobs_table,
                    "insert",
                    StoreError::MissingIdentifier {
                        table: self.jobs_table.clone(),
                    },
                )
            })?;

        info!(
            package = %self.package,
            table = %self.jobs_table,
            job_id,
            user_id = %record.identity.user_id,
            sys_name = %record.identity.sys_name,
            "Job row inserted"
        );
        Ok(job_id)
    }

    /// Create or update the single status row of `status.job_id`
    pub async fn upsert_status(&self, status: &StatusRecord) -> IngestResult<UpsertOutcome> {
        let table = self.status_table.as_str();
        let exists = self
            .store
            .exists(table, "job_id", status.job_id)
            .await
            .map_err(|e| IngestError::persistence(table, "lookup", e))?;

        let changes = Row::new()
            .with("status", status.status.as_str())
            .with("output_file", status.output_file.as_str())
            .with("secondary_file", status.secondary_file.clone())
            .with("updated_at", status.recorded_at);

        let outcome = if exists {
            let row = self.storable(table, changes).await?;
            self.store
                .update(table, &row, "job_id", status.job_id)
                .await
                .map_err(|e| IngestError::persistence(table, "update", e))?;
            UpsertOutcome::Updated
        } else {
            let mut row = Row::new()
                .with("job_id", status.job_id)
                .with("user_id", status.user_id.as_str())
                .with("package", self.package.label());
            for (column, value) in changes.iter() {
                row.set(column, value.clone());
            }
            row.set("created_at", status.recorded_at);

            let row = self.storable(table, row).await?;
            self.store
                .insert(table, &row, None)
                .await
                .map_err(|e| IngestError::persistence(table, "insert", e))?;
            UpsertOutcome::Inserted
        };

        info!(
            package = %self.package,
            table,
            job_id = status.job_id,
            status = %status.status,
            outcome = ?outcome,
            "Job status recorded"
        );
        Ok(outcome)
    }
}

/// Observer that writes every monitor transition to the status table
///
/// Used when the job row already exists, so a crash after `COMPLETED` is
/// still visible from outside.
pub struct StatusWriter {
    repository: JobRepository,
    job_id: i64,
    user_id: String,
    output_file: String,
    secondary_file: Option<String>,
}

impl StatusWriter {
    pub fn new(
        repository: JobRepository,
        job_id: i64,
        user_id: impl Into<String>,
        output_file: impl Into<String>,
        secondary_file: Option<String>,
    ) -> Self {
        Self {
            repository,
            job_id,
            user_id: user_id.into(),
            output_file: output_file.into(),
            secondary_file,
        }
    }
}

#[async_trait]
impl TransitionObserver for StatusWriter {
    async fn on_transition(&self, from: Option<JobStatusState>, to: JobStatusState) -> IngestResult<()> {
        info!(job_id = self.job_id, from = ?from, status = %to, "Job status changed");
        let record = StatusRecord {
            job_id: self.job_id,
            user_id: self.user_id.clone(),
            status: to,
            output_file: self.output_file.clone(),
            secondary_file: self.secondary_file.clone(),
            recorded_at: Utc::now().naive_utc(),
        };
        self.repository.upsert_status(&record).await?;
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::schema::migrate;
    use crate::store::MemoryStore;
    use chrono::NaiveDate;
    use qcdb_common::{
        EspressoResults, JobIdentity, Orbital, OrbitalSummary, OrbitalWindow, OrcaResults,
    };

    fn at(hour: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 3, 12)
            .unwrap()
            .and_hms_opt(hour, 0, 0)
            .unwrap()
    }

    fn qe_record() -> NormalizedRecord {
        NormalizedRecord::new(
            JobIdentity::new("u1", "si").with_description("bulk"),
            PackageResults::Espresso(EspressoResults {
                total_energy: Some(-15.8),
                pseudopotentials: Some(vec!["Si.UPF".to_string()]),
                scf_converged: true,
                ..Default::default()
            }),
        )
    }

    fn status(job_id: i64, state: JobStatusState, hour: u32) -> StatusRecord {
        StatusRecord {
            job_id,
            user_id: "u1".to_string(),
            status: state,
            output_file: "scf.out".to_string(),
            secondary_file: Some("nscf.out".to_string()),
            recorded_at: at(hour),
        }
    }

    #[test]
    fn test_job_row_mapping() {
        let row = job_row(&qe_record(), at(9)).unwrap();
        assert_eq!(row.get("package").and_then(|v| v.as_text()), Some("QE"));
        assert_eq!(row.get("total_energy"), Some(&ColumnValue::Float(-15.8)));
        assert!(row.get("fermi_energy").unwrap().is_null());
        assert_eq!(
            row.get("pseudopotentials"),
            Some(&ColumnValue::Json(serde_json::json!(["Si.UPF"])))
        );
        assert_eq!(row.get("scf_conv"), Some(&ColumnValue::Bool(true)));
    }

    #[test]
    fn test_orca_orbitals_split_per_channel() {
        let orbital = |index| Orbital {
            index,
            occupation: 0.0,
            energy_hartree: 0.01,
            energy_ev: 0.27,
        };
        let record = NormalizedRecord::new(
            JobIdentity::new("u1", "o2"),
            PackageResults::Orca(OrcaResults {
                orbitals: Some(OrbitalSummary {
                    spin_up: OrbitalWindow {
                        lumo: orbital(8),
                        homos: vec![],
                    },
                    spin_down: OrbitalWindow {
                        lumo: orbital(6),
                        homos: vec![],
                    },
                }),
                ..Default::default()
            }),
        );

        let row = job_row(&record, at(9)).unwrap();
        match row.get("spin_down_orbitals") {
            Some(ColumnValue::Json(v)) => assert_eq!(v["lumo"]["index"], 6),
            other => panic!("unexpected value {other:?}"),
        }
        assert!(row.get("ir_spectrum").unwrap().is_null());
    }

    #[tokio::test]
    async fn test_insert_job_returns_generated_ids() {
        let store = Arc::new(MemoryStore::new());
        migrate(&*store, Package::Espresso).await.unwrap();
        let repo = JobRepository::new(store.clone(), Package::Espresso);

        let first = repo.insert_job(&qe_record(), at(9)).await.unwrap();
        let second = repo.insert_job(&qe_record(), at(10)).await.unwrap();
        assert_ne!(first, second);
        assert_eq!(store.row_count("qe_jobs"), 2);
    }

    #[tokio::test]
    async fn test_missing_identifier_is_an_error() {
        let store = Arc::new(MemoryStore::new());
        migrate(&*store, Package::Espresso).await.unwrap();
        store.withhold_identifiers_from("qe_jobs");
        let repo = JobRepository::new(store.clone(), Package::Espresso);

        let err = repo.insert_job(&qe_record(), at(9)).await.unwrap_err();
        assert!(matches!(
            err,
            IngestError::Persistence {
                source: StoreError::MissingIdentifier { .. },
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_upsert_keeps_one_row_per_job() {
        let store = Arc::new(MemoryStore::new());
        migrate(&*store, Package::Espresso).await.unwrap();
        let repo = JobRepository::new(store.clone(), Package::Espresso);
        let job_id = repo.insert_job(&qe_record(), at(9)).await.unwrap();

        let outcomes = [
            repo.upsert_status(&status(job_id, JobStatusState::Pending, 9)).await.unwrap(),
            repo.upsert_status(&status(job_id, JobStatusState::Running, 10)).await.unwrap(),
            repo.upsert_status(&status(job_id, JobStatusState::Completed, 11)).await.unwrap(),
        ];
        assert_eq!(
            outcomes,
            [UpsertOutcome::Inserted, UpsertOutcome::Updated, UpsertOutcome::Updated]
        );

        let rows = store.rows_where("qe_job_status", "job_id", job_id);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].get("status").and_then(|v| v.as_text()), Some("COMPLETED"));
        assert_eq!(rows[0].get("created_at"), Some(&ColumnValue::Timestamp(at(9))));
        assert_eq!(rows[0].get("updated_at"), Some(&ColumnValue::Timestamp(at(11))));
    }

    #[tokio::test]
    async fn test_status_writer_records_transitions() {
        let store = Arc::new(MemoryStore::new());
        migrate(&*store, Package::Espresso).await.unwrap();
        let repo = JobRepository::new(store.clone(), Package::Espresso);
        let job_id = repo.insert_job(&qe_record(), at(9)).await.unwrap();

        let writer = StatusWriter::new(repo, job_id, "u1", "scf.out", None);
        writer.on_transition(None, JobStatusState::Pending).await.unwrap();
        writer
            .on_transition(Some(JobStatusState::Pending), JobStatusState::Failed)
            .await
            .unwrap();

        let rows = store.rows_where("qe_job_status", "job_id", job_id);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].get("status").and_then(|v| v.as_text()), Some("FAILED"));
    }
}
