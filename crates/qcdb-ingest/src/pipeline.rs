//! Ingestion pipeline
//!
//! Drives one job through the same sequence for every package:
//!
//! ```text
//! CONNECT -> RECONCILE_SCHEMA -> MONITOR -> PARSE -> PERSIST_JOB -> PERSIST_STATUS -> DONE
//! ```
//!
//! Any failing step ends the run with an error naming that step. Steps that
//! already committed are not rolled back: a job row whose status write failed
//! stays in place and the error carries its `job_id`.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use qcdb_common::{JobIdentity, JobStatusState, NormalizedRecord, Package};
use serde::Serialize;
use tracing::{error, info, warn};

use crate::config::IngestConfig;
use crate::error::{IngestError, IngestResult};
use crate::monitor::{JobMonitor, LogObserver};
use crate::parsers::parse_output;
use crate::persistence::{JobRepository, StatusRecord, StatusWriter};
use crate::schema::{jobs_table, migrate};
use crate::store::JobStore;

/// Pipeline step, in execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Stage {
    Connect,
    ReconcileSchema,
    Monitor,
    Parse,
    PersistJob,
    PersistStatus,
    Done,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Connect => "CONNECT",
            Stage::ReconcileSchema => "RECONCILE_SCHEMA",
            Stage::Monitor => "MONITOR",
            Stage::Parse => "PARSE",
            Stage::PersistJob => "PERSIST_JOB",
            Stage::PersistStatus => "PERSIST_STATUS",
            Stage::Done => "DONE",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One job to ingest
#[derive(Debug, Clone)]
pub struct IngestRequest {
    pub package: Package,
    pub output: PathBuf,
    /// nscf output for Quantum ESPRESSO; ignored by the other packages
    pub secondary: Option<PathBuf>,
    pub identity: JobIdentity,
}

impl IngestRequest {
    pub fn new(package: Package, output: impl Into<PathBuf>, identity: JobIdentity) -> Self {
        Self {
            package,
            output: output.into(),
            secondary: None,
            identity,
        }
    }

    pub fn with_secondary(mut self, path: impl Into<PathBuf>) -> Self {
        self.secondary = Some(path.into());
        self
    }

    /// Files the monitor must watch; a secondary file only counts for packages that have one
    fn monitored_secondary(&self) -> Option<&Path> {
        self.secondary
            .as_deref()
            .filter(|_| self.package.has_secondary_output())
    }
}

/// Result of a successful run
#[derive(Debug, Clone, Serialize)]
pub struct IngestOutcome {
    pub job_id: i64,
    pub status: JobStatusState,
    pub record: NormalizedRecord,
}

/// Re-monitor the files of a job that is already stored
#[derive(Debug, Clone)]
pub struct RecheckRequest {
    pub package: Package,
    pub job_id: i64,
    pub user_id: String,
    pub output: PathBuf,
    pub secondary: Option<PathBuf>,
}

pub struct Pipeline {
    store: Arc<dyn JobStore>,
    config: IngestConfig,
}

impl Pipeline {
    pub fn new(store: Arc<dyn JobStore>, config: IngestConfig) -> Self {
        Self { store, config }
    }

    pub fn config(&self) -> &IngestConfig {
        &self.config
    }

    /// Run every stage for `request`
    pub async fn run(&self, request: &IngestRequest) -> IngestResult<IngestOutcome> {
        let start_time = Instant::now();
        let mut stage = Stage::Connect;

        let result = self.execute(request, &mut stage).await;
        match &result {
            Ok(outcome) => info!(
                package = %request.package,
                job_id = outcome.job_id,
                status = %outcome.status,
                duration_secs = start_time.elapsed().as_secs_f64(),
                "Ingestion complete"
            ),
            Err(e) => error!(
                package = %request.package,
                stage = %stage,
                error = %e,
                "Ingestion failed"
            ),
        }
        result
    }

    async fn execute(&self, request: &IngestRequest, stage: &mut Stage) -> IngestResult<IngestOutcome> {
        let package = request.package;
        let secondary = request.monitored_secondary();
        if let (Some(path), None) = (&request.secondary, secondary) {
            warn!(%package, path = %path.display(), "Package has no secondary output, ignoring file");
        }

        // Step 1: Make sure the store answers
        advance(stage, Stage::Connect, package);
        self.connect(package).await?;

        // Step 2: Create or extend the package tables
        advance(stage, Stage::ReconcileSchema, package);
        self.reconcile(package).await?;

        // Step 3: Wait for a terminal state
        advance(stage, Stage::Monitor, package);
        let monitor = JobMonitor::for_package(package, &self.config);
        let status = monitor.watch(&request.output, secondary, &LogObserver).await?;

        // Step 4: Parse whatever the output holds, finished or not
        advance(stage, Stage::Parse, package);
        let mut record =
            parse_output(package, request.identity.clone(), &request.output, secondary).await?;
        if status != JobStatusState::Completed {
            record.completed_at = None;
        }

        // Step 5: Insert the job row
        advance(stage, Stage::PersistJob, package);
        let repository = JobRepository::new(Arc::clone(&self.store), package);
        let recorded_at = Utc::now().naive_utc();
        let job_id = repository.insert_job(&record, recorded_at).await?;

        // Step 6: Record the final status; the job row stays even if this fails
        advance(stage, Stage::PersistStatus, package);
        let status_record = StatusRecord {
            job_id,
            user_id: request.identity.user_id.clone(),
            status,
            output_file: request.output.display().to_string(),
            secondary_file: secondary.map(|p| p.display().to_string()),
            recorded_at,
        };
        if let Err(e) = repository.upsert_status(&status_record).await {
            return Err(IngestError::StatusNotRecorded {
                job_id,
                source: Box::new(e),
            });
        }

        advance(stage, Stage::Done, package);
        Ok(IngestOutcome {
            job_id,
            status,
            record,
        })
    }

    /// Monitor a stored job again, writing each transition to its status row
    pub async fn recheck(&self, request: &RecheckRequest) -> IngestResult<JobStatusState> {
        let package = request.package;
        self.connect(package).await?;
        self.reconcile(package).await?;

        let table = jobs_table(package);
        let known = self
            .store
            .exists(&table, "job_id", request.job_id)
            .await
            .map_err(|e| IngestError::persistence(&table, "lookup", e))?;
        if !known {
            return Err(IngestError::UnknownJob {
                table,
                job_id: request.job_id,
            });
        }

        let secondary = request
            .secondary
            .as_deref()
            .filter(|_| package.has_secondary_output());
        let writer = StatusWriter::new(
            JobRepository::new(Arc::clone(&self.store), package),
            request.job_id,
            request.user_id.as_str(),
            request.output.display().to_string(),
            secondary.map(|p| p.display().to_string()),
        );

        let monitor = JobMonitor::for_package(package, &self.config);
        let status = monitor.watch(&request.output, secondary, &writer).await?;
        info!(%package, job_id = request.job_id, status = %status, "Recheck complete");
        Ok(status)
    }

    async fn connect(&self, package: Package) -> IngestResult<()> {
        self.store
            .ping()
            .await
            .map_err(|e| IngestError::persistence(jobs_table(package), "connect", e))
    }

    async fn reconcile(&self, package: Package) -> IngestResult<()> {
        let report = migrate(self.store.as_ref(), package)
            .await
            .map_err(|e| IngestError::persistence(jobs_table(package), "migrate", e))?;
        if !report.added.is_empty() {
            info!(%package, added = ?report.added, "Schema extended");
        }
        Ok(())
    }
}

fn advance(stage: &mut Stage, next: Stage, package: Package) {
    *stage = next;
    info!(%package, stage = %next, "Pipeline stage");
}
