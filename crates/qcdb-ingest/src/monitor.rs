//! Job completion monitor
//!
//! Re-reads the whole output file(s) on every tick and classifies the run:
//!
//! - completion marker in every monitored file: `COMPLETED`
//! - any error marker, or a monitored file missing or unreadable: `FAILED`
//! - time budget spent without either: `TIMEOUT`
//!
//! All three are terminal. The monitor starts in `PENDING`, moves to
//! `RUNNING` on the first inconclusive read, and reports every transition to
//! a [`TransitionObserver`] as it happens.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use qcdb_common::{JobStatusState, Package};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::config::IngestConfig;
use crate::error::IngestResult;

/// Package-specific strings that decide the state of a run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MarkerSet {
    pub completion: &'static str,
    pub errors: &'static [&'static str],
}

impl MarkerSet {
    pub fn for_package(package: Package) -> Self {
        match package {
            Package::Espresso => Self {
                completion: "JOB DONE",
                errors: &["Error in routine"],
            },
            Package::Vasp => Self {
                completion: "</modeling>",
                errors: &[],
            },
            Package::Orca => Self {
                completion: "****ORCA TERMINATED NORMALLY****",
                errors: &["ORCA finished by error termination", "aborting the run"],
            },
        }
    }

    /// Classify one snapshot of every monitored file; `None` means still running
    pub fn classify<S: AsRef<str>>(&self, contents: &[S]) -> Option<JobStatusState> {
        if contents.is_empty() {
            return None;
        }
        if contents.iter().all(|c| c.as_ref().contains(self.completion)) {
            return Some(JobStatusState::Completed);
        }
        let failed = contents
            .iter()
            .any(|c| self.errors.iter().any(|marker| c.as_ref().contains(marker)));
        failed.then_some(JobStatusState::Failed)
    }
}

/// Receives every state change while a job is monitored
#[async_trait]
pub trait TransitionObserver: Send + Sync {
    async fn on_transition(&self, from: Option<JobStatusState>, to: JobStatusState) -> IngestResult<()>;
}

/// Observer that only logs
#[derive(Debug, Default, Clone, Copy)]
pub struct LogObserver;

#[async_trait]
impl TransitionObserver for LogObserver {
    async fn on_transition(&self, from: Option<JobStatusState>, to: JobStatusState) -> IngestResult<()> {
        info!(from = ?from, status = %to, "Job status changed");
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct JobMonitor {
    markers: MarkerSet,
    poll_interval: Duration,
    timeout: Option<Duration>,
}

impl JobMonitor {
    pub fn new(markers: MarkerSet, poll_interval: Duration, timeout: Option<Duration>) -> Self {
        Self {
            markers,
            poll_interval,
            timeout,
        }
    }

    pub fn for_package(package: Package, config: &IngestConfig) -> Self {
        Self::new(MarkerSet::for_package(package), config.poll_interval, config.timeout)
    }

    /// Read every monitored file once and classify the snapshot
    pub async fn check(&self, files: &[PathBuf]) -> Option<JobStatusState> {
        let mut contents = Vec::with_capacity(files.len());
        for path in files {
            match tokio::fs::read(path).await {
                Ok(bytes) => contents.push(String::from_utf8_lossy(&bytes).into_owned()),
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Monitored file unavailable, marking job failed");
                    return Some(JobStatusState::Failed);
                },
            }
        }
        self.markers.classify(contents.as_slice())
    }

    /// Poll until a terminal state is reached or the time budget is spent
    pub async fn watch(
        &self,
        primary: &Path,
        secondary: Option<&Path>,
        observer: &dyn TransitionObserver,
    ) -> IngestResult<JobStatusState> {
        let files: Vec<PathBuf> = std::iter::once(primary)
            .chain(secondary)
            .map(Path::to_path_buf)
            .collect();
        let started = Instant::now();

        let mut current = JobStatusState::Pending;
        observer.on_transition(None, current).await?;

        loop {
            let next = self.check(&files).await.unwrap_or(JobStatusState::Running);
            if next != current {
                observer.on_transition(Some(current), next).await?;
                current = next;
            }
            if current.is_terminal() {
                return Ok(current);
            }

            let mut wait = self.poll_interval;
            if let Some(budget) = self.timeout {
                let elapsed = started.elapsed();
                if elapsed >= budget {
                    warn!(elapsed_secs = elapsed.as_secs(), "Monitor time budget exhausted");
                    observer
                        .on_transition(Some(current), JobStatusState::Timeout)
                        .await?;
                    return Ok(JobStatusState::Timeout);
                }
                wait = wait.min(budget - elapsed);
            }

            debug!(wait_secs = wait.as_secs_f64(), "Job still running");
            tokio::time::sleep(wait).await;
        }
    }
}
