//! Ingestion error types
//!
//! Missing patterns in an output file are not errors: parsers leave the field
//! empty. Schema drift is handled by additive migration. What remains is
//! reported here.

use std::path::PathBuf;

use qcdb_common::QcdbError;
use thiserror::Error;

use crate::store::StoreError;

pub type IngestResult<T> = Result<T, IngestError>;

#[derive(Error, Debug)]
pub enum IngestError {
    /// Output file missing or unreadable
    #[error("Output file {} is unavailable: {source}", path.display())]
    Unavailable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The store rejected a write or returned no generated identifier
    #[error("{operation} on table '{table}' failed: {source}")]
    Persistence {
        table: String,
        operation: &'static str,
        #[source]
        source: StoreError,
    },

    /// The job row committed but its status row did not; retry the status write only
    #[error("Job {job_id} was stored but its status was not recorded: {source}")]
    StatusNotRecorded {
        job_id: i64,
        #[source]
        source: Box<IngestError>,
    },

    /// A re-check named a job that was never stored
    #[error("Job {job_id} does not exist in table '{table}'")]
    UnknownJob { table: String, job_id: i64 },

    #[error("Configuration error: {0}")]
    Config(String),

    /// A built-in extraction pattern failed to compile
    #[error("Invalid output pattern: {0}")]
    Pattern(#[from] regex::Error),

    #[error(transparent)]
    Common(#[from] QcdbError),
}

impl IngestError {
    pub fn unavailable(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Unavailable {
            path: path.into(),
            source,
        }
    }

    pub fn persistence(table: impl Into<String>, operation: &'static str, source: StoreError) -> Self {
        Self::Persistence {
            table: table.into(),
            operation,
            source,
        }
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }
}
