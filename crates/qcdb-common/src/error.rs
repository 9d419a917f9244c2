//! Error types for QCDB

use thiserror::Error;

/// Result type alias for QCDB operations
pub type Result<T> = std::result::Result<T, QcdbError>;

/// Main error type shared by the workspace crates
#[derive(Error, Debug)]
pub enum QcdbError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid job status: {0}")]
    InvalidStatus(String),

    #[error("Unsupported package: {0} (expected qe, vasp or orca)")]
    UnknownPackage(String),
}
