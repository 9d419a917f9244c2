//! QCDB Ingest Library
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Ingests finished (or still running) computational-chemistry jobs into a
//! relational store.
//!
//! # Supported Packages
//!
//! - **Quantum ESPRESSO**: scf output plus an optional nscf output
//! - **VASP**: `vasprun.xml`
//! - **ORCA**: text output with orbital energies and vibrational analysis
//!
//! # Pipeline
//!
//! ```text
//! CONNECT -> RECONCILE_SCHEMA -> MONITOR -> PARSE -> PERSIST_JOB -> PERSIST_STATUS -> DONE
//! ```
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use qcdb_common::{JobIdentity, Package};
//! use qcdb_ingest::{config::IngestConfig, pipeline::{IngestRequest, Pipeline}, store::MemoryStore};
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> anyhow::Result<()> {
//!     let config = IngestConfig::load()?;
//!     let request = IngestRequest::new(Package::Orca, "benzene.out", JobIdentity::new("u1", "benzene"));
//!     let outcome = Pipeline::new(Arc::new(MemoryStore::new()), config).run(&request).await?;
//!     println!("stored job {}", outcome.job_id);
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod monitor;
pub mod parsers;
pub mod persistence;
pub mod pipeline;
pub mod schema;
pub mod store;

pub use error::{IngestError, IngestResult};
