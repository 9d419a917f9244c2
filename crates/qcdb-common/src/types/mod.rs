//! Common types used across QCDB

use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::error::QcdbError;

mod record;

pub use record::{
    EspressoResults, IrPeak, NormalizedRecord, Orbital, OrbitalSummary, OrbitalWindow,
    OrcaResults, PackageResults, VaspEnergies, VaspResults, VibrationalMode,
};

/// Simulation package that produced an output file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Package {
    /// Quantum ESPRESSO (plane-wave DFT, scf + optional nscf text output)
    Espresso,
    /// VASP (periodic ab-initio, `vasprun.xml`)
    Vasp,
    /// ORCA (quantum chemistry, text output)
    Orca,
}

impl Package {
    pub const ALL: [Package; 3] = [Package::Espresso, Package::Vasp, Package::Orca];

    /// Prefix of the `<prefix>_jobs` / `<prefix>_job_status` tables
    pub fn table_prefix(self) -> &'static str {
        match self {
            Package::Espresso => "qe",
            Package::Vasp => "vasp",
            Package::Orca => "orca",
        }
    }

    /// Value written to the `package` column
    pub fn label(self) -> &'static str {
        match self {
            Package::Espresso => "QE",
            Package::Vasp => "vasp",
            Package::Orca => "ORCA",
        }
    }

    /// Whether the package writes a second output file worth monitoring
    pub fn has_secondary_output(self) -> bool {
        matches!(self, Package::Espresso)
    }
}

impl std::fmt::Display for Package {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.table_prefix())
    }
}

impl FromStr for Package {
    type Err = QcdbError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "qe" | "espresso" | "quantum_espresso" | "quantum-espresso" => Ok(Package::Espresso),
            "vasp" => Ok(Package::Vasp),
            "orca" => Ok(Package::Orca),
            _ => Err(QcdbError::UnknownPackage(s.to_string())),
        }
    }
}

/// Lifecycle state of a monitored job
///
/// `Pending -> Running -> {Completed | Failed | Timeout}`. The last three are
/// terminal; the monitor never leaves them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum JobStatusState {
    Pending,
    Running,
    Completed,
    Failed,
    Timeout,
}

impl JobStatusState {
    pub fn as_str(self) -> &'static str {
        match self {
            JobStatusState::Pending => "PENDING",
            JobStatusState::Running => "RUNNING",
            JobStatusState::Completed => "COMPLETED",
            JobStatusState::Failed => "FAILED",
            JobStatusState::Timeout => "TIMEOUT",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            JobStatusState::Completed | JobStatusState::Failed | JobStatusState::Timeout
        )
    }
}

impl std::fmt::Display for JobStatusState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobStatusState {
    type Err = QcdbError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "PENDING" => Ok(JobStatusState::Pending),
            "RUNNING" => Ok(JobStatusState::Running),
            "COMPLETED" => Ok(JobStatusState::Completed),
            "FAILED" => Ok(JobStatusState::Failed),
            "TIMEOUT" => Ok(JobStatusState::Timeout),
            _ => Err(QcdbError::InvalidStatus(s.to_string())),
        }
    }
}

/// Caller-supplied labels attached to every ingested job
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobIdentity {
    pub user_id: String,
    pub sys_name: String,
    pub description: Option<String>,
}

impl JobIdentity {
    pub fn new(user_id: impl Into<String>, sys_name: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            sys_name: sys_name.into(),
            description: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}
