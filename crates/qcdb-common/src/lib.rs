//! QCDB Common Library
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Shared types, logging and error handling for the QCDB ingestion workspace.
//!
//! # Overview
//!
//! - **Types**: the normalized job record every output parser produces, the
//!   package selector and the job status lifecycle
//! - **Error Handling**: common error type and result alias
//! - **Logging**: `tracing` subscriber setup driven by `LOG_*` variables
//!
//! # Example
//!
//! ```no_run
//! use qcdb_common::types::{JobIdentity, JobStatusState, Package};
//!
//! let identity = JobIdentity::new("u-42", "graphene-2x2");
//! let package: Package = "qe".parse().unwrap();
//! assert_eq!(package.table_prefix(), "qe");
//! assert!(JobStatusState::Timeout.is_terminal());
//! # let _ = identity;
//! ```

pub mod error;
pub mod logging;
pub mod types;

// Re-export commonly used types
pub use error::{QcdbError, Result};
pub use types::{
    EspressoResults, IrPeak, JobIdentity, JobStatusState, NormalizedRecord, Orbital, OrbitalSummary,
    OrbitalWindow, OrcaResults, Package, PackageResults, VaspEnergies, VaspResults, VibrationalMode,
};

#[cfg(test)]
mod tests {
    use crate::{
        EspressoResults, IrPeak, Orbital, OrbitalSummary, OrbitalWindow, OrcaResults, Package,
        PackageResults, VaspEnergies, VaspResults, VibrationalMode,
    };

    #[test]
    fn test_result_types_reachable_from_crate_root() {
        let espresso = PackageResults::Espresso(EspressoResults::default());
        let vasp = PackageResults::Vasp(VaspResults {
            total_energies: Some(VaspEnergies {
                e_0_energy: Some(-10.45),
                ..VaspEnergies::default()
            }),
            ..VaspResults::default()
        });

        let orbital = Orbital {
            index: 4,
            occupation: 0.0,
            energy_hartree: 0.01,
            energy_ev: 0.27,
        };
        let window = OrbitalWindow {
            lumo: orbital.clone(),
            homos: Vec::new(),
        };
        let orca = PackageResults::Orca(OrcaResults {
            orbitals: Some(OrbitalSummary {
                spin_up: window.clone(),
                spin_down: window,
            }),
            vibrational_frequencies: Some(vec![VibrationalMode {
                mode: 6,
                frequency_cm1: 1595.2,
            }]),
            ir_spectrum: Some(vec![IrPeak {
                mode: 6,
                frequency_cm1: 1595.2,
                epsilon: 0.01,
                intensity: 53.2,
                coordinates: [0.0, 0.0, 0.1],
            }]),
            ..OrcaResults::default()
        });

        assert_eq!(espresso.package(), Package::Espresso);
        assert_eq!(vasp.package(), Package::Vasp);
        assert_eq!(orca.package(), Package::Orca);
    }
}
