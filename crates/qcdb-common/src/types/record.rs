//! Normalized job record
//!
//! Every parser produces a [`NormalizedRecord`]. All result fields are
//! optional: `None` means the value was not present in the output, which is
//! kept distinct from a parsed zero.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::{JobIdentity, Package};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedRecord {
    #[serde(flatten)]
    pub identity: JobIdentity,

    /// Simulation start, from the package's run banner
    pub created_at: Option<NaiveDateTime>,

    /// Simulation end, from the package's termination banner
    pub completed_at: Option<NaiveDateTime>,

    pub results: PackageResults,
}

impl NormalizedRecord {
    pub fn new(identity: JobIdentity, results: PackageResults) -> Self {
        Self {
            identity,
            created_at: None,
            completed_at: None,
            results,
        }
    }

    pub fn package(&self) -> Package {
        self.results.package()
    }

    /// SCF convergence flag; `false` when the package reports none
    pub fn converged(&self) -> bool {
        match &self.results {
            PackageResults::Espresso(r) => r.scf_converged,
            PackageResults::Vasp(_) => false,
            PackageResults::Orca(r) => r.scf_converged,
        }
    }
}

/// Package-specific part of a record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "package", rename_all = "lowercase")]
pub enum PackageResults {
    Espresso(EspressoResults),
    Vasp(VaspResults),
    Orca(OrcaResults),
}

impl PackageResults {
    pub fn package(&self) -> Package {
        match self {
            PackageResults::Espresso(_) => Package::Espresso,
            PackageResults::Vasp(_) => Package::Vasp,
            PackageResults::Orca(_) => Package::Orca,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EspressoResults {
    /// Kinetic-energy cutoff (Ry)
    pub energy_cutoff: Option<f64>,
    /// Lattice parameter alat (bohr)
    pub lattice_param: Option<f64>,
    pub num_atomic_types: Option<i64>,
    pub kohn_sham_states: Option<i64>,
    /// Final total energy (Ry)
    pub total_energy: Option<f64>,
    /// Fermi energy (eV), from the nscf run when available
    pub fermi_energy: Option<f64>,
    pub pseudopotentials: Option<Vec<String>>,
    /// Crystal axes a(1)..a(3) in units of alat
    pub crystal_axes: Option<Vec<[f64; 3]>>,
    pub scf_converged: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VaspResults {
    pub encut: Option<f64>,
    pub num_atoms: Option<i64>,
    pub basis_vectors: Option<Vec<[f64; 3]>>,
    pub kpoints: Option<Vec<[f64; 3]>>,
    pub xc_functional: Option<String>,
    /// Element symbol -> pseudopotential label
    pub pseudopotentials: Option<BTreeMap<String, String>>,
    pub fermi_energy: Option<f64>,
    pub total_energies: Option<VaspEnergies>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VaspEnergies {
    pub e_fr_energy: Option<f64>,
    pub e_wo_entrp: Option<f64>,
    pub e_0_energy: Option<f64>,
}

impl VaspEnergies {
    pub fn is_empty(&self) -> bool {
        self.e_fr_energy.is_none() && self.e_wo_entrp.is_none() && self.e_0_energy.is_none()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OrcaResults {
    /// FINAL SINGLE POINT ENERGY (Eh)
    pub final_energy: Option<f64>,
    pub scf_converged: bool,
    /// Omitted entirely when either spin channel has no LUMO
    pub orbitals: Option<OrbitalSummary>,
    pub vibrational_frequencies: Option<Vec<VibrationalMode>>,
    pub ir_spectrum: Option<Vec<IrPeak>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrbitalSummary {
    pub spin_up: OrbitalWindow,
    pub spin_down: OrbitalWindow,
}

/// LUMO plus up to nine HOMOs directly below it, ascending by index
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrbitalWindow {
    pub lumo: Orbital,
    pub homos: Vec<Orbital>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Orbital {
    pub index: u32,
    pub occupation: f64,
    pub energy_hartree: f64,
    pub energy_ev: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VibrationalMode {
    pub mode: u32,
    pub frequency_cm1: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IrPeak {
    pub mode: u32,
    pub frequency_cm1: f64,
    pub epsilon: f64,
    pub intensity: f64,
    /// Transition dipole (TX, TY, TZ)
    pub coordinates: [f64; 3],
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_absent_fields_stay_null_in_json() {
        let record = NormalizedRecord::new(
            JobIdentity::new("u1", "h2o"),
            PackageResults::Espresso(EspressoResults {
                total_energy: Some(0.0),
                ..Default::default()
            }),
        );

        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["user_id"], "u1");
        assert_eq!(json["results"]["package"], "espresso");
        assert_eq!(json["results"]["total_energy"], 0.0);
        assert!(json["results"]["fermi_energy"].is_null());
        assert!(json["created_at"].is_null());
    }

    #[test]
    fn test_converged_per_package() {
        let orca = NormalizedRecord::new(
            JobIdentity::new("u1", "benzene"),
            PackageResults::Orca(OrcaResults {
                scf_converged: true,
                ..Default::default()
            }),
        );
        assert!(orca.converged());
        assert_eq!(orca.package(), Package::Orca);

        let vasp = NormalizedRecord::new(
            JobIdentity::new("u1", "si"),
            PackageResults::Vasp(VaspResults::default()),
        );
        assert!(!vasp.converged());
    }

    #[test]
    fn test_vasp_energies_empty() {
        assert!(VaspEnergies::default().is_empty());
        let energies = VaspEnergies {
            e_0_energy: Some(-10.5),
            ..Default::default()
        };
        assert!(!energies.is_empty());
    }
}
