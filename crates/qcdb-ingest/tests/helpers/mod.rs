//! Shared fixtures for ingestion integration tests
//!
//! Output files are written into a temporary directory that lives as long as
//! the returned [`Workdir`].

#![allow(dead_code)]

use std::path::PathBuf;
use std::time::Duration;

use qcdb_ingest::config::IngestConfig;

/// Finished Quantum ESPRESSO scf run
pub const QE_SCF: &str = r#"
     Program PWSCF v.7.2 starts on 12Mar2024 at 10:15:30

     lattice parameter (alat)  =      10.2000  a.u.
     number of atomic types    =            1
     number of Kohn-Sham states=            8
     kinetic-energy cutoff     =      30.0000  Ry

     crystal axes: (cart. coord. in units of alat)
               a(1) = (  -0.500000   0.000000   0.500000 )
               a(2) = (   0.000000   0.500000   0.500000 )
               a(3) = (  -0.500000   0.500000   0.000000 )

     PseudoPot. # 1 for Si read from file:
     /home/user/PSEUDOPOTENTIALS/Si.pbe-n-rrkjus_psl.1.0.0.UPF

     total energy              =     -123.456 Ry

     convergence has been achieved in   6 iterations

     JOB DONE.
     This run was terminated on:  10:20:45  12Mar2024
"#;

/// Finished Quantum ESPRESSO nscf run
pub const QE_NSCF: &str = r#"
     Program PWSCF v.7.2 starts on 12Mar2024 at 10:21:00

     the Fermi energy is     6.4821 ev

     JOB DONE.
     This run was terminated on:  10:30:00  12Mar2024
"#;

pub const VASPRUN: &str = r#"<?xml version="1.0" encoding="ISO-8859-1"?>
<modeling>
 <generator>
  <i name="date" type="string">2024 03 12 </i>
  <i name="time" type="string">10:15:30 </i>
 </generator>
 <incar>
  <i type="string" name="GGA">PE</i>
  <i name="ENCUT">    400.00000000</i>
 </incar>
 <atominfo>
  <atoms>       2 </atoms>
 </atominfo>
 <calculation>
  <energy>
   <i name="e_fr_energy">    -10.84726015 </i>
   <i name="e_wo_entrp">    -10.84726015 </i>
   <i name="e_0_energy">    -10.84726015 </i>
  </energy>
 </calculation>
 <dos>
  <i name="efermi">      5.81471523 </i>
 </dos>
</modeling>
"#;

/// ORCA orbital table with `occupied` singly occupied and `empty` empty orbitals
pub fn orbital_table(occupied: u32, empty: u32) -> String {
    let mut table = String::from("  NO   OCC          E(Eh)            E(eV)\n");
    for i in 0..occupied {
        table.push_str(&format!(
            "  {:>3}   1.0000     {:>10.6}     {:>10.4}\n",
            i,
            -1.0 + 0.05 * f64::from(i),
            -27.2 + 1.36 * f64::from(i)
        ));
    }
    for i in occupied..occupied + empty {
        table.push_str(&format!("  {:>3}   0.0000       0.012345       0.3359\n", i));
    }
    table.push('\n');
    table
}

/// Unrestricted ORCA output that terminated normally
pub fn orca_output(up: (u32, u32), down: (u32, u32)) -> String {
    format!(
        "SCF CONVERGED AFTER  14 CYCLES\n\
         ----------------\nORBITAL ENERGIES\n----------------\n\
         \x20                SPIN UP ORBITALS\n{}\
         \x20                SPIN DOWN ORBITALS\n{}\n\
         FINAL SINGLE POINT ENERGY      -150.123456\n\
         ****ORCA TERMINATED NORMALLY****\n",
        orbital_table(up.0, up.1),
        orbital_table(down.0, down.1)
    )
}

/// Short poll interval with a bounded budget so tests never wait long
pub fn test_config() -> IngestConfig {
    IngestConfig {
        poll_interval: Duration::from_secs(1),
        timeout: Some(Duration::from_secs(5)),
    }
}

pub struct Workdir {
    dir: tempfile::TempDir,
}

impl Workdir {
    pub fn new() -> Self {
        Self {
            dir: tempfile::tempdir().expect("Failed to create temp dir"),
        }
    }

    pub fn write(&self, name: &str, body: &str) -> PathBuf {
        let path = self.dir.path().join(name);
        std::fs::write(&path, body).expect("Failed to write fixture");
        path
    }

    /// Path inside the workdir that is never created
    pub fn missing(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }
}
