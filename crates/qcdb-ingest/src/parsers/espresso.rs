//! Quantum ESPRESSO (pw.x) text output parser
//!
//! The scf output carries the structural and energetic data; the optional
//! nscf output only contributes the Fermi energy and, when present, the
//! termination time of the whole job.

use qcdb_common::{EspressoResults, JobIdentity, NormalizedRecord, PackageResults};
use regex::Regex;

use super::{banner_timestamp, first_integer, first_number, last_number, NUMBER};

/// Axis rows kept from a crystal axes block
const AXIS_COUNT: usize = 3;

pub struct EspressoParser {
    final_energy: Regex,
    iteration_energy: Regex,
    lattice_param: Regex,
    atomic_types: Regex,
    kohn_sham_states: Regex,
    energy_cutoff: Regex,
    pseudo_dir: Regex,
    pseudo_file: Regex,
    axes_header: Regex,
    axis: Regex,
    fermi_energy: Regex,
    start_banner: Regex,
    end_banner: Regex,
}

impl EspressoParser {
    pub fn new() -> Result<Self, regex::Error> {
        Ok(Self {
            final_energy: Regex::new(&format!(r"(?m)^\s*!\s*total energy\s*=\s*({NUMBER})"))?,
            iteration_energy: Regex::new(&format!(r"(?m)^\s*total energy\s*=\s*({NUMBER})"))?,
            lattice_param: Regex::new(&format!(r"lattice parameter \(alat\)\s*=\s*({NUMBER})"))?,
            atomic_types: Regex::new(r"number of atomic types\s*=\s*(\d+)")?,
            kohn_sham_states: Regex::new(r"number of Kohn-Sham states\s*=\s*(\d+)")?,
            energy_cutoff: Regex::new(&format!(r"kinetic-energy cutoff\s*=\s*({NUMBER})"))?,
            pseudo_dir: Regex::new(r"PSEUDOPOTENTIALS/(\S+)")?,
            pseudo_file: Regex::new(r"read from file:\s*(\S+)")?,
            axes_header: Regex::new(r"crystal axes:")?,
            axis: Regex::new(&format!(
                r"(?m)^\s*a\((\d)\)\s*=\s*\(\s*({NUMBER})\s+({NUMBER})\s+({NUMBER})\s*\)"
            ))?,
            fermi_energy: Regex::new(&format!(r"the Fermi energy is\s+({NUMBER})"))?,
            start_banner: Regex::new(
                r"starts on\s+(\d{1,2}[A-Za-z]{3}\s?\d{4})\s+at\s+(\d{1,2}:\s?\d{1,2}:\s?\d{1,2})",
            )?,
            end_banner: Regex::new(
                r"This run was terminated on:\s+(\d{1,2}:\s?\d{1,2}:\s?\d{1,2})\s+(\d{1,2}[A-Za-z]{3}\s?\d{4})",
            )?,
        })
    }

    pub fn parse(&self, identity: JobIdentity, scf: &str, nscf: Option<&str>) -> NormalizedRecord {
        let fermi_energy = nscf
            .and_then(|text| last_number(&self.fermi_energy, text))
            .or_else(|| last_number(&self.fermi_energy, scf));

        let results = EspressoResults {
            energy_cutoff: first_number(&self.energy_cutoff, scf),
            lattice_param: first_number(&self.lattice_param, scf),
            num_atomic_types: first_integer(&self.atomic_types, scf),
            kohn_sham_states: first_integer(&self.kohn_sham_states, scf),
            total_energy: self.total_energy(scf),
            fermi_energy,
            pseudopotentials: self.pseudopotentials(scf),
            crystal_axes: self.crystal_axes(scf),
            scf_converged: scf.contains("convergence has been achieved"),
        };

        let mut record = NormalizedRecord::new(identity, PackageResults::Espresso(results));
        record.created_at = self
            .start_banner
            .captures(scf)
            .and_then(|c| banner_timestamp(&c[1], &c[2]));
        record.completed_at = nscf
            .and_then(|text| self.termination(text))
            .or_else(|| self.termination(scf));
        record
    }

    /// Final `!`-marked energy; truncated runs fall back to the last iteration energy
    fn total_energy(&self, scf: &str) -> Option<f64> {
        last_number(&self.final_energy, scf).or_else(|| last_number(&self.iteration_energy, scf))
    }

    fn pseudopotentials(&self, scf: &str) -> Option<Vec<String>> {
        let mut names: Vec<String> = Vec::new();
        for captures in self.pseudo_dir.captures_iter(scf) {
            let name = captures[1].to_string();
            if !names.contains(&name) {
                names.push(name);
            }
        }

        if names.is_empty() {
            for captures in self.pseudo_file.captures_iter(scf) {
                let path = &captures[1];
                let name = path.rsplit('/').next().unwrap_or(path).to_string();
                if !names.contains(&name) {
                    names.push(name);
                }
            }
        }

        (!names.is_empty()).then_some(names)
    }

    /// Axes from the last `crystal axes:` block, at most three rows, unpadded
    fn crystal_axes(&self, scf: &str) -> Option<Vec<[f64; 3]>> {
        let start = self.axes_header.find_iter(scf).last().map_or(0, |m| m.end());
        let axes: Vec<[f64; 3]> = self
            .axis
            .captures_iter(&scf[start..])
            .take(AXIS_COUNT)
            .filter_map(|c| {
                Some([
                    super::parse_number(&c[2])?,
                    super::parse_number(&c[3])?,
                    super::parse_number(&c[4])?,
                ])
            })
            .collect();

        (!axes.is_empty()).then_some(axes)
    }

    fn termination(&self, text: &str) -> Option<chrono::NaiveDateTime> {
        self.end_banner
            .captures_iter(text)
            .last()
            .and_then(|c| banner_timestamp(&c[2], &c[1]))
    }
}
