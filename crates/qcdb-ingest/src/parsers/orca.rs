//! ORCA text output parser

use qcdb_common::{
    IrPeak, JobIdentity, NormalizedRecord, Orbital, OrbitalSummary, OrbitalWindow, OrcaResults,
    PackageResults, VibrationalMode,
};
use regex::Regex;

use super::{last_number, parse_number, NUMBER};

/// HOMOs kept directly below the LUMO
pub const HOMO_WINDOW: usize = 9;

pub struct OrcaParser {
    final_energy: Regex,
    spin_up: Regex,
    spin_down: Regex,
    orbital_row: Regex,
    frequencies_header: Regex,
    frequency_row: Regex,
    ir_header: Regex,
    ir_row: Regex,
}

impl OrcaParser {
    pub fn new() -> Result<Self, regex::Error> {
        Ok(Self {
            final_energy: Regex::new(&format!(r"FINAL SINGLE POINT ENERGY\s+({NUMBER})"))?,
            spin_up: Regex::new(r"\bSPIN\s+UP\s+ORBITALS\b")?,
            spin_down: Regex::new(r"\bSPIN\s+DOWN\s+ORBITALS\b")?,
            orbital_row: Regex::new(&format!(
                r"^\s*(\d+)\s+(\d+\.\d+)\s+({NUMBER})\s+({NUMBER})\s*$"
            ))?,
            frequencies_header: Regex::new(r"VIBRATIONAL FREQUENCIES")?,
            frequency_row: Regex::new(&format!(r"(?m)^\s*(\d+):\s*({NUMBER})\s*cm\*\*-1"))?,
            ir_header: Regex::new(r"IR SPECTRUM")?,
            ir_row: Regex::new(&format!(
                r"(?m)^\s*(\d+):\s*({NUMBER})\s+({NUMBER})\s+({NUMBER})(?:\s+{NUMBER})?\s*\(([^)]*)\)"
            ))?,
        })
    }

    pub fn parse(&self, identity: JobIdentity, text: &str) -> NormalizedRecord {
        let results = OrcaResults {
            final_energy: last_number(&self.final_energy, text),
            scf_converged: text.contains("SCF CONVERGED AFTER"),
            orbitals: self.orbitals(text),
            vibrational_frequencies: self.frequencies(text),
            ir_spectrum: self.ir_spectrum(text),
        };
        NormalizedRecord::new(identity, PackageResults::Orca(results))
    }

    /// Orbital windows from the most recent spin-up/spin-down section pair
    ///
    /// `None` unless both channels have a LUMO.
    pub fn orbitals(&self, text: &str) -> Option<OrbitalSummary> {
        let down = self.spin_down.find_iter(text).last()?;
        let up = self.spin_up.find_iter(&text[..down.start()]).last()?;

        let spin_up = window(self.orbital_rows(&text[up.end()..down.start()]))?;
        let spin_down = window(self.orbital_rows(&text[down.end()..]))?;

        Some(OrbitalSummary { spin_up, spin_down })
    }

    /// Rows of the first orbital table in `section`
    fn orbital_rows(&self, section: &str) -> Vec<Orbital> {
        let mut rows = Vec::new();
        for line in section.lines() {
            let parsed = self.orbital_row.captures(line).and_then(|c| {
                Some(Orbital {
                    index: c[1].parse().ok()?,
                    occupation: parse_number(&c[2])?,
                    energy_hartree: parse_number(&c[3])?,
                    energy_ev: parse_number(&c[4])?,
                })
            });
            match parsed {
                Some(orbital) => rows.push(orbital),
                None if !rows.is_empty() => break,
                None => {},
            }
        }
        rows
    }

    fn frequencies(&self, text: &str) -> Option<Vec<VibrationalMode>> {
        let section = last_section(&self.frequencies_header, text);
        let modes: Vec<VibrationalMode> = self
            .frequency_row
            .captures_iter(section)
            .filter_map(|c| {
                Some(VibrationalMode {
                    mode: c[1].parse().ok()?,
                    frequency_cm1: parse_number(&c[2])?,
                })
            })
            .collect();
        (!modes.is_empty()).then_some(modes)
    }

    fn ir_spectrum(&self, text: &str) -> Option<Vec<IrPeak>> {
        let section = last_section(&self.ir_header, text);
        let peaks: Vec<IrPeak> = self
            .ir_row
            .captures_iter(section)
            .filter_map(|c| {
                Some(IrPeak {
                    mode: c[1].parse().ok()?,
                    frequency_cm1: parse_number(&c[2])?,
                    epsilon: parse_number(&c[3])?,
                    intensity: parse_number(&c[4])?,
                    coordinates: coordinates(&c[5])?,
                })
            })
            .collect();
        (!peaks.is_empty()).then_some(peaks)
    }
}

/// Text after the last match of `header`, or all of it when there is none
fn last_section<'a>(header: &Regex, text: &'a str) -> &'a str {
    let start = header.find_iter(text).last().map_or(0, |m| m.end());
    &text[start..]
}

/// LUMO = first empty orbital; HOMOs = up to [`HOMO_WINDOW`] singly occupied
/// orbitals with a lower index, ascending
fn window(rows: Vec<Orbital>) -> Option<OrbitalWindow> {
    let lumo = rows.iter().find(|o| o.occupation == 0.0)?.clone();

    let mut homos: Vec<Orbital> = rows
        .into_iter()
        .filter(|o| o.occupation == 1.0 && o.index < lumo.index)
        .collect();
    homos.sort_by_key(|o| o.index);
    let homos = homos.split_off(homos.len().saturating_sub(HOMO_WINDOW));

    Some(OrbitalWindow { lumo, homos })
}

/// Three floats from the inside of `( tx, ty, tz )`, any spacing or commas
fn coordinates(inner: &str) -> Option<[f64; 3]> {
    let values: Vec<f64> = inner
        .split(|c: char| c.is_whitespace() || c == ',')
        .filter(|s| !s.is_empty())
        .map(parse_number)
        .collect::<Option<_>>()?;
    match values.as_slice() {
        [x, y, z] => Some([*x, *y, *z]),
        _ => None,
    }
}
