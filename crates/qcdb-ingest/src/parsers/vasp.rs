//! VASP `vasprun.xml` parser
//!
//! Streams the document with quick-xml, keeping a stack of open elements and
//! their `name` attributes. Repeated values (ENCUT, EFERMI, energies) keep
//! the last occurrence, which is the final ionic step. A malformed or
//! truncated document stops the scan and whatever was read so far is kept.

use std::collections::BTreeMap;

use chrono::NaiveDateTime;
use qcdb_common::{JobIdentity, NormalizedRecord, PackageResults, VaspEnergies, VaspResults};
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use tracing::warn;

use super::parse_number;

const BASIS_VECTORS: usize = 3;

#[derive(Debug)]
struct Element {
    tag: String,
    name: Option<String>,
}

impl Element {
    fn from_start(start: &BytesStart<'_>) -> Self {
        let tag = String::from_utf8_lossy(start.name().as_ref()).into_owned();
        let name = start
            .try_get_attribute("name")
            .ok()
            .flatten()
            .and_then(|attr| attr.unescape_value().ok().map(|v| v.trim().to_string()));
        Self { tag, name }
    }

    fn is(&self, tag: &str, name: &str) -> bool {
        self.tag == tag && self.name.as_deref() == Some(name)
    }
}

#[derive(Debug, Default)]
struct Scan {
    results: VaspResults,
    energies: VaspEnergies,
    basis: Vec<[f64; 3]>,
    kpoints: Vec<[f64; 3]>,
    pseudopotentials: BTreeMap<String, String>,
    atomtype_row: Vec<String>,
    generator_date: Option<String>,
    generator_time: Option<String>,
}

impl Scan {
    fn inside(stack: &[Element], tag: &str, name: &str) -> bool {
        stack.iter().any(|e| e.is(tag, name))
    }

    fn text(&mut self, stack: &[Element], text: &str) {
        let Some(current) = stack.last() else {
            return;
        };

        match (current.tag.as_str(), current.name.as_deref()) {
            ("i", Some("ENCUT")) => {
                if let Some(v) = parse_number(text) {
                    self.results.encut = Some(v);
                }
            },
            ("i", Some(name)) if name.eq_ignore_ascii_case("efermi") => {
                if let Some(v) = parse_number(text) {
                    self.results.fermi_energy = Some(v);
                }
            },
            ("i", Some("GGA")) => {
                let value = text.trim();
                if self.results.xc_functional.is_none() && !value.is_empty() && value != "--" {
                    self.results.xc_functional = Some(value.to_string());
                }
            },
            ("i", Some(name @ ("e_fr_energy" | "e_wo_entrp" | "e_0_energy"))) => {
                // Overflowed values print as asterisks; keep the last readable one
                if let Some(v) = parse_number(text) {
                    match name {
                        "e_fr_energy" => self.energies.e_fr_energy = Some(v),
                        "e_wo_entrp" => self.energies.e_wo_entrp = Some(v),
                        _ => self.energies.e_0_energy = Some(v),
                    }
                }
            },
            ("i", Some("date")) if in_generator(stack) => {
                self.generator_date = Some(text.trim().to_string());
            },
            ("i", Some("time")) if in_generator(stack) => {
                self.generator_time = Some(text.trim().to_string());
            },
            ("atoms", _) if stack.iter().any(|e| e.tag == "atominfo") => {
                if let Ok(count) = text.trim().parse() {
                    self.results.num_atoms = Some(count);
                }
            },
            ("v", _) => {
                if Self::inside(stack, "varray", "basis") && self.basis.len() < BASIS_VECTORS {
                    if let Some(vector) = triple(text) {
                        self.basis.push(vector);
                    }
                } else if Self::inside(stack, "varray", "kpointlist") {
                    if let Some(vector) = triple(text) {
                        self.kpoints.push(vector);
                    }
                }
            },
            ("c", _) if Self::inside(stack, "array", "atomtypes") => {
                self.atomtype_row.push(text.trim().to_string());
            },
            _ => {},
        }
    }

    fn end(&mut self, closed: &Element, stack: &[Element]) {
        if closed.tag == "rc" && Self::inside(stack, "array", "atomtypes") {
            let row = std::mem::take(&mut self.atomtype_row);
            // atomspertype, element, mass, valence, pseudopotential
            if let (Some(element), Some(pseudo)) = (row.get(1), row.last()) {
                if row.len() > 2 && !element.is_empty() {
                    self.pseudopotentials.insert(element.clone(), pseudo.clone());
                }
            }
        }
    }

    fn finish(mut self, identity: JobIdentity) -> NormalizedRecord {
        self.results.basis_vectors = (!self.basis.is_empty()).then_some(self.basis);
        self.results.kpoints = (!self.kpoints.is_empty()).then_some(self.kpoints);
        self.results.pseudopotentials =
            (!self.pseudopotentials.is_empty()).then_some(self.pseudopotentials);
        self.results.total_energies = (!self.energies.is_empty()).then_some(self.energies);

        let created_at = match (self.generator_date, self.generator_time) {
            (Some(date), Some(time)) => generator_timestamp(&date, &time),
            _ => None,
        };

        let mut record = NormalizedRecord::new(identity, PackageResults::Vasp(self.results));
        record.created_at = created_at;
        record
    }
}

fn in_generator(stack: &[Element]) -> bool {
    stack.iter().any(|e| e.tag == "generator")
}

/// Exactly three whitespace-separated numbers
fn triple(text: &str) -> Option<[f64; 3]> {
    let values: Vec<f64> = text.split_whitespace().map(parse_number).collect::<Option<_>>()?;
    match values.as_slice() {
        [x, y, z] => Some([*x, *y, *z]),
        _ => None,
    }
}

/// `2024 03 12` + `10:15:30`
fn generator_timestamp(date: &str, time: &str) -> Option<NaiveDateTime> {
    let date = date.split_whitespace().collect::<Vec<_>>().join(" ");
    NaiveDateTime::parse_from_str(&format!("{} {}", date, time.trim()), "%Y %m %d %H:%M:%S").ok()
}

#[derive(Debug, Default)]
pub struct VaspParser;

impl VaspParser {
    pub fn new() -> Self {
        Self
    }

    pub fn parse(&self, identity: JobIdentity, xml: &str) -> NormalizedRecord {
        let mut reader = Reader::from_str(xml);
        reader.config_mut().trim_text(true);

        let mut stack: Vec<Element> = Vec::new();
        let mut scan = Scan::default();

        loop {
            match reader.read_event() {
                Ok(Event::Start(start)) => stack.push(Element::from_start(&start)),
                Ok(Event::End(_)) => {
                    if let Some(closed) = stack.pop() {
                        scan.end(&closed, &stack);
                    }
                },
                Ok(Event::Text(text)) => {
                    if let Ok(text) = text.unescape() {
                        scan.text(&stack, &text);
                    }
                },
                Ok(Event::Eof) => break,
                Err(e) => {
                    warn!(
                        position = reader.buffer_position(),
                        error = %e,
                        "vasprun.xml is malformed or truncated, keeping values read so far"
                    );
                    break;
                },
                Ok(_) => {},
            }
        }

        scan.finish(identity)
    }
}
