//! Output file parsers
//!
//! One parser per package. Parsers work on file contents and never fail on
//! a missing pattern: the field is left as `None`. Only reading the file
//! itself can fail, with [`IngestError::Unavailable`].

use std::path::Path;

use chrono::NaiveDateTime;
use qcdb_common::{JobIdentity, NormalizedRecord, Package};
use regex::Regex;
use tracing::{debug, warn};

use crate::error::{IngestError, IngestResult};

pub mod espresso;
pub mod orca;
pub mod vasp;

pub use espresso::EspressoParser;
pub use orca::OrcaParser;
pub use vasp::VaspParser;

/// Signed decimal literal with optional exponent (`e`, `E` or Fortran `d`, `D`)
pub(crate) const NUMBER: &str = r"[-+]?(?:\d+\.?\d*|\.\d+)(?:[eEdD][-+]?\d+)?";

/// Parse a numeric literal as printed by Fortran or C codes
pub(crate) fn parse_number(literal: &str) -> Option<f64> {
    let literal = literal.trim();
    if literal.contains(['d', 'D']) {
        literal.replace(['d', 'D'], "e").parse().ok()
    } else {
        literal.parse().ok()
    }
}

/// First capture group of the last match of `re`, as a number
pub(crate) fn last_number(re: &Regex, text: &str) -> Option<f64> {
    re.captures_iter(text)
        .last()
        .and_then(|c| c.get(1))
        .and_then(|m| parse_number(m.as_str()))
}

/// First capture group of the first match of `re`, as a number
pub(crate) fn first_number(re: &Regex, text: &str) -> Option<f64> {
    re.captures(text)
        .and_then(|c| c.get(1))
        .and_then(|m| parse_number(m.as_str()))
}

pub(crate) fn first_integer(re: &Regex, text: &str) -> Option<i64> {
    re.captures(text)
        .and_then(|c| c.get(1))
        .and_then(|m| m.as_str().parse().ok())
}

/// Normalize a banner date such as ` 2Mar2024` or `12Mar 2024` and a time such
/// as `15: 8: 3` into a timestamp
///
/// pw.x writes each field with Fortran `i2`, so single digits are space padded.
pub(crate) fn banner_timestamp(date: &str, time: &str) -> Option<NaiveDateTime> {
    let mut date: String = date.chars().filter(|c| !c.is_whitespace()).collect();
    if date.chars().nth(1).is_some_and(|c| c.is_ascii_alphabetic()) {
        date.insert(0, '0');
    }

    let parts = time
        .split(':')
        .map(|part| part.trim().parse::<u32>().ok())
        .collect::<Option<Vec<_>>>()?;
    let [hour, minute, second] = parts.as_slice() else {
        return None;
    };

    NaiveDateTime::parse_from_str(
        &format!("{date} {hour:02}:{minute:02}:{second:02}"),
        "%d%b%Y %H:%M:%S",
    )
    .ok()
}

/// Read a whole output file, tolerating invalid UTF-8
pub async fn read_output(path: &Path) -> IngestResult<String> {
    let bytes = tokio::fs::read(path)
        .await
        .map_err(|e| IngestError::unavailable(path, e))?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

/// Parse the output file(s) of one job into a normalized record
///
/// The primary file must be readable. A secondary file that cannot be read is
/// logged and its fields stay empty.
pub async fn parse_output(
    package: Package,
    identity: JobIdentity,
    primary: &Path,
    secondary: Option<&Path>,
) -> IngestResult<NormalizedRecord> {
    let primary_text = read_output(primary).await?;

    let secondary_text = match secondary {
        Some(path) if package.has_secondary_output() => match read_output(path).await {
            Ok(text) => Some(text),
            Err(e) => {
                warn!(%package, error = %e, "Secondary output unreadable, its fields are left empty");
                None
            },
        },
        Some(path) => {
            warn!(%package, path = %path.display(), "Package has no secondary output, ignoring file");
            None
        },
        None => None,
    };

    let record = match package {
        Package::Espresso => {
            EspressoParser::new()?.parse(identity, &primary_text, secondary_text.as_deref())
        },
        Package::Vasp => VaspParser::new().parse(identity, &primary_text),
        Package::Orca => OrcaParser::new()?.parse(identity, &primary_text),
    };

    debug!(%package, path = %primary.display(), "Output parsed");
    Ok(record)
}
