//! YAML conversion table loader.
//!
//! ```yaml
//! conversions:
//!   RPM_LINEAR:
//!     metric:   { divisor: 4, units: "1/min" }
//!     imperial: { divisor: 4, units: "rpm" }
//! ```
//!
//! Every entry is a [`LinearConversion`]; unit systems without an entry
//! decode as text.

use crate::conversion::{ConversionSet, ConversionTable, LinearConversion, UnitSystem};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConversionFileError {
    #[error("YAML deserialization error: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("conversion '{name}' ({system}) has a zero divisor")]
    ZeroDivisor { name: String, system: UnitSystem },
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConversionFile {
    #[serde(default)]
    pub conversions: BTreeMap<String, ConversionEntry>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConversionEntry {
    pub metric: Option<LinearConversion>,
    pub imperial: Option<LinearConversion>,
}

impl ConversionEntry {
    fn get(&self, system: UnitSystem) -> Option<&LinearConversion> {
        match system {
            UnitSystem::Metric => self.metric.as_ref(),
            UnitSystem::Imperial => self.imperial.as_ref(),
        }
    }
}

/// Parse a YAML conversion document into a [`ConversionTable`].
pub fn parse_conversions_yaml(yaml: &str) -> Result<ConversionTable, ConversionFileError> {
    let file: ConversionFile = serde_yaml::from_str(yaml)?;
    let mut table = ConversionTable::new();

    for (name, entry) in &file.conversions {
        let mut set = ConversionSet::new(name.as_str());
        for system in UnitSystem::ALL {
            if let Some(cnv) = entry.get(system) {
                if cnv.divisor == 0.0 {
                    return Err(ConversionFileError::ZeroDivisor {
                        name: name.clone(),
                        system,
                    });
                }
                set = set.with(system, cnv.clone());
            }
        }
        table.insert(set);
    }

    log::debug!("parsed {} conversion set(s)", table.len());
    Ok(table)
}

pub fn read_conversions_file(path: &Path) -> Result<ConversionTable, ConversionFileError> {
    let text = std::fs::read_to_string(path)?;
    parse_conversions_yaml(&text)
}
