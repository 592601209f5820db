//! Conversion contract consumed by parameter definitions.
//!
//! A conversion maps the raw integer read from a message to a physical value
//! and back. Conversions are grouped into a [`ConversionSet`] holding one
//! optional variant per [`UnitSystem`]; sets are looked up by formula name in
//! a [`ConversionTable`].

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// Display convention selecting which conversion of a set is active.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UnitSystem {
    #[default]
    Metric,
    Imperial,
}

impl UnitSystem {
    pub const COUNT: usize = 2;
    pub const ALL: [UnitSystem; UnitSystem::COUNT] = [UnitSystem::Metric, UnitSystem::Imperial];

    pub fn index(self) -> usize {
        match self {
            UnitSystem::Metric => 0,
            UnitSystem::Imperial => 1,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            UnitSystem::Metric => "metric",
            UnitSystem::Imperial => "imperial",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        UnitSystem::ALL
            .into_iter()
            .find(|s| s.name().eq_ignore_ascii_case(name.trim()))
    }
}

impl fmt::Display for UnitSystem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConversionError {
    #[error("division by zero")]
    DivisionByZero,
    #[error("physical value {0} has no raw representation")]
    Unrepresentable(f64),
    #[error("{0}")]
    Failed(String),
}

/// A named formula between raw memory values and physical values.
pub trait Conversion: fmt::Debug + Send + Sync {
    fn mem_to_phys(&self, raw: u64) -> Result<f64, ConversionError>;

    fn phys_to_mem(&self, phys: f64) -> Result<u64, ConversionError>;

    /// Unit label of the physical value, e.g. `"km/h"`.
    fn units(&self) -> &str;
}

fn one() -> f64 {
    1.0
}

/// `phys = raw * factor / divisor + offset`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LinearConversion {
    #[serde(default = "one")]
    pub factor: f64,
    #[serde(default = "one")]
    pub divisor: f64,
    #[serde(default)]
    pub offset: f64,
    #[serde(default)]
    pub units: String,
}

impl LinearConversion {
    pub fn new(factor: f64, divisor: f64, offset: f64, units: impl Into<String>) -> Self {
        Self {
            factor,
            divisor,
            offset,
            units: units.into(),
        }
    }
}

impl Conversion for LinearConversion {
    fn mem_to_phys(&self, raw: u64) -> Result<f64, ConversionError> {
        if self.divisor == 0.0 {
            return Err(ConversionError::DivisionByZero);
        }
        Ok(raw as f64 * self.factor / self.divisor + self.offset)
    }

    fn phys_to_mem(&self, phys: f64) -> Result<u64, ConversionError> {
        if self.factor == 0.0 {
            return Err(ConversionError::DivisionByZero);
        }
        let raw = ((phys - self.offset) * self.divisor / self.factor).round();
        if !raw.is_finite() || raw < 0.0 || raw > u64::MAX as f64 {
            return Err(ConversionError::Unrepresentable(phys));
        }
        Ok(raw as u64)
    }

    fn units(&self) -> &str {
        &self.units
    }
}

/// All unit-system variants of one named formula.
#[derive(Debug, Clone)]
pub struct ConversionSet {
    name: String,
    conversions: [Option<Arc<dyn Conversion>>; UnitSystem::COUNT],
}

impl ConversionSet {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            conversions: Default::default(),
        }
    }

    /// Builder-style variant of [`ConversionSet::set`].
    pub fn with(mut self, system: UnitSystem, conversion: impl Conversion + 'static) -> Self {
        self.set(system, Arc::new(conversion));
        self
    }

    pub fn set(&mut self, system: UnitSystem, conversion: Arc<dyn Conversion>) {
        self.conversions[system.index()] = Some(conversion);
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn get(&self, system: UnitSystem) -> Option<&dyn Conversion> {
        self.conversions[system.index()].as_deref()
    }
}

/// Conversion sets indexed by formula name.
#[derive(Debug, Clone, Default)]
pub struct ConversionTable {
    sets: HashMap<String, Arc<ConversionSet>>,
}

impl ConversionTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a set, replacing any previous set of the same name.
    pub fn insert(&mut self, set: ConversionSet) {
        self.sets.insert(set.name().to_string(), Arc::new(set));
    }

    pub fn lookup(&self, name: &str) -> Option<Arc<ConversionSet>> {
        self.sets.get(name).cloned()
    }

    pub fn len(&self) -> usize {
        self.sets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sets.is_empty()
    }
}
