//! A single ECU parameter definition and its decode logic.

use crate::conversion::{Conversion, ConversionError, ConversionSet, UnitSystem};
use crate::process_var::{DecodedValue, ProcessVar};
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// Largest raw value per byte length, used to derive a default maximum.
/// Length 0 carries a fake default.
pub const MAX_RAW_BY_LENGTH: [u64; 5] = [0xFFFF, 0xFF, 0xFFFF, 0xFF_FFFF, 0xFFFF_FFFF];

#[derive(Debug, Error)]
pub enum DefinitionError {
    #[error("no default maximum for a {0}-byte numeric parameter")]
    UnsupportedLength(usize),
    #[error("deriving default range: {0}")]
    Conversion(#[from] ConversionError),
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum DecodeError {
    #[error("bytes {offset}..{end} out of range for buffer of {len} bytes")]
    BufferTooShort { offset: usize, end: usize, len: usize },
    #[error("{0}-byte value does not fit into 64 bits")]
    TooWide(usize),
    #[error("conversion failed: {0}")]
    Conversion(#[from] ConversionError),
}

/// Whether a definition still takes part in decoding.
#[derive(Debug, Clone, PartialEq)]
pub enum DecodeState {
    Enabled,
    /// Set by the first failed decode, carries the failure reason.
    Disabled { reason: String },
}

/// Construction parameters of a [`ParameterDefinition`].
#[derive(Debug, Clone, Default)]
pub struct DefinitionConfig {
    pub pid: u32,
    pub offset: usize,
    pub length: usize,
    /// `None` decodes the byte window as text.
    pub conversions: Option<Arc<ConversionSet>>,
    pub format: String,
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub label: String,
    pub description: String,
}

/// Which bytes of a message to read, how to convert them, and the live
/// result of the latest decode.
///
/// Cloning deep-copies the process variable, so decoding into a clone never
/// touches the original. Conversion sets are immutable and stay shared.
#[derive(Debug, Clone)]
pub struct ParameterDefinition {
    pid: u32,
    offset: usize,
    length: usize,
    conversions: Option<Arc<ConversionSet>>,
    format: String,
    label: String,
    description: String,
    state: DecodeState,
    pv: ProcessVar,
}

impl ParameterDefinition {
    /// Build a definition, deriving absent min/max bounds from the
    /// conversion active for `system`.
    pub fn new(config: DefinitionConfig, system: UnitSystem) -> Result<Self, DefinitionError> {
        let DefinitionConfig {
            pid,
            offset,
            length,
            conversions,
            format,
            min,
            max,
            label,
            description,
        } = config;

        let mut min_value = min;
        let mut max_value = max;
        let mut units = String::new();
        if let Some(cnv) = conversions.as_deref().and_then(|set| set.get(system)) {
            units = cnv.units().to_string();
            if min_value.is_none() {
                min_value = Some(cnv.mem_to_phys(0)?);
            }
            if max_value.is_none() {
                let raw = MAX_RAW_BY_LENGTH
                    .get(length)
                    .copied()
                    .ok_or(DefinitionError::UnsupportedLength(length))?;
                max_value = Some(cnv.mem_to_phys(raw)?);
            }
        }

        let pv = ProcessVar {
            pid,
            offset,
            label: label.clone(),
            value: DecodedValue::Numeric {
                value: 0.0,
                units: units.clone(),
            },
            units,
            format: format.clone(),
            conversion: conversions.as_ref().map(|set| set.name().to_string()),
            min: min_value,
            max: max_value,
        };

        Ok(Self {
            pid,
            offset,
            length,
            conversions,
            format,
            label,
            description,
            state: DecodeState::Enabled,
            pv,
        })
    }

    pub fn pid(&self) -> u32 {
        self.pid
    }

    pub fn offset(&self) -> usize {
        self.offset
    }

    pub fn length(&self) -> usize {
        self.length
    }

    pub fn conversions(&self) -> Option<&ConversionSet> {
        self.conversions.as_deref()
    }

    pub fn format(&self) -> &str {
        &self.format
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn min(&self) -> Option<f64> {
        self.pv.min
    }

    pub fn max(&self) -> Option<f64> {
        self.pv.max
    }

    pub fn state(&self) -> &DecodeState {
        &self.state
    }

    pub fn is_enabled(&self) -> bool {
        self.state == DecodeState::Enabled
    }

    pub fn process_var(&self) -> &ProcessVar {
        &self.pv
    }

    pub fn value(&self) -> &DecodedValue {
        &self.pv.value
    }

    /// Put a disabled definition back into service. The last value is kept
    /// until the next successful decode overwrites it.
    pub fn enable(&mut self) {
        if let DecodeState::Disabled { reason } = &self.state {
            log::debug!("{self}: re-enabled after '{reason}'");
            self.state = DecodeState::Enabled;
        }
    }

    fn active_conversion(&self, system: UnitSystem) -> Option<&dyn Conversion> {
        self.conversions.as_deref().and_then(|set| set.get(system))
    }

    /// Decode this definition's byte window of `buffer` into the process
    /// variable.
    ///
    /// Does nothing once disabled. A failure disables the definition for
    /// good and stores a hex dump of the buffer plus the reason as value;
    /// it is logged, never returned.
    pub fn decode_from_buffer(&mut self, buffer: &[u8], system: UnitSystem) {
        if !self.is_enabled() {
            return;
        }

        match self.phys_from_buffer(buffer, system) {
            Ok(value) => {
                if let DecodedValue::Numeric { units, .. } = &value {
                    self.pv.units.clone_from(units);
                }
                self.pv.value = value;
                log::debug!(
                    "{:02X} {:<30} {:>16} {}",
                    self.pid,
                    self.label,
                    self.pv.value,
                    self.pv.units
                );
            }
            Err(e) => {
                let dump = hex_dump(buffer);
                let reason = e.to_string();
                log::warn!("{self}: {dump}:{reason}");
                self.pv.value = DecodedValue::Failed {
                    dump,
                    reason: reason.clone(),
                };
                self.state = DecodeState::Disabled { reason };
            }
        }
    }

    fn phys_from_buffer(&self, buffer: &[u8], system: UnitSystem) -> Result<DecodedValue, DecodeError> {
        let end = self
            .offset
            .checked_add(self.length)
            .filter(|end| *end <= buffer.len())
            .ok_or(DecodeError::BufferTooShort {
                offset: self.offset,
                end: self.offset.saturating_add(self.length),
                len: buffer.len(),
            })?;
        let window = &buffer[self.offset..end];

        match self.active_conversion(system) {
            Some(cnv) => {
                let raw = read_be_uint(window)?;
                Ok(DecodedValue::Numeric {
                    value: cnv.mem_to_phys(raw)?,
                    units: cnv.units().to_string(),
                })
            }
            None => Ok(DecodedValue::Text(window.iter().copied().map(char::from).collect())),
        }
    }
}

impl fmt::Display for ParameterDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02X}.{}", self.pid, self.offset)
    }
}

fn read_be_uint(bytes: &[u8]) -> Result<u64, DecodeError> {
    if bytes.len() > 8 {
        return Err(DecodeError::TooWide(bytes.len()));
    }
    Ok(bytes.iter().fold(0u64, |acc, b| (acc << 8) | u64::from(*b)))
}

fn hex_dump(buffer: &[u8]) -> String {
    buffer
        .iter()
        .map(|b| format!("{b:02X}"))
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conversion::LinearConversion;
    use pretty_assertions::assert_eq;

    fn rpm_set() -> Arc<ConversionSet> {
        Arc::new(
            ConversionSet::new("RPM_LINEAR")
                .with(UnitSystem::Metric, LinearConversion::new(1.0, 4.0, 0.0, "1/min"))
                .with(UnitSystem::Imperial, LinearConversion::new(1.0, 4.0, 0.0, "rpm")),
        )
    }

    fn rpm(min: Option<f64>, max: Option<f64>) -> ParameterDefinition {
        ParameterDefinition::new(
            DefinitionConfig {
                pid: 0x0C,
                offset: 0,
                length: 2,
                conversions: Some(rpm_set()),
                format: "%.0f".into(),
                min,
                max,
                label: "Engine RPM".into(),
                description: String::new(),
            },
            UnitSystem::Metric,
        )
        .unwrap()
    }

    fn text_item(offset: usize, length: usize) -> ParameterDefinition {
        ParameterDefinition::new(
            DefinitionConfig {
                pid: 0x02,
                offset,
                length,
                label: "VIN".into(),
                ..Default::default()
            },
            UnitSystem::Metric,
        )
        .unwrap()
    }

    #[test]
    fn test_new_initialises_process_var() {
        let def = rpm(None, None);
        let pv = def.process_var();
        assert_eq!(pv.pid, 0x0C);
        assert_eq!(pv.units, "1/min");
        assert_eq!(pv.conversion.as_deref(), Some("RPM_LINEAR"));
        assert_eq!(pv.value.as_f64(), Some(0.0));
        assert!(def.is_enabled());
    }

    #[test]
    fn test_default_range_from_length_table() {
        for (length, raw) in MAX_RAW_BY_LENGTH.iter().enumerate() {
            let def = ParameterDefinition::new(
                DefinitionConfig {
                    pid: 1,
                    length,
                    conversions: Some(rpm_set()),
                    ..Default::default()
                },
                UnitSystem::Metric,
            )
            .unwrap();
            assert_eq!(def.min(), Some(0.0));
            assert_eq!(def.max(), Some(*raw as f64 / 4.0), "length {length}");
        }
    }

    #[test]
    fn test_explicit_range_is_preserved() {
        let def = rpm(Some(-12.5), Some(8000.0));
        assert_eq!(def.min(), Some(-12.5));
        assert_eq!(def.max(), Some(8000.0));
    }

    #[test]
    fn test_text_item_has_no_range_or_units() {
        let def = text_item(0, 17);
        assert_eq!(def.min(), None);
        assert_eq!(def.max(), None);
        assert_eq!(def.process_var().units, "");
        assert_eq!(def.process_var().conversion, None);
    }

    #[test]
    fn test_wide_numeric_without_max_is_rejected() {
        let result = ParameterDefinition::new(
            DefinitionConfig {
                length: 5,
                conversions: Some(rpm_set()),
                ..Default::default()
            },
            UnitSystem::Metric,
        );
        assert!(matches!(result, Err(DefinitionError::UnsupportedLength(5))));
    }

    #[test]
    fn test_decode_numeric() {
        let mut def = rpm(None, None);
        def.decode_from_buffer(&[0x1A, 0x0A, 0xFF], UnitSystem::Metric);
        assert_eq!(
            def.value(),
            &DecodedValue::Numeric {
                value: 1666.5,
                units: "1/min".into()
            }
        );
        assert!(def.is_enabled());
    }

    #[test]
    fn test_decode_uses_given_unit_system() {
        let mut def = rpm(None, None);
        def.decode_from_buffer(&[0x00, 0x04], UnitSystem::Imperial);
        assert_eq!(def.process_var().units, "rpm");
        assert_eq!(def.value().as_f64(), Some(1.0));
    }

    #[test]
    fn test_decode_text() {
        let mut def = text_item(1, 3);
        def.decode_from_buffer(b"xABCx", UnitSystem::Metric);
        assert_eq!(def.value().as_text(), Some("ABC"));
    }

    #[test]
    fn test_set_without_active_variant_decodes_text() {
        let set = ConversionSet::new("METRIC_ONLY")
            .with(UnitSystem::Metric, LinearConversion::new(1.0, 1.0, 0.0, "km/h"));
        let mut def = ParameterDefinition::new(
            DefinitionConfig {
                length: 2,
                conversions: Some(Arc::new(set)),
                ..Default::default()
            },
            UnitSystem::Imperial,
        )
        .unwrap();
        def.decode_from_buffer(b"OK", UnitSystem::Imperial);
        assert_eq!(def.value().as_text(), Some("OK"));
    }

    #[test]
    fn test_short_buffer_disables() {
        let mut def = ParameterDefinition::new(
            DefinitionConfig {
                offset: 10,
                length: 2,
                conversions: Some(rpm_set()),
                ..Default::default()
            },
            UnitSystem::Metric,
        )
        .unwrap();
        def.decode_from_buffer(&[0x41, 0x0C, 0x1A, 0x0A], UnitSystem::Metric);

        assert!(!def.is_enabled());
        match def.value() {
            DecodedValue::Failed { dump, reason } => {
                assert_eq!(dump, "41 0C 1A 0A");
                assert!(reason.contains("out of range"), "{reason}");
            }
            other => panic!("expected failure, got {other:?}"),
        }
        assert!(matches!(def.state(), DecodeState::Disabled { .. }));
    }

    #[test]
    fn test_disabled_stays_disabled() {
        let mut def = rpm(None, None);
        def.decode_from_buffer(&[0x01], UnitSystem::Metric);
        assert!(!def.is_enabled());
        let failed = def.value().clone();

        def.decode_from_buffer(&[0x1A, 0x0A], UnitSystem::Metric);
        assert!(!def.is_enabled());
        assert_eq!(def.value(), &failed);
    }

    #[test]
    fn test_conversion_failure_disables() {
        let set = ConversionSet::new("BROKEN")
            .with(UnitSystem::Metric, LinearConversion::new(1.0, 0.0, 0.0, "x"));
        let mut def = ParameterDefinition::new(
            DefinitionConfig {
                length: 1,
                conversions: Some(Arc::new(set)),
                min: Some(0.0),
                max: Some(1.0),
                ..Default::default()
            },
            UnitSystem::Metric,
        )
        .unwrap();
        def.decode_from_buffer(&[0x01], UnitSystem::Metric);
        assert!(!def.is_enabled());
        assert!(def.value().is_failed());
    }

    #[test]
    fn test_too_wide_numeric_window_disables() {
        let mut def = ParameterDefinition::new(
            DefinitionConfig {
                length: 9,
                conversions: Some(rpm_set()),
                min: Some(0.0),
                max: Some(1.0),
                ..Default::default()
            },
            UnitSystem::Metric,
        )
        .unwrap();
        def.decode_from_buffer(&[0; 9], UnitSystem::Metric);
        assert_eq!(
            def.state(),
            &DecodeState::Disabled {
                reason: DecodeError::TooWide(9).to_string()
            }
        );
    }

    #[test]
    fn test_enable_after_failure() {
        let mut def = rpm(None, None);
        def.decode_from_buffer(&[], UnitSystem::Metric);
        assert!(!def.is_enabled());

        def.enable();
        def.decode_from_buffer(&[0x00, 0x08], UnitSystem::Metric);
        assert!(def.is_enabled());
        assert_eq!(def.value().as_f64(), Some(2.0));
    }

    #[test]
    fn test_clone_has_independent_value() {
        let original = rpm(None, None);
        let mut copy = original.clone();
        copy.decode_from_buffer(&[0x1A, 0x0A], UnitSystem::Metric);

        assert_eq!(copy.value().as_f64(), Some(1666.5));
        assert_eq!(original.value().as_f64(), Some(0.0));
        assert_eq!(copy.pid(), original.pid());
        assert_eq!(copy.label(), original.label());
    }

    #[test]
    fn test_display() {
        assert_eq!(rpm(None, None).to_string(), "0C.0");
    }
}
