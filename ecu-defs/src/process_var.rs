//! Live value bag attached to each parameter definition.
//!
//! Presentation and telemetry layers bind to the field names in [`PvField`]
//! once; the names and their meaning do not change between decodes.

use serde::Serialize;
use std::fmt;

/// Result of the latest decode of a definition.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DecodedValue {
    Numeric { value: f64, units: String },
    Text(String),
    /// `dump` is a hex dump of the whole buffer that failed to decode.
    Failed { dump: String, reason: String },
}

impl DecodedValue {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            DecodedValue::Numeric { value, .. } => Some(*value),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            DecodedValue::Text(text) => Some(text),
            _ => None,
        }
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, DecodedValue::Failed { .. })
    }
}

impl fmt::Display for DecodedValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DecodedValue::Numeric { value, .. } => write!(f, "{value}"),
            DecodedValue::Text(text) => f.write_str(text),
            DecodedValue::Failed { dump, reason } => write!(f, "{dump}:{reason}"),
        }
    }
}

/// Named fields exposed by a [`ProcessVar`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PvField {
    Pid,
    Offset,
    Label,
    Units,
    Value,
    Format,
    Conversion,
    Min,
    Max,
}

impl PvField {
    pub const ALL: [PvField; 9] = [
        PvField::Pid,
        PvField::Offset,
        PvField::Label,
        PvField::Units,
        PvField::Value,
        PvField::Format,
        PvField::Conversion,
        PvField::Min,
        PvField::Max,
    ];

    pub fn key(self) -> &'static str {
        match self {
            PvField::Pid => "pid",
            PvField::Offset => "offset",
            PvField::Label => "label",
            PvField::Units => "units",
            PvField::Value => "value",
            PvField::Format => "format",
            PvField::Conversion => "conversion",
            PvField::Min => "min",
            PvField::Max => "max",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProcessVar {
    pub pid: u32,
    pub offset: usize,
    pub label: String,
    pub units: String,
    pub value: DecodedValue,
    pub format: String,
    /// Name of the conversion set, `None` for text items.
    pub conversion: Option<String>,
    pub min: Option<f64>,
    pub max: Option<f64>,
}

impl ProcessVar {
    /// Render a single field as text.
    pub fn get(&self, field: PvField) -> String {
        fn opt(v: Option<f64>) -> String {
            v.map(|v| v.to_string()).unwrap_or_default()
        }

        match field {
            PvField::Pid => format!("0x{:02X}", self.pid),
            PvField::Offset => self.offset.to_string(),
            PvField::Label => self.label.clone(),
            PvField::Units => self.units.clone(),
            PvField::Value => self.value.to_string(),
            PvField::Format => self.format.clone(),
            PvField::Conversion => self.conversion.clone().unwrap_or_default(),
            PvField::Min => opt(self.min),
            PvField::Max => opt(self.max),
        }
    }

    pub fn entries(&self) -> Vec<(&'static str, String)> {
        PvField::ALL
            .iter()
            .map(|f| (f.key(), self.get(*f)))
            .collect()
    }
}
