//! Tab-separated PID table -> [`DefinitionRegistry`].
//!
//! Columns: `service_ids, pid, offset, length, conversion, format, min, max,
//! label, description`. The first line is a header and is always skipped, as
//! are `#` comments and blank lines. Quotes are stripped before splitting.

use crate::conversion::ConversionTable;
use crate::definition::{DefinitionConfig, ParameterDefinition};
use crate::registry::DefinitionRegistry;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::num::ParseIntError;
use std::path::Path;
use thiserror::Error;

const FLD_SVC: usize = 0;
const FLD_PID: usize = 1;
const FLD_OFS: usize = 2;
const FLD_LEN: usize = 3;
const FLD_FORMULA: usize = 4;
const FLD_FORMAT: usize = 5;
const FLD_MIN: usize = 6;
const FLD_MAX: usize = 7;
const FLD_LABEL: usize = 8;
const FLD_DESCRIPTION: usize = 9;

/// Fields up to and including the label are required.
const REQUIRED_FIELDS: usize = FLD_LABEL + 1;

/// What to do with a row that cannot be turned into a definition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LoadPolicy {
    /// Abort the whole load on the first bad row.
    Strict,
    /// Log and record the bad row, then continue with the next one.
    #[default]
    Lenient,
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum RowError {
    #[error("expected at least {expected} tab-separated fields, found {found}")]
    MissingFields { expected: usize, found: usize },
    #[error("invalid {field} '{value}'")]
    InvalidNumber { field: &'static str, value: String },
    #[error("invalid definition: {0}")]
    Definition(String),
}

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("line {line}: {source}")]
    Row { line: usize, source: RowError },
}

#[derive(Debug, Clone, PartialEq)]
pub struct MissingConversion {
    pub line: usize,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SkippedRow {
    pub line: usize,
    pub error: RowError,
}

/// Outcome of a completed load.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LoadReport {
    /// Definitions created, one per accepted row.
    pub definitions: usize,
    /// Rows whose conversion was not found; they decode as text.
    pub missing_conversions: Vec<MissingConversion>,
    /// Rows rejected under [`LoadPolicy::Lenient`].
    pub skipped: Vec<SkippedRow>,
}

struct Row<'a> {
    services: Vec<u32>,
    pid: u32,
    offset: usize,
    length: usize,
    formula: &'a str,
    format: &'a str,
    min: Option<f64>,
    max: Option<f64>,
    label: &'a str,
    description: &'a str,
}

/// Parse a service id or PID: decimal, or hex with a `0x`, `0X` or `#` prefix.
pub fn parse_numeric_id(value: &str) -> Result<u32, ParseIntError> {
    let v = value.trim();
    match v
        .strip_prefix("0x")
        .or_else(|| v.strip_prefix("0X"))
        .or_else(|| v.strip_prefix('#'))
    {
        Some(hex) => u32::from_str_radix(hex, 16),
        None => v.parse::<u32>(),
    }
}

fn parse_id(field: &'static str, value: &str) -> Result<u32, RowError> {
    parse_numeric_id(value).map_err(|_| RowError::InvalidNumber {
        field,
        value: value.to_string(),
    })
}

fn parse_size(field: &'static str, value: &str) -> Result<usize, RowError> {
    value.trim().parse().map_err(|_| RowError::InvalidNumber {
        field,
        value: value.to_string(),
    })
}

/// Unparsable limits count as absent.
fn parse_limit(value: &str) -> Option<f64> {
    value.trim().parse().ok()
}

fn parse_row(line: &str) -> Result<Row<'_>, RowError> {
    let fields: Vec<&str> = line.split('\t').collect();
    if fields.len() < REQUIRED_FIELDS {
        return Err(RowError::MissingFields {
            expected: REQUIRED_FIELDS,
            found: fields.len(),
        });
    }

    let services = fields[FLD_SVC]
        .split(',')
        .map(|s| parse_id("service id", s))
        .collect::<Result<Vec<_>, _>>()?;

    Ok(Row {
        services,
        pid: parse_id("pid", fields[FLD_PID])?,
        offset: parse_size("offset", fields[FLD_OFS])?,
        length: parse_size("length", fields[FLD_LEN])?,
        formula: fields[FLD_FORMULA],
        format: fields[FLD_FORMAT],
        min: parse_limit(fields[FLD_MIN]),
        max: parse_limit(fields[FLD_MAX]),
        label: fields[FLD_LABEL],
        description: fields.get(FLD_DESCRIPTION).copied().unwrap_or_default(),
    })
}

impl DefinitionRegistry {
    /// Read a PID table and register one definition per data row under
    /// every service the row lists.
    pub fn load_from_reader<R: BufRead>(
        &mut self,
        mut reader: R,
        conversions: &ConversionTable,
        policy: LoadPolicy,
    ) -> Result<LoadReport, LoadError> {
        let mut report = LoadReport::default();

        let mut raw = Vec::new();
        let mut line_no = 0;
        loop {
            raw.clear();
            if reader.read_until(b'\n', &mut raw)? == 0 {
                break;
            }
            line_no += 1;
            // Non-UTF-8 bytes (e.g. Latin-1 labels) are replaced, not rejected
            let line = String::from_utf8_lossy(&raw);
            let line = line.trim_end_matches(['\n', '\r']);
            if line_no == 1 || line.starts_with('#') || line.trim().is_empty() {
                continue;
            }
            let line = line.replace('"', "");

            let row = match parse_row(&line) {
                Ok(row) => row,
                Err(error) => {
                    reject(policy, &mut report, line_no, error)?;
                    continue;
                }
            };

            let set = conversions.lookup(row.formula);
            if set.is_none() {
                log::warn!("Conversion not found: {} {}", row.formula, line);
                report.missing_conversions.push(MissingConversion {
                    line: line_no,
                    name: row.formula.to_string(),
                });
            }

            let config = DefinitionConfig {
                pid: row.pid,
                offset: row.offset,
                length: row.length,
                conversions: set,
                format: row.format.to_string(),
                min: row.min,
                max: row.max,
                label: row.label.to_string(),
                description: row.description.to_string(),
            };
            let definition = match ParameterDefinition::new(config, self.unit_system()) {
                Ok(def) => def,
                Err(e) => {
                    reject(policy, &mut report, line_no, RowError::Definition(e.to_string()))?;
                    continue;
                }
            };

            let id = self.insert(definition);
            for service in row.services {
                self.append_to_service(service, id);
            }
            report.definitions += 1;
        }

        log::info!(
            "loaded {} definition(s), {} missing conversion(s), {} skipped row(s)",
            report.definitions,
            report.missing_conversions.len(),
            report.skipped.len()
        );
        Ok(report)
    }

    pub fn load_from_path(
        &mut self,
        path: &Path,
        conversions: &ConversionTable,
        policy: LoadPolicy,
    ) -> Result<LoadReport, LoadError> {
        let file = File::open(path)?;
        self.load_from_reader(BufReader::new(file), conversions, policy)
    }
}

fn reject(
    policy: LoadPolicy,
    report: &mut LoadReport,
    line: usize,
    error: RowError,
) -> Result<(), LoadError> {
    match policy {
        LoadPolicy::Strict => Err(LoadError::Row {
            line,
            source: error,
        }),
        LoadPolicy::Lenient => {
            log::warn!("line {line}: skipping row: {error}");
            report.skipped.push(SkippedRow { line, error });
            Ok(())
        }
    }
}
