//! Registry of ECU parameter definitions indexed by diagnostic service and
//! PID, decoding raw message bytes into physical values.

pub mod conversion;
pub mod conversion_file;
pub mod definition;
pub mod loader;
pub mod process_var;
pub mod registry;

pub use conversion::{Conversion, ConversionError, ConversionSet, ConversionTable, LinearConversion, UnitSystem};
pub use conversion_file::{parse_conversions_yaml, read_conversions_file, ConversionFileError};
pub use definition::{DecodeError, DecodeState, DefinitionConfig, DefinitionError, ParameterDefinition};
pub use loader::{parse_numeric_id, LoadError, LoadPolicy, LoadReport, RowError};
pub use process_var::{DecodedValue, ProcessVar, PvField};
pub use registry::{DefinitionId, DefinitionRegistry};
