//! JSON / YAML document I/O shared by the resolver, the artifact manager,
//! and root config discovery.

use std::fs;
use std::path::Path;

use serde_json::Value;

use crate::error::{DatError, Result};
use crate::namespace::DataFormat;


/// Guess the format from the extension; anything but yaml/yml is JSON.
pub fn format_of(path: &Path) -> DataFormat {
    match path.extension().and_then(|e| e.to_str()) {
        Some("yaml") | Some("yml") => DataFormat::Yaml,
        _ => DataFormat::Json,
    }
}

/// Parse document text. Empty YAML parses as `null`.
pub fn parse_value(text: &str, format: DataFormat) -> std::result::Result<Value, String> {
    match format {
        DataFormat::Json => serde_json::from_str(text).map_err(|e| e.to_string()),
        DataFormat::Yaml => {
            if text.trim().is_empty() {
                return Ok(Value::Null);
            }
            serde_yaml::from_str(text).map_err(|e| e.to_string())
        }
    }
}

/// Read and parse a document. I/O failures are `Io`; parse failures are
/// `CorruptSpec` naming the file.
pub fn read_value(path: &Path, format: DataFormat) -> Result<Value> {
    let text = fs::read_to_string(path).map_err(|e| DatError::io(path, e))?;
    parse_value(&text, format).map_err(|reason| DatError::corrupt(path, reason))
}

/// Write a value as pretty JSON followed by a newline, replacing the file.
pub fn write_json(path: &Path, value: &Value) -> Result<()> {
    let mut text = serde_json::to_string_pretty(value)
        .map_err(|e| DatError::InvalidArgument(format!("value is not serializable: {}", e)))?;
    text.push('\n');
    fs::write(path, text).map_err(|e| DatError::io(path, e))
}
