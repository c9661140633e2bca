//! Loading telemetry records from files
//!
//! Accepts either a JSON array of objects or JSON Lines (one object per line).

use std::fs;
use std::path::Path;

use serde_json::Value;
use tracing::debug;

use super::error::{MlError, Result};
use super::features::Record;

/// Read records from a JSON array or JSON Lines file
pub fn load_records<P: AsRef<Path>>(path: P) -> Result<Vec<Record>> {
    let path = path.as_ref();
    let content = fs::read_to_string(path).map_err(|e| MlError::io(path, e))?;
    let records = parse_records(&content)?;
    debug!("Read {} records from {:?}", records.len(), path);
    Ok(records)
}

/// Parse records from a JSON array or JSON Lines document
pub fn parse_records(content: &str) -> Result<Vec<Record>> {
    let trimmed = content.trim_start();
    if trimmed.is_empty() {
        return Ok(Vec::new());
    }

    if trimmed.starts_with('[') {
        let values: Vec<Value> = serde_json::from_str(trimmed)
            .map_err(|e| MlError::Dataset(format!("invalid JSON array: {}", e)))?;
        return values
            .into_iter()
            .enumerate()
            .map(|(i, value)| into_record(value, || format!("element {}", i)))
            .collect();
    }

    let mut records = Vec::new();
    for (i, line) in content.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let value: Value = serde_json::from_str(line)
            .map_err(|e| MlError::Dataset(format!("line {}: {}", i + 1, e)))?;
        records.push(into_record(value, || format!("line {}", i + 1))?);
    }
    Ok(records)
}

/// Parse a single record from a JSON object string
pub fn parse_record(content: &str) -> Result<Record> {
    let value: Value = serde_json::from_str(content)
        .map_err(|e| MlError::Dataset(format!("invalid record: {}", e)))?;
    into_record(value, || "record".to_string())
}

fn into_record(value: Value, location: impl FnOnce() -> String) -> Result<Record> {
    match value {
        Value::Object(map) => Ok(map),
        _ => Err(MlError::Dataset(format!(
            "{}: expected a JSON object",
            location()
        ))),
    }
}
