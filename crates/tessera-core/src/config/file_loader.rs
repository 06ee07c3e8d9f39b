//! File-based configuration loading

use super::model::TesseraConfig;
use crate::error::{TesseraError, TesseraResult};
use serde_json::Value;
use std::fs;
use std::path::Path;

/// Read a config file as a loose JSON tree.
///
/// Format follows the extension: `.toml`, `.yaml`/`.yml`, anything else is
/// JSON. A missing file yields `None`.
pub(super) fn read_file_layer(path: &Path) -> TesseraResult<Option<Value>> {
    if !path.exists() {
        tracing::debug!(path = %path.display(), "config file not found, using defaults");
        return Ok(None);
    }

    let content = fs::read_to_string(path).map_err(|e| {
        TesseraError::config_with_context(
            format!("Failed to read config file: {}", e),
            format!("Reading configuration from '{}'", path.display()),
        )
    })?;

    let parse_error = |format: &str, e: &dyn std::fmt::Display| {
        TesseraError::config_with_context(
            format!("Failed to parse {} config: {}", format, e),
            format!("Deserializing {} configuration from '{}'", format, path.display()),
        )
    };
    let value: Value = match path.extension().and_then(|s| s.to_str()) {
        Some("toml") => toml::from_str(&content).map_err(|e| parse_error("TOML", &e))?,
        Some("yaml") | Some("yml") => {
            serde_yaml::from_str(&content).map_err(|e| parse_error("YAML", &e))?
        }
        _ => serde_json::from_str(&content).map_err(|e| parse_error("JSON", &e))?,
    };
    Ok(Some(value))
}

/// Load a complete configuration from one file, defaults filling the gaps
pub fn load_from_file(path: &Path) -> TesseraResult<TesseraConfig> {
    match read_file_layer(path)? {
        Some(value) => serde_json::from_value(value).map_err(|e| {
            TesseraError::config_with_context(
                format!("Invalid configuration: {}", e),
                format!("Reading configuration from '{}'", path.display()),
            )
        }),
        None => Ok(TesseraConfig::default()),
    }
}
