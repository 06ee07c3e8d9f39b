//! Layered configuration loader

use super::env_loader::{apply_env_overrides, load_env_overrides};
use super::file_loader::read_file_layer;
use super::model::TesseraConfig;
use crate::error::{TesseraError, TesseraResult};
use serde_json::Value;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Source of configuration data
#[derive(Debug, Clone)]
pub enum ConfigSource {
    /// Built-in defaults
    Default,
    /// A TOML, YAML or JSON file; missing files are skipped
    File(PathBuf),
    /// `TESSERA_*` variables of the process environment
    Environment,
    /// `TESSERA_*` variables from an explicit map
    Variables(HashMap<String, String>),
}

/// Configuration loader with support for multiple sources
#[derive(Debug, Default)]
pub struct ConfigLoader {
    sources: Vec<ConfigSource>,
}

impl ConfigLoader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_source(mut self, source: ConfigSource) -> Self {
        self.sources.push(source);
        self
    }

    pub fn with_defaults(self) -> Self {
        self.add_source(ConfigSource::Default)
    }

    pub fn with_file<P: AsRef<Path>>(self, path: P) -> Self {
        self.add_source(ConfigSource::File(path.as_ref().to_path_buf()))
    }

    pub fn with_env(self) -> Self {
        self.add_source(ConfigSource::Environment)
    }

    pub fn with_variables(self, variables: HashMap<String, String>) -> Self {
        self.add_source(ConfigSource::Variables(variables))
    }

    /// Apply every source in order, then validate
    pub fn load(self) -> TesseraResult<TesseraConfig> {
        let mut config = TesseraConfig::default();

        for source in &self.sources {
            match source {
                ConfigSource::Default => config = TesseraConfig::default(),
                ConfigSource::File(path) => {
                    if let Some(layer) = read_file_layer(path)? {
                        config = merge_layer(&config, layer, path)?;
                        tracing::debug!(path = %path.display(), "config file applied");
                    }
                }
                ConfigSource::Environment => load_env_overrides(&mut config)?,
                ConfigSource::Variables(vars) => {
                    apply_env_overrides(&mut config, |key| vars.get(key).cloned())?
                }
            }
        }

        config.validate()?;
        Ok(config)
    }
}

/// Overlay a file's keys onto `base`; keys the file omits keep their value
fn merge_layer(base: &TesseraConfig, layer: Value, path: &Path) -> TesseraResult<TesseraConfig> {
    let mut merged = serde_json::to_value(base)?;
    merge_values(&mut merged, layer);
    serde_json::from_value(merged).map_err(|e| {
        TesseraError::config_with_context(
            format!("Invalid configuration: {}", e),
            format!("Reading configuration from '{}'", path.display()),
        )
    })
}

fn merge_values(base: &mut Value, overlay: Value) {
    match (base, overlay) {
        (Value::Object(base), Value::Object(overlay)) => {
            for (key, value) in overlay {
                match base.get_mut(&key) {
                    Some(existing) => merge_values(existing, value),
                    None => {
                        base.insert(key, value);
                    }
                }
            }
        }
        (base, overlay) => *base = overlay,
    }
}
