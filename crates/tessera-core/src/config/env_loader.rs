//! Environment variable overrides

use super::model::TesseraConfig;
use crate::error::{TesseraError, TesseraResult};
use std::time::Duration;

pub const ENV_API_URL: &str = "TESSERA_API_URL";
pub const ENV_API_TOKEN: &str = "TESSERA_API_TOKEN";
pub const ENV_MAX_RETRIES: &str = "TESSERA_MAX_RETRIES";
pub const ENV_POLL_INTERVAL_SECS: &str = "TESSERA_POLL_INTERVAL_SECS";
pub const ENV_LOG_LEVEL: &str = "TESSERA_LOG_LEVEL";

/// Apply `TESSERA_*` overrides read through `lookup`
pub fn apply_env_overrides<F>(config: &mut TesseraConfig, lookup: F) -> TesseraResult<()>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(url) = lookup(ENV_API_URL) {
        config.api.base_url = url;
    }
    if let Some(token) = lookup(ENV_API_TOKEN).filter(|t| !t.is_empty()) {
        config.api.token = Some(token);
    }
    if let Some(value) = lookup(ENV_MAX_RETRIES) {
        config.retry.max_retries = value.trim().parse().map_err(|_| {
            TesseraError::config(format!("Invalid {} value '{}'", ENV_MAX_RETRIES, value))
        })?;
    }
    if let Some(value) = lookup(ENV_POLL_INTERVAL_SECS) {
        let secs: u64 = value.trim().parse().map_err(|_| {
            TesseraError::config(format!(
                "Invalid {} value '{}'",
                ENV_POLL_INTERVAL_SECS, value
            ))
        })?;
        config.tasks.poll_interval = Duration::from_secs(secs);
    }
    if let Some(level) = lookup(ENV_LOG_LEVEL) {
        config.logging.level = level;
    }
    Ok(())
}

/// Apply overrides from the process environment
pub fn load_env_overrides(config: &mut TesseraConfig) -> TesseraResult<()> {
    apply_env_overrides(config, |key| std::env::var(key).ok())
}
