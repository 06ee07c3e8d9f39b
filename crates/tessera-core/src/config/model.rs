//! Configuration model

use crate::error::{TesseraError, TesseraResult};
use crate::recovery::RetryPolicy;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Backend endpoint settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    pub base_url: String,
    /// Bearer token sent with every request
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    /// Cold-start window for the first response of a request
    #[serde(with = "humantime_serde")]
    pub connect_timeout: Duration,
    /// Longest allowed gap between chunks of a streaming body
    #[serde(with = "humantime_serde")]
    pub idle_timeout: Duration,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8080/api".to_string(),
            token: None,
            connect_timeout: Duration::from_secs(30),
            idle_timeout: Duration::from_secs(60),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VoiceConfig {
    /// Pause between the end of capture and submitting the transcript
    #[serde(with = "humantime_serde")]
    pub settle_delay: Duration,
    /// Speak replies to voice questions
    pub auto_speak: bool,
}

impl Default for VoiceConfig {
    fn default() -> Self {
        Self {
            settle_delay: Duration::from_millis(300),
            auto_speak: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TasksConfig {
    #[serde(with = "humantime_serde")]
    pub poll_interval: Duration,
    /// Agents that always get a rollup, even without tasks
    pub agents: Vec<String>,
}

impl Default for TasksConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(5),
            agents: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level or `EnvFilter` directive
    pub level: String,
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Pretty,
        }
    }
}

/// Complete engine configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TesseraConfig {
    pub api: ApiConfig,
    pub retry: RetryPolicy,
    pub voice: VoiceConfig,
    pub tasks: TasksConfig,
    pub logging: LoggingConfig,
}

impl TesseraConfig {
    /// `~/.config/tessera/config.toml` or the platform equivalent
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("tessera").join("config.toml"))
    }

    pub fn validate(&self) -> TesseraResult<()> {
        let base_url = self.api.base_url.trim();
        if base_url.is_empty() {
            return Err(TesseraError::config_with_context(
                "api.base_url is empty",
                "validating configuration",
            ));
        }
        let url = reqwest::Url::parse(base_url).map_err(|e| {
            TesseraError::config_with_context(
                format!("api.base_url '{}' is not a valid URL: {}", base_url, e),
                "validating configuration",
            )
        })?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(TesseraError::config(format!(
                "api.base_url must use http or https, got '{}'",
                url.scheme()
            )));
        }
        if self.retry.max_retries == 0 {
            return Err(TesseraError::config("retry.max_retries must be at least 1"));
        }
        if self.tasks.poll_interval.is_zero() {
            return Err(TesseraError::config("tasks.poll_interval must be positive"));
        }
        Ok(())
    }
}
