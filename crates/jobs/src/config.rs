//! Client configuration.
//!
//! Resolution order: built-in defaults, then the TOML file
//! (`$CONFIG_DIR/dats/jobs.toml` or an explicit path), then environment
//! variables.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::error::ConfigError;

/// Polling cadence for one job.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct PollConfig {
    pub interval_ms: u64,
    /// Upper bound for the delay after repeated poll failures.
    pub max_backoff_ms: u64,
    /// Give up after this many consecutive failures. `None` polls forever.
    pub max_consecutive_failures: Option<u32>,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval_ms: 1000,
            max_backoff_ms: 30_000,
            max_consecutive_failures: None,
        }
    }
}

impl PollConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    /// Delay before the next poll, doubling per consecutive failure.
    pub fn delay_after(&self, consecutive_failures: u32) -> Duration {
        let factor = 1u64 << consecutive_failures.min(16);
        let delay = self.interval_ms.saturating_mul(factor);
        Duration::from_millis(delay.min(self.max_backoff_ms.max(self.interval_ms)))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Base URL of the REST API.
    pub api_url: String,
    /// Base URL that export `results_url`s are relative to.
    pub content_url: String,
    /// Bearer token sent with every request.
    pub token: Option<String>,
    pub request_timeout_secs: u64,
    /// Where finished exports are saved.
    pub download_dir: PathBuf,
    pub poll: PollConfig,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_url: "http://localhost:5500".into(),
            content_url: "http://localhost:13120".into(),
            token: None,
            request_timeout_secs: 30,
            download_dir: PathBuf::from("."),
            poll: PollConfig::default(),
        }
    }
}

impl ClientConfig {
    /// Default config file location, if the platform has a config dir.
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("dats").join("jobs.toml"))
    }

    /// Load from `path` (or the default location when it exists), then apply
    /// environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => match Self::default_path().filter(|p| p.exists()) {
                Some(path) => Self::from_file(&path)?,
                None => Self::default(),
            },
        };
        config.apply_overrides(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&raw).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            message: e.to_string(),
        })
    }

    /// Apply `DATS_*` overrides from `lookup`.
    pub fn apply_overrides(
        &mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<(), ConfigError> {
        if let Some(url) = lookup("DATS_API_URL") {
            self.api_url = url;
        }
        if let Some(url) = lookup("DATS_CONTENT_URL") {
            self.content_url = url;
        }
        if let Some(token) = lookup("DATS_TOKEN").filter(|t| !t.is_empty()) {
            self.token = Some(token);
        }
        if let Some(dir) = lookup("DATS_DOWNLOAD_DIR") {
            self.download_dir = PathBuf::from(dir);
        }
        if let Some(raw) = lookup("DATS_POLL_INTERVAL_MS") {
            self.poll.interval_ms = raw.parse().map_err(|_| ConfigError::InvalidValue {
                key: "DATS_POLL_INTERVAL_MS",
                value: raw.clone(),
            })?;
        }
        self.validate()
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        for (key, url) in [("api_url", &self.api_url), ("content_url", &self.content_url)] {
            if !(url.starts_with("http://") || url.starts_with("https://")) {
                return Err(ConfigError::InvalidValue {
                    key,
                    value: url.clone(),
                });
            }
        }
        if self.poll.interval_ms == 0 {
            return Err(ConfigError::InvalidValue {
                key: "poll.interval_ms",
                value: "0".into(),
            });
        }
        Ok(())
    }
}
