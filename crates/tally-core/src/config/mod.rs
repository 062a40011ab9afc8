//! Engine configuration.
//!
//! `EngineConfig` is read from an optional JSON file and then overridden by
//! `TALLY_*` environment variables. Every field has a default, so a missing
//! file yields a working configuration.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::util::{is_http_url, normalize_text_option};

pub const DEFAULT_MAX_RETRIES: u32 = 5;
pub const DEFAULT_REMOTE_TIMEOUT_SECS: u64 = 10;
pub const DEFAULT_RETRY_INTERVAL_SECS: u64 = 60;

pub const ENV_MAX_RETRIES: &str = "TALLY_MAX_RETRIES";
pub const ENV_REMOTE_TIMEOUT_SECS: &str = "TALLY_REMOTE_TIMEOUT_SECS";
pub const ENV_RETRY_INTERVAL_SECS: &str = "TALLY_RETRY_INTERVAL_SECS";
pub const ENV_API_URL: &str = "TALLY_API_URL";

/// Tunables of the queue, the coordinator and the HTTP remote.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct EngineConfig {
    /// Transient delivery failures tolerated before a vote becomes `Failed`
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Upper bound for a single remote call
    #[serde(default = "default_remote_timeout_secs")]
    pub remote_timeout_secs: u64,
    /// Periodic drain while online; `0` disables the timer
    #[serde(default = "default_retry_interval_secs")]
    pub retry_interval_secs: u64,
    #[serde(default)]
    pub api_base_url: Option<String>,
}

const fn default_max_retries() -> u32 {
    DEFAULT_MAX_RETRIES
}

const fn default_remote_timeout_secs() -> u64 {
    DEFAULT_REMOTE_TIMEOUT_SECS
}

const fn default_retry_interval_secs() -> u64 {
    DEFAULT_RETRY_INTERVAL_SECS
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            remote_timeout_secs: DEFAULT_REMOTE_TIMEOUT_SECS,
            retry_interval_secs: DEFAULT_RETRY_INTERVAL_SECS,
            api_base_url: None,
        }
    }
}

impl EngineConfig {
    /// Load from a JSON file; a missing file yields the defaults.
    pub fn load_from_path(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let raw = std::fs::read_to_string(path)?;
        let mut config = serde_json::from_str::<Self>(&raw).map_err(|error| {
            Error::InvalidInput(format!(
                "Failed to parse config at {}: {error}",
                path.display()
            ))
        })?;
        config.api_base_url = normalize_text_option(config.api_base_url.take());
        Ok(config)
    }

    /// Apply `TALLY_*` overrides from the process environment.
    pub fn apply_env(&mut self) -> Result<()> {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    /// Apply overrides from an arbitrary variable lookup.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(value) = lookup(ENV_MAX_RETRIES) {
            self.max_retries = parse_number(ENV_MAX_RETRIES, &value)?;
        }
        if let Some(value) = lookup(ENV_REMOTE_TIMEOUT_SECS) {
            self.remote_timeout_secs = parse_number(ENV_REMOTE_TIMEOUT_SECS, &value)?;
        }
        if let Some(value) = lookup(ENV_RETRY_INTERVAL_SECS) {
            self.retry_interval_secs = parse_number(ENV_RETRY_INTERVAL_SECS, &value)?;
        }
        if let Some(url) = normalize_text_option(lookup(ENV_API_URL)) {
            self.api_base_url = Some(url);
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_retries == 0 {
            return Err(Error::InvalidInput(
                "max_retries must be at least 1".to_string(),
            ));
        }
        if self.remote_timeout_secs == 0 {
            return Err(Error::InvalidInput(
                "remote_timeout_secs must be at least 1".to_string(),
            ));
        }
        if let Some(url) = self.api_base_url.as_deref() {
            if !is_http_url(url) {
                return Err(Error::InvalidInput(
                    "api_base_url must include http:// or https://".to_string(),
                ));
            }
        }
        Ok(())
    }

    pub const fn remote_timeout(&self) -> Duration {
        Duration::from_secs(self.remote_timeout_secs)
    }

    /// `None` when the periodic drain is disabled
    pub const fn retry_interval(&self) -> Option<Duration> {
        if self.retry_interval_secs == 0 {
            None
        } else {
            Some(Duration::from_secs(self.retry_interval_secs))
        }
    }
}

fn parse_number<T: std::str::FromStr>(key: &str, value: &str) -> Result<T> {
    value
        .trim()
        .parse()
        .map_err(|_| {
            Error::InvalidInput(format!(
                "{key} must be a non-negative integer, got '{value}'"
            ))
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::collections::HashMap;

    #[test]
    fn test_missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = EngineConfig::load_from_path(&dir.path().join("config.json")).unwrap();
        assert_eq!(config, EngineConfig::default());
        assert_eq!(config.remote_timeout(), Duration::from_secs(10));
    }

    #[test]
    fn test_partial_file_keeps_other_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(
            &path,
            r#"{ "max_retries": 3, "api_base_url": " https://votes.example.com " }"#,
        )
        .unwrap();

        let config = EngineConfig::load_from_path(&path).unwrap();
        assert_eq!(config.max_retries, 3);
        assert_eq!(config.retry_interval_secs, DEFAULT_RETRY_INTERVAL_SECS);
        assert_eq!(
            config.api_base_url.as_deref(),
            Some("https://votes.example.com")
        );
    }

    #[test]
    fn test_rejects_unknown_fields() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{ "max_retry": 3 }"#).unwrap();

        let error = EngineConfig::load_from_path(&path).unwrap_err();
        assert!(error.to_string().contains("unknown field"));
    }

    #[test]
    fn test_env_overrides() {
        let vars = HashMap::from([
            (ENV_MAX_RETRIES, "2"),
            (ENV_RETRY_INTERVAL_SECS, "0"),
            (ENV_API_URL, "http://localhost:8080"),
        ]);
        let mut config = EngineConfig::default();
        config
            .apply_overrides(|key| vars.get(key).map(ToString::to_string))
            .unwrap();

        assert_eq!(config.max_retries, 2);
        assert_eq!(config.retry_interval(), None);
        assert_eq!(config.remote_timeout_secs, DEFAULT_REMOTE_TIMEOUT_SECS);
        assert_eq!(config.api_base_url.as_deref(), Some("http://localhost:8080"));
    }

    #[test]
    fn test_env_override_rejects_garbage() {
        let mut config = EngineConfig::default();
        let error = config
            .apply_overrides(|key| (key == ENV_MAX_RETRIES).then(|| "five".to_string()))
            .unwrap_err();
        assert!(error.to_string().contains(ENV_MAX_RETRIES));
    }

    #[test]
    fn test_validate() {
        assert!(EngineConfig::default().validate().is_ok());
        assert!(EngineConfig {
            max_retries: 0,
            ..EngineConfig::default()
        }
        .validate()
        .is_err());
        assert!(EngineConfig {
            remote_timeout_secs: 0,
            ..EngineConfig::default()
        }
        .validate()
        .is_err());
        assert!(EngineConfig {
            api_base_url: Some("ftp://votes".to_string()),
            ..EngineConfig::default()
        }
        .validate()
        .is_err());
    }
}
