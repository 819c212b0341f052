//! Configuration for the trust console.

use crate::core::{DEFAULT_ACTIVITY_CAPACITY, DEFAULT_TIMELINE_CAPACITY, DEFAULT_WINDOW_LIMIT};
use crate::core::SyncLimits;
use crate::sources::ReconnectPolicy;
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Environment variable overriding [`Config::api_base_url`].
pub const ENV_API_BASE_URL: &str = "TRUST_CONSOLE_API_BASE_URL";

/// Environment variable overriding [`Config::read_intent`].
pub const ENV_READ_INTENT: &str = "TRUST_CONSOLE_READ_INTENT";

/// Main configuration for the console.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Base URL of the trust service HTTP API
    pub api_base_url: String,

    /// Value sent in the `X-Intent` header on every read
    pub read_intent: String,

    /// How often the full score snapshot is pulled
    #[serde(with = "duration_serde")]
    pub snapshot_interval: Duration,

    /// How often the selected agent's timeline is pulled
    #[serde(with = "duration_serde")]
    pub timeline_interval: Duration,

    /// Per-request HTTP timeout
    #[serde(with = "duration_serde")]
    pub request_timeout: Duration,

    /// Number of timeline points shown for the selected agent
    pub window_limit: usize,

    /// Points retained in the backing timeline buffer
    pub timeline_capacity: usize,

    /// Live events retained in the activity feed
    pub activity_capacity: usize,

    /// Reconnect backoff for the live channel
    pub reconnect: ReconnectPolicy,

    /// IANA time zone for displayed timestamps (local time if unset)
    pub display_timezone: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_base_url: "http://localhost:8000".to_string(),
            read_intent: "READ".to_string(),
            snapshot_interval: Duration::from_secs(8),
            timeline_interval: Duration::from_secs(12),
            request_timeout: Duration::from_secs(10),
            window_limit: DEFAULT_WINDOW_LIMIT,
            timeline_capacity: DEFAULT_TIMELINE_CAPACITY,
            activity_capacity: DEFAULT_ACTIVITY_CAPACITY,
            reconnect: ReconnectPolicy::default(),
            display_timezone: None,
        }
    }
}

impl Config {
    /// Load configuration from the default location, then apply environment
    /// overrides.
    pub fn load() -> Result<Self, ConfigError> {
        let mut config = Self::load_from(&Self::config_path())?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Load configuration from `path`, falling back to defaults if the file
    /// does not exist.
    pub fn load_from(path: &std::path::Path) -> Result<Self, ConfigError> {
        if path.exists() {
            let content =
                std::fs::read_to_string(path).map_err(|e| ConfigError::IoError(e.to_string()))?;
            let config: Config = serde_json::from_str(&content)
                .map_err(|e| ConfigError::ParseError(e.to_string()))?;
            Ok(config)
        } else {
            Ok(Self::default())
        }
    }

    /// Save configuration to the default location.
    pub fn save(&self) -> Result<PathBuf, ConfigError> {
        let config_path = Self::config_path();
        self.save_to(&config_path)?;
        Ok(config_path)
    }

    pub fn save_to(&self, path: &std::path::Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| ConfigError::IoError(e.to_string()))?;
        }

        let content = serde_json::to_string_pretty(self)
            .map_err(|e| ConfigError::SerializeError(e.to_string()))?;

        std::fs::write(path, content).map_err(|e| ConfigError::IoError(e.to_string()))?;

        Ok(())
    }

    /// Get the path to the configuration file.
    pub fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("trust-console")
            .join("config.json")
    }

    fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    /// Apply overrides from a key lookup. Empty values are ignored.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let lookup = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(url) = lookup(ENV_API_BASE_URL) {
            self.api_base_url = url.trim().to_string();
        }
        if let Some(intent) = lookup(ENV_READ_INTENT) {
            self.read_intent = intent.trim().to_string();
        }
    }

    /// Check that the configuration is usable.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let url = url::Url::parse(&self.api_base_url).map_err(|e| {
            ConfigError::Invalid(format!("api_base_url '{}': {e}", self.api_base_url))
        })?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(ConfigError::Invalid(format!(
                "api_base_url must use http or https, got '{}'",
                url.scheme()
            )));
        }

        if self.snapshot_interval.is_zero() || self.timeline_interval.is_zero() {
            return Err(ConfigError::Invalid(
                "poll intervals must be greater than zero".to_string(),
            ));
        }
        if self.window_limit == 0 {
            return Err(ConfigError::Invalid(
                "window_limit must be greater than zero".to_string(),
            ));
        }
        if self.timeline_capacity < self.window_limit {
            return Err(ConfigError::Invalid(format!(
                "timeline_capacity ({}) must be at least window_limit ({})",
                self.timeline_capacity, self.window_limit
            )));
        }

        self.display_tz()?;
        self.reconnect.validate().map_err(ConfigError::Invalid)?;
        Ok(())
    }

    /// Parsed display time zone.
    pub fn display_tz(&self) -> Result<Option<Tz>, ConfigError> {
        self.display_timezone
            .as_deref()
            .map(|name| {
                name.parse::<Tz>()
                    .map_err(|e| ConfigError::Invalid(format!("display_timezone '{name}': {e}")))
            })
            .transpose()
    }

    pub fn sync_limits(&self) -> SyncLimits {
        SyncLimits {
            timeline_capacity: self.timeline_capacity,
            activity_capacity: self.activity_capacity,
        }
    }
}

/// Configuration errors.
#[derive(Debug)]
pub enum ConfigError {
    IoError(String),
    ParseError(String),
    SerializeError(String),
    Invalid(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::IoError(e) => write!(f, "IO error: {e}"),
            ConfigError::ParseError(e) => write!(f, "Parse error: {e}"),
            ConfigError::SerializeError(e) => write!(f, "Serialize error: {e}"),
            ConfigError::Invalid(e) => write!(f, "Invalid configuration: {e}"),
        }
    }
}

impl std::error::Error for ConfigError {}

/// Serde support for Duration, as whole seconds.
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        duration.as_secs().serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.snapshot_interval, Duration::from_secs(8));
        assert_eq!(config.timeline_interval, Duration::from_secs(12));
        assert_eq!(config.window_limit, 10);
        assert_eq!(config.read_intent, "READ");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let config: Config =
            serde_json::from_str(r#"{"api_base_url": "https://trust.example", "window_limit": 5}"#)
                .unwrap();
        assert_eq!(config.api_base_url, "https://trust.example");
        assert_eq!(config.window_limit, 5);
        assert_eq!(config.snapshot_interval, Duration::from_secs(8));
    }

    #[test]
    fn test_overrides() {
        let mut config = Config::default();
        config.apply_overrides(|key| match key {
            ENV_API_BASE_URL => Some(" http://10.0.0.5:9000 ".to_string()),
            ENV_READ_INTENT => Some("".to_string()),
            _ => None,
        });
        assert_eq!(config.api_base_url, "http://10.0.0.5:9000");
        assert_eq!(config.read_intent, "READ");
    }

    #[test]
    fn test_validation_errors() {
        let mut config = Config {
            api_base_url: "not a url".to_string(),
            ..Config::default()
        };
        assert!(config.validate().is_err());

        config.api_base_url = "ftp://host".to_string();
        assert!(config.validate().is_err());

        config.api_base_url = "http://host".to_string();
        config.window_limit = 0;
        assert!(config.validate().is_err());

        config.window_limit = 10;
        config.display_timezone = Some("Mars/Olympus".to_string());
        assert!(config.validate().is_err());

        config.display_timezone = Some("Europe/Berlin".to_string());
        assert!(config.validate().is_ok());
        assert_eq!(config.display_tz().unwrap(), Some(chrono_tz::Europe::Berlin));
    }

    #[test]
    fn test_save_and_load_roundtrip_file() {
        let path = std::env::temp_dir()
            .join(format!("trust-console-test-{}", uuid::Uuid::new_v4()))
            .join("config.json");

        let config = Config {
            window_limit: 7,
            ..Config::default()
        };
        config.save_to(&path).unwrap();

        let loaded = Config::load_from(&path).unwrap();
        assert_eq!(loaded.window_limit, 7);

        let _ = std::fs::remove_dir_all(path.parent().unwrap());
    }
}
