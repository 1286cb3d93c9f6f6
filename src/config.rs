//! Configuration file parser for ~/.config/feeda/config.toml.
//!
//! The config file is optional: a missing or empty file yields
//! `Config::default()`. Unknown keys are accepted but logged as warnings so
//! typos do not go unnoticed. Command-line flags override file values.
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::feed::fetcher::{DEFAULT_MAX_FEED_SIZE, DEFAULT_TIMEOUT, USER_AGENT};

// ============================================================================
// Error Types
// ============================================================================

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid TOML in config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Config file too large: {0}")]
    TooLarge(String),

    /// A value parsed but is outside its allowed range.
    #[error("Invalid config value for {key}: {reason}")]
    Invalid { key: &'static str, reason: String },
}

// ============================================================================
// Configuration
// ============================================================================

/// Top-level application configuration.
///
/// All fields use `#[serde(default)]` so any subset of keys can be specified.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Database file. `None` means `~/.feeda/db.sqlite`.
    pub db_path: Option<PathBuf>,

    pub user_agent: String,

    /// Per-feed HTTP timeout in seconds.
    pub fetch_timeout_secs: u64,

    /// Upper bound on feeds fetched at the same time.
    pub max_concurrent_fetches: usize,

    pub max_feed_size_bytes: usize,

    /// Default `list` page size. 0 = unlimited.
    pub list_limit: i64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            db_path: None,
            user_agent: USER_AGENT.to_string(),
            fetch_timeout_secs: DEFAULT_TIMEOUT.as_secs(),
            max_concurrent_fetches: 10,
            max_feed_size_bytes: DEFAULT_MAX_FEED_SIZE,
            list_limit: 10,
        }
    }
}

const KNOWN_KEYS: [&str; 6] = [
    "db_path",
    "user_agent",
    "fetch_timeout_secs",
    "max_concurrent_fetches",
    "max_feed_size_bytes",
    "list_limit",
];

impl Config {
    /// Maximum config file size (1 MB).
    const MAX_FILE_SIZE: u64 = 1_048_576;

    /// Load configuration from a TOML file.
    ///
    /// - Missing file → `Ok(Config::default())`
    /// - Empty file → `Ok(Config::default())`
    /// - Invalid TOML → `Err(ConfigError::Parse)` with line number info
    /// - Zero timeout, concurrency or size → `Err(ConfigError::Invalid)`
    /// - Unknown keys → accepted, logged as warning
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        // Check file size before reading so a huge file is never loaded
        match std::fs::metadata(path) {
            Ok(meta) if meta.len() > Self::MAX_FILE_SIZE => {
                return Err(ConfigError::TooLarge(format!(
                    "Config file is {} bytes (max {} bytes)",
                    meta.len(),
                    Self::MAX_FILE_SIZE
                )));
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "No config file found, using defaults");
                return Ok(Self::default());
            }
            Err(e) => return Err(ConfigError::Io(e)),
            Ok(_) => {}
        }

        let content = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                // File deleted between metadata and read
                tracing::debug!(path = %path.display(), "Config file disappeared, using defaults");
                return Ok(Self::default());
            }
            Err(e) => return Err(ConfigError::Io(e)),
        };

        if content.trim().is_empty() {
            tracing::debug!(path = %path.display(), "Config file is empty, using defaults");
            return Ok(Self::default());
        }

        if let Ok(raw) = content.parse::<toml::Table>() {
            for key in raw.keys() {
                if !KNOWN_KEYS.contains(&key.as_str()) {
                    tracing::warn!(key = %key, "Unknown key in config file, ignoring");
                }
            }
        }

        let config: Config = toml::from_str(&content)?;
        config.validate()?;
        tracing::info!(path = %path.display(), "Loaded configuration");
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let positive = [
            ("fetch_timeout_secs", self.fetch_timeout_secs == 0),
            ("max_concurrent_fetches", self.max_concurrent_fetches == 0),
            ("max_feed_size_bytes", self.max_feed_size_bytes == 0),
        ];
        if let Some((key, _)) = positive.into_iter().find(|&(_, is_zero)| is_zero) {
            return Err(ConfigError::Invalid {
                key,
                reason: "must be greater than 0".to_string(),
            });
        }
        if self.list_limit < 0 {
            return Err(ConfigError::Invalid {
                key: "list_limit",
                reason: "must not be negative".to_string(),
            });
        }
        Ok(())
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    /// Fresh per-test directory under the system temp dir.
    fn temp_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir()
            .join(format!("feeda_config_test_{}_{}", name, std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.db_path, None);
        assert_eq!(config.user_agent, "Feeda_feed_aggregator/1.0");
        assert_eq!(config.fetch_timeout_secs, 10);
        assert_eq!(config.max_concurrent_fetches, 10);
        assert_eq!(config.max_feed_size_bytes, 10 * 1024 * 1024);
        assert_eq!(config.list_limit, 10);
        assert_eq!(config.fetch_timeout(), Duration::from_secs(10));
    }

    #[test]
    fn test_missing_file_returns_default() {
        let path = Path::new("/tmp/feeda_test_nonexistent_config.toml");
        let config = Config::load(path).unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_whitespace_only_file_returns_default() {
        let dir = temp_dir("whitespace");
        let path = dir.join("config.toml");
        std::fs::write(&path, "   \n  \n  ").unwrap();

        assert_eq!(Config::load(&path).unwrap(), Config::default());

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_partial_config_uses_defaults_for_missing() {
        let dir = temp_dir("partial");
        let path = dir.join("config.toml");
        std::fs::write(&path, "list_limit = 25\n").unwrap();

        let config = Config::load(&path).unwrap();
        assert_eq!(config.list_limit, 25);
        assert_eq!(config.max_concurrent_fetches, 10);

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_full_config() {
        let dir = temp_dir("full");
        let path = dir.join("config.toml");

        let content = r#"
db_path = "/var/lib/feeda/feeds.sqlite"
user_agent = "custom-agent/2.0"
fetch_timeout_secs = 30
max_concurrent_fetches = 4
max_feed_size_bytes = 2048
list_limit = 0
"#;
        std::fs::write(&path, content).unwrap();

        let config = Config::load(&path).unwrap();
        assert_eq!(
            config,
            Config {
                db_path: Some(PathBuf::from("/var/lib/feeda/feeds.sqlite")),
                user_agent: "custom-agent/2.0".to_string(),
                fetch_timeout_secs: 30,
                max_concurrent_fetches: 4,
                max_feed_size_bytes: 2048,
                list_limit: 0,
            }
        );

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_invalid_toml_returns_error() {
        let dir = temp_dir("invalid");
        let path = dir.join("config.toml");
        std::fs::write(&path, "this is not [valid toml").unwrap();

        let err = Config::load(&path).unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
        assert!(err.to_string().contains("Invalid TOML"));

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_unknown_keys_accepted() {
        let dir = temp_dir("unknown");
        let path = dir.join("config.toml");
        std::fs::write(&path, "list_limit = 5\ntheme = \"dark\"\n").unwrap();

        let config = Config::load(&path).unwrap();
        assert_eq!(config.list_limit, 5);

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_wrong_type_returns_error() {
        let dir = temp_dir("wrongtype");
        let path = dir.join("config.toml");
        std::fs::write(&path, "fetch_timeout_secs = \"ten\"\n").unwrap();

        assert!(matches!(Config::load(&path), Err(ConfigError::Parse(_))));

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_zero_values_rejected() {
        let dir = temp_dir("zero");
        let path = dir.join("config.toml");

        std::fs::write(&path, "max_concurrent_fetches = 0\n").unwrap();
        assert!(matches!(
            Config::load(&path),
            Err(ConfigError::Invalid {
                key: "max_concurrent_fetches",
                ..
            })
        ));

        std::fs::write(&path, "list_limit = -1\n").unwrap();
        assert!(matches!(
            Config::load(&path),
            Err(ConfigError::Invalid { key: "list_limit", .. })
        ));

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_too_large_file_rejected() {
        let dir = temp_dir("too_large");
        let path = dir.join("config.toml");
        std::fs::write(&path, "a".repeat(1_048_577)).unwrap();

        let err = Config::load(&path).unwrap_err();
        assert!(matches!(err, ConfigError::TooLarge(_)));
        assert!(err.to_string().contains("too large"));

        std::fs::remove_dir_all(&dir).ok();
    }
}
