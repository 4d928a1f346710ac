//! Configuration loading and validation for Loomline.
//!
//! Loads orchestrator tunables from `~/.loomline/config.toml` with
//! environment variable overrides. Validates all settings at load time.
//!
//! The token limit and compaction recency window are deployment knobs, not
//! invariants: the defaults are 16000 tokens and keep-last-3, and every value
//! here can be overridden.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use loomline_core::RetryPolicy;

/// The root configuration structure.
///
/// Maps directly to `~/.loomline/config.toml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Token budget for the reasoning context. Compaction is required once
    /// the estimated context size exceeds this.
    #[serde(default = "default_token_limit")]
    pub token_limit: usize,

    /// How many raw entries survive a compaction, after the digest.
    #[serde(default = "default_keep_recent")]
    pub keep_recent: usize,

    /// Cap on autonomous think→act steps within one drained turn.
    #[serde(default = "default_max_chain_steps")]
    pub max_chain_steps: usize,

    /// Capacity of the per-conversation signal channel.
    #[serde(default = "default_signal_buffer")]
    pub signal_buffer: usize,

    /// Retry policies per step class.
    #[serde(default)]
    pub retry: RetryConfig,
}

fn default_token_limit() -> usize {
    16_000
}
fn default_keep_recent() -> usize {
    3
}
fn default_max_chain_steps() -> usize {
    16
}
fn default_signal_buffer() -> usize {
    64
}

/// Retry/backoff settings for one step class.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryPolicyConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    #[serde(default = "default_initial_backoff_secs")]
    pub initial_backoff_secs: u64,

    #[serde(default = "default_multiplier")]
    pub multiplier: f64,

    pub timeout_secs: u64,
}

fn default_max_attempts() -> u32 {
    5
}
fn default_initial_backoff_secs() -> u64 {
    1
}
fn default_multiplier() -> f64 {
    1.0
}

impl RetryPolicyConfig {
    fn with_timeout(timeout_secs: u64) -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_backoff_secs: default_initial_backoff_secs(),
            multiplier: default_multiplier(),
            timeout_secs,
        }
    }

    /// Convert into the runtime policy value.
    pub fn to_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts,
            initial_backoff: Duration::from_secs(self.initial_backoff_secs),
            multiplier: self.multiplier,
            timeout: Duration::from_secs(self.timeout_secs),
        }
    }
}

/// Per-step-class retry configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Fast steps: persistence, session-link access. Default 15s / 5.
    #[serde(default = "default_fast")]
    pub fast: RetryPolicyConfig,

    /// The reasoning step. Default 5min / 5.
    #[serde(default = "default_reasoning")]
    pub reasoning: RetryPolicyConfig,

    /// Observation and compaction summarization. Default 1min / 5.
    #[serde(default = "default_observation")]
    pub observation: RetryPolicyConfig,
}

fn default_fast() -> RetryPolicyConfig {
    RetryPolicyConfig::with_timeout(15)
}
fn default_reasoning() -> RetryPolicyConfig {
    RetryPolicyConfig::with_timeout(300)
}
fn default_observation() -> RetryPolicyConfig {
    RetryPolicyConfig::with_timeout(60)
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            fast: default_fast(),
            reasoning: default_reasoning(),
            observation: default_observation(),
        }
    }
}

impl AppConfig {
    /// Load configuration from the default location with env overrides.
    ///
    /// Overrides: `LOOMLINE_TOKEN_LIMIT`, `LOOMLINE_KEEP_RECENT`.
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_dir().join("config.toml");
        let mut config = Self::load_from(&config_path)?;

        if let Ok(limit) = std::env::var("LOOMLINE_TOKEN_LIMIT")
            && let Ok(limit) = limit.parse()
        {
            config.token_limit = limit;
        }
        if let Ok(keep) = std::env::var("LOOMLINE_KEEP_RECENT")
            && let Ok(keep) = keep.parse()
        {
            config.keep_recent = keep;
        }

        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific file path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::info!("No config file found at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".loomline")
    }

    /// Validate the configuration.
    fn validate(&self) -> Result<(), ConfigError> {
        if self.token_limit == 0 {
            return Err(ConfigError::ValidationError("token_limit must be > 0".into()));
        }
        if self.keep_recent == 0 {
            return Err(ConfigError::ValidationError("keep_recent must be >= 1".into()));
        }
        if self.max_chain_steps == 0 {
            return Err(ConfigError::ValidationError(
                "max_chain_steps must be >= 1".into(),
            ));
        }
        if self.signal_buffer == 0 {
            return Err(ConfigError::ValidationError(
                "signal_buffer must be >= 1".into(),
            ));
        }
        for (name, policy) in [
            ("fast", &self.retry.fast),
            ("reasoning", &self.retry.reasoning),
            ("observation", &self.retry.observation),
        ] {
            if policy.max_attempts == 0 {
                return Err(ConfigError::ValidationError(format!(
                    "retry.{name}.max_attempts must be >= 1"
                )));
            }
            if policy.multiplier < 1.0 {
                return Err(ConfigError::ValidationError(format!(
                    "retry.{name}.multiplier must be >= 1.0"
                )));
            }
        }
        Ok(())
    }

    /// Generate a default config TOML string.
    pub fn default_toml() -> String {
        toml::to_string_pretty(&Self::default()).unwrap_or_default()
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            token_limit: default_token_limit(),
            keep_recent: default_keep_recent(),
            max_chain_steps: default_max_chain_steps(),
            signal_buffer: default_signal_buffer(),
            retry: RetryConfig::default(),
        }
    }
}

/// Get the user's home directory.
fn dirs_home() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        std::env::var("USERPROFILE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("C:\\Users\\Default"))
    }
    #[cfg(not(target_os = "windows"))]
    {
        std::env::var("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("/tmp"))
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {path}: {reason}")]
    ReadError { path: PathBuf, reason: String },

    #[error("Failed to parse config file at {path}: {reason}")]
    ParseError { path: PathBuf, reason: String },

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn default_config_is_valid() {
        let config = AppConfig::default();
        assert_eq!(config.token_limit, 16_000);
        assert_eq!(config.keep_recent, 3);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn default_retry_policies_per_step_class() {
        let config = AppConfig::default();
        assert_eq!(config.retry.fast.timeout_secs, 15);
        assert_eq!(config.retry.reasoning.timeout_secs, 300);
        assert_eq!(config.retry.observation.timeout_secs, 60);
        assert_eq!(config.retry.reasoning.max_attempts, 5);
    }

    #[test]
    fn to_policy_converts_durations() {
        let policy = RetryPolicyConfig::with_timeout(42).to_policy();
        assert_eq!(policy.timeout, Duration::from_secs(42));
        assert_eq!(policy.max_attempts, 5);
    }

    #[test]
    fn config_roundtrip_toml() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).unwrap();
        let back: AppConfig = toml::from_str(&toml_str).unwrap();
        assert_eq!(back.token_limit, config.token_limit);
        assert_eq!(back.retry.reasoning.timeout_secs, 300);
    }

    #[test]
    fn load_from_missing_file_uses_defaults() {
        let config = AppConfig::load_from(Path::new("/nonexistent/config.toml")).unwrap();
        assert_eq!(config.token_limit, 16_000);
    }

    #[test]
    fn load_from_file_with_overrides() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("config.toml");
        fs::write(
            &path,
            r#"
token_limit = 8000
keep_recent = 5

[retry.reasoning]
timeout_secs = 120
max_attempts = 3
"#,
        )
        .unwrap();

        let config = AppConfig::load_from(&path).unwrap();
        assert_eq!(config.token_limit, 8000);
        assert_eq!(config.keep_recent, 5);
        assert_eq!(config.retry.reasoning.max_attempts, 3);
        // Unspecified classes keep their defaults
        assert_eq!(config.retry.fast.timeout_secs, 15);
    }

    #[test]
    fn invalid_values_rejected() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("config.toml");
        fs::write(&path, "token_limit = 0").unwrap();
        assert!(matches!(
            AppConfig::load_from(&path),
            Err(ConfigError::ValidationError(_))
        ));

        fs::write(&path, "keep_recent = 0").unwrap();
        assert!(AppConfig::load_from(&path).is_err());
    }

    #[test]
    fn garbage_toml_rejected() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("config.toml");
        fs::write(&path, "not [valid toml").unwrap();
        assert!(matches!(
            AppConfig::load_from(&path),
            Err(ConfigError::ParseError { .. })
        ));
    }
}
