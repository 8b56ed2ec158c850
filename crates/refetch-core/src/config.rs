use crate::retry::{BackoffKind, RetryPolicy, DEFAULT_MAX_ATTEMPTS, DEFAULT_RETRY_AFTER_CODES};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Backoff parameters (optional `[retry]` section in config.toml).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryConfig {
    /// "linear" or "exponential" (any case); anything else fails to load.
    #[serde(default)]
    pub kind: BackoffKind,
    /// Floor for every backoff delay, in milliseconds.
    pub min_delay_ms: u64,
    /// Linear ceiling and jitter base, in milliseconds.
    pub max_delay_ms: u64,
    #[serde(default = "default_jitter")]
    pub jitter: bool,
}

fn default_jitter() -> bool {
    true
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            kind: BackoffKind::Exponential,
            min_delay_ms: 500,
            max_delay_ms: 60_000,
            jitter: true,
        }
    }
}

impl RetryConfig {
    pub fn to_policy(&self, max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            kind: self.kind,
            min_delay: Duration::from_millis(self.min_delay_ms),
            max_delay: Duration::from_millis(self.max_delay_ms),
            max_attempts,
            jitter: self.jitter,
        }
    }
}

/// Semantic problems in an otherwise well-formed config file.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("max_attempts must be at least 1")]
    ZeroAttempts,
    #[error("retry.min_delay_ms ({min}) exceeds retry.max_delay_ms ({max})")]
    DelayRange { min: u64, max: u64 },
    #[error("retry_after_codes contains {0}, which is not an HTTP status code")]
    InvalidStatus(u16),
    #[error("invalid base_url {0:?}")]
    InvalidBaseUrl(String),
    #[error("invalid default header {0:?}")]
    InvalidHeader(String),
}

/// Global configuration loaded from `~/.config/refetch/config.toml`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RefetchConfig {
    /// Base URL that request endpoints are joined to.
    #[serde(default)]
    pub base_url: Option<String>,
    /// Attempts per logical request (including the first).
    pub max_attempts: u32,
    /// Per-attempt timeout in milliseconds.
    #[serde(default)]
    pub timeout_ms: Option<u64>,
    /// Statuses that consult `Retry-After`.
    #[serde(default = "default_retry_after_codes")]
    pub retry_after_codes: Vec<u16>,
    /// Headers sent with every request.
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    /// Optional backoff policy; without it plain failures retry immediately.
    #[serde(default)]
    pub retry: Option<RetryConfig>,
}

fn default_retry_after_codes() -> Vec<u16> {
    DEFAULT_RETRY_AFTER_CODES.to_vec()
}

impl Default for RefetchConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            timeout_ms: None,
            retry_after_codes: default_retry_after_codes(),
            headers: BTreeMap::new(),
            retry: None,
        }
    }
}

impl RefetchConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_attempts == 0 {
            return Err(ConfigError::ZeroAttempts);
        }
        if let Some(retry) = &self.retry {
            if retry.min_delay_ms > retry.max_delay_ms {
                return Err(ConfigError::DelayRange {
                    min: retry.min_delay_ms,
                    max: retry.max_delay_ms,
                });
            }
        }
        if let Some(code) = self
            .retry_after_codes
            .iter()
            .find(|c| !(100..=999).contains(*c))
        {
            return Err(ConfigError::InvalidStatus(*code));
        }
        if let Some(base) = &self.base_url {
            url::Url::parse(base).map_err(|_| ConfigError::InvalidBaseUrl(base.clone()))?;
        }
        Ok(())
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_ms.map(Duration::from_millis)
    }

    /// Backoff policy over this config's attempt budget, if configured.
    pub fn retry_policy(&self) -> Option<RetryPolicy> {
        self.retry.as_ref().map(|r| r.to_policy(self.max_attempts))
    }
}

pub fn config_path() -> Result<PathBuf> {
    let xdg_dirs = xdg::BaseDirectories::with_prefix("refetch")?;
    Ok(xdg_dirs.place_config_file("config.toml")?)
}

/// Parse and validate config text.
pub fn parse(text: &str) -> Result<RefetchConfig> {
    let cfg: RefetchConfig = toml::from_str(text)?;
    cfg.validate()?;
    Ok(cfg)
}

/// Load configuration from an explicit path.
pub fn load_from(path: &Path) -> Result<RefetchConfig> {
    let data = fs::read_to_string(path)
        .with_context(|| format!("reading config {}", path.display()))?;
    parse(&data).with_context(|| format!("loading config {}", path.display()))
}

/// Load configuration from disk, creating a default file if none exists.
pub fn load_or_init() -> Result<RefetchConfig> {
    let path = config_path()?;
    if !path.exists() {
        let default_cfg = RefetchConfig::default();
        let toml = toml::to_string_pretty(&default_cfg)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, toml)?;
        tracing::info!("created default config at {}", path.display());
        return Ok(default_cfg);
    }

    load_from(&path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_values() {
        let cfg = RefetchConfig::default();
        assert_eq!(cfg.max_attempts, 5);
        assert_eq!(cfg.retry_after_codes, [408, 429, 500, 502, 503, 504]);
        assert!(cfg.retry.is_none());
        assert!(cfg.timeout().is_none());
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn config_toml_roundtrip() {
        let mut cfg = RefetchConfig::default();
        cfg.base_url = Some("https://api.example.com/v1/".to_string());
        cfg.headers
            .insert("Accept".to_string(), "application/json".to_string());
        cfg.retry = Some(RetryConfig::default());
        let toml = toml::to_string_pretty(&cfg).unwrap();
        let parsed = parse(&toml).unwrap();
        assert_eq!(parsed, cfg);
    }

    #[test]
    fn config_toml_custom_values() {
        let toml = r#"
            base_url = "http://127.0.0.1:8000"
            max_attempts = 3
            timeout_ms = 2500
            retry_after_codes = [429, 503]

            [headers]
            X-Client = "refetch"

            [retry]
            kind = "linear"
            min_delay_ms = 100
            max_delay_ms = 10000
            jitter = false
        "#;
        let cfg = parse(toml).unwrap();
        assert_eq!(cfg.max_attempts, 3);
        assert_eq!(cfg.timeout(), Some(Duration::from_millis(2500)));
        assert_eq!(cfg.retry_after_codes, [429, 503]);
        assert_eq!(cfg.headers.get("X-Client").map(String::as_str), Some("refetch"));
        let policy = cfg.retry_policy().unwrap();
        assert_eq!(policy.kind, BackoffKind::Linear);
        assert_eq!(policy.max_attempts, 3);
        assert_eq!(policy.min_delay, Duration::from_millis(100));
        assert!(!policy.jitter);
    }

    #[test]
    fn minimal_toml_uses_defaults() {
        let cfg = parse("max_attempts = 2").unwrap();
        assert_eq!(cfg.retry_after_codes, DEFAULT_RETRY_AFTER_CODES);
        assert!(cfg.headers.is_empty());
        assert!(cfg.base_url.is_none());
    }

    #[test]
    fn retry_section_defaults_kind_and_jitter() {
        let cfg = parse(
            r#"
            max_attempts = 4
            [retry]
            min_delay_ms = 200
            max_delay_ms = 5000
        "#,
        )
        .unwrap();
        let retry = cfg.retry.unwrap();
        assert_eq!(retry.kind, BackoffKind::Exponential);
        assert!(retry.jitter);
    }

    #[test]
    fn backoff_kind_is_case_insensitive() {
        let cfg = parse(
            r#"
            max_attempts = 4
            [retry]
            kind = "LINEAR"
            min_delay_ms = 200
            max_delay_ms = 5000
        "#,
        )
        .unwrap();
        assert_eq!(cfg.retry.unwrap().kind, BackoffKind::Linear);
    }

    #[test]
    fn unknown_backoff_kind_is_rejected() {
        let err = parse(
            r#"
            max_attempts = 4
            [retry]
            kind = "fibonacci"
            min_delay_ms = 200
            max_delay_ms = 5000
        "#,
        )
        .unwrap_err();
        assert!(format!("{err:#}").contains("fibonacci"), "{err:#}");
    }

    #[test]
    fn validation_errors() {
        assert!(parse("max_attempts = 0").is_err());

        let mut cfg = RefetchConfig::default();
        cfg.retry = Some(RetryConfig {
            min_delay_ms: 5000,
            max_delay_ms: 100,
            ..RetryConfig::default()
        });
        assert_eq!(
            cfg.validate(),
            Err(ConfigError::DelayRange { min: 5000, max: 100 })
        );

        let mut cfg = RefetchConfig::default();
        cfg.retry_after_codes = vec![429, 42];
        assert_eq!(cfg.validate(), Err(ConfigError::InvalidStatus(42)));

        let mut cfg = RefetchConfig::default();
        cfg.base_url = Some("not a url".to_string());
        assert!(matches!(cfg.validate(), Err(ConfigError::InvalidBaseUrl(_))));
    }

    #[test]
    fn load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "max_attempts = 7\ntimeout_ms = 100\n").unwrap();
        let cfg = load_from(&path).unwrap();
        assert_eq!(cfg.max_attempts, 7);
        assert!(load_from(&dir.path().join("missing.toml")).is_err());
    }
}
