//! Configuration loading.
//!
//! A TOML file supplies the bridge URL, device name seed, poll/sync
//! intervals and custom pattern definitions. Everything has a default so
//! the tool works out of the box with no file at all; an explicitly named
//! file that is missing or malformed is an error.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;

use clipbridge_core::{DetectError, PatternSet, PatternSpec};

pub const DEFAULT_POLL_INTERVAL_MS: u64 = 1000;
pub const DEFAULT_SYNC_INTERVAL_SECS: u64 = 30;
pub const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 10;

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Bridge base URL, e.g. `https://cb.yourl.cloud`. When absent the
    /// tool runs capture-only; sync commands warn and skip.
    pub bridge_url: Option<String>,
    /// Seed for the device identifier (defaults to the hostname). Only
    /// consulted the first time the store generates an id.
    pub device_name: Option<String>,
    /// Where the history database lives; defaults to the user data dir.
    pub db_path: Option<PathBuf>,
    pub poll_interval_ms: u64,
    pub sync_interval_secs: u64,
    pub http_timeout_secs: u64,
    /// Extra detection patterns; the canonical access-code pattern is used
    /// when none are configured.
    pub patterns: Vec<PatternSpec>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bridge_url: None,
            device_name: None,
            db_path: None,
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            sync_interval_secs: DEFAULT_SYNC_INTERVAL_SECS,
            http_timeout_secs: DEFAULT_HTTP_TIMEOUT_SECS,
            patterns: Vec::new(),
        }
    }
}

impl Config {
    /// Load configuration. An explicit path must exist and parse; the
    /// default path is optional and silently falls back to defaults.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        match explicit {
            Some(path) => Self::read(path)
                .with_context(|| format!("failed to load config {}", path.display())),
            None => match Self::default_path() {
                Some(path) if path.exists() => Self::read(&path)
                    .with_context(|| format!("failed to load config {}", path.display())),
                _ => Ok(Self::default()),
            },
        }
    }

    fn read(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)?;
        Ok(toml::from_str(&raw)?)
    }

    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("clipbridge").join("config.toml"))
    }

    /// Resolved database path; the parent directory is created on demand.
    pub fn resolve_db_path(&self) -> Result<PathBuf> {
        let path = match &self.db_path {
            Some(path) => path.clone(),
            None => dirs::data_dir()
                .context("no user data directory available; set db_path in the config")?
                .join("clipbridge")
                .join("history.db"),
        };
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("cannot create {}", parent.display()))?;
        }
        Ok(path)
    }

    /// Compiled pattern set: configured patterns, or the canonical default.
    pub fn pattern_set(&self) -> Result<PatternSet, DetectError> {
        if self.patterns.is_empty() {
            Ok(PatternSet::with_defaults())
        } else {
            PatternSet::from_specs(&self.patterns)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.poll_interval_ms, DEFAULT_POLL_INTERVAL_MS);
        assert_eq!(config.sync_interval_secs, DEFAULT_SYNC_INTERVAL_SECS);
        assert!(config.bridge_url.is_none());
        assert!(config.pattern_set().is_ok());
    }

    #[test]
    fn test_parse_full_config() {
        let raw = r#"
            bridge_url = "https://cb.yourl.cloud"
            device_name = "desk"
            poll_interval_ms = 250
            sync_interval_secs = 60

            [[patterns]]
            name = "ticket"
            tag = "ticket"
            regex = '\bTKT-\d{4}\b'
        "#;
        let config: Config = toml::from_str(raw).unwrap();
        assert_eq!(config.bridge_url.as_deref(), Some("https://cb.yourl.cloud"));
        assert_eq!(config.poll_interval_ms, 250);
        assert_eq!(config.patterns.len(), 1);
        assert!(config.pattern_set().is_ok());
    }

    #[test]
    fn test_unknown_keys_rejected() {
        assert!(toml::from_str::<Config>("bridge_uri = \"typo\"").is_err());
    }

    #[test]
    fn test_missing_explicit_config_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope.toml");
        assert!(Config::load(Some(&missing)).is_err());
    }

    #[test]
    fn test_bad_pattern_surfaces_at_compile_time() {
        let config: Config = toml::from_str(
            r#"
            [[patterns]]
            name = "broken"
            tag = "broken"
            regex = "(unclosed"
        "#,
        )
        .unwrap();
        assert!(config.pattern_set().is_err());
    }
}
