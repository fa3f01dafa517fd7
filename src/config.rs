use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

use crate::ingest::FetchOptions;

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct HoardConfig {
    pub server: ServerConfig,
    pub ingest: IngestConfig,
    pub sources: Vec<SourceEntry>,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ServerConfig {
    pub log_level: String,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct IngestConfig {
    pub queue_capacity: usize,
    /// Per-instance fetch timeout. `0` disables it.
    pub fetch_timeout_secs: u64,
}

/// One configured producer instance.
#[derive(Debug, Deserialize, Clone)]
pub struct SourceEntry {
    /// Instance name; becomes the `origin` of every record it emits.
    pub name: String,
    /// Producer type, e.g. `"shell_history"`.
    #[serde(rename = "type")]
    pub kind: String,
    /// Producer-specific settings, decoded by the producer's config type.
    #[serde(default)]
    pub settings: Option<toml::Table>,
}

impl SourceEntry {
    /// Settings as JSON, the form producer configs decode from.
    pub fn settings_json(&self) -> Result<serde_json::Value> {
        match &self.settings {
            Some(table) => serde_json::to_value(table)
                .with_context(|| format!("settings for source '{}' are not representable", self.name)),
            None => Ok(serde_json::Value::Null),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            log_level: "info".into(),
        }
    }
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 64,
            fetch_timeout_secs: 300,
        }
    }
}

impl IngestConfig {
    pub fn fetch_options(&self) -> FetchOptions {
        FetchOptions {
            queue_capacity: self.queue_capacity.max(1),
            timeout: (self.fetch_timeout_secs > 0)
                .then(|| Duration::from_secs(self.fetch_timeout_secs)),
        }
    }
}

/// Returns `~/.hoard/`
pub fn default_hoard_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".hoard")
}

/// Returns the default config file path: `~/.hoard/config.toml`, or
/// `HOARD_CONFIG` when set.
pub fn default_config_path() -> PathBuf {
    match std::env::var("HOARD_CONFIG") {
        Ok(path) => expand_tilde(&path),
        Err(_) => default_hoard_dir().join("config.toml"),
    }
}

impl HoardConfig {
    /// Load config from TOML file (if it exists) then apply env var overrides.
    pub fn load() -> Result<Self> {
        Self::load_from(default_config_path())
    }

    /// Load from a specific path, then apply env var overrides.
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let mut config = if path.exists() {
            let contents =
                std::fs::read_to_string(path).context("failed to read config file")?;
            Self::parse(&contents)?
        } else {
            info!("no config file at {}, using defaults", path.display());
            HoardConfig::default()
        };

        config.apply_env_overrides();
        Ok(config)
    }

    pub fn parse(contents: &str) -> Result<Self> {
        let config: HoardConfig = toml::from_str(contents).context("failed to parse config TOML")?;
        config.check_unique_names()?;
        Ok(config)
    }

    fn check_unique_names(&self) -> Result<()> {
        let mut seen = std::collections::HashSet::new();
        for source in &self.sources {
            anyhow::ensure!(
                seen.insert(source.name.as_str()),
                "source name '{}' is configured more than once",
                source.name
            );
        }
        Ok(())
    }

    /// Apply environment variable overrides (HOARD_LOG_LEVEL, HOARD_QUEUE_CAPACITY).
    fn apply_env_overrides(&mut self) {
        if let Ok(val) = std::env::var("HOARD_LOG_LEVEL") {
            self.server.log_level = val;
        }
        if let Ok(val) = std::env::var("HOARD_QUEUE_CAPACITY") {
            match val.parse() {
                Ok(capacity) => self.ingest.queue_capacity = capacity,
                Err(_) => tracing::warn!(value = %val, "ignoring invalid HOARD_QUEUE_CAPACITY"),
            }
        }
    }
}

pub fn expand_tilde(path: &str) -> PathBuf {
    match (path.strip_prefix("~/"), dirs::home_dir()) {
        (Some(rest), Some(home)) => home.join(rest),
        _ => PathBuf::from(path),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = HoardConfig::default();
        assert_eq!(config.server.log_level, "info");
        assert_eq!(config.ingest.queue_capacity, 64);
        assert!(config.sources.is_empty());
    }

    #[test]
    fn parse_toml_config() {
        let toml_str = r#"
[server]
log_level = "debug"

[ingest]
queue_capacity = 8

[[sources]]
name = "laptop"
type = "shell_history"
settings = { path = "/tmp/history", max_entries = 10 }

[[sources]]
name = "gh"
type = "forge"
"#;
        let config = HoardConfig::parse(toml_str).unwrap();
        assert_eq!(config.server.log_level, "debug");
        assert_eq!(config.ingest.queue_capacity, 8);
        // defaults still apply for unset fields
        assert_eq!(config.ingest.fetch_timeout_secs, 300);

        assert_eq!(config.sources.len(), 2);
        assert_eq!(config.sources[0].kind, "shell_history");
        let settings = config.sources[0].settings_json().unwrap();
        assert_eq!(settings["path"], "/tmp/history");
        assert_eq!(settings["max_entries"], 10);
        assert!(config.sources[1].settings_json().unwrap().is_null());
    }

    #[test]
    fn duplicate_source_names_rejected() {
        let toml_str = r#"
[[sources]]
name = "a"
type = "jsonl"

[[sources]]
name = "a"
type = "forge"
"#;
        assert!(HoardConfig::parse(toml_str).is_err());
    }

    #[test]
    fn fetch_options_from_ingest() {
        let ingest = IngestConfig {
            queue_capacity: 0,
            fetch_timeout_secs: 0,
        };
        let options = ingest.fetch_options();
        assert_eq!(options.queue_capacity, 1);
        assert!(options.timeout.is_none());
    }

    #[test]
    fn env_overrides_apply() {
        let mut config = HoardConfig::default();
        std::env::set_var("HOARD_LOG_LEVEL", "trace");
        std::env::set_var("HOARD_QUEUE_CAPACITY", "16");

        config.apply_env_overrides();

        assert_eq!(config.server.log_level, "trace");
        assert_eq!(config.ingest.queue_capacity, 16);

        // Clean up
        std::env::remove_var("HOARD_LOG_LEVEL");
        std::env::remove_var("HOARD_QUEUE_CAPACITY");
    }
}
