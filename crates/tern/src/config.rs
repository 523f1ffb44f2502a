//! The handful of values the core actually consumes, loaded from an
//! optional TOML file and layered with defaults so the server runs with
//! zero configuration.

use std::path::{Path, PathBuf};

use serde::Deserialize;

/// One field per configurable value, each defaulting to what the core
/// uses when nothing overrides it.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    pub fact_buffer_limit: usize,
    pub mangle: MangleConfig,
    pub event_throttle_ms: u64,
    pub poll_interval_ms: u64,
    #[serde(rename = "jsGateTTL")]
    pub js_gate_ttl_ms: i64,
    pub docker: DockerConfig,
    pub default_timeout_ms: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            fact_buffer_limit: 10_000,
            mangle: MangleConfig::default(),
            event_throttle_ms: 50,
            poll_interval_ms: 200,
            js_gate_ttl_ms: 600_000,
            docker: DockerConfig::default(),
            default_timeout_ms: 10_000,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct MangleConfig {
    pub schema_path: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DockerConfig {
    pub enabled: bool,
}

impl Default for DockerConfig {
    fn default() -> Self {
        Self { enabled: false }
    }
}

impl Config {
    /// Loads config from `path` if given, falling back to the platform
    /// config directory (`dirs::config_dir()/tern/tern.toml`) when `path`
    /// is `None`, and to built-in defaults when neither exists. A
    /// present-but-malformed file is an error; a missing path (explicit
    /// or resolved) is not.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let path = match path {
            Some(path) => Some(path.to_path_buf()),
            None => Self::default_config_path(),
        };
        let Some(path) = path else {
            return Ok(Self::default());
        };
        if !path.exists() {
            return Ok(Self::default());
        }
        let text = std::fs::read_to_string(&path)
            .map_err(|e| ConfigError::Read(path.clone(), e.to_string()))?;
        toml::from_str(&text).map_err(|e| ConfigError::Parse(path, e.to_string()))
    }

    /// Platform config directory resolved the way the teacher's binary
    /// does (`dirs::config_dir()`), joined with this binary's name.
    fn default_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("tern").join("tern.toml"))
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {0}: {1}")]
    Read(PathBuf, String),
    #[error("failed to parse config file {0}: {1}")]
    Parse(PathBuf, String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec_table() {
        let config = Config::default();
        assert_eq!(config.fact_buffer_limit, 10_000);
        assert_eq!(config.event_throttle_ms, 50);
        assert_eq!(config.poll_interval_ms, 200);
        assert_eq!(config.js_gate_ttl_ms, 600_000);
        assert!(!config.docker.enabled);
        assert_eq!(config.default_timeout_ms, 10_000);
        assert!(config.mangle.schema_path.is_none());
    }

    #[test]
    fn missing_path_falls_back_to_defaults() {
        let config = Config::load(Some(Path::new("/nonexistent/tern.toml"))).unwrap();
        assert_eq!(config.fact_buffer_limit, 10_000);
    }

    #[test]
    fn partial_toml_merges_with_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tern.toml");
        std::fs::write(&path, "fact_buffer_limit = 500\nevent_throttle_ms = 10\n").unwrap();
        let config = Config::load(Some(&path)).unwrap();
        assert_eq!(config.fact_buffer_limit, 500);
        assert_eq!(config.event_throttle_ms, 10);
        assert_eq!(config.poll_interval_ms, 200);
    }

    #[test]
    fn default_config_path_is_rooted_in_platform_config_dir() {
        let Some(path) = Config::default_config_path() else {
            return;
        };
        assert!(path.ends_with("tern/tern.toml"));
    }

    #[test]
    fn malformed_toml_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tern.toml");
        std::fs::write(&path, "not valid toml {{{").unwrap();
        assert!(Config::load(Some(&path)).is_err());
    }
}
