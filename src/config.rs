//! Bridge configuration.
//!
//! Settings are layered, each layer overriding the one before:
//! 1. `temple.toml` in the working directory, or the file given with `--config`
//! 2. Environment (`TEMPLE_BASICS_PATH`, `TEMPLE_THRESHOLD_PATH`, `TEMPLE_JOURNEY_LOG`),
//!    after `.env` has been loaded
//! 3. CLI flags
//!
//! # Configuration File Format
//!
//! ```toml
//! [paths]
//! basics = "../back-to-the-basics"
//! threshold = "../threshold-protocols"
//!
//! [journey]
//! log_path = "spiral_journey.jsonl"
//! enabled = true
//!
//! [server]
//! name = "TempleObserver"
//! max_line_bytes = 10485760
//! ```
//!
//! Relative paths in the file resolve against the file's directory.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::errors::ConfigError;

pub const DEFAULT_CONFIG_FILE: &str = "temple.toml";
pub const DEFAULT_SERVER_NAME: &str = "TempleObserver";
pub const DEFAULT_JOURNEY_LOG: &str = "spiral_journey.jsonl";
pub const DEFAULT_BASICS_PATH: &str = "../back-to-the-basics";
pub const DEFAULT_THRESHOLD_PATH: &str = "../threshold-protocols";
/// Longest request line the stdio transport accepts (10 MiB).
pub const DEFAULT_MAX_LINE_BYTES: usize = 10 * 1024 * 1024;

pub const ENV_BASICS_PATH: &str = "TEMPLE_BASICS_PATH";
pub const ENV_THRESHOLD_PATH: &str = "TEMPLE_THRESHOLD_PATH";
pub const ENV_JOURNEY_LOG: &str = "TEMPLE_JOURNEY_LOG";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PathsSection {
    /// Action repository (back-to-the-basics)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub basics: Option<PathBuf>,
    /// Governance repository (threshold-protocols)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub threshold: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JourneySection {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_path: Option<PathBuf>,
    #[serde(default = "default_journey_enabled")]
    pub enabled: bool,
}

fn default_journey_enabled() -> bool {
    true
}

impl Default for JourneySection {
    fn default() -> Self {
        Self {
            log_path: None,
            enabled: default_journey_enabled(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerSection {
    #[serde(default = "default_server_name")]
    pub name: String,
    #[serde(default = "default_max_line_bytes")]
    pub max_line_bytes: usize,
}

fn default_server_name() -> String {
    DEFAULT_SERVER_NAME.to_string()
}

fn default_max_line_bytes() -> usize {
    DEFAULT_MAX_LINE_BYTES
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            name: default_server_name(),
            max_line_bytes: default_max_line_bytes(),
        }
    }
}

/// Contents of `temple.toml`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TempleToml {
    #[serde(default)]
    pub paths: PathsSection,
    #[serde(default)]
    pub journey: JourneySection,
    #[serde(default)]
    pub server: ServerSection,
}

impl TempleToml {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::ReadFailed {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&content).map_err(|source| ConfigError::ParseFailed {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Resolve relative paths against `base`.
    fn rebase(mut self, base: &Path) -> Self {
        let rebase = |p: PathBuf| if p.is_relative() { base.join(p) } else { p };
        self.paths.basics = self.paths.basics.map(rebase);
        self.paths.threshold = self.paths.threshold.map(rebase);
        self.journey.log_path = self.journey.log_path.map(rebase);
        self
    }
}

/// Values given on the command line; `None` leaves the lower layers in place.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub basics: Option<PathBuf>,
    pub threshold: Option<PathBuf>,
    pub journey_log: Option<PathBuf>,
    pub no_journey: bool,
}

/// Effective bridge configuration after layering.
#[derive(Debug, Clone, PartialEq)]
pub struct BridgeConfig {
    pub basics_path: PathBuf,
    pub threshold_path: PathBuf,
    pub journey_log: PathBuf,
    pub journey_enabled: bool,
    pub server_name: String,
    pub max_line_bytes: usize,
    /// Config file the settings came from, if any
    pub source: Option<PathBuf>,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            basics_path: PathBuf::from(DEFAULT_BASICS_PATH),
            threshold_path: PathBuf::from(DEFAULT_THRESHOLD_PATH),
            journey_log: PathBuf::from(DEFAULT_JOURNEY_LOG),
            journey_enabled: true,
            server_name: DEFAULT_SERVER_NAME.to_string(),
            max_line_bytes: DEFAULT_MAX_LINE_BYTES,
            source: None,
        }
    }
}

impl BridgeConfig {
    /// Load configuration from file, process environment and CLI overrides.
    pub fn load(config_file: Option<&Path>, overrides: &ConfigOverrides) -> Result<Self, ConfigError> {
        Self::load_with_env(config_file, overrides, |key| std::env::var(key).ok())
    }

    /// Same as `load`, reading environment variables through `env`.
    ///
    /// An explicit `config_file` must exist; the default `temple.toml` is
    /// optional.
    pub fn load_with_env<F>(
        config_file: Option<&Path>,
        overrides: &ConfigOverrides,
        env: F,
    ) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let source = match config_file {
            Some(path) => Some(path.to_path_buf()),
            None => {
                let default = PathBuf::from(DEFAULT_CONFIG_FILE);
                default.is_file().then_some(default)
            }
        };

        let file = match &source {
            Some(path) => {
                let base = path.parent().unwrap_or_else(|| Path::new(""));
                TempleToml::load(path)?.rebase(base)
            }
            None => TempleToml::default(),
        };

        let mut config = Self {
            source,
            ..Self::default()
        };
        config.apply_file(file);
        config.apply_env(env);
        config.apply_overrides(overrides);
        Ok(config)
    }

    fn apply_file(&mut self, file: TempleToml) {
        if let Some(basics) = file.paths.basics {
            self.basics_path = basics;
        }
        if let Some(threshold) = file.paths.threshold {
            self.threshold_path = threshold;
        }
        if let Some(log_path) = file.journey.log_path {
            self.journey_log = log_path;
        }
        self.journey_enabled = file.journey.enabled;
        self.server_name = file.server.name;
        self.max_line_bytes = file.server.max_line_bytes;
    }

    fn apply_env<F: Fn(&str) -> Option<String>>(&mut self, env: F) {
        let var = |key: &str| env(key).filter(|v| !v.trim().is_empty());
        if let Some(basics) = var(ENV_BASICS_PATH) {
            self.basics_path = PathBuf::from(basics);
        }
        if let Some(threshold) = var(ENV_THRESHOLD_PATH) {
            self.threshold_path = PathBuf::from(threshold);
        }
        if let Some(log) = var(ENV_JOURNEY_LOG) {
            self.journey_log = PathBuf::from(log);
        }
    }

    fn apply_overrides(&mut self, overrides: &ConfigOverrides) {
        if let Some(basics) = &overrides.basics {
            self.basics_path = basics.clone();
        }
        if let Some(threshold) = &overrides.threshold {
            self.threshold_path = threshold.clone();
        }
        if let Some(log) = &overrides.journey_log {
            self.journey_log = log.clone();
        }
        if overrides.no_journey {
            self.journey_enabled = false;
        }
    }

    /// Journey log path, or `None` when journey logging is disabled.
    pub fn journey_log_path(&self) -> Option<PathBuf> {
        self.journey_enabled.then(|| self.journey_log.clone())
    }

    /// Fail when either repository is missing; the server refuses to start without both.
    pub fn verify(&self) -> Result<(), ConfigError> {
        if !self.basics_path.exists() {
            return Err(ConfigError::RepositoryMissing {
                role: "BTB",
                path: self.basics_path.clone(),
            });
        }
        if !self.threshold_path.exists() {
            return Err(ConfigError::RepositoryMissing {
                role: "Threshold",
                path: self.threshold_path.clone(),
            });
        }
        Ok(())
    }

    /// Every problem with the configuration, in a form fit for printing.
    pub fn validate(&self) -> Vec<String> {
        let mut problems = Vec::new();

        for (role, path) in [("BTB", &self.basics_path), ("Threshold", &self.threshold_path)] {
            if !path.exists() {
                problems.push(format!("{} repository not found at: {}", role, path.display()));
            } else if !path.is_dir() {
                problems.push(format!("{} repository is not a directory: {}", role, path.display()));
            }
        }

        if self.journey_enabled
            && let Some(parent) = self.journey_log.parent()
            && !parent.as_os_str().is_empty()
            && !parent.is_dir()
        {
            problems.push(format!(
                "Journey log directory does not exist: {}",
                parent.display()
            ));
        }

        if self.server_name.trim().is_empty() {
            problems.push("Server name must not be empty".to_string());
        }
        if self.max_line_bytes == 0 {
            problems.push("max_line_bytes must be greater than zero".to_string());
        }

        problems
    }

    /// The effective configuration in `temple.toml` form.
    pub fn to_toml(&self) -> TempleToml {
        TempleToml {
            paths: PathsSection {
                basics: Some(self.basics_path.clone()),
                threshold: Some(self.threshold_path.clone()),
            },
            journey: JourneySection {
                log_path: Some(self.journey_log.clone()),
                enabled: self.journey_enabled,
            },
            server: ServerSection {
                name: self.server_name.clone(),
                max_line_bytes: self.max_line_bytes,
            },
        }
    }

    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string_pretty(&self.to_toml()).context("Failed to serialize configuration")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::TempDir;

    fn no_env(_: &str) -> Option<String> {
        None
    }

    fn env_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    fn write_config(dir: &TempDir, content: &str) -> PathBuf {
        let path = dir.path().join("temple.toml");
        std::fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn test_parse_empty_uses_defaults() {
        let toml: TempleToml = toml::from_str("").unwrap();
        assert_eq!(toml, TempleToml::default());
        assert!(toml.journey.enabled);
        assert_eq!(toml.server.name, DEFAULT_SERVER_NAME);
        assert_eq!(toml.server.max_line_bytes, DEFAULT_MAX_LINE_BYTES);
    }

    #[test]
    fn test_file_paths_resolve_against_file_dir() {
        let dir = TempDir::new().unwrap();
        let path = write_config(
            &dir,
            r#"
[paths]
basics = "btb"
threshold = "/abs/threshold"

[journey]
log_path = "logs/journey.jsonl"

[server]
name = "Observer"
"#,
        );

        let config = BridgeConfig::load_with_env(Some(&path), &ConfigOverrides::default(), no_env).unwrap();
        assert_eq!(config.basics_path, dir.path().join("btb"));
        assert_eq!(config.threshold_path, PathBuf::from("/abs/threshold"));
        assert_eq!(config.journey_log, dir.path().join("logs/journey.jsonl"));
        assert_eq!(config.server_name, "Observer");
        assert_eq!(config.source.as_deref(), Some(path.as_path()));
    }

    #[test]
    fn test_env_overrides_file() {
        let dir = TempDir::new().unwrap();
        let path = write_config(&dir, "[paths]\nbasics = \"btb\"\n");
        let env = env_from(&[(ENV_BASICS_PATH, "/env/btb"), (ENV_JOURNEY_LOG, "/env/journey.jsonl")]);

        let config = BridgeConfig::load_with_env(Some(&path), &ConfigOverrides::default(), env).unwrap();
        assert_eq!(config.basics_path, PathBuf::from("/env/btb"));
        assert_eq!(config.journey_log, PathBuf::from("/env/journey.jsonl"));
        assert_eq!(config.threshold_path, PathBuf::from(DEFAULT_THRESHOLD_PATH));
    }

    #[test]
    fn test_blank_env_is_ignored() {
        let env = env_from(&[(ENV_THRESHOLD_PATH, "  ")]);
        let dir = TempDir::new().unwrap();
        let path = write_config(&dir, "");
        let config = BridgeConfig::load_with_env(Some(&path), &ConfigOverrides::default(), env).unwrap();
        assert_eq!(config.threshold_path, PathBuf::from(DEFAULT_THRESHOLD_PATH));
    }

    #[test]
    fn test_cli_overrides_env() {
        let dir = TempDir::new().unwrap();
        let path = write_config(&dir, "");
        let env = env_from(&[(ENV_THRESHOLD_PATH, "/env/threshold")]);
        let overrides = ConfigOverrides {
            threshold: Some(PathBuf::from("/cli/threshold")),
            no_journey: true,
            ..ConfigOverrides::default()
        };

        let config = BridgeConfig::load_with_env(Some(&path), &overrides, env).unwrap();
        assert_eq!(config.threshold_path, PathBuf::from("/cli/threshold"));
        assert!(!config.journey_enabled);
        assert_eq!(config.journey_log_path(), None);
    }

    #[test]
    fn test_explicit_missing_file_is_an_error() {
        let dir = TempDir::new().unwrap();
        let missing = dir.path().join("nope.toml");
        let err = BridgeConfig::load_with_env(Some(&missing), &ConfigOverrides::default(), no_env).unwrap_err();
        assert!(matches!(err, ConfigError::ReadFailed { .. }));
    }

    #[test]
    fn test_invalid_toml_is_a_parse_error() {
        let dir = TempDir::new().unwrap();
        let path = write_config(&dir, "[server\nname = 1");
        let err = BridgeConfig::load_with_env(Some(&path), &ConfigOverrides::default(), no_env).unwrap_err();
        assert!(matches!(err, ConfigError::ParseFailed { .. }));
    }

    #[test]
    fn test_verify_reports_missing_repository() {
        let dir = TempDir::new().unwrap();
        let config = BridgeConfig {
            basics_path: dir.path().to_path_buf(),
            threshold_path: dir.path().join("missing"),
            ..BridgeConfig::default()
        };
        let err = config.verify().unwrap_err();
        assert!(matches!(err, ConfigError::RepositoryMissing { role: "Threshold", .. }));

        let config = BridgeConfig {
            threshold_path: dir.path().to_path_buf(),
            ..config
        };
        assert!(config.verify().is_ok());
    }

    #[test]
    fn test_validate_collects_every_problem() {
        let dir = TempDir::new().unwrap();
        let config = BridgeConfig {
            basics_path: dir.path().join("a"),
            threshold_path: dir.path().join("b"),
            journey_log: dir.path().join("no/such/dir/journey.jsonl"),
            max_line_bytes: 0,
            ..BridgeConfig::default()
        };
        let problems = config.validate();
        assert_eq!(problems.len(), 4);
        assert!(problems[0].starts_with("BTB repository not found"));
        assert!(problems[2].starts_with("Journey log directory"));
    }

    #[test]
    fn test_validate_skips_journey_dir_when_disabled() {
        let dir = TempDir::new().unwrap();
        let config = BridgeConfig {
            basics_path: dir.path().to_path_buf(),
            threshold_path: dir.path().to_path_buf(),
            journey_log: dir.path().join("no/such/dir/journey.jsonl"),
            journey_enabled: false,
            ..BridgeConfig::default()
        };
        assert!(config.validate().is_empty());
    }

    #[test]
    fn test_to_toml_round_trips_through_load() {
        let dir = TempDir::new().unwrap();
        let config = BridgeConfig {
            basics_path: dir.path().join("btb"),
            threshold_path: dir.path().join("threshold"),
            journey_log: dir.path().join("journey.jsonl"),
            server_name: "Observer".to_string(),
            ..BridgeConfig::default()
        };
        let rendered = config.to_toml_string().unwrap();
        assert!(rendered.contains("[paths]"));
        let path = write_config(&dir, &rendered);

        let loaded = BridgeConfig::load_with_env(Some(&path), &ConfigOverrides::default(), no_env).unwrap();
        assert_eq!(
            loaded,
            BridgeConfig {
                source: Some(path),
                ..config
            }
        );
    }
}
