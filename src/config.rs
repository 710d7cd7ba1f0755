//! Configuration handling
//!
//! Manages the fedquery.toml configuration file.
//!
//! ## Environment Variables
//!
//! The following environment variables can override config file settings:
//!
//! - `FEDQUERY_DEFAULT_SOURCE` - Source that receives inserts
//! - `FEDQUERY_PAGE_SIZE` - Rows fetched per cursor page
//! - `FEDQUERY_LOG` - Log level
//!
//! These can be set in a `.env` file in the config directory.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};

use crate::sqlite::DEFAULT_PAGE_SIZE;

/// Configuration file name
pub const CONFIG_FILE_NAME: &str = "fedquery.toml";

/// Environment variable names
pub const ENV_DEFAULT_SOURCE: &str = "FEDQUERY_DEFAULT_SOURCE";
pub const ENV_PAGE_SIZE: &str = "FEDQUERY_PAGE_SIZE";
pub const ENV_LOG: &str = "FEDQUERY_LOG";

/// One federated source
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceConfig {
    /// Source id used by `using` and `--source`
    pub name: String,
    /// SQLite database file (relative to the config directory)
    pub path: PathBuf,
}

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Source receiving inserts when none is given
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_source: Option<String>,
    /// Rows fetched per cursor page
    #[serde(default = "default_page_size")]
    pub page_size: usize,
    /// Log level used when RUST_LOG is unset
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Sources in iteration order
    #[serde(default)]
    pub sources: Vec<SourceConfig>,
    /// Directory the file was loaded from
    #[serde(skip)]
    base_dir: PathBuf,
}

fn default_page_size() -> usize {
    DEFAULT_PAGE_SIZE
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Config {
    /// Create a new configuration over the given sources
    pub fn new(sources: Vec<SourceConfig>) -> Self {
        Self {
            sources,
            default_source: None,
            page_size: default_page_size(),
            log_level: default_log_level(),
            base_dir: PathBuf::from("."),
        }
    }

    /// Load configuration from a directory
    ///
    /// This also loads any `.env` file in the directory and applies
    /// environment variable overrides.
    pub fn load(dir: &Path) -> anyhow::Result<Self> {
        Self::load_with_env(dir, ".env")
    }

    /// Load configuration with a specific env file
    pub fn load_with_env(dir: &Path, env_file: &str) -> anyhow::Result<Self> {
        // Load env file if present (ignore errors)
        let env_path = dir.join(env_file);
        if env_path.exists() {
            let _ = dotenvy::from_path(&env_path);
        }

        let config_path = dir.join(CONFIG_FILE_NAME);
        if !config_path.exists() {
            anyhow::bail!("Configuration file not found: {}", config_path.display());
        }

        let content = std::fs::read_to_string(&config_path)?;
        let mut config: Config = toml::from_str(&content)?;
        config.base_dir = dir.to_path_buf();

        config.apply_env_overrides();
        config.validate()?;

        Ok(config)
    }

    /// Apply environment variable overrides to the configuration
    fn apply_env_overrides(&mut self) {
        self.apply_overrides(|name| std::env::var(name).ok());
    }

    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(source) = lookup(ENV_DEFAULT_SOURCE) {
            if !source.is_empty() {
                self.default_source = Some(source);
            }
        }

        if let Some(raw) = lookup(ENV_PAGE_SIZE) {
            match raw.parse::<usize>() {
                Ok(size) if size > 0 => self.page_size = size,
                _ => tracing::warn!("Ignoring invalid {}={:?}", ENV_PAGE_SIZE, raw),
            }
        }

        if let Some(level) = lookup(ENV_LOG) {
            if !level.is_empty() {
                self.log_level = level;
            }
        }
    }

    /// Reject configurations no federation can be built from
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.sources.is_empty() {
            anyhow::bail!("No sources declared in {}", CONFIG_FILE_NAME);
        }

        let mut seen = HashSet::new();
        for source in &self.sources {
            if source.name.is_empty() {
                anyhow::bail!("Source with path {} has no name", source.path.display());
            }
            if !seen.insert(source.name.as_str()) {
                anyhow::bail!("Duplicate source name '{}'", source.name);
            }
        }

        if let Some(default) = &self.default_source {
            if !seen.contains(default.as_str()) {
                anyhow::bail!("Default source '{}' is not declared", default);
            }
        }

        if self.page_size == 0 {
            anyhow::bail!("page_size must be at least 1");
        }

        Ok(())
    }

    /// Save configuration to a directory
    pub fn save(&self, dir: &Path) -> anyhow::Result<()> {
        let config_path = dir.join(CONFIG_FILE_NAME);
        let content = toml::to_string_pretty(self)?;
        std::fs::write(&config_path, content)?;
        Ok(())
    }

    /// Source names in declaration order
    pub fn source_names(&self) -> Vec<String> {
        self.sources.iter().map(|s| s.name.clone()).collect()
    }

    /// Get the absolute database path of a source
    pub fn source_path(&self, source: &SourceConfig) -> PathBuf {
        if source.path.is_absolute() {
            source.path.clone()
        } else {
            self.base_dir.join(&source.path)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn source(name: &str, path: &str) -> SourceConfig {
        SourceConfig {
            name: name.to_string(),
            path: PathBuf::from(path),
        }
    }

    #[test]
    fn test_config_serialization() {
        let config = Config::new(vec![source("default", "hot.db"), source("cold", "cold.db")]);
        let toml_str = toml::to_string_pretty(&config).unwrap();
        assert!(toml_str.contains("page_size = 100"));
        assert!(toml_str.contains("name = \"cold\""));
        assert!(!toml_str.contains("default_source"));
    }

    #[test]
    fn test_defaults_when_fields_missing() {
        let config: Config = toml::from_str(
            r#"
            [[sources]]
            name = "default"
            path = "hot.db"
            "#,
        )
        .unwrap();
        assert_eq!(config.page_size, 100);
        assert_eq!(config.log_level, "info");
        assert!(config.default_source.is_none());
    }

    #[test]
    fn test_save_and_load_resolves_relative_paths() {
        let dir = tempdir().unwrap();
        let mut config = Config::new(vec![
            source("default", "hot.db"),
            source("cold", "/var/lib/cold.db"),
        ]);
        config.default_source = Some("cold".to_string());
        config.page_size = 25;
        config.save(dir.path()).unwrap();

        let loaded = Config::load_with_env(dir.path(), ".env.missing").unwrap();
        assert_eq!(loaded.source_names(), vec!["default", "cold"]);
        assert_eq!(loaded.default_source.as_deref(), Some("cold"));
        assert_eq!(loaded.page_size, 25);
        assert_eq!(loaded.source_path(&loaded.sources[0]), dir.path().join("hot.db"));
        assert_eq!(
            loaded.source_path(&loaded.sources[1]),
            PathBuf::from("/var/lib/cold.db")
        );
    }

    #[test]
    fn test_missing_file_is_an_error() {
        let dir = tempdir().unwrap();
        let err = Config::load_with_env(dir.path(), ".env.missing").unwrap_err();
        assert!(err.to_string().contains("Configuration file not found"));
    }

    #[test]
    fn test_validation() {
        assert!(Config::new(vec![]).validate().is_err());

        let duplicate = Config::new(vec![source("a", "a.db"), source("a", "b.db")]);
        assert!(duplicate
            .validate()
            .unwrap_err()
            .to_string()
            .contains("Duplicate source name"));

        let mut undeclared = Config::new(vec![source("a", "a.db")]);
        undeclared.default_source = Some("b".to_string());
        assert!(undeclared.validate().is_err());

        let ok = Config::new(vec![source("a", "a.db")]);
        assert!(ok.validate().is_ok());
    }

    #[test]
    fn test_overrides() {
        let mut config = Config::new(vec![source("default", "hot.db")]);
        config.apply_overrides(|name| match name {
            ENV_DEFAULT_SOURCE => Some("default".to_string()),
            ENV_PAGE_SIZE => Some("7".to_string()),
            ENV_LOG => Some("debug".to_string()),
            _ => None,
        });
        assert_eq!(config.default_source.as_deref(), Some("default"));
        assert_eq!(config.page_size, 7);
        assert_eq!(config.log_level, "debug");

        config.apply_overrides(|name| (name == ENV_PAGE_SIZE).then(|| "zero".to_string()));
        assert_eq!(config.page_size, 7);
    }
}
