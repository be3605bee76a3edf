//! Configuration management
//!
//! Uses XDG-compliant paths:
//! - Config: ~/.config/splitscout/config.toml
//! - Data: ~/.local/share/splitscout/

mod paths;

pub use paths::Paths;

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use tokio::fs;

use crate::error::{Error, Result};

/// On-disk configuration. Unknown or missing fields fall back to defaults so
/// older files keep loading.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Override for the cache database location.
    pub database_path_override: Option<String>,

    /// Maximum rows returned by catalog search feeds.
    pub search_result_limit: usize,

    /// Paths configuration
    #[serde(skip)]
    pub paths: Paths,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_path_override: None,
            search_result_limit: crate::db::SEARCH_RESULT_LIMIT,
            paths: Paths::new(),
        }
    }
}

impl Config {
    /// Load configuration from disk, creating a default file on first run.
    pub async fn load() -> Result<Self> {
        let paths = Paths::new();
        let config_path = paths.config_file();

        let mut config = if config_path.exists() {
            let content = fs::read_to_string(&config_path).await?;
            toml::from_str(&content)
                .map_err(|e| Error::Config(format!("failed to parse config file: {e}")))?
        } else {
            let config = Config::default();
            config.save().await?;
            config
        };

        config.paths = paths;
        Ok(config)
    }

    /// Save configuration to disk.
    pub async fn save(&self) -> Result<()> {
        let config_path = self.paths.config_file();
        if let Some(parent) = config_path.parent() {
            fs::create_dir_all(parent).await?;
        }

        let content = toml::to_string_pretty(self)
            .map_err(|e| Error::Config(format!("failed to serialize config: {e}")))?;
        fs::write(&config_path, content).await?;
        Ok(())
    }

    /// Where the cache database lives, honoring the override.
    pub fn database_file(&self) -> PathBuf {
        match &self.database_path_override {
            Some(path) => PathBuf::from(path),
            None => self.paths.database_file(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_parses_to_defaults() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.database_path_override, None);
        assert_eq!(config.search_result_limit, crate::db::SEARCH_RESULT_LIMIT);
    }

    #[test]
    fn override_wins_over_xdg_path() {
        let mut config = Config::default();
        config.database_path_override = Some("/tmp/custom.db".to_string());
        assert_eq!(config.database_file(), PathBuf::from("/tmp/custom.db"));
    }

    #[test]
    fn config_round_trips_through_toml() {
        let mut config = Config::default();
        config.database_path_override = Some("/tmp/custom.db".to_string());
        config.search_result_limit = 10;

        let text = toml::to_string_pretty(&config).unwrap();
        let parsed: Config = toml::from_str(&text).unwrap();
        assert_eq!(parsed.database_path_override, config.database_path_override);
        assert_eq!(parsed.search_result_limit, 10);
    }
}
