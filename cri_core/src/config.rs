//! Runtime configuration loaded from a TOML file

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Environment variable that overrides `database_path`.
pub const DATABASE_ENV: &str = "CRI_DATABASE";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// SQLite database file holding the catalog and student records.
    pub database_path: PathBuf,
    /// Present multiple-choice options in random order.
    pub shuffle_choices: bool,
    /// How long a writer waits for another writer's transaction, in milliseconds.
    pub busy_timeout_ms: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_path: PathBuf::from("cri.db"),
            shuffle_choices: false,
            busy_timeout_ms: 5000,
        }
    }
}

impl Config {
    /// Parse configuration from TOML text. Missing keys take their defaults.
    pub fn from_toml(text: &str) -> Result<Self> {
        toml::from_str(text).map_err(|e| Error::Config(e.to_string()))
    }

    /// Load configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        Self::from_toml(&text)
    }

    /// Load from `path` if it exists (defaults otherwise), then apply the
    /// `CRI_DATABASE` override.
    pub fn from_env_or_file(path: impl AsRef<Path>) -> Result<Self> {
        Self::from_file_with_override(path.as_ref(), std::env::var(DATABASE_ENV).ok())
    }

    fn from_file_with_override(path: &Path, database_override: Option<String>) -> Result<Self> {
        let mut config = if path.exists() {
            Self::load(path)?
        } else {
            log::debug!("config file {} not found, using defaults", path.display());
            Self::default()
        };

        if let Some(db) = database_override.filter(|db| !db.trim().is_empty()) {
            config.database_path = PathBuf::from(db);
        }

        Ok(config)
    }

    pub fn database_path_str(&self) -> Result<&str> {
        self.database_path
            .to_str()
            .ok_or_else(|| Error::Config("database path is not valid UTF-8".to_string()))
    }
}
