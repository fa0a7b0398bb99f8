use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{AppError, Result};

const CONFIG_FILE_NAME: &str = ".gatorconfig.json";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Path to the SQLite database file.
    pub db_url: String,

    #[serde(default)]
    pub current_user_name: String,
}

impl Config {
    /// Reads the config from `<home>/.gatorconfig.json`.
    ///
    /// A missing or malformed file is fatal at startup: the tool is not
    /// usable without a database location.
    pub fn load() -> Result<Self> {
        Self::read_from(&Self::config_path())
    }

    /// Sets the active user and rewrites the whole config file.
    pub fn set_user(&mut self, username: &str) -> Result<()> {
        self.current_user_name = username.to_string();
        self.save()
    }

    pub fn save(&self) -> Result<()> {
        self.write_to(&Self::config_path())
    }

    pub fn config_path() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(CONFIG_FILE_NAME)
    }

    fn read_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            AppError::Config(format!(
                "cannot read {}: {e}; create it with {{\"db_url\": \"<path to db>\"}}",
                path.display()
            ))
        })?;
        let config = serde_json::from_str(&content)?;
        Ok(config)
    }

    fn write_to(&self, path: &Path) -> Result<()> {
        let content = serde_json::to_string(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }
}
