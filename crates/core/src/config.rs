//! Persisted CLI configuration
//!
//! Lives at `$GS_CONFIG_DIR/config.toml`, defaulting to
//! `~/.config/gs/config.toml`. Holds the bits the engine treats as opaque:
//! which project to bill listings against and where credentials come from.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// On-disk configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Project used for bucket listing/creation
    #[serde(skip_serializing_if = "Option::is_none")]
    pub project: Option<String>,

    /// Path to a service-account key file (JSON)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub credentials_file: Option<String>,

    /// Static bearer token; overrides other credential sources when set
    #[serde(skip_serializing_if = "Option::is_none")]
    pub access_token: Option<String>,
}

impl Config {
    /// Effective project: `GOOGLE_CLOUD_PROJECT` wins over the config file
    pub fn effective_project(&self) -> Option<String> {
        std::env::var("GOOGLE_CLOUD_PROJECT")
            .ok()
            .filter(|p| !p.is_empty())
            .or_else(|| self.project.clone())
    }
}

/// Loads and saves [`Config`], resolving the config directory once
#[derive(Debug, Clone)]
pub struct ConfigManager {
    dir: PathBuf,
}

impl ConfigManager {
    /// Resolve the config directory (`GS_CONFIG_DIR` override for tests)
    pub fn new() -> Result<Self> {
        let dir = match std::env::var("GS_CONFIG_DIR") {
            Ok(d) if !d.is_empty() => PathBuf::from(d),
            _ => dirs::config_dir()
                .ok_or_else(|| Error::Config("cannot determine config directory".to_string()))?
                .join("gs"),
        };
        Ok(Self { dir })
    }

    /// Use an explicit directory (tests)
    pub fn with_dir(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn config_path(&self) -> PathBuf {
        self.dir.join("config.toml")
    }

    /// Path of the persisted upload-session cache, next to the config file
    pub fn sessions_path(&self) -> PathBuf {
        self.dir.join("sessions.json")
    }

    /// Load the config, returning defaults when the file does not exist
    pub fn load(&self) -> Result<Config> {
        let path = self.config_path();
        if !path.exists() {
            return Ok(Config::default());
        }
        let raw = std::fs::read_to_string(&path)?;
        toml::from_str(&raw).map_err(|e| Error::Config(format!("{}: {e}", path.display())))
    }

    /// Persist the config, creating the directory as needed
    pub fn save(&self, config: &Config) -> Result<()> {
        std::fs::create_dir_all(&self.dir)?;
        let raw = toml::to_string_pretty(config)
            .map_err(|e| Error::Config(format!("serialize config: {e}")))?;
        std::fs::write(self.config_path(), raw)?;
        Ok(())
    }
}
