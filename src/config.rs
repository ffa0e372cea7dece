use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

use crate::cache::FileCacheConfig;
use crate::constants::{DEFAULT_EVALUATION_INTERVAL, DEFAULT_PROGRESS_WINDOW};
use crate::workers::InterfaceKind;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub cache: FileCacheConfig,

    #[serde(default)]
    pub playback: PlaybackConfig,

    #[serde(default)]
    pub network: NetworkConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlaybackConfig {
    /// Minimum time between two visibility evaluations
    #[serde(default = "default_evaluation_interval_ms")]
    pub evaluation_interval_ms: u64,

    /// Number of feed items on each side of the current one whose progress is kept
    #[serde(default = "default_progress_window")]
    pub progress_window: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkConfig {
    /// Interface reported to the network monitor when no OS observer is wired in
    #[serde(default = "default_interface")]
    pub assumed_interface: InterfaceKind,
}

impl Config {
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path()?;

        if config_path.exists() {
            Self::load_from(&config_path)
        } else {
            info!("No config file found, using defaults");
            let config = Config::default();
            config.save_to(&config_path)?;
            Ok(config)
        }
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        debug!("Loading config from {:?}", path);
        let contents = fs::read_to_string(path).context("Failed to read config file")?;
        let config: Config = toml::from_str(&contents).context("Failed to parse config file")?;
        config.validate()?;
        info!("Config loaded successfully");
        Ok(config)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).context("Failed to create config directory")?;
        }

        let contents = toml::to_string_pretty(self).context("Failed to serialize config")?;
        fs::write(path, contents).context("Failed to write config file")?;

        debug!("Config saved to {:?}", path);
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        self.cache.validate().context("Invalid [cache] section")?;
        self.playback.validate().context("Invalid [playback] section")?;
        Ok(())
    }

    fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir().context("Failed to get config directory")?;
        Ok(config_dir.join("vidfeed").join("config.toml"))
    }
}

impl PlaybackConfig {
    pub fn evaluation_interval(&self) -> Duration {
        Duration::from_millis(self.evaluation_interval_ms)
    }

    pub fn validate(&self) -> Result<()> {
        if self.progress_window == 0 {
            bail!("progress_window must be greater than 0");
        }
        Ok(())
    }
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            evaluation_interval_ms: default_evaluation_interval_ms(),
            progress_window: default_progress_window(),
        }
    }
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            assumed_interface: default_interface(),
        }
    }
}

// Default value functions
fn default_evaluation_interval_ms() -> u64 {
    DEFAULT_EVALUATION_INTERVAL.as_millis() as u64
}
fn default_progress_window() -> usize {
    DEFAULT_PROGRESS_WINDOW
}
fn default_interface() -> InterfaceKind {
    InterfaceKind::Wifi
}
