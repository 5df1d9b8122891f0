//! Application configuration management.
//!
//! Configuration is stored at `~/.config/offcache/config.json` and holds
//! the scope to keep offline, naming and timing knobs, and where generations
//! are stored on disk.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::network::http::DEFAULT_REQUEST_TIMEOUT_SECS;
use crate::worker::{WorkerSettings, DEFAULT_CACHE_PREFIX, DEFAULT_MANIFEST_FILE};

/// Application name used for config/storage directory paths
const APP_NAME: &str = "offcache";

/// Config file name
const CONFIG_FILE: &str = "config.json";

/// Default delay before notifications are posted, in milliseconds.
/// Gives a page that just loaded time to attach its listener.
const DEFAULT_NOTIFY_DELAY_MS: u64 = 3000;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub scope: Option<String>,
    pub cache_prefix: String,
    pub manifest_file: String,
    pub notify_delay_ms: u64,
    pub request_timeout_secs: u64,
    pub storage_dir: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            scope: None,
            cache_prefix: DEFAULT_CACHE_PREFIX.to_string(),
            manifest_file: DEFAULT_MANIFEST_FILE.to_string(),
            notify_delay_ms: DEFAULT_NOTIFY_DELAY_MS,
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
            storage_dir: None,
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        let path = Self::config_path()?;
        if path.exists() {
            let contents = std::fs::read_to_string(&path)
                .with_context(|| format!("Failed to read config file: {}", path.display()))?;
            serde_json::from_str(&contents)
                .with_context(|| format!("Failed to parse config file: {}", path.display()))
        } else {
            Ok(Self::default())
        }
    }

    pub fn save(&self) -> Result<()> {
        let path = Self::config_path()?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(self)?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find config directory"))?;
        Ok(config_dir.join(APP_NAME).join(CONFIG_FILE))
    }

    /// Where generations live: the configured directory, or the user cache directory.
    pub fn storage_dir(&self) -> Result<PathBuf> {
        if let Some(ref dir) = self.storage_dir {
            return Ok(dir.clone());
        }
        let cache_dir = dirs::cache_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find cache directory"))?;
        Ok(cache_dir.join(APP_NAME).join("generations"))
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn worker_settings(&self) -> Result<WorkerSettings> {
        let scope = self
            .scope
            .clone()
            .ok_or_else(|| anyhow::anyhow!("No scope configured"))?;
        Ok(WorkerSettings {
            scope,
            cache_prefix: self.cache_prefix.clone(),
            manifest_file: self.manifest_file.clone(),
            notify_delay: Duration::from_millis(self.notify_delay_ms),
        })
    }
}
