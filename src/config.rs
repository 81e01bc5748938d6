//! Persistent settings
//!
//! Stored as JSON in ~/.config/spotgrab/config.json. Missing files and missing
//! fields fall back to defaults, so older config files keep working.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

use crate::extract::{AudioFormat, AudioQuality};

const APP_DIR: &str = "spotgrab";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Where downloaded audio is written
    pub output_dir: PathBuf,
    pub audio_format: AudioFormat,
    pub audio_quality: AudioQuality,
    /// Concurrent track downloads per playlist
    pub workers: usize,
    /// Save progress after this many finished tracks
    pub flush_interval: usize,
    /// Progress older than this is discarded
    pub ledger_ttl_hours: u64,
    pub ledger_dir: PathBuf,
    pub embed_metadata: bool,
    pub embed_artwork: bool,
    pub ytdlp_path: String,
    /// Netscape cookie file handed to yt-dlp
    pub cookie_file: Option<PathBuf>,
    pub max_retries: u32,
    pub socket_timeout_secs: u64,
    pub artwork_timeout_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            output_dir: dirs::audio_dir()
                .map(|dir| dir.join(APP_DIR))
                .unwrap_or_else(|| PathBuf::from("downloads")),
            audio_format: AudioFormat::default(),
            audio_quality: AudioQuality::default(),
            workers: 8,
            flush_interval: 10,
            ledger_ttl_hours: 24,
            ledger_dir: dirs::data_local_dir()
                .map(|dir| dir.join(APP_DIR).join("progress"))
                .unwrap_or_else(|| PathBuf::from(".spotgrab-progress")),
            embed_metadata: true,
            embed_artwork: true,
            ytdlp_path: "yt-dlp".to_string(),
            cookie_file: None,
            max_retries: 3,
            socket_timeout_secs: 30,
            artwork_timeout_secs: 15,
        }
    }
}

impl Config {
    /// Load the config from its default location
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path()?)
    }

    /// Save the config to its default location
    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_path()?)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            debug!("No config found at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config from {:?}", path))?;

        let config: Self = serde_json::from_str(&contents)
            .with_context(|| format!("Failed to parse config {:?}", path))?;

        debug!("Loaded config from {}", path.display());
        Ok(config)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create config directory {:?}", parent))?;
        }

        let contents = serde_json::to_string_pretty(self).context("Failed to serialize config")?;

        fs::write(path, contents)
            .with_context(|| format!("Failed to write config to {:?}", path))?;

        debug!("Saved config to {}", path.display());
        Ok(())
    }

    /// Get the config file path
    pub fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not determine config directory"))?;
        Ok(config_dir.join(APP_DIR).join("config.json"))
    }

    pub fn ledger_ttl(&self) -> Duration {
        Duration::from_secs(self.ledger_ttl_hours * 3600)
    }
}
