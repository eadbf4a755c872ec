//! Configuration management for atvtui
//!
//! Handles config file loading/saving and timeout settings.
//! Config is stored at ~/.config/atvtui/config.toml

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::warn;

/// Scan timeout handed to atvremote
pub const DEFAULT_SCAN_TIMEOUT_SECS: u64 = 8;
/// Supervisory bound around a whole discovery, leaves room for atvremote to exit
pub const DEFAULT_OUTER_TIMEOUT_SECS: u64 = 12;
pub const DEFAULT_PIN_TIMEOUT_SECS: u64 = 120;
pub const DEFAULT_COMMAND_TIMEOUT_SECS: u64 = 10;
pub const DEFAULT_HIGHLIGHT_MS: u64 = 150;
pub const DEFAULT_NOW_PLAYING_INTERVAL_SECS: u64 = 2;

/// Application configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Path to the atvremote binary
    pub atvremote_path: String,
    /// Default device name or identifier for CLI commands
    pub default_device: Option<String>,
    pub scan_timeout_secs: u64,
    pub outer_timeout_secs: u64,
    /// How long to wait for the user to type a PIN before cancelling pairing
    pub pin_timeout_secs: u64,
    pub command_timeout_secs: u64,
    /// Button highlight duration after a key press
    pub highlight_ms: u64,
    pub now_playing_interval_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            atvremote_path: "atvremote".to_string(),
            default_device: None,
            scan_timeout_secs: DEFAULT_SCAN_TIMEOUT_SECS,
            outer_timeout_secs: DEFAULT_OUTER_TIMEOUT_SECS,
            pin_timeout_secs: DEFAULT_PIN_TIMEOUT_SECS,
            command_timeout_secs: DEFAULT_COMMAND_TIMEOUT_SECS,
            highlight_ms: DEFAULT_HIGHLIGHT_MS,
            now_playing_interval_secs: DEFAULT_NOW_PLAYING_INTERVAL_SECS,
        }
    }
}

impl Config {
    /// Get config file path (~/.config/atvtui/config.toml)
    pub fn path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("atvtui").join("config.toml"))
    }

    /// Load config from the default path, or return defaults if not found
    pub fn load() -> Self {
        match Self::path() {
            Some(path) => Self::load_from(&path),
            None => Self::default().with_env_overrides(),
        }
    }

    /// Load config from `path`. Missing or invalid files fall back to defaults.
    pub fn load_from(path: &Path) -> Self {
        let config = match std::fs::read_to_string(path) {
            Ok(s) => toml::from_str(&s).unwrap_or_else(|e| {
                warn!("Ignoring invalid config {}: {}", path.display(), e);
                Self::default()
            }),
            Err(_) => Self::default(),
        };
        config.with_env_overrides()
    }

    /// ATVREMOTE_PATH wins over the config file
    fn with_env_overrides(mut self) -> Self {
        if let Ok(path) = std::env::var("ATVREMOTE_PATH") {
            if !path.trim().is_empty() {
                self.atvremote_path = path;
            }
        }
        self
    }

    /// Save config to the default path
    pub fn save(&self) -> Result<()> {
        let path = Self::path().ok_or_else(|| anyhow::anyhow!("Could not determine config path"))?;
        self.save_to(&path)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let toml = toml::to_string_pretty(self)?;
        std::fs::write(path, toml)?;
        Ok(())
    }

    pub fn scan_timeout(&self) -> Duration {
        Duration::from_secs(self.scan_timeout_secs.max(1))
    }

    /// Outer discovery bound, always strictly longer than the scan itself
    pub fn outer_timeout(&self) -> Duration {
        let outer = Duration::from_secs(self.outer_timeout_secs);
        outer.max(self.scan_timeout() + Duration::from_secs(1))
    }

    pub fn pin_timeout(&self) -> Duration {
        Duration::from_secs(self.pin_timeout_secs.max(1))
    }

    pub fn command_timeout(&self) -> Duration {
        Duration::from_secs(self.command_timeout_secs.max(1))
    }

    pub fn highlight_duration(&self) -> Duration {
        Duration::from_millis(self.highlight_ms)
    }

    pub fn now_playing_interval(&self) -> Duration {
        Duration::from_secs(self.now_playing_interval_secs.max(1))
    }
}
