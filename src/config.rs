// SPDX-License-Identifier: GPL-3.0-only

use crate::backends::camera::CaptureFormat;
use crate::constants::{DEFAULT_FADE_STEP, timing};
use crate::errors::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Directory name under the platform config dir
const APP_DIR: &str = "camera-handoff";
const CONFIG_FILE: &str = "config.json";

#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Alpha change per delivered frame while fading
    pub fade_step: u8,
    /// Fade the outgoing camera to black while the incoming one starts
    pub fade_out_on_switch: bool,
    /// Emit a black frame at this interval while the camera is off
    pub blackout_keepalive_ms: Option<u64>,
    /// Delay before re-enumerating devices after a hot-plug notification
    pub enumeration_settle_ms: u64,
    /// Capture settings used when a device advertises no formats
    pub default_capture: CaptureFormat,
    /// Last device that was switched to successfully
    pub last_device_id: Option<String>,
    /// Demo snapshots: save one frame out of this many
    pub snapshot_every: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            fade_step: DEFAULT_FADE_STEP,
            fade_out_on_switch: false, // Cut straight to the fade-in
            blackout_keepalive_ms: None,
            enumeration_settle_ms: timing::ENUMERATION_SETTLE_MS,
            default_capture: CaptureFormat::default(),
            last_device_id: None,
            snapshot_every: 15,
        }
    }
}

impl Config {
    /// Path of the config file in the platform config directory
    pub fn path() -> Result<PathBuf, ConfigError> {
        dirs::config_dir()
            .map(|dir| dir.join(APP_DIR).join(CONFIG_FILE))
            .ok_or(ConfigError::NoConfigDir)
    }

    /// Load the user config, falling back to defaults when none was saved
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(&Self::path()?)
    }

    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            debug!(path = %path.display(), "No config file, using defaults");
            return Ok(Self::default());
        }
        let contents = std::fs::read_to_string(path)?;
        let config = serde_json::from_str(&contents)?;
        debug!(path = %path.display(), "Config loaded");
        Ok(config)
    }

    pub fn save(&self) -> Result<(), ConfigError> {
        self.save_to(&Self::path()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, serde_json::to_string_pretty(self)?)?;
        info!(path = %path.display(), "Config saved");
        Ok(())
    }
}
