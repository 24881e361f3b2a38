use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use facecap_core::shared::constants::{APP_DIR_NAME, DEFAULT_DEVICE_INDEX};

pub const DEFAULT_PREVIEW_EVERY: usize = 30;

/// Persisted CLI defaults. Command-line flags override every field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub samples_dir: PathBuf,
    pub device_index: u32,
    pub preview_every: usize,
}

fn default_samples_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_DIR_NAME)
        .join("training_images")
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            samples_dir: default_samples_dir(),
            device_index: DEFAULT_DEVICE_INDEX,
            preview_every: DEFAULT_PREVIEW_EVERY,
        }
    }
}

impl Settings {
    fn config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join(APP_DIR_NAME).join("settings.json"))
    }

    /// Missing or unreadable settings fall back to defaults.
    pub fn load() -> Self {
        Self::config_path()
            .map(|path| Self::load_from(&path))
            .unwrap_or_default()
    }

    pub fn load_from(path: &Path) -> Self {
        fs::read_to_string(path)
            .ok()
            .and_then(|json| serde_json::from_str(&json).ok())
            .unwrap_or_default()
    }

    pub fn save(&self) -> Result<PathBuf, Box<dyn std::error::Error>> {
        let path = Self::config_path().ok_or("no config directory on this platform")?;
        self.save_to(&path)?;
        Ok(path)
    }

    pub fn save_to(&self, path: &Path) -> Result<(), Box<dyn std::error::Error>> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }
}
