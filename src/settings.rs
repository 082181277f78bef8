use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::SettingsError;

pub const MIN_QUALITY: u8 = 60;
pub const MAX_QUALITY: u8 = 95;
pub const DEFAULT_QUALITY: u8 = 72;
pub const MIN_THREADS: usize = 1;
pub const MAX_THREADS: usize = 100;
pub const DEFAULT_THREADS: usize = 8;
pub const MAX_CROP_POWER: f32 = 3.0;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum CropMode {
    #[serde(rename = "none")]
    None,
    #[default]
    #[serde(rename = "margins")]
    Margins,
    #[serde(rename = "margins+page")]
    MarginsAndPage,
}

impl CropMode {
    pub fn crops_margins(self) -> bool {
        matches!(self, CropMode::Margins | CropMode::MarginsAndPage)
    }

    pub fn crops_page_number(self) -> bool {
        matches!(self, CropMode::MarginsAndPage)
    }
}

impl std::str::FromStr for CropMode {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "none" => Ok(CropMode::None),
            "margins" => Ok(CropMode::Margins),
            "margins+page" => Ok(CropMode::MarginsAndPage),
            other => Err(format!(
                "unknown crop mode `{}` (expected none, margins or margins+page)",
                other
            )),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CropConfig {
    pub mode: CropMode,
    pub power: f32,
}

impl CropConfig {
    pub fn disabled() -> Self {
        Self {
            mode: CropMode::None,
            power: 0.0,
        }
    }

    /// Cropping is off when the mode says so or the power is not positive.
    pub fn is_enabled(&self) -> bool {
        self.mode != CropMode::None && self.power > 0.0
    }
}

impl Default for CropConfig {
    fn default() -> Self {
        Self {
            mode: CropMode::Margins,
            power: 1.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompressionConfig {
    pub target_quality: u8,
    pub thread_count: usize,
}

impl CompressionConfig {
    pub fn new(target_quality: u8, thread_count: usize) -> Self {
        Self {
            target_quality: target_quality.clamp(MIN_QUALITY, MAX_QUALITY),
            thread_count: thread_count.clamp(MIN_THREADS, MAX_THREADS),
        }
    }
}

impl Default for CompressionConfig {
    fn default() -> Self {
        Self::new(DEFAULT_QUALITY, DEFAULT_THREADS)
    }
}

/// User settings persisted as JSON next to the executable or in a chosen file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Settings {
    #[serde(default = "default_quality")]
    pub quality: u8,
    #[serde(default = "default_threads")]
    pub num_threads: usize,
    #[serde(default)]
    pub crop_mode: CropMode,
    #[serde(default = "default_crop_power")]
    pub crop_power: f32,
}

fn default_quality() -> u8 {
    DEFAULT_QUALITY
}

fn default_threads() -> usize {
    DEFAULT_THREADS
}

fn default_crop_power() -> f32 {
    1.0
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            quality: default_quality(),
            num_threads: default_threads(),
            crop_mode: CropMode::default(),
            crop_power: default_crop_power(),
        }
    }
}

impl Settings {
    pub fn normalize(mut self) -> Self {
        self.quality = self.quality.clamp(MIN_QUALITY, MAX_QUALITY);
        self.num_threads = self.num_threads.clamp(MIN_THREADS, MAX_THREADS);
        self.crop_power = if self.crop_power.is_finite() {
            self.crop_power.clamp(0.0, MAX_CROP_POWER)
        } else {
            default_crop_power()
        };
        self
    }

    pub fn crop_config(&self) -> CropConfig {
        CropConfig {
            mode: self.crop_mode,
            power: self.crop_power,
        }
    }

    pub fn compression_config(&self) -> CompressionConfig {
        CompressionConfig::new(self.quality, self.num_threads)
    }
}

pub fn load_settings(path: &Path) -> Result<Settings, SettingsError> {
    let bytes = fs::read(path)?;
    let settings: Settings = serde_json::from_slice(&bytes)?;
    Ok(settings.normalize())
}

pub fn load_settings_or_default(path: &Path) -> Settings {
    match load_settings(path) {
        Ok(settings) => settings,
        Err(err) => {
            if path.exists() {
                warn!(path = %path.display(), error = %err, "ignoring unreadable settings");
            }
            Settings::default()
        }
    }
}

pub fn save_settings(path: &Path, settings: &Settings) -> Result<(), SettingsError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    let json = serde_json::to_vec_pretty(settings)?;
    fs::write(path, json)?;
    Ok(())
}

pub fn default_settings_path(root: &Path) -> PathBuf {
    root.join("config.json")
}
