//! Mixer configuration
//!
//! Stored as YAML. A missing or unreadable file is not an error: the mixer
//! starts with defaults and the problem is logged.
//!
//! ```yaml
//! block_size: 512
//! sample_rate: 48000
//! interpolation: cubic
//! decks:
//!   - gain: 1.0
//!     speed: 1.0
//!   - gain: 0.8
//!     speed: 1.0
//! ```

mod paths;

use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::engine::{InterpolationMethod, MAX_SPEED};
use crate::types::{DEFAULT_SAMPLE_RATE, MAX_BLOCK_SIZE, NUM_DECKS};

pub use paths::{default_config_path, CONFIG_FILE_NAME};

/// Block size used when none is configured
pub const DEFAULT_BLOCK_SIZE: usize = 512;

/// Gain and speed applied to a deck at startup
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeckPreset {
    pub gain: f64,
    pub speed: f64,
}

impl Default for DeckPreset {
    fn default() -> Self {
        Self {
            gain: 1.0,
            speed: 1.0,
        }
    }
}

impl DeckPreset {
    fn is_valid(&self) -> bool {
        (0.0..=1.0).contains(&self.gain) && self.speed > 0.0 && self.speed <= MAX_SPEED
    }
}

/// Render settings plus per-deck presets
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MixerConfig {
    pub block_size: usize,
    pub sample_rate: u32,
    pub interpolation: InterpolationMethod,
    pub decks: [DeckPreset; NUM_DECKS],
}

impl Default for MixerConfig {
    fn default() -> Self {
        Self {
            block_size: DEFAULT_BLOCK_SIZE,
            sample_rate: DEFAULT_SAMPLE_RATE,
            interpolation: InterpolationMethod::default(),
            decks: [DeckPreset::default(); NUM_DECKS],
        }
    }
}

impl MixerConfig {
    /// Load from a YAML file, falling back to defaults
    ///
    /// Out-of-range values are replaced by their defaults with a warning.
    pub fn load(path: &Path) -> Self {
        if !path.exists() {
            log::info!("No mixer config at {:?}, using defaults", path);
            return Self::default();
        }

        let parsed = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {:?}", path))
            .and_then(|contents| {
                serde_yaml::from_str::<MixerConfig>(&contents)
                    .with_context(|| format!("Failed to parse {:?}", path))
            });

        match parsed {
            Ok(config) => {
                log::info!("Loaded mixer config from {:?}", path);
                config.sanitized()
            }
            Err(e) => {
                log::warn!("{:#}, using defaults", e);
                Self::default()
            }
        }
    }

    /// Write as YAML, creating parent directories
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create config directory {:?}", parent))?;
        }
        let yaml = serde_yaml::to_string(self).context("Failed to serialize mixer config")?;
        std::fs::write(path, yaml).with_context(|| format!("Failed to write {:?}", path))?;
        log::info!("Saved mixer config to {:?}", path);
        Ok(())
    }

    /// Replace any out-of-range field with its default
    pub fn sanitized(mut self) -> Self {
        let defaults = Self::default();

        if self.block_size == 0 || self.block_size > MAX_BLOCK_SIZE {
            log::warn!(
                "block_size {} outside 1..={}, using {}",
                self.block_size,
                MAX_BLOCK_SIZE,
                defaults.block_size
            );
            self.block_size = defaults.block_size;
        }
        if self.sample_rate == 0 {
            log::warn!("sample_rate 0 is invalid, using {}", defaults.sample_rate);
            self.sample_rate = defaults.sample_rate;
        }
        for (index, preset) in self.decks.iter_mut().enumerate() {
            if !preset.is_valid() {
                log::warn!(
                    "Deck {} preset (gain {}, speed {}) out of range, using defaults",
                    index,
                    preset.gain,
                    preset.speed
                );
                *preset = DeckPreset::default();
            }
        }
        self
    }
}
