//! Editor settings (persistent, JSON).
//!
//! Loaded from `curvekeys.json` in the config directory resolved by
//! [`crate::paths`]. Missing fields take their defaults, so old files keep
//! loading after new settings are added.

use std::path::Path;

use anyhow::{Context, Result};
use log::{debug, info};
use serde::{Deserialize, Serialize};

use crate::entities::space::LinearSpace;
use crate::paths::{self, PathConfig};

/// Settings file name inside the config directory.
pub const SETTINGS_FILE: &str = "curvekeys.json";

/// Curve editor settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EditorSettings {
    // Key points
    pub key_half_size: f32,  // Half extent of the key icon, before view scale (default 8.0)
    pub handle_length: f32,  // Rendered tangent handle length, before view scale (default 100.0)
    pub handle_radius: f32,  // Hit radius of a tangent handle end, before view scale (default 4.0)

    // View
    pub view_scale: f32,       // Pointer delta multiplier (1.0 = unzoomed)
    pub pixels_per_frame: f32, // Graph mapping, frames -> screen x
    pub pixels_per_unit: f32,  // Graph mapping, values -> screen y
}

impl Default for EditorSettings {
    fn default() -> Self {
        Self {
            key_half_size: 8.0,
            handle_length: 100.0,
            handle_radius: 4.0,
            view_scale: 1.0,
            pixels_per_frame: 10.0,
            pixels_per_unit: 10.0,
        }
    }
}

impl EditorSettings {
    /// Graph mapping described by these settings.
    pub fn space(&self) -> LinearSpace {
        LinearSpace::new(self.pixels_per_frame, self.pixels_per_unit)
    }

    /// Load from an explicit file.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read settings: {}", path.display()))?;
        let settings: Self = serde_json::from_str(&text)
            .with_context(|| format!("Failed to parse settings: {}", path.display()))?;
        debug!("Loaded settings from {}: {:?}", path.display(), settings);
        Ok(settings.sanitized())
    }

    /// Load from the config directory, falling back to defaults when the
    /// file does not exist yet.
    pub fn load_or_default(config: &PathConfig) -> Result<Self> {
        let path = paths::config_file(SETTINGS_FILE, config);
        if !path.exists() {
            info!("No settings at {}, using defaults", path.display());
            return Ok(Self::default());
        }
        Self::load(&path)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let text = serde_json::to_string_pretty(self).context("Failed to serialize settings")?;
        std::fs::write(path, text)
            .with_context(|| format!("Failed to write settings: {}", path.display()))?;
        Ok(())
    }

    /// Replace non-positive or non-finite sizes with defaults.
    pub fn sanitized(mut self) -> Self {
        let defaults = Self::default();
        let fix = |v: f32, d: f32| if v.is_finite() && v > 0.0 { v } else { d };
        self.key_half_size = fix(self.key_half_size, defaults.key_half_size);
        self.handle_length = fix(self.handle_length, defaults.handle_length);
        self.handle_radius = fix(self.handle_radius, defaults.handle_radius);
        self.view_scale = fix(self.view_scale, defaults.view_scale);
        self.pixels_per_frame = fix(self.pixels_per_frame, defaults.pixels_per_frame);
        self.pixels_per_unit = fix(self.pixels_per_unit, defaults.pixels_per_unit);
        self
    }
}
