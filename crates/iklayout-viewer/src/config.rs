//! Viewer settings, optionally loaded from a TOML file.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::cells::SelectionPolicy;
use crate::translate::DoubleClickPolicy;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Failed to read config file at {path}: {reason}")]
    ReadError { path: PathBuf, reason: String },

    #[error("Invalid TOML in {path}: {reason}")]
    ParseError { path: PathBuf, reason: String },

    #[error("Invalid config value for {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

/// Settings for one viewer session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ViewerConfig {
    /// Canvas width in pixels.
    pub width: u32,
    /// Canvas height in pixels.
    pub height: u32,
    /// Period of the renderer timer tick.
    pub tick_interval_ms: u64,
    /// Minimum spacing of scroll-driven zoom steps on surfaces that throttle scrolling.
    pub scroll_throttle_ms: u64,
    /// Overrides the display binding's own double-click handling.
    pub double_click: Option<DoubleClickPolicy>,
    pub selection: SelectionPolicy,
    /// Top-left corner of the info box, in canvas pixels.
    pub info_anchor: [f64; 2],
    /// Where in-memory designs are written before loading. Defaults to the OS temp dir.
    pub transfer_dir: Option<PathBuf>,
}

impl Default for ViewerConfig {
    fn default() -> Self {
        Self {
            width: 800,
            height: 600,
            tick_interval_ms: 10,
            scroll_throttle_ms: 100,
            double_click: None,
            selection: SelectionPolicy::First,
            info_anchor: [10.0, 10.0],
            transfer_dir: None,
        }
    }
}

/// Canvas sizes must be non-empty on both axes.
pub fn validate_dimensions(width: u32, height: u32) -> Result<(), ConfigError> {
    if width == 0 || height == 0 {
        return Err(ConfigError::Invalid {
            field: "width/height",
            reason: format!("canvas must be non-empty, got {}x{}", width, height),
        });
    }
    Ok(())
}

impl ViewerConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        let config: Self = toml::from_str(&contents).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        config.validate()?;
        log::debug!("Loaded viewer config from {}", path.display());
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_dimensions(self.width, self.height)?;
        if self.tick_interval_ms == 0 {
            return Err(ConfigError::Invalid {
                field: "tick_interval_ms",
                reason: "must be positive".into(),
            });
        }
        Ok(())
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }

    pub fn scroll_throttle(&self) -> Duration {
        Duration::from_millis(self.scroll_throttle_ms)
    }

    pub fn transfer_dir(&self) -> PathBuf {
        self.transfer_dir
            .clone()
            .unwrap_or_else(|| std::env::temp_dir().join("iklayout"))
    }
}
