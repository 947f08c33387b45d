//! # Configuration Management Module
//!
//! Measurement settings stored in platform-appropriate locations.
//! Handles loading, saving, validating and providing defaults.
//!
//! ## Settings
//! - Sampling: `sample_rate_hz`, `downsample_resolution`, ROI size/shape, brightness channel
//! - Session: `session_duration_secs`, `buffer_capacity`, `stall_timeout_secs`
//! - Detection: mode, detrend radius, RR bounds per mode, peak spacing, threshold multiplier
//! - Classification: minimum interval count, RMSSD coaching threshold
//!
//! ## Storage Location
//! - macOS: ~/Library/Application Support/zen-pulse/config.toml
//! - Linux: ~/.config/zen-pulse/config.toml
//! - Windows: %APPDATA%\zen-pulse\config.toml
//!
//! Every field has a default, so a config file only needs the keys it overrides.

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Which colour information a frame is reduced to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BrightnessChannel {
    /// Mean of the red channel
    Red,
    /// Mean Rec.601 luma
    Luminance,
}

/// Shape of the centered region of interest
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RoiShape {
    Circle,
    Square,
}

/// Beat detection strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DetectionMode {
    /// Local maximum over three samples, evaluated as samples arrive
    Streaming,
    /// Detrend + adaptive percentile threshold over the whole buffer at the end
    Batch,
}

/// Plausible RR interval band in milliseconds (inclusive)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RrBounds {
    pub min_ms: f64,
    pub max_ms: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MeasurementConfig {
    pub sample_rate_hz: f64,
    pub session_duration_secs: f64,
    pub buffer_capacity: usize,
    pub downsample_resolution: usize,
    /// ROI side (square) or diameter (circle) as a fraction of the downsampled frame
    pub roi_fraction: f64,
    pub roi_shape: RoiShape,
    pub brightness_channel: BrightnessChannel,
    pub detrend_radius: usize,
    pub detection_mode: DetectionMode,
    pub streaming_rr_bounds: RrBounds,
    pub batch_rr_bounds: RrBounds,
    pub min_peak_distance_ms: f64,
    pub threshold_multiplier: f64,
    pub min_rr_intervals: usize,
    pub rmssd_coach_threshold_ms: f64,
    pub stall_timeout_secs: f64,
}

impl Default for MeasurementConfig {
    fn default() -> Self {
        Self {
            sample_rate_hz: 30.0,
            session_duration_secs: 30.0,
            buffer_capacity: 512,
            downsample_resolution: 64,
            roi_fraction: 0.5,
            roi_shape: RoiShape::Circle,
            brightness_channel: BrightnessChannel::Red,
            detrend_radius: 5,
            detection_mode: DetectionMode::Batch,
            streaming_rr_bounds: RrBounds { min_ms: 400.0, max_ms: 1500.0 },
            batch_rr_bounds: RrBounds { min_ms: 300.0, max_ms: 2000.0 },
            min_peak_distance_ms: 400.0,
            threshold_multiplier: 0.6,
            // Five accepted beats
            min_rr_intervals: 4,
            rmssd_coach_threshold_ms: 40.0,
            stall_timeout_secs: 3.0,
        }
    }
}

impl MeasurementConfig {
    /// Get the path to the config file
    fn config_path() -> PathBuf {
        let config_dir = dirs::config_dir().unwrap_or_else(|| PathBuf::from("."));
        config_dir.join("zen-pulse").join("config.toml")
    }

    /// Load config from the platform location, or create default if it doesn't exist
    pub fn load() -> Result<Self, ConfigError> {
        let path = Self::config_path();

        match fs::read_to_string(&path) {
            Ok(contents) => Self::parse(&contents),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                let config = Self::default();
                config.save()?;
                Ok(config)
            }
            Err(e) => Err(ConfigError::ReadFailed(e)),
        }
    }

    /// Load config from an explicit path; the file must exist
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path.as_ref()).map_err(ConfigError::ReadFailed)?;
        Self::parse(&contents)
    }

    fn parse(contents: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(contents).map_err(ConfigError::ParseFailed)?;
        config.validate()?;
        Ok(config)
    }

    /// Save config to the platform location
    pub fn save(&self) -> Result<(), ConfigError> {
        self.save_to(Self::config_path())
    }

    /// Save config to an explicit path, creating parent directories
    pub fn save_to(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(ConfigError::WriteFailed)?;
        }

        let toml_string = toml::to_string_pretty(self).map_err(ConfigError::SerializeFailed)?;
        fs::write(path, toml_string).map_err(ConfigError::WriteFailed)?;

        Ok(())
    }

    /// Reject values the pipeline cannot run with
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.sample_rate_hz > 0.0) {
            return Err(ConfigError::Invalid("sample_rate_hz must be positive".into()));
        }
        if !(self.session_duration_secs > 0.0) {
            return Err(ConfigError::Invalid("session_duration_secs must be positive".into()));
        }
        if self.buffer_capacity == 0 {
            return Err(ConfigError::Invalid("buffer_capacity must be at least 1".into()));
        }
        if self.downsample_resolution == 0 {
            return Err(ConfigError::Invalid("downsample_resolution must be at least 1".into()));
        }
        if !(self.roi_fraction > 0.0 && self.roi_fraction <= 1.0) {
            return Err(ConfigError::Invalid("roi_fraction must be in (0, 1]".into()));
        }
        for (name, bounds) in [
            ("streaming_rr_bounds", self.streaming_rr_bounds),
            ("batch_rr_bounds", self.batch_rr_bounds),
        ] {
            if !(bounds.min_ms > 0.0 && bounds.min_ms < bounds.max_ms) {
                return Err(ConfigError::Invalid(format!(
                    "{} must satisfy 0 < min_ms < max_ms",
                    name
                )));
            }
        }
        if self.min_rr_intervals == 0 {
            return Err(ConfigError::Invalid("min_rr_intervals must be at least 1".into()));
        }
        Ok(())
    }

    /// RR band for the configured detection mode
    pub fn active_rr_bounds(&self) -> RrBounds {
        match self.detection_mode {
            DetectionMode::Streaming => self.streaming_rr_bounds,
            DetectionMode::Batch => self.batch_rr_bounds,
        }
    }

    pub fn session_duration_ms(&self) -> f64 {
        self.session_duration_secs * 1000.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_default_config_values() {
        let config = MeasurementConfig::default();
        assert_eq!(config.sample_rate_hz, 30.0);
        assert_eq!(config.session_duration_secs, 30.0);
        assert_eq!(config.buffer_capacity, 512);
        assert_eq!(config.detrend_radius, 5);
        assert_eq!(config.streaming_rr_bounds, RrBounds { min_ms: 400.0, max_ms: 1500.0 });
        assert_eq!(config.batch_rr_bounds, RrBounds { min_ms: 300.0, max_ms: 2000.0 });
        assert_eq!(config.rmssd_coach_threshold_ms, 40.0);
        assert_eq!(config.threshold_multiplier, 0.6);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_serialization() {
        let config = MeasurementConfig {
            detection_mode: DetectionMode::Streaming,
            roi_shape: RoiShape::Square,
            ..Default::default()
        };

        let toml_str = toml::to_string(&config).expect("Failed to serialize");
        assert!(toml_str.contains("detection_mode = \"streaming\""));
        assert!(toml_str.contains("roi_shape = \"square\""));
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let toml_str = r#"
            sample_rate_hz = 60.0
            brightness_channel = "luminance"
        "#;

        let config: MeasurementConfig = toml::from_str(toml_str).expect("Failed to deserialize");
        assert_eq!(config.sample_rate_hz, 60.0);
        assert_eq!(config.brightness_channel, BrightnessChannel::Luminance);
        assert_eq!(config.buffer_capacity, 512);
    }

    #[test]
    fn test_save_and_load_from_path() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let config = MeasurementConfig {
            session_duration_secs: 45.0,
            detrend_radius: 7,
            ..Default::default()
        };
        config.save_to(&path).expect("Failed to save");

        let loaded = MeasurementConfig::load_from(&path).expect("Failed to load");
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_load_from_missing_file() {
        let dir = tempdir().unwrap();
        let result = MeasurementConfig::load_from(dir.path().join("absent.toml"));
        assert!(matches!(result, Err(ConfigError::ReadFailed(_))));
    }

    #[test]
    fn test_load_rejects_invalid_values() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "roi_fraction = 1.5\n").unwrap();

        let result = MeasurementConfig::load_from(&path);
        assert!(matches!(result, Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_validate_inverted_bounds() {
        let config = MeasurementConfig {
            batch_rr_bounds: RrBounds { min_ms: 2000.0, max_ms: 300.0 },
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_active_rr_bounds_follow_mode() {
        let mut config = MeasurementConfig::default();
        assert_eq!(config.active_rr_bounds().min_ms, 300.0);
        config.detection_mode = DetectionMode::Streaming;
        assert_eq!(config.active_rr_bounds().min_ms, 400.0);
    }
}
