//! `[capture]` section: which device to open and at what geometry and rate.

use crate::config::ConfigError;
use serde::{Deserialize, Serialize};

/// Upper frame rate a source is asked for.
pub const MAX_FPS: u32 = 120;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    pub device_id: u32,
    pub width: u32,
    pub height: u32,
    pub fps: u32,
    /// Locked exposure in microseconds. `None` leaves the device setting;
    /// a drifting exposure moves the frame mean and trips rejection.
    pub exposure_us: Option<u32>,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            device_id: 0,
            width: 320,
            height: 240,
            fps: 30,
            exposure_us: Some(10_000),
        }
    }
}

impl CaptureConfig {
    pub fn with_dimensions(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            ..Self::default()
        }
    }

    /// Pause between capture ticks for the configured rate.
    pub fn frame_interval(&self) -> std::time::Duration {
        std::time::Duration::from_micros(1_000_000 / u64::from(self.fps.max(1)))
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.width == 0 || self.height == 0 {
            return Err(ConfigError::InvalidDimensions);
        }
        if self.exposure_us == Some(0) {
            return Err(ConfigError::InvalidExposure);
        }
        if !(1..=MAX_FPS).contains(&self.fps) {
            return Err(ConfigError::InvalidFrameRate);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_pass_validation() {
        let config = CaptureConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.frame_interval().as_micros(), 33_333);
    }

    #[test]
    fn test_rate_outside_range_rejected() {
        let mut config = CaptureConfig::with_dimensions(64, 48);
        config.fps = 0;
        assert!(matches!(config.validate(), Err(ConfigError::InvalidFrameRate)));
        config.fps = MAX_FPS + 1;
        assert!(matches!(config.validate(), Err(ConfigError::InvalidFrameRate)));
        config.fps = 25;
        assert_eq!(config.frame_interval().as_millis(), 40);
    }

    #[test]
    fn test_unlocked_exposure_allowed() {
        let mut config = CaptureConfig::with_dimensions(8, 8);
        config.exposure_us = None;
        assert!(config.validate().is_ok());
        config.exposure_us = Some(0);
        assert!(matches!(config.validate(), Err(ConfigError::InvalidExposure)));
        config = CaptureConfig::with_dimensions(0, 8);
        assert!(matches!(config.validate(), Err(ConfigError::InvalidDimensions)));
    }
}
