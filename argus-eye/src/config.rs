//! Configuration for the live capture loop

use serde::{Deserialize, Serialize};

/// Default confidence threshold applied when a request omits one.
pub const DEFAULT_CONFIDENCE: f32 = 0.25;

/// Default square inference size in pixels.
pub const DEFAULT_INPUT_SIZE: u32 = 640;

/// Configuration snapshot for one live run.
///
/// The loop binds the snapshot passed to `LiveController::start`;
/// changing the desired configuration afterwards has no effect on a
/// run already in progress until it is stopped and restarted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LiveConfig {
    /// Capture device index (0, 1, 2, etc.)
    pub camera_id: u32,
    /// Minimum confidence for a detection to be reported, in [0, 1].
    pub confidence: f32,
    /// Square inference size handed to the detector, in pixels.
    pub input_size: u32,
    /// Comma-separated class-name filter text. Empty means no filter.
    pub classes: String,
}

impl Default for LiveConfig {
    fn default() -> Self {
        Self {
            camera_id: 0,
            confidence: DEFAULT_CONFIDENCE,
            input_size: DEFAULT_INPUT_SIZE,
            classes: String::new(),
        }
    }
}

impl LiveConfig {
    /// Validate configuration
    pub fn validate(&self) -> Result<(), String> {
        if !self.confidence.is_finite() || !(0.0..=1.0).contains(&self.confidence) {
            return Err("Confidence must be between 0.0 and 1.0".to_string());
        }

        if self.input_size == 0 {
            return Err("Inference size must be non-zero".to_string());
        }

        if self.input_size > 7680 {
            return Err("Inference size too large (max 7680)".to_string());
        }

        if self.camera_id > 100 {
            return Err("Camera ID too large (max 100)".to_string());
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_default() {
        let config = LiveConfig::default();
        assert_eq!(config.camera_id, 0);
        assert_eq!(config.confidence, DEFAULT_CONFIDENCE);
        assert_eq!(config.input_size, DEFAULT_INPUT_SIZE);
        assert!(config.classes.is_empty());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation_confidence_range() {
        let mut config = LiveConfig::default();
        config.confidence = -0.1;
        assert!(config.validate().is_err());

        config.confidence = 1.1;
        assert!(config.validate().is_err());

        config.confidence = f32::NAN;
        assert!(config.validate().is_err());

        config.confidence = 1.0;
        assert!(config.validate().is_ok());

        config.confidence = 0.0;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation_input_size() {
        let mut config = LiveConfig::default();
        config.input_size = 0;
        assert!(config.validate().is_err());

        config.input_size = 7681;
        assert!(config.validate().is_err());

        config.input_size = 320;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation_camera_id() {
        let mut config = LiveConfig::default();
        config.camera_id = 101;
        assert!(config.validate().is_err());

        config.camera_id = 100;
        assert!(config.validate().is_ok());
    }
}
