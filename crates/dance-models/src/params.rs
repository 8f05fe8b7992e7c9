//! Pose detection confidence parameters.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::error::{ModelError, ModelResult};

/// Default minimum confidence for the initial person detection.
pub const DEFAULT_MIN_DETECTION_CONFIDENCE: f32 = 0.5;
/// Default minimum confidence for frame-to-frame landmark tracking.
pub const DEFAULT_MIN_TRACKING_CONFIDENCE: f32 = 0.5;

/// Thresholds handed to the pose tracker. Both must lie in `[0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, JsonSchema, Validate)]
pub struct ConfidenceParams {
    #[validate(range(min = 0.0, max = 1.0))]
    #[serde(default = "default_detection")]
    pub min_detection_confidence: f32,

    #[validate(range(min = 0.0, max = 1.0))]
    #[serde(default = "default_tracking")]
    pub min_tracking_confidence: f32,
}

fn default_detection() -> f32 {
    DEFAULT_MIN_DETECTION_CONFIDENCE
}

fn default_tracking() -> f32 {
    DEFAULT_MIN_TRACKING_CONFIDENCE
}

impl Default for ConfidenceParams {
    fn default() -> Self {
        Self {
            min_detection_confidence: DEFAULT_MIN_DETECTION_CONFIDENCE,
            min_tracking_confidence: DEFAULT_MIN_TRACKING_CONFIDENCE,
        }
    }
}

impl ConfidenceParams {
    /// Build validated parameters.
    pub fn new(min_detection_confidence: f32, min_tracking_confidence: f32) -> ModelResult<Self> {
        let params = Self {
            min_detection_confidence,
            min_tracking_confidence,
        };
        params.check()?;
        Ok(params)
    }

    /// Range-check both thresholds.
    pub fn check(&self) -> ModelResult<()> {
        for (name, value) in [
            ("min_detection_confidence", self.min_detection_confidence),
            ("min_tracking_confidence", self.min_tracking_confidence),
        ] {
            if !value.is_finite() {
                return Err(ModelError::validation(format!("{} must be a finite number", name)));
            }
        }

        self.validate().map_err(|errors| {
            let fields: Vec<String> = errors
                .field_errors()
                .keys()
                .map(|field| format!("{} must be between 0 and 1", field))
                .collect();
            ModelError::validation(fields.join("; "))
        })
    }
}
