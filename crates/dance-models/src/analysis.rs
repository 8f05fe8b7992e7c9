//! Analysis results produced by the video pipeline.

use serde::{Deserialize, Serialize};

use crate::error::{ModelError, ModelResult};

/// Frame dimensions in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

/// Aggregate landmark statistics over the frames where a pose was found.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MovementStatistics {
    pub total_frames_analyzed: u64,
    /// Mean landmark visibility; absent when no pose was detected at all.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub average_visibility: Option<f64>,
    pub pose_detected: bool,
}

impl MovementStatistics {
    /// Build statistics from the number of detected frames and the summed
    /// mean visibility of those frames.
    pub fn from_visibility_sum(detected_frames: u64, visibility_sum: f64) -> Self {
        let average_visibility = if detected_frames > 0 {
            Some(visibility_sum / detected_frames as f64)
        } else {
            None
        };
        Self {
            total_frames_analyzed: detected_frames,
            average_visibility,
            pose_detected: detected_frames > 0,
        }
    }
}

/// Summary of one analyzed video.
///
/// The detection rate is derived from the frame counts on every access and is
/// never stored, so it cannot drift from them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(into = "SummaryWire", try_from = "SummaryWire")]
pub struct AnalysisSummary {
    total_frames: u64,
    detected_frames: u64,
    fps: f64,
    resolution: Resolution,
    movement_statistics: MovementStatistics,
}

impl AnalysisSummary {
    /// Create a summary. Zero frames is an [`ModelError::EmptyVideo`].
    pub fn new(
        total_frames: u64,
        detected_frames: u64,
        fps: f64,
        resolution: Resolution,
        movement_statistics: MovementStatistics,
    ) -> ModelResult<Self> {
        if total_frames == 0 {
            return Err(ModelError::EmptyVideo);
        }
        if detected_frames > total_frames {
            return Err(ModelError::validation(format!(
                "detected frames ({}) exceed total frames ({})",
                detected_frames, total_frames
            )));
        }
        Ok(Self {
            total_frames,
            detected_frames,
            fps,
            resolution,
            movement_statistics,
        })
    }

    pub fn total_frames(&self) -> u64 {
        self.total_frames
    }

    pub fn detected_frames(&self) -> u64 {
        self.detected_frames
    }

    /// Percentage of frames with a detected pose.
    pub fn detection_rate(&self) -> f64 {
        self.detected_frames as f64 / self.total_frames as f64 * 100.0
    }

    pub fn fps(&self) -> f64 {
        self.fps
    }

    pub fn resolution(&self) -> Resolution {
        self.resolution
    }

    /// Number of frames that contributed keypoints to the export.
    pub fn keypoint_frames(&self) -> u64 {
        self.detected_frames
    }

    pub fn movement_statistics(&self) -> &MovementStatistics {
        &self.movement_statistics
    }
}

#[derive(Serialize, Deserialize)]
struct SummaryWire {
    total_frames: u64,
    detected_frames: u64,
    #[serde(default)]
    detection_rate: f64,
    fps: f64,
    resolution: Resolution,
    #[serde(default)]
    keypoint_frames: u64,
    movement_statistics: MovementStatistics,
}

impl From<AnalysisSummary> for SummaryWire {
    fn from(summary: AnalysisSummary) -> Self {
        Self {
            total_frames: summary.total_frames,
            detected_frames: summary.detected_frames,
            detection_rate: summary.detection_rate(),
            fps: summary.fps,
            resolution: summary.resolution,
            keypoint_frames: summary.keypoint_frames(),
            movement_statistics: summary.movement_statistics,
        }
    }
}

impl TryFrom<SummaryWire> for AnalysisSummary {
    type Error = ModelError;

    // Incoming `detection_rate` is ignored and recomputed.
    fn try_from(wire: SummaryWire) -> Result<Self, Self::Error> {
        AnalysisSummary::new(
            wire.total_frames,
            wire.detected_frames,
            wire.fps,
            wire.resolution,
            wire.movement_statistics,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn summary(total: u64, detected: u64) -> ModelResult<AnalysisSummary> {
        AnalysisSummary::new(
            total,
            detected,
            30.0,
            Resolution { width: 640, height: 480 },
            MovementStatistics::from_visibility_sum(detected, detected as f64 * 0.9),
        )
    }

    #[test]
    fn test_detection_rate_is_percentage() {
        let s = summary(10, 5).unwrap();
        assert_eq!(s.detection_rate(), 50.0);
        assert_eq!(summary(3, 3).unwrap().detection_rate(), 100.0);
        assert_eq!(summary(4, 0).unwrap().detection_rate(), 0.0);
    }

    #[test]
    fn test_zero_frames_is_empty_video() {
        assert_eq!(summary(0, 0).unwrap_err(), ModelError::EmptyVideo);
    }

    #[test]
    fn test_detected_cannot_exceed_total() {
        assert!(matches!(summary(2, 3), Err(ModelError::Validation(_))));
    }

    #[test]
    fn test_serialized_rate_is_derived() {
        let json = serde_json::to_value(summary(8, 2).unwrap()).unwrap();
        assert_eq!(json["detection_rate"], 25.0);
        assert_eq!(json["keypoint_frames"], 2);
        assert_eq!(json["resolution"]["width"], 640);
    }

    #[test]
    fn test_deserialize_recomputes_rate() {
        let mut json = serde_json::to_value(summary(8, 2).unwrap()).unwrap();
        json["detection_rate"] = serde_json::json!(99.0);
        let s: AnalysisSummary = serde_json::from_value(json).unwrap();
        assert_eq!(s.detection_rate(), 25.0);
    }

    #[test]
    fn test_movement_statistics_without_detections() {
        let stats = MovementStatistics::from_visibility_sum(0, 0.0);
        assert!(!stats.pose_detected);
        assert!(stats.average_visibility.is_none());

        let stats = MovementStatistics::from_visibility_sum(4, 3.0);
        assert_eq!(stats.average_visibility, Some(0.75));
    }
}
