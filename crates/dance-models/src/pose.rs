//! Keypoints, poses and the 33-landmark body topology.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::error::{ModelError, ModelResult};

/// Number of landmarks in a full-body pose.
pub const LANDMARK_COUNT: usize = 33;

/// A single detected landmark.
///
/// `x` and `y` are normalized to the frame (`0.0..=1.0` when inside it),
/// `z` is a relative depth estimate and `visibility` a confidence in `[0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Keypoint {
    pub x: f32,
    pub y: f32,
    pub z: f32,
    pub visibility: f32,
}

impl Keypoint {
    pub fn new(x: f32, y: f32, z: f32, visibility: f32) -> Self {
        Self { x, y, z, visibility }
    }

    /// Whether the normalized position lies inside the frame.
    pub fn is_in_frame(&self) -> bool {
        (0.0..=1.0).contains(&self.x) && (0.0..=1.0).contains(&self.y)
    }
}

/// Anatomical landmarks of the full-body topology, in model output order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PoseLandmark {
    Nose,
    LeftEyeInner,
    LeftEye,
    LeftEyeOuter,
    RightEyeInner,
    RightEye,
    RightEyeOuter,
    LeftEar,
    RightEar,
    MouthLeft,
    MouthRight,
    LeftShoulder,
    RightShoulder,
    LeftElbow,
    RightElbow,
    LeftWrist,
    RightWrist,
    LeftPinky,
    RightPinky,
    LeftIndex,
    RightIndex,
    LeftThumb,
    RightThumb,
    LeftHip,
    RightHip,
    LeftKnee,
    RightKnee,
    LeftAnkle,
    RightAnkle,
    LeftHeel,
    RightHeel,
    LeftFootIndex,
    RightFootIndex,
}

/// Body side of a landmark, used to colour annotations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BodySide {
    Left,
    Right,
    Center,
}

impl PoseLandmark {
    /// All landmarks in index order.
    pub const ALL: [PoseLandmark; LANDMARK_COUNT] = [
        PoseLandmark::Nose,
        PoseLandmark::LeftEyeInner,
        PoseLandmark::LeftEye,
        PoseLandmark::LeftEyeOuter,
        PoseLandmark::RightEyeInner,
        PoseLandmark::RightEye,
        PoseLandmark::RightEyeOuter,
        PoseLandmark::LeftEar,
        PoseLandmark::RightEar,
        PoseLandmark::MouthLeft,
        PoseLandmark::MouthRight,
        PoseLandmark::LeftShoulder,
        PoseLandmark::RightShoulder,
        PoseLandmark::LeftElbow,
        PoseLandmark::RightElbow,
        PoseLandmark::LeftWrist,
        PoseLandmark::RightWrist,
        PoseLandmark::LeftPinky,
        PoseLandmark::RightPinky,
        PoseLandmark::LeftIndex,
        PoseLandmark::RightIndex,
        PoseLandmark::LeftThumb,
        PoseLandmark::RightThumb,
        PoseLandmark::LeftHip,
        PoseLandmark::RightHip,
        PoseLandmark::LeftKnee,
        PoseLandmark::RightKnee,
        PoseLandmark::LeftAnkle,
        PoseLandmark::RightAnkle,
        PoseLandmark::LeftHeel,
        PoseLandmark::RightHeel,
        PoseLandmark::LeftFootIndex,
        PoseLandmark::RightFootIndex,
    ];

    /// Position of this landmark in a pose.
    pub fn index(self) -> usize {
        self as usize
    }

    /// Look up a landmark by its index.
    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }

    /// Upper snake case name, e.g. `LEFT_SHOULDER`.
    pub fn name(self) -> &'static str {
        match self {
            PoseLandmark::Nose => "NOSE",
            PoseLandmark::LeftEyeInner => "LEFT_EYE_INNER",
            PoseLandmark::LeftEye => "LEFT_EYE",
            PoseLandmark::LeftEyeOuter => "LEFT_EYE_OUTER",
            PoseLandmark::RightEyeInner => "RIGHT_EYE_INNER",
            PoseLandmark::RightEye => "RIGHT_EYE",
            PoseLandmark::RightEyeOuter => "RIGHT_EYE_OUTER",
            PoseLandmark::LeftEar => "LEFT_EAR",
            PoseLandmark::RightEar => "RIGHT_EAR",
            PoseLandmark::MouthLeft => "MOUTH_LEFT",
            PoseLandmark::MouthRight => "MOUTH_RIGHT",
            PoseLandmark::LeftShoulder => "LEFT_SHOULDER",
            PoseLandmark::RightShoulder => "RIGHT_SHOULDER",
            PoseLandmark::LeftElbow => "LEFT_ELBOW",
            PoseLandmark::RightElbow => "RIGHT_ELBOW",
            PoseLandmark::LeftWrist => "LEFT_WRIST",
            PoseLandmark::RightWrist => "RIGHT_WRIST",
            PoseLandmark::LeftPinky => "LEFT_PINKY",
            PoseLandmark::RightPinky => "RIGHT_PINKY",
            PoseLandmark::LeftIndex => "LEFT_INDEX",
            PoseLandmark::RightIndex => "RIGHT_INDEX",
            PoseLandmark::LeftThumb => "LEFT_THUMB",
            PoseLandmark::RightThumb => "RIGHT_THUMB",
            PoseLandmark::LeftHip => "LEFT_HIP",
            PoseLandmark::RightHip => "RIGHT_HIP",
            PoseLandmark::LeftKnee => "LEFT_KNEE",
            PoseLandmark::RightKnee => "RIGHT_KNEE",
            PoseLandmark::LeftAnkle => "LEFT_ANKLE",
            PoseLandmark::RightAnkle => "RIGHT_ANKLE",
            PoseLandmark::LeftHeel => "LEFT_HEEL",
            PoseLandmark::RightHeel => "RIGHT_HEEL",
            PoseLandmark::LeftFootIndex => "LEFT_FOOT_INDEX",
            PoseLandmark::RightFootIndex => "RIGHT_FOOT_INDEX",
        }
    }

    pub fn side(self) -> BodySide {
        if self == PoseLandmark::Nose {
            BodySide::Center
        } else if self.name().starts_with("LEFT") || self == PoseLandmark::MouthLeft {
            BodySide::Left
        } else {
            BodySide::Right
        }
    }
}

/// Full-body pose: exactly one keypoint per [`PoseLandmark`].
#[derive(Debug, Clone, PartialEq, Serialize, JsonSchema)]
#[serde(transparent)]
pub struct Pose {
    keypoints: Vec<Keypoint>,
}

impl Pose {
    /// Build a pose, rejecting any keypoint count other than 33.
    pub fn new(keypoints: Vec<Keypoint>) -> ModelResult<Self> {
        if keypoints.len() != LANDMARK_COUNT {
            return Err(ModelError::validation(format!(
                "pose must have {} keypoints, got {}",
                LANDMARK_COUNT,
                keypoints.len()
            )));
        }
        Ok(Self { keypoints })
    }

    pub fn keypoints(&self) -> &[Keypoint] {
        &self.keypoints
    }

    pub fn get(&self, landmark: PoseLandmark) -> &Keypoint {
        &self.keypoints[landmark.index()]
    }

    /// Mean visibility over all landmarks.
    pub fn mean_visibility(&self) -> f64 {
        let sum: f64 = self.keypoints.iter().map(|k| k.visibility as f64).sum();
        sum / LANDMARK_COUNT as f64
    }

    /// Export records for this pose.
    pub fn landmark_records(&self) -> Vec<LandmarkRecord> {
        self.keypoints
            .iter()
            .zip(PoseLandmark::ALL)
            .map(|(kp, landmark)| LandmarkRecord {
                id: landmark.index(),
                name: landmark.name().to_string(),
                x: kp.x,
                y: kp.y,
                z: kp.z,
                visibility: kp.visibility,
            })
            .collect()
    }
}

impl<'de> Deserialize<'de> for Pose {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let keypoints = Vec::<Keypoint>::deserialize(deserializer)?;
        Pose::new(keypoints).map_err(serde::de::Error::custom)
    }
}

/// Detection outcome for one frame.
#[derive(Debug, Clone, PartialEq)]
pub struct FrameResult {
    pub frame_index: u64,
    pub pose: Option<Pose>,
}

/// Named landmark in a keypoint export.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct LandmarkRecord {
    pub id: usize,
    pub name: String,
    pub x: f32,
    pub y: f32,
    pub z: f32,
    pub visibility: f32,
}

/// Keypoints exported for one frame in which a pose was detected.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct FrameKeypoints {
    pub frame: u64,
    pub landmarks: Vec<LandmarkRecord>,
}

impl FrameKeypoints {
    pub fn from_pose(frame: u64, pose: &Pose) -> Self {
        Self {
            frame,
            landmarks: pose.landmark_records(),
        }
    }
}
