//! Skeleton rendering for overlay and skeleton-only frames.

use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_filled_circle_mut, draw_line_segment_mut};

use dance_models::{BodySide, Pose, PoseLandmark, LANDMARK_COUNT};

/// Edges of the 33-landmark body topology, as landmark index pairs.
pub const POSE_CONNECTIONS: [(usize, usize); 35] = [
    // face
    (0, 1),
    (1, 2),
    (2, 3),
    (3, 7),
    (0, 4),
    (4, 5),
    (5, 6),
    (6, 8),
    (9, 10),
    // torso and arms
    (11, 12),
    (11, 13),
    (13, 15),
    (15, 17),
    (15, 19),
    (15, 21),
    (17, 19),
    (12, 14),
    (14, 16),
    (16, 18),
    (16, 20),
    (16, 22),
    (18, 20),
    (11, 23),
    (12, 24),
    (23, 24),
    // legs
    (23, 25),
    (24, 26),
    (25, 27),
    (26, 28),
    (27, 29),
    (28, 30),
    (29, 31),
    (30, 32),
    (27, 31),
    (28, 32),
];

/// Landmarks below this visibility are not drawn.
pub const DEFAULT_VISIBILITY_THRESHOLD: f32 = 0.5;

const CONNECTION_COLOR: Rgb<u8> = Rgb([224, 224, 224]);
const LEFT_COLOR: Rgb<u8> = Rgb([255, 138, 0]);
const RIGHT_COLOR: Rgb<u8> = Rgb([0, 217, 231]);
const CENTER_COLOR: Rgb<u8> = Rgb([255, 255, 255]);

/// Drawing parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AnnotationStyle {
    pub visibility_threshold: f32,
    pub line_thickness: u32,
    pub landmark_radius: i32,
}

impl Default for AnnotationStyle {
    fn default() -> Self {
        Self {
            visibility_threshold: DEFAULT_VISIBILITY_THRESHOLD,
            line_thickness: 2,
            landmark_radius: 3,
        }
    }
}

/// Both rendered frames plus what was drawn on them.
#[derive(Debug, Clone)]
pub struct Annotation {
    /// Input frame with the skeleton drawn on top
    pub overlay: RgbImage,
    /// Same skeleton on a black frame of identical size
    pub skeleton: RgbImage,
    pub connections_drawn: usize,
    pub landmarks_drawn: usize,
}

/// Stateless skeleton renderer.
#[derive(Debug, Clone, Copy, Default)]
pub struct FrameAnnotator {
    style: AnnotationStyle,
}

impl FrameAnnotator {
    pub fn new(style: AnnotationStyle) -> Self {
        Self { style }
    }

    pub fn with_visibility_threshold(threshold: f32) -> Self {
        Self::new(AnnotationStyle {
            visibility_threshold: threshold,
            ..AnnotationStyle::default()
        })
    }

    pub fn style(&self) -> &AnnotationStyle {
        &self.style
    }

    /// Render `pose` onto a copy of `frame` and onto a black frame.
    ///
    /// With no pose the overlay is an unchanged copy and the skeleton frame is
    /// solid black.
    pub fn annotate(&self, frame: &RgbImage, pose: Option<&Pose>) -> Annotation {
        let mut overlay = frame.clone();
        let mut skeleton = RgbImage::new(frame.width(), frame.height());

        let Some(pose) = pose else {
            return Annotation {
                overlay,
                skeleton,
                connections_drawn: 0,
                landmarks_drawn: 0,
            };
        };

        let points = self.pixel_points(pose, frame.width(), frame.height());

        let mut connections_drawn = 0;
        for &(a, b) in POSE_CONNECTIONS.iter() {
            if let (Some(start), Some(end)) = (points[a], points[b]) {
                for canvas in [&mut overlay, &mut skeleton] {
                    draw_thick_line(canvas, start, end, self.style.line_thickness, CONNECTION_COLOR);
                }
                connections_drawn += 1;
            }
        }

        let mut landmarks_drawn = 0;
        for (landmark, point) in PoseLandmark::ALL.iter().zip(points.iter()) {
            if let Some((x, y)) = point {
                let center = (x.round() as i32, y.round() as i32);
                let color = side_color(landmark.side());
                for canvas in [&mut overlay, &mut skeleton] {
                    draw_filled_circle_mut(canvas, center, self.style.landmark_radius, color);
                }
                landmarks_drawn += 1;
            }
        }

        Annotation {
            overlay,
            skeleton,
            connections_drawn,
            landmarks_drawn,
        }
    }

    /// Pixel position of every drawable landmark.
    fn pixel_points(&self, pose: &Pose, width: u32, height: u32) -> [Option<(f32, f32)>; LANDMARK_COUNT] {
        let mut points = [None; LANDMARK_COUNT];
        for (slot, kp) in points.iter_mut().zip(pose.keypoints()) {
            if kp.visibility < self.style.visibility_threshold || !kp.is_in_frame() {
                continue;
            }
            let x = (kp.x * width as f32).floor().min(width.saturating_sub(1) as f32);
            let y = (kp.y * height as f32).floor().min(height.saturating_sub(1) as f32);
            *slot = Some((x, y));
        }
        points
    }
}

fn side_color(side: BodySide) -> Rgb<u8> {
    match side {
        BodySide::Left => LEFT_COLOR,
        BodySide::Right => RIGHT_COLOR,
        BodySide::Center => CENTER_COLOR,
    }
}

/// Draw a line `thickness` pixels wide as parallel one-pixel segments.
fn draw_thick_line(canvas: &mut RgbImage, start: (f32, f32), end: (f32, f32), thickness: u32, color: Rgb<u8>) {
    let (dx, dy) = (end.0 - start.0, end.1 - start.1);
    let len = (dx * dx + dy * dy).sqrt();
    if thickness <= 1 || len == 0.0 {
        draw_line_segment_mut(canvas, start, end, color);
        return;
    }

    let (nx, ny) = (-dy / len, dx / len);
    let half = (thickness - 1) as f32 / 2.0;
    for k in 0..thickness {
        let offset = k as f32 - half;
        draw_line_segment_mut(
            canvas,
            (start.0 + nx * offset, start.1 + ny * offset),
            (end.0 + nx * offset, end.1 + ny * offset),
            color,
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dance_models::Keypoint;

    /// Pose with every landmark visible at a distinct in-frame position.
    fn spread_pose(visibility: f32) -> Vec<Keypoint> {
        (0..LANDMARK_COUNT)
            .map(|i| {
                let x = 0.1 + 0.8 * (i % 6) as f32 / 5.0;
                let y = 0.1 + 0.8 * (i / 6) as f32 / 5.0;
                Keypoint::new(x, y, 0.0, visibility)
            })
            .collect()
    }

    fn gray_frame() -> RgbImage {
        RgbImage::from_pixel(64, 48, Rgb([40, 40, 40]))
    }

    #[test]
    fn test_connections_are_valid_indices() {
        for (a, b) in POSE_CONNECTIONS {
            assert!(a < LANDMARK_COUNT && b < LANDMARK_COUNT);
            assert_ne!(a, b);
        }
    }

    #[test]
    fn test_fully_visible_pose_draws_everything() {
        let pose = Pose::new(spread_pose(0.9)).unwrap();
        let out = FrameAnnotator::default().annotate(&gray_frame(), Some(&pose));
        assert_eq!(out.connections_drawn, 35);
        assert_eq!(out.landmarks_drawn, 33);
        assert_eq!(out.skeleton.dimensions(), (64, 48));
        assert!(out.skeleton.pixels().any(|p| p.0 != [0, 0, 0]));
        assert_ne!(out.overlay, gray_frame());
    }

    #[test]
    fn test_no_pose_leaves_frames_untouched() {
        let frame = gray_frame();
        let out = FrameAnnotator::default().annotate(&frame, None);
        assert_eq!(out.overlay, frame);
        assert!(out.skeleton.pixels().all(|p| p.0 == [0, 0, 0]));
        assert_eq!(out.connections_drawn, 0);
        assert_eq!(out.landmarks_drawn, 0);
    }

    #[test]
    fn test_low_visibility_landmark_is_skipped() {
        let mut keypoints = spread_pose(0.9);
        keypoints[PoseLandmark::Nose.index()].visibility = 0.1;
        let pose = Pose::new(keypoints).unwrap();

        let out = FrameAnnotator::default().annotate(&gray_frame(), Some(&pose));
        // nose joins (0,1) and (0,4)
        assert_eq!(out.connections_drawn, 33);
        assert_eq!(out.landmarks_drawn, 32);
    }

    #[test]
    fn test_out_of_frame_landmark_is_skipped() {
        let mut keypoints = spread_pose(0.9);
        keypoints[PoseLandmark::LeftWrist.index()].x = 1.4;
        let pose = Pose::new(keypoints).unwrap();

        let out = FrameAnnotator::default().annotate(&gray_frame(), Some(&pose));
        // left wrist joins (13,15), (15,17), (15,19) and (15,21)
        assert_eq!(out.connections_drawn, 31);
        assert_eq!(out.landmarks_drawn, 32);
    }

    #[test]
    fn test_threshold_is_configurable() {
        let pose = Pose::new(spread_pose(0.6)).unwrap();
        let strict = FrameAnnotator::with_visibility_threshold(0.7).annotate(&gray_frame(), Some(&pose));
        assert_eq!(strict.connections_drawn, 0);
        assert!(strict.skeleton.pixels().all(|p| p.0 == [0, 0, 0]));
    }

    #[test]
    fn test_landmark_colour_by_side() {
        let mut keypoints = vec![Keypoint::new(0.0, 0.0, 0.0, 0.0); LANDMARK_COUNT];
        keypoints[PoseLandmark::LeftHip.index()] = Keypoint::new(0.25, 0.5, 0.0, 1.0);
        keypoints[PoseLandmark::RightHip.index()] = Keypoint::new(0.75, 0.5, 0.0, 1.0);
        let pose = Pose::new(keypoints).unwrap();

        let out = FrameAnnotator::default().annotate(&gray_frame(), Some(&pose));
        assert_eq!(out.landmarks_drawn, 2);
        assert_eq!(out.connections_drawn, 1);
        assert_eq!(*out.skeleton.get_pixel(16, 24), LEFT_COLOR);
        assert_eq!(*out.skeleton.get_pixel(48, 24), RIGHT_COLOR);
    }
}
