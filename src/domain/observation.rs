//! Per-frame observation records handed to the monitoring agents.
//!
//! An [`Observation`] is the immutable perception output for one tracked
//! person on one frame: bounding box, optional pose keypoints, optional face
//! region, optional externally-classified emotion, and an optional frame
//! brightness sample. Coordinates are normalized to `[0, 1]` with the origin
//! at the top-left corner, so `y` grows downward.

use serde::{Deserialize, Serialize};

/// Stable perception-assigned identifier for one physical person.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TrackId(pub u32);

impl std::fmt::Display for TrackId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Axis-aligned bounding box in normalized image coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    /// Left edge
    pub x1: f64,
    /// Top edge
    pub y1: f64,
    /// Right edge
    pub x2: f64,
    /// Bottom edge
    pub y2: f64,
    /// Detection confidence
    pub confidence: f64,
}

impl BoundingBox {
    /// Create a new bounding box.
    pub fn new(x1: f64, y1: f64, x2: f64, y2: f64, confidence: f64) -> Self {
        Self { x1, y1, x2, y2, confidence }
    }

    /// True if the box has positive extent on both axes.
    pub fn is_valid(&self) -> bool {
        self.x2 > self.x1 && self.y2 > self.y1
    }

    /// Center point of the box.
    pub fn center(&self) -> (f64, f64) {
        ((self.x1 + self.x2) / 2.0, (self.y1 + self.y2) / 2.0)
    }

    /// Box area.
    pub fn area(&self) -> f64 {
        (self.x2 - self.x1) * (self.y2 - self.y1)
    }

    /// Intersection-over-union with another box. Returns 0.0 when either
    /// box is degenerate or there is no overlap.
    pub fn iou(&self, other: &BoundingBox) -> f64 {
        if !self.is_valid() || !other.is_valid() {
            return 0.0;
        }

        let ix1 = self.x1.max(other.x1);
        let iy1 = self.y1.max(other.y1);
        let ix2 = self.x2.min(other.x2);
        let iy2 = self.y2.min(other.y2);

        if ix2 <= ix1 || iy2 <= iy1 {
            return 0.0;
        }

        let intersection = (ix2 - ix1) * (iy2 - iy1);
        let union = self.area() + other.area() - intersection;

        if union <= 0.0 {
            0.0
        } else {
            intersection / union
        }
    }

    /// Expand the box by a fraction of its own size on every side.
    pub fn expanded(&self, fraction: f64) -> BoundingBox {
        let w = (self.x2 - self.x1) * fraction;
        let h = (self.y2 - self.y1) * fraction;
        BoundingBox {
            x1: self.x1 - w,
            y1: self.y1 - h,
            x2: self.x2 + w,
            y2: self.y2 + h,
            confidence: self.confidence,
        }
    }
}

/// A single pose keypoint in normalized coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Keypoint {
    /// Horizontal position
    pub x: f64,
    /// Vertical position (grows downward)
    pub y: f64,
    /// Depth relative to the hips (perception-dependent units)
    pub z: f64,
    /// Per-point detection confidence
    pub confidence: f64,
    /// Visibility estimate (occlusion-aware)
    pub visibility: f64,
}

impl Keypoint {
    /// Create a fully-visible keypoint at a 2D position.
    pub fn at(x: f64, y: f64) -> Self {
        Self { x, y, z: 0.0, confidence: 1.0, visibility: 1.0 }
    }
}

/// MediaPipe-layout landmark indices used by the agents.
pub mod keypoints {
    /// Nose tip
    pub const NOSE: usize = 0;
    /// Left shoulder
    pub const LEFT_SHOULDER: usize = 11;
    /// Right shoulder
    pub const RIGHT_SHOULDER: usize = 12;
    /// Left elbow
    pub const LEFT_ELBOW: usize = 13;
    /// Right elbow
    pub const RIGHT_ELBOW: usize = 14;
    /// Left wrist
    pub const LEFT_WRIST: usize = 15;
    /// Right wrist
    pub const RIGHT_WRIST: usize = 16;
    /// Left hip
    pub const LEFT_HIP: usize = 23;
    /// Right hip
    pub const RIGHT_HIP: usize = 24;
    /// Left knee
    pub const LEFT_KNEE: usize = 25;
    /// Right knee
    pub const RIGHT_KNEE: usize = 26;
    /// Left ankle
    pub const LEFT_ANKLE: usize = 27;
    /// Right ankle
    pub const RIGHT_ANKLE: usize = 28;

    /// Number of landmarks in the MediaPipe full-body layout.
    pub const LANDMARK_COUNT: usize = 33;
}

/// Minimum visibility for a keypoint to contribute to derived metrics.
const MIN_VISIBILITY: f64 = 0.5;

/// Full-body pose for one person on one frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PoseData {
    /// Ordered landmark set (MediaPipe layout, 33 points)
    pub keypoints: Vec<Keypoint>,
}

impl PoseData {
    /// Create a pose from an ordered landmark set.
    pub fn new(keypoints: Vec<Keypoint>) -> Self {
        Self { keypoints }
    }

    fn point(&self, index: usize) -> Option<&Keypoint> {
        self.keypoints.get(index)
    }

    /// Midpoint of two landmarks, or `None` if either is missing.
    pub fn midpoint(&self, a: usize, b: usize) -> Option<(f64, f64)> {
        let pa = self.point(a)?;
        let pb = self.point(b)?;
        Some(((pa.x + pb.x) / 2.0, (pa.y + pb.y) / 2.0))
    }

    /// Angle in degrees between the shoulder-hip axis and vertical.
    /// 0° is fully upright, 90° is horizontal. Image y grows downward, so
    /// an upright torso has shoulders at smaller y than hips.
    pub fn torso_angle_deg(&self) -> Option<f64> {
        let (sx, sy) = self.midpoint(keypoints::LEFT_SHOULDER, keypoints::RIGHT_SHOULDER)?;
        let (hx, hy) = self.midpoint(keypoints::LEFT_HIP, keypoints::RIGHT_HIP)?;
        Some((sx - hx).atan2(hy - sy).abs().to_degrees())
    }

    /// Normalized hip height: 1.0 at the top of the frame, 0.0 at the bottom.
    pub fn hip_height(&self) -> Option<f64> {
        let (_, hy) = self.midpoint(keypoints::LEFT_HIP, keypoints::RIGHT_HIP)?;
        Some(1.0 - hy)
    }

    /// Mean position of a set of landmarks, skipping low-visibility points.
    /// Returns `None` when no landmark in the set is reliably visible.
    pub fn mean_position(&self, indices: &[usize]) -> Option<(f64, f64)> {
        let mut sum = (0.0, 0.0);
        let mut count = 0usize;

        for &idx in indices {
            if let Some(kp) = self.point(idx) {
                if kp.visibility > MIN_VISIBILITY {
                    sum.0 += kp.x;
                    sum.1 += kp.y;
                    count += 1;
                }
            }
        }

        if count == 0 {
            None
        } else {
            Some((sum.0 / count as f64, sum.1 / count as f64))
        }
    }

    /// Mean displacement of the given landmarks between two poses, skipping
    /// points not reliably visible in both.
    pub fn displacement(&self, other: &PoseData, indices: &[usize]) -> Option<f64> {
        let mut total = 0.0;
        let mut count = 0usize;

        for &idx in indices {
            let (Some(a), Some(b)) = (self.point(idx), other.point(idx)) else {
                continue;
            };
            if a.visibility > MIN_VISIBILITY && b.visibility > MIN_VISIBILITY {
                total += ((a.x - b.x).powi(2) + (a.y - b.y).powi(2)).sqrt();
                count += 1;
            }
        }

        if count == 0 {
            None
        } else {
            Some(total / count as f64)
        }
    }
}

/// Face region with the per-frame color statistic used by rPPG.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FaceRegion {
    /// Face bounding box
    pub bbox: BoundingBox,
    /// Mean RGB of the face crop, supplied by perception
    pub mean_rgb: [f64; 3],
    /// Face detection confidence
    pub confidence: f64,
}

/// Discrete emotion labels produced by the external classifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmotionLabel {
    /// Positive affect
    Happy,
    /// Low mood
    Sad,
    /// Anger
    Angry,
    /// Fear
    Fear,
    /// Disgust
    Disgust,
    /// Surprise
    Surprise,
    /// No marked expression
    Neutral,
}

impl EmotionLabel {
    /// Valence/arousal coordinates for the label: valence in [-1, 1]
    /// (negative to positive affect), arousal in [-1, 1] (calm to excited).
    pub fn valence_arousal(&self) -> (f64, f64) {
        match self {
            EmotionLabel::Happy => (0.8, 0.6),
            EmotionLabel::Sad => (-0.6, -0.4),
            EmotionLabel::Angry => (-0.7, 0.7),
            EmotionLabel::Fear => (-0.8, 0.8),
            EmotionLabel::Disgust => (-0.6, 0.3),
            EmotionLabel::Surprise => (0.3, 0.8),
            EmotionLabel::Neutral => (0.0, 0.0),
        }
    }
}

impl std::fmt::Display for EmotionLabel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            EmotionLabel::Happy => "happy",
            EmotionLabel::Sad => "sad",
            EmotionLabel::Angry => "angry",
            EmotionLabel::Fear => "fear",
            EmotionLabel::Disgust => "disgust",
            EmotionLabel::Surprise => "surprise",
            EmotionLabel::Neutral => "neutral",
        };
        f.write_str(s)
    }
}

/// Externally-classified emotion for one frame.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EmotionObservation {
    /// Classified label
    pub label: EmotionLabel,
    /// Classifier probability for the label
    pub probability: f64,
}

/// One perception output record: one tracked person on one frame.
///
/// Immutable once handed to the agents. Optional modalities (pose, face,
/// emotion, brightness) are simply absent on frames where perception could
/// not produce them; agents treat absence as "no update".
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    /// Monotonically non-decreasing frame sequence number
    pub frame_id: u64,
    /// Capture timestamp in seconds (fractional)
    pub timestamp: f64,
    /// Track identity of the observed person
    pub track_id: TrackId,
    /// Person bounding box
    pub bbox: BoundingBox,
    /// Person detection confidence
    pub confidence: f64,
    /// Body pose, if estimated this frame
    pub pose: Option<PoseData>,
    /// Face region, if visible this frame
    pub face: Option<FaceRegion>,
    /// Externally-classified emotion, if available this frame
    pub emotion: Option<EmotionObservation>,
    /// Mean frame luma in [0, 255], sampled by the capture layer
    pub frame_brightness: Option<f64>,
}

impl Observation {
    /// Create an observation with only the mandatory fields.
    pub fn new(
        frame_id: u64,
        timestamp: f64,
        track_id: TrackId,
        bbox: BoundingBox,
        confidence: f64,
    ) -> Self {
        Self {
            frame_id,
            timestamp,
            track_id,
            bbox,
            confidence,
            pose: None,
            face: None,
            emotion: None,
            frame_brightness: None,
        }
    }

    /// Attach pose data.
    pub fn with_pose(mut self, pose: PoseData) -> Self {
        self.pose = Some(pose);
        self
    }

    /// Attach a face region.
    pub fn with_face(mut self, face: FaceRegion) -> Self {
        self.face = Some(face);
        self
    }

    /// Attach an emotion classification.
    pub fn with_emotion(mut self, emotion: EmotionObservation) -> Self {
        self.emotion = Some(emotion);
        self
    }

    /// Attach a frame brightness sample.
    pub fn with_brightness(mut self, brightness: f64) -> Self {
        self.frame_brightness = Some(brightness);
        self
    }

    /// Person bounding box, or `None` when the box is contradictory
    /// (zero or negative extent). Malformed geometry degrades to a missing
    /// modality rather than an error.
    pub fn valid_bbox(&self) -> Option<&BoundingBox> {
        self.bbox.is_valid().then_some(&self.bbox)
    }

    /// Face region with a well-formed bounding box, if present.
    pub fn valid_face(&self) -> Option<&FaceRegion> {
        self.face.as_ref().filter(|f| f.bbox.is_valid())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bbox_iou() {
        let a = BoundingBox::new(0.0, 0.0, 0.5, 0.5, 1.0);
        let b = BoundingBox::new(0.25, 0.25, 0.75, 0.75, 1.0);
        let c = BoundingBox::new(0.6, 0.6, 0.9, 0.9, 1.0);

        assert!((a.iou(&a) - 1.0).abs() < 1e-9);
        assert!(a.iou(&b) > 0.0 && a.iou(&b) < 1.0);
        assert_eq!(a.iou(&c), 0.0);
    }

    #[test]
    fn test_degenerate_bbox_is_missing() {
        let obs = Observation::new(
            1,
            0.0,
            TrackId(1),
            BoundingBox::new(0.5, 0.5, 0.5, 0.8, 1.0),
            0.9,
        );
        assert!(obs.valid_bbox().is_none());
    }

    fn pose_with(shoulder_y: f64, hip_y: f64, shoulder_x: f64, hip_x: f64) -> PoseData {
        let mut kps = vec![Keypoint::at(0.5, 0.5); keypoints::LANDMARK_COUNT];
        kps[keypoints::LEFT_SHOULDER] = Keypoint::at(shoulder_x, shoulder_y);
        kps[keypoints::RIGHT_SHOULDER] = Keypoint::at(shoulder_x, shoulder_y);
        kps[keypoints::LEFT_HIP] = Keypoint::at(hip_x, hip_y);
        kps[keypoints::RIGHT_HIP] = Keypoint::at(hip_x, hip_y);
        PoseData::new(kps)
    }

    #[test]
    fn test_upright_torso_angle() {
        // Shoulders directly above hips
        let pose = pose_with(0.3, 0.6, 0.5, 0.5);
        let angle = pose.torso_angle_deg().unwrap();
        assert!(angle < 1.0, "angle = {angle}");
    }

    #[test]
    fn test_horizontal_torso_angle() {
        let pose = pose_with(0.5, 0.5, 0.2, 0.6);
        let angle = pose.torso_angle_deg().unwrap();
        assert!((angle - 90.0).abs() < 1.0, "angle = {angle}");
    }

    #[test]
    fn test_hip_height() {
        let pose = pose_with(0.3, 0.8, 0.5, 0.5);
        let h = pose.hip_height().unwrap();
        assert!((h - 0.2).abs() < 1e-9);
    }

    #[test]
    fn test_displacement_skips_invisible() {
        let mut a = pose_with(0.3, 0.6, 0.5, 0.5);
        let b = pose_with(0.3, 0.6, 0.5, 0.5);
        a.keypoints[keypoints::NOSE].visibility = 0.1;

        let d = a
            .displacement(&b, &[keypoints::NOSE, keypoints::LEFT_HIP])
            .unwrap();
        assert!(d.abs() < 1e-9);
    }
}
