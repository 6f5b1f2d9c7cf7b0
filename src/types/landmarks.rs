//! Pose landmark types: Landmark, FrameLandmarks, PoseSequence

use serde::{Deserialize, Serialize};

/// Number of keypoints in the BlazePose full-body topology.
pub const BLAZEPOSE_KEYPOINT_COUNT: usize = 33;

/// A single anatomical keypoint located by the pose model.
///
/// `x` and `y` are normalized to the source frame (0..1, origin top-left),
/// `z` is depth relative to the hips in roughly the same scale as `x`.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Landmark {
    pub x: f32,
    pub y: f32,
    pub z: f32,
    /// Likelihood that the keypoint is visible (not occluded), 0..1.
    pub visibility: f32,
}

impl Landmark {
    pub fn new(x: f32, y: f32, z: f32, visibility: f32) -> Self {
        Self { x, y, z, visibility }
    }
}

/// BlazePose keypoint indices.
///
/// Landmark vectors are positional: index `i` always refers to the same body part.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeypointIndex {
    Nose = 0,
    LeftEyeInner = 1,
    LeftEye = 2,
    LeftEyeOuter = 3,
    RightEyeInner = 4,
    RightEye = 5,
    RightEyeOuter = 6,
    LeftEar = 7,
    RightEar = 8,
    MouthLeft = 9,
    MouthRight = 10,
    LeftShoulder = 11,
    RightShoulder = 12,
    LeftElbow = 13,
    RightElbow = 14,
    LeftWrist = 15,
    RightWrist = 16,
    LeftPinky = 17,
    RightPinky = 18,
    LeftIndex = 19,
    RightIndex = 20,
    LeftThumb = 21,
    RightThumb = 22,
    LeftHip = 23,
    RightHip = 24,
    LeftKnee = 25,
    RightKnee = 26,
    LeftAnkle = 27,
    RightAnkle = 28,
    LeftHeel = 29,
    RightHeel = 30,
    LeftFootIndex = 31,
    RightFootIndex = 32,
}

impl From<KeypointIndex> for usize {
    fn from(index: KeypointIndex) -> usize {
        index as usize
    }
}

/// Landmarks of the single detected person in one sampled frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrameLandmarks {
    /// Zero-based index of the frame in the source video (presentation order)
    pub frame_index: u64,
    pub landmarks: Vec<Landmark>,
}

impl FrameLandmarks {
    pub fn new(frame_index: u64, landmarks: Vec<Landmark>) -> Self {
        Self {
            frame_index,
            landmarks,
        }
    }

    /// Get a landmark by its anatomical index, if the model produced it.
    pub fn keypoint(&self, index: KeypointIndex) -> Option<&Landmark> {
        self.landmarks.get(usize::from(index))
    }
}

/// Returned when a frame would break the strictly-increasing index invariant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("frame {attempted} does not follow frame {last}; pose sequences are strictly increasing")]
pub struct OutOfOrderFrame {
    pub last: u64,
    pub attempted: u64,
}

/// Ordered landmark frames for one video, strictly increasing by `frame_index`.
///
/// An empty sequence is a normal value: it means no person was detected in
/// any sampled frame.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PoseSequence {
    frames: Vec<FrameLandmarks>,
}

impl PoseSequence {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a frame. Rejects duplicate or decreasing frame indices.
    pub fn push(&mut self, frame: FrameLandmarks) -> Result<(), OutOfOrderFrame> {
        if let Some(last) = self.frames.last() {
            if frame.frame_index <= last.frame_index {
                return Err(OutOfOrderFrame {
                    last: last.frame_index,
                    attempted: frame.frame_index,
                });
            }
        }
        self.frames.push(frame);
        Ok(())
    }

    pub fn frames(&self) -> &[FrameLandmarks] {
        &self.frames
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn frame_indices(&self) -> impl Iterator<Item = u64> + '_ {
        self.frames.iter().map(|f| f.frame_index)
    }
}

impl TryFrom<Vec<FrameLandmarks>> for PoseSequence {
    type Error = OutOfOrderFrame;

    fn try_from(frames: Vec<FrameLandmarks>) -> Result<Self, Self::Error> {
        let mut seq = Self::new();
        for frame in frames {
            seq.push(frame)?;
        }
        Ok(seq)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(index: u64) -> FrameLandmarks {
        FrameLandmarks::new(index, vec![Landmark::new(0.5, 0.5, 0.0, 1.0); 3])
    }

    #[test]
    fn test_push_accepts_increasing_indices() {
        let mut seq = PoseSequence::new();
        seq.push(frame(0)).unwrap();
        seq.push(frame(15)).unwrap();
        seq.push(frame(45)).unwrap();
        assert_eq!(seq.frame_indices().collect::<Vec<_>>(), vec![0, 15, 45]);
    }

    #[test]
    fn test_push_rejects_duplicate_index() {
        let mut seq = PoseSequence::new();
        seq.push(frame(15)).unwrap();
        let err = seq.push(frame(15)).unwrap_err();
        assert_eq!(err, OutOfOrderFrame { last: 15, attempted: 15 });
        assert_eq!(seq.len(), 1);
    }

    #[test]
    fn test_try_from_rejects_decreasing() {
        let result = PoseSequence::try_from(vec![frame(30), frame(15)]);
        assert!(result.is_err());
    }

    #[test]
    fn test_keypoint_lookup_is_positional() {
        let mut landmarks = vec![Landmark::new(0.0, 0.0, 0.0, 0.0); BLAZEPOSE_KEYPOINT_COUNT];
        landmarks[16] = Landmark::new(0.7, 0.4, -0.1, 0.9);
        let f = FrameLandmarks::new(0, landmarks);
        let wrist = f.keypoint(KeypointIndex::RightWrist).unwrap();
        assert_eq!(wrist.x, 0.7);
        assert_eq!(wrist.visibility, 0.9);
    }
}
