//! Pose estimation and landmark sampling
//!
//! - [`PoseEstimator`]: single-person landmark model, one RGB frame at a time
//! - [`PoseModel`]: factory that loads a fresh estimator per analysis
//! - [`LandmarkSampler`]: strided frame sampling over a decoded video
//! - `blazepose` (feature `onnx`): BlazePose full-body model via ONNX Runtime

mod sampler;
#[cfg(feature = "onnx")]
mod blazepose;

pub use sampler::{LandmarkSampler, SampleError, SamplerSettings};
#[cfg(feature = "onnx")]
pub use blazepose::BlazePoseModel;

use image::RgbImage;

use crate::types::Landmark;

/// Result of running the landmark model on one frame.
#[derive(Debug, Clone, PartialEq)]
pub struct PoseDetection {
    /// Model's confidence that a person is in frame, 0..1
    pub presence: f32,
    /// 33 keypoints in BlazePose order, normalized to the frame
    pub landmarks: Vec<Landmark>,
}

#[derive(Debug, thiserror::Error)]
pub enum PoseError {
    #[error("Pose model not available: {0}")]
    Unavailable(String),

    #[error("Failed to load pose model: {0}")]
    ModelLoad(String),

    #[error("Pose inference failed: {0}")]
    Inference(String),

    #[error("Pose model output shape mismatch: expected {expected}, got {got}")]
    ShapeMismatch { expected: String, got: String },
}

/// Single-person pose model bound to one loaded session.
pub trait PoseEstimator: Send {
    /// Run the model on one RGB frame.
    ///
    /// `Ok(None)` means the model saw nobody; a low-presence detection is
    /// still returned so the caller can apply its own threshold.
    fn estimate(&mut self, frame: &RgbImage) -> Result<Option<PoseDetection>, PoseError>;
}

/// Loads estimators. Shared across requests; each analysis loads its own
/// session and drops it when sampling ends.
pub trait PoseModel: Send + Sync {
    fn load(&self) -> Result<Box<dyn PoseEstimator>, PoseError>;
}
