//! Strided landmark sampling over a decoded video.
//!
//! The sampler owns both the frame source and the loaded pose session.
//! Dropping it, whether after exhaustion, an error or early abandonment,
//! releases the decoder process and the model together.

use std::path::Path;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::{PoseError, PoseEstimator, PoseModel};
use crate::config::SamplingConfig;
use crate::types::{FrameLandmarks, OutOfOrderFrame, PoseSequence, BLAZEPOSE_KEYPOINT_COUNT};
use crate::video::{DecodeError, FrameSource, VideoDecoder};

#[derive(Debug, thiserror::Error)]
pub enum SampleError {
    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error(transparent)]
    Pose(#[from] PoseError),

    #[error(transparent)]
    OutOfOrder(#[from] OutOfOrderFrame),

    #[error("Landmark sampling cancelled")]
    Cancelled,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SamplerSettings {
    /// Only frames whose index is a multiple of this are run through the model
    pub stride: u64,
    /// Presence score at or above which a frame's landmarks are emitted
    pub min_confidence: f32,
}

impl SamplerSettings {
    pub fn from_config(config: &SamplingConfig) -> Self {
        Self {
            stride: config.stride,
            min_confidence: config.min_confidence,
        }
    }
}

/// Lazy, finite sequence of per-frame landmarks for one video.
///
/// Yields `Ok(FrameLandmarks)` only for sampled frames with a detected person.
/// Frames without a person are skipped silently. The first `Err` ends the
/// sequence.
pub struct LandmarkSampler {
    source: Box<dyn FrameSource>,
    estimator: Box<dyn PoseEstimator>,
    settings: SamplerSettings,
    cancel: CancellationToken,
    position: u64,
    sampled: u64,
    detected: u64,
    done: bool,
}

impl LandmarkSampler {
    /// Open `path` with `decoder` and load a session from `model`.
    pub fn open(
        decoder: &dyn VideoDecoder,
        model: &dyn PoseModel,
        path: &Path,
        settings: SamplerSettings,
        cancel: CancellationToken,
    ) -> Result<Self, SampleError> {
        let source = decoder.open(path)?;
        let estimator = model.load()?;
        Ok(Self::new(source, estimator, settings, cancel))
    }

    /// A stride of 0 is treated as 1.
    pub fn new(
        source: Box<dyn FrameSource>,
        estimator: Box<dyn PoseEstimator>,
        settings: SamplerSettings,
        cancel: CancellationToken,
    ) -> Self {
        let settings = SamplerSettings {
            stride: settings.stride.max(1),
            ..settings
        };
        Self {
            source,
            estimator,
            settings,
            cancel,
            position: 0,
            sampled: 0,
            detected: 0,
            done: false,
        }
    }

    /// Drain the sampler into a `PoseSequence`. An empty sequence is a valid result.
    pub fn collect_sequence(mut self) -> Result<PoseSequence, SampleError> {
        let mut sequence = PoseSequence::new();
        for frame in self.by_ref() {
            sequence.push(frame?)?;
        }
        info!(
            frames = self.position,
            sampled = self.sampled,
            detected = self.detected,
            stride = self.settings.stride,
            "Landmark sampling complete"
        );
        Ok(sequence)
    }

    /// Number of frames run through the model so far.
    pub fn sampled(&self) -> u64 {
        self.sampled
    }

    fn fail(&mut self, err: impl Into<SampleError>) -> Option<Result<FrameLandmarks, SampleError>> {
        self.done = true;
        Some(Err(err.into()))
    }
}

impl Iterator for LandmarkSampler {
    type Item = Result<FrameLandmarks, SampleError>;

    fn next(&mut self) -> Option<Self::Item> {
        while !self.done {
            if self.cancel.is_cancelled() {
                return self.fail(SampleError::Cancelled);
            }

            let index = self.position;
            if index % self.settings.stride != 0 {
                match self.source.skip_frame() {
                    Ok(true) => {
                        self.position += 1;
                        continue;
                    }
                    Ok(false) => break,
                    Err(e) => return self.fail(e),
                }
            }

            let frame = match self.source.next_frame() {
                Ok(Some(frame)) => frame,
                Ok(None) => break,
                Err(e) => return self.fail(e),
            };
            self.position += 1;
            self.sampled += 1;

            let detection = match self.estimator.estimate(&frame.image) {
                Ok(d) => d,
                Err(e) => return self.fail(e),
            };

            match detection {
                Some(d) if d.presence >= self.settings.min_confidence => {
                    if d.landmarks.len() != BLAZEPOSE_KEYPOINT_COUNT {
                        return self.fail(PoseError::ShapeMismatch {
                            expected: format!("{BLAZEPOSE_KEYPOINT_COUNT} landmarks"),
                            got: format!("{} landmarks", d.landmarks.len()),
                        });
                    }
                    self.detected += 1;
                    return Some(Ok(FrameLandmarks::new(index, d.landmarks)));
                }
                Some(d) => {
                    debug!(frame = index, presence = d.presence, "Person below presence threshold");
                }
                None => {
                    debug!(frame = index, "No person in frame");
                }
            }
        }

        self.done = true;
        None
    }
}
