//! Motion evidence for the text reasoning path.
//!
//! Turns a `PoseSequence` into a compact JSON array:
//!
//! ```text
//! [{"frame":0,"landmarks":[{"x":0.5123,"y":0.4021,"z":-0.1,"visibility":0.9987}, ...]}, ...]
//! ```
//!
//! Output size is bounded by rounding every coordinate and by keeping at most
//! `max_frames` frames, picked evenly across the sequence.

use serde::Serialize;

use crate::config::EvidenceConfig;
use crate::types::{FrameLandmarks, PoseSequence};

/// The sequence had no frames; there is nothing to reason about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("No pose landmarks to build evidence from")]
pub struct EmptyEvidence;

#[derive(Serialize)]
struct FrameEntry {
    frame: u64,
    landmarks: Vec<LandmarkEntry>,
}

#[derive(Serialize)]
struct LandmarkEntry {
    x: f64,
    y: f64,
    z: f64,
    visibility: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EvidenceBuilder {
    max_frames: usize,
    precision: u32,
}

impl EvidenceBuilder {
    /// `max_frames` of 0 is treated as 1.
    pub fn new(max_frames: usize, precision: u32) -> Self {
        Self {
            max_frames: max_frames.max(1),
            precision,
        }
    }

    pub fn from_config(config: &EvidenceConfig) -> Self {
        Self::new(config.max_frames, config.precision)
    }

    /// Serialize the sequence. Identical input always yields identical bytes.
    pub fn build(&self, sequence: &PoseSequence) -> Result<String, EmptyEvidence> {
        let frames = sequence.frames();
        if frames.is_empty() {
            return Err(EmptyEvidence);
        }

        let entries: Vec<FrameEntry> = select_evenly(frames.len(), self.max_frames)
            .map(|i| self.entry(&frames[i]))
            .collect();

        // Plain structs of numbers; serialization cannot fail.
        Ok(serde_json::to_string(&entries).unwrap_or_else(|_| "[]".to_string()))
    }

    fn entry(&self, frame: &FrameLandmarks) -> FrameEntry {
        let factor = 10f64.powi(self.precision as i32);
        let round = |v: f32| (f64::from(v) * factor).round() / factor;
        FrameEntry {
            frame: frame.frame_index,
            landmarks: frame
                .landmarks
                .iter()
                .map(|l| LandmarkEntry {
                    x: round(l.x),
                    y: round(l.y),
                    z: round(l.z),
                    visibility: round(l.visibility),
                })
                .collect(),
        }
    }
}

impl Default for EvidenceBuilder {
    fn default() -> Self {
        Self::from_config(&EvidenceConfig::default())
    }
}

/// Indices of `keep` evenly spaced items out of `len`, first and last included.
fn select_evenly(len: usize, keep: usize) -> impl Iterator<Item = usize> {
    let keep = keep.min(len);
    (0..keep).map(move |i| {
        if keep == len {
            i
        } else if keep == 1 {
            0
        } else {
            (i * (len - 1) + (keep - 1) / 2) / (keep - 1)
        }
    })
}
