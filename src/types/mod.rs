//! Shared data structures for the video-to-evidence pipeline
//!
//! - Pose landmarks: Landmark, FrameLandmarks, PoseSequence
//! - Remote file job: RemoteFileState, RemoteFileReference, ReadyFile
//! - Reasoning call: Strategy, AnalysisRequest, AnalysisResult
//!
//! Everything here is request-scoped.

mod landmarks;
mod remote;
mod analysis;

pub use landmarks::*;
pub use remote::*;
pub use analysis::*;
