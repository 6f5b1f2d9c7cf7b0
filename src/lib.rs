//! ntrp-coach: tennis NTRP assessment from video
//!
//! Turns an uploaded video of a tennis player into an NTRP rating with
//! coaching advice, by way of a remote multimodal reasoning service.
//!
//! ## Architecture
//!
//! - **Video / Pose**: ffmpeg decoding, strided BlazePose landmark sampling
//! - **Evidence**: bounded, deterministic JSON of the sampled landmarks
//! - **Remote**: upload + poll state machine for the direct video path
//! - **Analysis**: one orchestrator for both strategies, owns all cleanup
//! - **API**: Axum `POST /analyze` and `GET /health`

pub mod analysis;
pub mod api;
pub mod config;
pub mod evidence;
pub mod llm;
pub mod pose;
pub mod remote;
pub mod types;
pub mod video;

pub use analysis::{AnalysisError, AnalysisOrchestrator, StagedVideo, UploadStore};
pub use api::{create_app, AppState};
pub use config::AppConfig;
pub use evidence::{EmptyEvidence, EvidenceBuilder};
pub use llm::{GeminiClient, ReasoningError, ReasoningService};
pub use pose::{LandmarkSampler, PoseDetection, PoseEstimator, PoseModel, SamplerSettings};
pub use remote::{RemoteFileBackend, RemoteFileError, RemoteFileJob};
pub use types::{
    AnalysisRequest, AnalysisResult, Evidence, FrameLandmarks, Landmark, PoseSequence,
    ReadyFile, RemoteFileReference, RemoteFileState, Strategy,
};
pub use video::{FfmpegDecoder, VideoDecoder};
