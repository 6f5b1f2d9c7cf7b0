//! System-wide default constants.
//!
//! Centralises the numbers the config structs fall back to when a key is
//! absent. Grouped by subsystem for easy discovery.

// ============================================================================
// HTTP Server
// ============================================================================

/// Default bind address for the HTTP server.
pub const SERVER_ADDR: &str = "0.0.0.0:5001";

/// Directory where uploaded videos are staged for the duration of a request.
pub const UPLOAD_DIR: &str = "uploads";

/// Largest accepted request body (bytes). 512 MiB covers a few minutes of 1080p phone video.
pub const MAX_UPLOAD_BYTES: usize = 512 * 1024 * 1024;

/// Overall deadline for one analysis request (seconds).
///
/// Must cover the remote processing timeout plus one reasoning call.
pub const REQUEST_TIMEOUT_SECS: u64 = 900;

// ============================================================================
// Landmark Sampling
// ============================================================================

/// Process every Nth decoded frame. 15 = two samples per second at 30 fps.
pub const SAMPLE_STRIDE: u64 = 15;

/// Minimum person-presence score for a sampled frame to count as a detection.
pub const MIN_PERSON_CONFIDENCE: f32 = 0.5;

/// BlazePose full-body landmark model (ONNX export).
pub const POSE_MODEL_PATH: &str = "models/pose_landmark_full.onnx";

pub const FFMPEG_PATH: &str = "ffmpeg";
pub const FFPROBE_PATH: &str = "ffprobe";

/// ONNX Runtime intra-op threads for pose inference.
pub const POSE_INTRA_THREADS: usize = 2;

// ============================================================================
// Evidence
// ============================================================================

/// Upper bound on frames serialized into the text prompt.
///
/// 120 frames x 33 landmarks keeps the payload well inside a single prompt.
pub const EVIDENCE_MAX_FRAMES: usize = 120;

/// Decimal places kept for landmark coordinates in the evidence text.
pub const EVIDENCE_PRECISION: u32 = 4;

// ============================================================================
// Remote File Job
// ============================================================================

/// Interval between state polls while the remote service processes a video (seconds).
pub const REMOTE_POLL_INTERVAL_SECS: u64 = 10;

/// Give up waiting for remote processing after this long (seconds).
pub const REMOTE_PROCESSING_TIMEOUT_SECS: u64 = 600;

// ============================================================================
// Reasoning Service
// ============================================================================

pub const REASONING_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
pub const REASONING_UPLOAD_BASE_URL: &str = "https://generativelanguage.googleapis.com/upload/v1beta";
pub const REASONING_MODEL: &str = "gemini-2.5-pro";

/// Environment variable holding the reasoning-service API key.
pub const REASONING_API_KEY_ENV: &str = "GOOGLE_API_KEY";

/// HTTP timeout for a single reasoning or Files API call (seconds).
///
/// Video inference on long clips regularly takes over a minute.
pub const REASONING_REQUEST_TIMEOUT_SECS: u64 = 300;
