//! Shared fakes for the integration tests.
//!
//! Every external seam (reasoning service, remote file service, video
//! decoder, pose model) has an in-memory stand-in here so the full request
//! path runs without network, ffmpeg or ONNX Runtime.

#![allow(dead_code)]

use async_trait::async_trait;
use image::{Rgb, RgbImage};
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use ntrp_coach::pose::PoseError;
use ntrp_coach::video::{DecodeError, FrameSource, VideoFrame};
use ntrp_coach::{
    AnalysisOrchestrator, AnalysisRequest, AppConfig, Landmark, PoseDetection, PoseEstimator,
    PoseModel, ReasoningError, ReasoningService, RemoteFileBackend, RemoteFileError,
    RemoteFileReference, RemoteFileState, VideoDecoder,
};

pub const ASSESSMENT: &str =
    r#"{"ntrp_level":"3.5","justification":"Consistent unit turn.","training_advice":"Split step earlier."}"#;

// ============================================================================
// Reasoning service
// ============================================================================

pub struct FakeReasoning {
    reply: Result<String, String>,
    requests: Mutex<Vec<AnalysisRequest>>,
}

impl FakeReasoning {
    pub fn replying(text: &str) -> Arc<Self> {
        Arc::new(Self {
            reply: Ok(text.to_string()),
            requests: Mutex::new(Vec::new()),
        })
    }

    pub fn failing(message: &str) -> Arc<Self> {
        Arc::new(Self {
            reply: Err(message.to_string()),
            requests: Mutex::new(Vec::new()),
        })
    }

    pub fn calls(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub fn requests(&self) -> Vec<AnalysisRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl ReasoningService for FakeReasoning {
    async fn generate(&self, request: &AnalysisRequest) -> Result<String, ReasoningError> {
        self.requests.lock().unwrap().push(request.clone());
        match &self.reply {
            Ok(text) => Ok(text.clone()),
            Err(message) => Err(ReasoningError::Api {
                status: 503,
                message: message.clone(),
            }),
        }
    }

    fn backend_name(&self) -> &'static str {
        "fake"
    }
}

// ============================================================================
// Remote file service
// ============================================================================

/// Reports `states[0]` on upload, then one state per poll; the last repeats.
pub struct ScriptedFiles {
    states: Mutex<VecDeque<RemoteFileState>>,
    pub uploads: AtomicUsize,
    pub polls: AtomicUsize,
    pub deletes: AtomicUsize,
    pub uploaded_bytes: AtomicUsize,
    upload_delay: Option<Duration>,
}

impl ScriptedFiles {
    pub fn new(states: &[RemoteFileState]) -> Arc<Self> {
        Arc::new(Self {
            states: Mutex::new(states.iter().copied().collect()),
            uploads: AtomicUsize::new(0),
            polls: AtomicUsize::new(0),
            deletes: AtomicUsize::new(0),
            uploaded_bytes: AtomicUsize::new(0),
            upload_delay: None,
        })
    }

    /// Like [`ScriptedFiles::new`], but each upload takes `delay` to complete.
    pub fn slow_upload(states: &[RemoteFileState], delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            states: Mutex::new(states.iter().copied().collect()),
            uploads: AtomicUsize::new(0),
            polls: AtomicUsize::new(0),
            deletes: AtomicUsize::new(0),
            uploaded_bytes: AtomicUsize::new(0),
            upload_delay: Some(delay),
        })
    }

    pub fn deletes(&self) -> usize {
        self.deletes.load(Ordering::SeqCst)
    }

    pub fn uploads(&self) -> usize {
        self.uploads.load(Ordering::SeqCst)
    }

    fn next_state(&self) -> RemoteFileState {
        let mut states = self.states.lock().unwrap();
        if states.len() > 1 {
            states.pop_front().unwrap()
        } else {
            states.front().copied().unwrap_or(RemoteFileState::Active)
        }
    }

    fn reference(state: RemoteFileState, mime_type: &str) -> RemoteFileReference {
        RemoteFileReference {
            remote_id: "files/test-video".to_string(),
            uri: "https://files.example.test/v1beta/files/test-video".to_string(),
            mime_type: mime_type.to_string(),
            state,
        }
    }
}

#[async_trait]
impl RemoteFileBackend for ScriptedFiles {
    async fn upload(
        &self,
        bytes: Vec<u8>,
        mime_type: &str,
        _display_name: &str,
    ) -> Result<RemoteFileReference, RemoteFileError> {
        if let Some(delay) = self.upload_delay {
            tokio::time::sleep(delay).await;
        }
        self.uploads.fetch_add(1, Ordering::SeqCst);
        self.uploaded_bytes.fetch_add(bytes.len(), Ordering::SeqCst);
        Ok(Self::reference(self.next_state(), mime_type))
    }

    async fn get(&self, _remote_id: &str) -> Result<RemoteFileReference, RemoteFileError> {
        self.polls.fetch_add(1, Ordering::SeqCst);
        Ok(Self::reference(self.next_state(), "video/mp4"))
    }

    async fn delete(&self, _remote_id: &str) -> Result<(), RemoteFileError> {
        self.deletes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

// ============================================================================
// Video decoder and pose model
// ============================================================================

/// Decodes every file as the same clip: one 8x8 frame per entry, red when a
/// person is "in" that frame.
pub struct FakeDecoder {
    frames: Vec<bool>,
    unreadable: bool,
    pub opened: Mutex<Vec<PathBuf>>,
}

impl FakeDecoder {
    pub fn with_person(frame_count: usize) -> Arc<Self> {
        Self::from_frames(vec![true; frame_count])
    }

    pub fn without_person(frame_count: usize) -> Arc<Self> {
        Self::from_frames(vec![false; frame_count])
    }

    pub fn from_frames(frames: Vec<bool>) -> Arc<Self> {
        Arc::new(Self {
            frames,
            unreadable: false,
            opened: Mutex::new(Vec::new()),
        })
    }

    pub fn unreadable() -> Arc<Self> {
        Arc::new(Self {
            frames: Vec::new(),
            unreadable: true,
            opened: Mutex::new(Vec::new()),
        })
    }
}

impl VideoDecoder for FakeDecoder {
    fn open(&self, path: &Path) -> Result<Box<dyn FrameSource>, DecodeError> {
        self.opened.lock().unwrap().push(path.to_path_buf());
        if self.unreadable {
            return Err(DecodeError::Unreadable {
                path: path.to_path_buf(),
                reason: "moov atom not found".to_string(),
            });
        }
        Ok(Box::new(FakeFrames {
            frames: self.frames.clone(),
            next: 0,
        }))
    }
}

struct FakeFrames {
    frames: Vec<bool>,
    next: usize,
}

impl FrameSource for FakeFrames {
    fn next_frame(&mut self) -> Result<Option<VideoFrame>, DecodeError> {
        let Some(&person) = self.frames.get(self.next) else {
            return Ok(None);
        };
        let index = self.next as u64;
        self.next += 1;
        let red = if person { 255 } else { 0 };
        Ok(Some(VideoFrame {
            index,
            image: RgbImage::from_pixel(8, 8, Rgb([red, 0, 0])),
        }))
    }
}

/// Presence is the red channel of the top-left pixel; landmark `i` sits at
/// `x = i / 33`.
pub struct RedChannelPose;

impl PoseModel for RedChannelPose {
    fn load(&self) -> Result<Box<dyn PoseEstimator>, PoseError> {
        Ok(Box::new(RedChannelEstimator))
    }
}

struct RedChannelEstimator;

impl PoseEstimator for RedChannelEstimator {
    fn estimate(&mut self, frame: &RgbImage) -> Result<Option<PoseDetection>, PoseError> {
        let presence = f32::from(frame.get_pixel(0, 0)[0]) / 255.0;
        if presence == 0.0 {
            return Ok(None);
        }
        let landmarks = (0..33)
            .map(|i| Landmark::new(i as f32 / 33.0, 0.5, -0.1, 0.9))
            .collect();
        Ok(Some(PoseDetection {
            presence,
            landmarks,
        }))
    }
}

// ============================================================================
// Wiring
// ============================================================================

/// Config pointing uploads at `upload_dir`; everything else default.
pub fn test_config(upload_dir: &Path) -> AppConfig {
    let mut config = AppConfig::default();
    config.server.upload_dir = upload_dir.to_path_buf();
    config
}

pub struct Harness {
    pub reasoning: Arc<FakeReasoning>,
    pub files: Arc<ScriptedFiles>,
    pub decoder: Arc<FakeDecoder>,
    pub orchestrator: Arc<AnalysisOrchestrator>,
}

impl Harness {
    pub fn new(
        config: AppConfig,
        reasoning: Arc<FakeReasoning>,
        files: Arc<ScriptedFiles>,
        decoder: Arc<FakeDecoder>,
        with_pose_model: bool,
    ) -> Self {
        let pose: Option<Arc<dyn PoseModel>> = if with_pose_model {
            Some(Arc::new(RedChannelPose))
        } else {
            None
        };
        let orchestrator = Arc::new(AnalysisOrchestrator::new(
            Arc::new(config),
            reasoning.clone(),
            files.clone(),
            decoder.clone(),
            pose,
        ));
        Self {
            reasoning,
            files,
            decoder,
            orchestrator,
        }
    }
}

/// Files left behind in the upload directory.
pub fn leftover_uploads(dir: &Path) -> Vec<PathBuf> {
    match std::fs::read_dir(dir) {
        Ok(entries) => entries.filter_map(|e| e.ok().map(|e| e.path())).collect(),
        Err(_) => Vec::new(),
    }
}
