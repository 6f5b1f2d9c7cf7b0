//! Analysis orchestration
//!
//! One entry point, [`AnalysisOrchestrator::analyze`], parameterized by
//! [`Strategy`]:
//!
//! - **DirectVideo**: upload -> wait for ACTIVE -> one reasoning call with the file
//! - **PoseBased**: sample landmarks -> build evidence -> one reasoning call with text
//!
//! Whatever happens, the staged local video is deleted and any uploaded
//! remote file is released before `analyze` returns.

mod upload;

pub use upload::{sanitize_filename, StagedVideo, UploadStore};

use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::config::AppConfig;
use crate::evidence::{EmptyEvidence, EvidenceBuilder};
use crate::llm::{prompts, ReasoningError, ReasoningService};
use crate::pose::{LandmarkSampler, PoseModel, SampleError, SamplerSettings};
use crate::remote::{RemoteFileBackend, RemoteFileError, RemoteFileJob};
use crate::types::{AnalysisRequest, AnalysisResult, RemoteFileState, Strategy};
use crate::video::VideoDecoder;

// ============================================================================
// Error Taxonomy
// ============================================================================

/// Everything that can end an analysis, tagged with its status class.
#[derive(Debug, thiserror::Error)]
pub enum AnalysisError {
    #[error("{0}")]
    InvalidInput(String),

    #[error("Could not read the video: {0}")]
    Decode(String),

    #[error("Could not detect a person in the video.")]
    NoPersonDetected,

    #[error("Video processing failed with state: {observed_state}")]
    RemoteProcessingFailed { observed_state: RemoteFileState },

    #[error("Video processing did not finish within {}s", waited.as_secs())]
    RemoteProcessingTimeout { waited: Duration },

    #[error("{0}")]
    RemoteFileService(String),

    #[error("{0}")]
    ReasoningService(String),

    #[error("Analysis cancelled before completion")]
    Cancelled,

    #[error("{0}")]
    Internal(String),
}

impl AnalysisError {
    /// Caller-side problems (bad upload, nobody in frame) rather than service faults.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            AnalysisError::InvalidInput(_)
                | AnalysisError::Decode(_)
                | AnalysisError::NoPersonDetected
        )
    }

    /// Short machine-readable tag for logs.
    pub fn kind(&self) -> &'static str {
        match self {
            AnalysisError::InvalidInput(_) => "invalid_input",
            AnalysisError::Decode(_) => "decode_error",
            AnalysisError::NoPersonDetected => "no_person_detected",
            AnalysisError::RemoteProcessingFailed { .. } => "remote_processing_failed",
            AnalysisError::RemoteProcessingTimeout { .. } => "remote_processing_timeout",
            AnalysisError::RemoteFileService(_) => "remote_file_error",
            AnalysisError::ReasoningService(_) => "reasoning_service_error",
            AnalysisError::Cancelled => "cancelled",
            AnalysisError::Internal(_) => "internal",
        }
    }
}

impl From<SampleError> for AnalysisError {
    fn from(e: SampleError) -> Self {
        match e {
            SampleError::Decode(d) => AnalysisError::Decode(d.to_string()),
            SampleError::Cancelled => AnalysisError::Cancelled,
            SampleError::Pose(p) => AnalysisError::Internal(p.to_string()),
            SampleError::OutOfOrder(o) => AnalysisError::Internal(o.to_string()),
        }
    }
}

impl From<RemoteFileError> for AnalysisError {
    fn from(e: RemoteFileError) -> Self {
        match e {
            RemoteFileError::Failed { observed_state } => {
                AnalysisError::RemoteProcessingFailed { observed_state }
            }
            RemoteFileError::Timeout { waited } => AnalysisError::RemoteProcessingTimeout { waited },
            RemoteFileError::Cancelled => AnalysisError::Cancelled,
            RemoteFileError::UnexpectedTransition { .. } => AnalysisError::Internal(e.to_string()),
            RemoteFileError::Upload(_) | RemoteFileError::Poll(_) | RemoteFileError::Delete(_) => {
                AnalysisError::RemoteFileService(e.to_string())
            }
        }
    }
}

impl From<ReasoningError> for AnalysisError {
    fn from(e: ReasoningError) -> Self {
        match e {
            ReasoningError::NotConfigured(_) => AnalysisError::Internal(e.to_string()),
            other => AnalysisError::ReasoningService(other.to_string()),
        }
    }
}

impl From<EmptyEvidence> for AnalysisError {
    fn from(_: EmptyEvidence) -> Self {
        AnalysisError::NoPersonDetected
    }
}

// ============================================================================
// Orchestrator
// ============================================================================

/// Drives one analysis end to end. Shared across requests; holds no per-request state.
pub struct AnalysisOrchestrator {
    config: Arc<AppConfig>,
    reasoning: Arc<dyn ReasoningService>,
    files: Arc<dyn RemoteFileBackend>,
    decoder: Arc<dyn VideoDecoder>,
    pose_model: Option<Arc<dyn PoseModel>>,
}

impl AnalysisOrchestrator {
    pub fn new(
        config: Arc<AppConfig>,
        reasoning: Arc<dyn ReasoningService>,
        files: Arc<dyn RemoteFileBackend>,
        decoder: Arc<dyn VideoDecoder>,
        pose_model: Option<Arc<dyn PoseModel>>,
    ) -> Self {
        Self {
            config,
            reasoning,
            files,
            decoder,
            pose_model,
        }
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn pose_model_available(&self) -> bool {
        self.pose_model.is_some()
    }

    pub fn reasoning_backend(&self) -> &'static str {
        self.reasoning.backend_name()
    }

    /// Run one analysis. Consumes the staged video; it is gone when this returns.
    pub async fn analyze(
        &self,
        video: StagedVideo,
        strategy: Strategy,
        cancel: CancellationToken,
    ) -> Result<AnalysisResult, AnalysisError> {
        let started = Instant::now();
        info!(
            %strategy,
            file = %video.original_name(),
            mime_type = %video.mime_type(),
            "Starting analysis"
        );

        let outcome = match strategy {
            Strategy::DirectVideo => self.analyze_direct(&video, &cancel).await,
            Strategy::PoseBased => self.analyze_pose(&video, &cancel).await,
        };

        let path = video.path().to_path_buf();
        if let Err(e) = video.remove().await {
            warn!(path = %path.display(), error = %e, "Failed to remove staged video");
        }

        let elapsed_ms = started.elapsed().as_millis() as u64;
        match &outcome {
            Ok(result) => info!(%strategy, elapsed_ms, chars = result.as_str().len(), "Analysis complete"),
            Err(e) => warn!(%strategy, elapsed_ms, kind = e.kind(), error = %e, "Analysis failed"),
        }
        outcome
    }

    async fn analyze_direct(
        &self,
        video: &StagedVideo,
        cancel: &CancellationToken,
    ) -> Result<AnalysisResult, AnalysisError> {
        let bytes = video
            .read()
            .await
            .map_err(|e| AnalysisError::Internal(format!("Failed to read staged video: {e}")))?;
        if bytes.is_empty() {
            return Err(AnalysisError::InvalidInput("Uploaded video is empty.".to_string()));
        }

        if cancel.is_cancelled() {
            return Err(AnalysisError::Cancelled);
        }

        // Once issued the upload runs to completion so the reference it
        // returns can always be released.
        let mut job = RemoteFileJob::submit(
            Arc::clone(&self.files),
            bytes,
            video.mime_type(),
            video.original_name(),
        )
        .await?;

        let outcome = if cancel.is_cancelled() {
            Err(AnalysisError::Cancelled)
        } else {
            self.reason_over_remote(&mut job, cancel).await
        };

        // Release failures are logged by the job; they never mask the outcome.
        let _ = job.release().await;
        outcome
    }

    async fn reason_over_remote(
        &self,
        job: &mut RemoteFileJob,
        cancel: &CancellationToken,
    ) -> Result<AnalysisResult, AnalysisError> {
        let remote = &self.config.remote;
        let ready = job
            .await_ready(remote.poll_interval(), remote.processing_timeout(), cancel)
            .await?;

        let request = AnalysisRequest::video(prompts::video_instruction(), ready);
        self.reason(&request, cancel).await
    }

    async fn analyze_pose(
        &self,
        video: &StagedVideo,
        cancel: &CancellationToken,
    ) -> Result<AnalysisResult, AnalysisError> {
        let model = self.pose_model.clone().ok_or_else(|| {
            AnalysisError::Internal(
                "Pose-based analysis is unavailable: no pose model is configured".to_string(),
            )
        })?;
        let decoder = Arc::clone(&self.decoder);
        let path = video.path().to_path_buf();
        let settings = SamplerSettings::from_config(&self.config.sampling);
        let token = cancel.clone();

        let sequence = tokio::task::spawn_blocking(move || {
            LandmarkSampler::open(decoder.as_ref(), model.as_ref(), &path, settings, token)?
                .collect_sequence()
        })
        .await
        .map_err(|e| AnalysisError::Internal(format!("Landmark sampling task failed: {e}")))??;

        let evidence = EvidenceBuilder::from_config(&self.config.evidence).build(&sequence)?;
        info!(
            frames = sequence.len(),
            evidence_bytes = evidence.len(),
            "Pose evidence built"
        );

        let request = AnalysisRequest::text(prompts::pose_instruction(), evidence);
        self.reason(&request, cancel).await
    }

    /// Exactly one reasoning call. Once started it runs to completion.
    async fn reason(
        &self,
        request: &AnalysisRequest,
        cancel: &CancellationToken,
    ) -> Result<AnalysisResult, AnalysisError> {
        if cancel.is_cancelled() {
            return Err(AnalysisError::Cancelled);
        }
        let text = self.reasoning.generate(request).await?;
        Ok(AnalysisResult(text))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_classes() {
        assert!(AnalysisError::NoPersonDetected.is_client_error());
        assert!(AnalysisError::Decode("bad".into()).is_client_error());
        assert!(!AnalysisError::Cancelled.is_client_error());
        assert!(!AnalysisError::RemoteProcessingFailed {
            observed_state: RemoteFileState::Failed
        }
        .is_client_error());
    }

    #[test]
    fn test_remote_failure_message_names_state() {
        let e: AnalysisError = RemoteFileError::Failed {
            observed_state: RemoteFileState::Failed,
        }
        .into();
        assert_eq!(e.to_string(), "Video processing failed with state: FAILED");
    }

    #[test]
    fn test_empty_evidence_means_no_person() {
        let e: AnalysisError = EmptyEvidence.into();
        assert_eq!(e.to_string(), "Could not detect a person in the video.");
        assert_eq!(e.kind(), "no_person_detected");
    }

    #[test]
    fn test_remote_file_errors_keep_their_own_kind() {
        let upload: AnalysisError = RemoteFileError::Upload("connection reset".into()).into();
        assert_eq!(upload.kind(), "remote_file_error");
        assert_eq!(upload.to_string(), "Video upload failed: connection reset");
        assert!(!upload.is_client_error());

        let poll: AnalysisError = RemoteFileError::Poll("503".into()).into();
        assert_eq!(poll.kind(), "remote_file_error");
    }

    #[test]
    fn test_unexpected_transition_is_internal() {
        let e: AnalysisError = RemoteFileError::UnexpectedTransition {
            from: RemoteFileState::Pending,
            to: RemoteFileState::Active,
        }
        .into();
        assert!(matches!(e, AnalysisError::Internal(_)), "got {e:?}");
        assert_eq!(e.kind(), "internal");
    }

    #[test]
    fn test_sampling_cancel_maps_to_cancelled() {
        let e: AnalysisError = SampleError::Cancelled.into();
        assert!(matches!(e, AnalysisError::Cancelled));
    }
}
