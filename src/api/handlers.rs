//! API route handlers
//!
//! - `POST /analyze`: multipart upload (`video` file, optional `strategy`)
//! - `GET /health`: liveness and capability report

use axum::extract::multipart::MultipartRejection;
use axum::extract::{Multipart, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::envelope::error_response;
use crate::analysis::{AnalysisError, AnalysisOrchestrator, StagedVideo, UploadStore};
use crate::types::Strategy;

pub const MISSING_VIDEO: &str = "No video file provided in the request.";
pub const EMPTY_FILENAME: &str = "No file selected.";

// ============================================================================
// API State
// ============================================================================

/// Shared state for API handlers
#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<AnalysisOrchestrator>,
    pub uploads: UploadStore,
    /// Root token; cancelled on server shutdown
    pub shutdown: CancellationToken,
    /// Whether reasoning-service credentials were found at startup
    pub credentials_configured: bool,
}

impl AppState {
    pub fn new(
        orchestrator: Arc<AnalysisOrchestrator>,
        shutdown: CancellationToken,
        credentials_configured: bool,
    ) -> Self {
        let uploads = UploadStore::new(&orchestrator.config().server.upload_dir);
        Self {
            orchestrator,
            uploads,
            shutdown,
            credentials_configured,
        }
    }
}

// ============================================================================
// POST /analyze
// ============================================================================

/// Accept a video and return the raw assessment text as `application/json`.
///
/// A body that is not multipart at all is answered like a form without a
/// `video` part.
pub async fn analyze(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Response {
    let multipart = match multipart {
        Ok(multipart) => multipart,
        Err(rejection) => {
            debug!(reason = %rejection.body_text(), "Request is not multipart");
            return AnalysisError::InvalidInput(MISSING_VIDEO.to_string()).into_response();
        }
    };

    let (video, strategy) = match read_upload(&state, multipart).await {
        Ok(parts) => parts,
        Err(resp) => return resp,
    };

    let cancel = state.shutdown.child_token();
    // Client disconnect drops this future; the guard then stops sampling/polling.
    let _guard = cancel.clone().drop_guard();
    let timeout = state.orchestrator.config().server.request_timeout();

    let analysis = state.orchestrator.analyze(video, strategy, cancel.clone());
    tokio::pin!(analysis);
    let result = tokio::select! {
        r = &mut analysis => r,
        _ = tokio::time::sleep(timeout) => {
            warn!(timeout_secs = timeout.as_secs(), "Request deadline reached, cancelling analysis");
            cancel.cancel();
            analysis.await
        }
    };

    match result {
        Ok(text) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "application/json")],
            text.into_inner(),
        )
            .into_response(),
        Err(e) => e.into_response(),
    }
}

/// Pull the `video` and `strategy` fields out of the form.
///
/// The video is streamed straight to disk. Nothing touches the filesystem
/// unless a `video` part carrying a filename is present.
async fn read_upload(
    state: &AppState,
    mut multipart: Multipart,
) -> Result<(StagedVideo, Strategy), Response> {
    let mut video: Option<StagedVideo> = None;
    let mut requested: Option<String> = None;

    loop {
        let mut field = match multipart.next_field().await {
            Ok(Some(field)) => field,
            Ok(None) => break,
            Err(e) => return Err(error_response(e.status(), e.body_text())),
        };

        let name = field.name().map(str::to_string);
        match name.as_deref() {
            Some("video") if video.is_none() => {
                // A plain text field named `video` is not an upload.
                let Some(filename) = field.file_name().map(str::to_string) else {
                    continue;
                };
                if filename.trim().is_empty() {
                    return Err(AnalysisError::InvalidInput(EMPTY_FILENAME.to_string()).into_response());
                }

                let (staged, mut file) = state
                    .uploads
                    .create(&filename)
                    .await
                    .map_err(|e| internal(format!("Failed to stage upload: {e}")))?;

                let mut written = 0usize;
                loop {
                    match field.chunk().await {
                        Ok(Some(chunk)) => {
                            written += chunk.len();
                            file.write_all(&chunk)
                                .await
                                .map_err(|e| internal(format!("Failed to stage upload: {e}")))?;
                        }
                        Ok(None) => break,
                        Err(e) => return Err(error_response(e.status(), e.body_text())),
                    }
                }
                file.flush()
                    .await
                    .map_err(|e| internal(format!("Failed to stage upload: {e}")))?;

                debug!(file = %staged.original_name(), bytes = written, "Upload staged");
                video = Some(staged);
            }
            Some("strategy") => {
                let text = field.text().await.map_err(|e| error_response(e.status(), e.body_text()))?;
                requested = Some(text);
            }
            _ => {}
        }
    }

    let Some(video) = video else {
        return Err(AnalysisError::InvalidInput(MISSING_VIDEO.to_string()).into_response());
    };

    let strategy = match requested.as_deref().map(str::trim) {
        Some(name) if !name.is_empty() => name
            .parse::<Strategy>()
            .map_err(|e| AnalysisError::InvalidInput(e.to_string()).into_response())?,
        _ => state.orchestrator.config().analysis.strategy,
    };

    Ok((video, strategy))
}

fn internal(msg: String) -> Response {
    AnalysisError::Internal(msg).into_response()
}

// ============================================================================
// GET /health
// ============================================================================

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub default_strategy: Strategy,
    pub pose_model_loaded: bool,
    pub reasoning_backend: &'static str,
    pub credentials_configured: bool,
}

pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let orchestrator = &state.orchestrator;
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        default_strategy: orchestrator.config().analysis.strategy,
        pose_model_loaded: orchestrator.pose_model_available(),
        reasoning_backend: orchestrator.reasoning_backend(),
        credentials_configured: state.credentials_configured,
    })
}
