//! Google Gemini backend
//!
//! Implements both seams against the Gemini REST API:
//! - `ReasoningService` via `models/{model}:generateContent`
//! - `RemoteFileBackend` via the Files API (resumable upload, get, delete)
//!
//! The API key travels in the `x-goog-api-key` header, never in a URL.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

use super::{ReasoningError, ReasoningService};
use crate::config::ReasoningConfig;
use crate::llm::prompts;
use crate::remote::{RemoteFileBackend, RemoteFileError};
use crate::types::{AnalysisRequest, Evidence, RemoteFileReference, RemoteFileState};

const API_KEY_HEADER: &str = "x-goog-api-key";
const UPLOAD_URL_HEADER: &str = "x-goog-upload-url";

// =============================================================================
// Client
// =============================================================================

pub struct GeminiClient {
    client: reqwest::Client,
    api_key: Option<String>,
    api_key_env: String,
    base_url: String,
    upload_base_url: String,
    model: String,
    json_response: bool,
    temperature: Option<f32>,
}

impl GeminiClient {
    /// Build a client, reading the API key from `config.api_key_env`.
    ///
    /// A missing key is not an error here; calls fail with a configuration
    /// error instead, so `/health` can still report the problem.
    pub fn from_config(config: &ReasoningConfig) -> Result<Self, ReasoningError> {
        Self::with_api_key(config, config.api_key())
    }

    pub fn with_api_key(
        config: &ReasoningConfig,
        api_key: Option<String>,
    ) -> Result<Self, ReasoningError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| ReasoningError::Request(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            api_key,
            api_key_env: config.api_key_env.clone(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            upload_base_url: config.upload_base_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            json_response: config.json_response,
            temperature: config.temperature,
        })
    }

    pub fn has_credentials(&self) -> bool {
        self.api_key.is_some()
    }

    fn key(&self) -> Result<&str, String> {
        self.api_key
            .as_deref()
            .ok_or_else(|| format!("{} is not set", self.api_key_env))
    }

    fn generate_url(&self) -> String {
        format!("{}/models/{}:generateContent", self.base_url, self.model)
    }

    fn file_url(&self, remote_id: &str) -> String {
        format!("{}/{}", self.base_url, remote_id.trim_start_matches('/'))
    }

    fn build_request(&self, request: &AnalysisRequest) -> GenerateContentRequest {
        let part = match &request.evidence {
            Evidence::Video(file) => Part::file(file.mime_type(), file.uri()),
            Evidence::Text(text) => Part::text(prompts::pose_evidence_prompt(text)),
        };

        GenerateContentRequest {
            contents: vec![Content {
                role: Some("user".to_string()),
                parts: vec![part],
            }],
            system_instruction: Some(Content {
                role: None,
                parts: vec![Part::text(request.instruction.clone())],
            }),
            generation_config: Some(GenerationConfig {
                temperature: self.temperature,
                response_mime_type: self.json_response.then(|| "application/json".to_string()),
            }),
        }
    }
}

// =============================================================================
// Gemini API Types
// =============================================================================

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest {
    contents: Vec<Content>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<Content>,
    #[serde(skip_serializing_if = "Option::is_none")]
    generation_config: Option<GenerationConfig>,
}

#[derive(Serialize, Deserialize)]
struct Content {
    #[serde(skip_serializing_if = "Option::is_none", default)]
    role: Option<String>,
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Part {
    #[serde(skip_serializing_if = "Option::is_none", default)]
    text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    file_data: Option<FileData>,
}

impl Part {
    fn text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            file_data: None,
        }
    }

    fn file(mime_type: &str, uri: &str) -> Self {
        Self {
            text: None,
            file_data: Some(FileData {
                mime_type: mime_type.to_string(),
                file_uri: uri.to_string(),
            }),
        }
    }
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FileData {
    mime_type: String,
    file_uri: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_mime_type: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    #[serde(default)]
    prompt_feedback: Option<PromptFeedback>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    content: Option<Content>,
    finish_reason: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    block_reason: Option<String>,
}

#[derive(Deserialize)]
struct ApiError {
    error: ApiErrorDetail,
}

#[derive(Deserialize)]
struct ApiErrorDetail {
    message: String,
    #[serde(default)]
    status: Option<String>,
}

#[derive(Serialize)]
struct CreateFileRequest<'a> {
    file: CreateFileMetadata<'a>,
}

#[derive(Serialize)]
struct CreateFileMetadata<'a> {
    display_name: &'a str,
}

#[derive(Deserialize)]
struct UploadFileResponse {
    file: FileResource,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct FileResource {
    name: String,
    #[serde(default)]
    uri: String,
    #[serde(default)]
    mime_type: String,
    #[serde(default)]
    state: Option<String>,
}

impl FileResource {
    fn into_reference(self) -> RemoteFileReference {
        RemoteFileReference {
            state: map_file_state(self.state.as_deref()),
            remote_id: self.name,
            uri: self.uri,
            mime_type: self.mime_type,
        }
    }
}

/// Files API state names. `STATE_UNSPECIFIED` and anything unknown count as PENDING.
fn map_file_state(state: Option<&str>) -> RemoteFileState {
    match state {
        Some("PROCESSING") => RemoteFileState::Processing,
        Some("ACTIVE") => RemoteFileState::Active,
        Some("FAILED") => RemoteFileState::Failed,
        _ => RemoteFileState::Pending,
    }
}

/// Human-readable error from a non-2xx body, falling back to the raw text.
fn describe_api_error(status: reqwest::StatusCode, body: &str) -> String {
    match serde_json::from_str::<ApiError>(body) {
        Ok(e) => format!(
            "{} (status={}): {}",
            status,
            e.error.status.as_deref().unwrap_or("unknown"),
            e.error.message
        ),
        Err(_) => format!("{status}: {}", body.trim()),
    }
}

/// Concatenate the text parts of the first candidate.
fn extract_text(response: GenerateContentResponse) -> Result<String, ReasoningError> {
    if let Some(reason) = response.prompt_feedback.and_then(|f| f.block_reason) {
        return Err(ReasoningError::Blocked(reason));
    }

    let candidate = response
        .candidates
        .into_iter()
        .next()
        .ok_or_else(|| ReasoningError::Malformed("no candidates returned".to_string()))?;

    let text: String = candidate
        .content
        .map(|c| c.parts.into_iter().filter_map(|p| p.text).collect())
        .unwrap_or_default();

    if text.trim().is_empty() {
        let reason = candidate.finish_reason.unwrap_or_else(|| "unknown".to_string());
        return Err(ReasoningError::Malformed(format!(
            "empty answer (finish reason: {reason})"
        )));
    }
    Ok(text)
}

// =============================================================================
// ReasoningService Implementation
// =============================================================================

#[async_trait]
impl ReasoningService for GeminiClient {
    async fn generate(&self, request: &AnalysisRequest) -> Result<String, ReasoningError> {
        let key = self.key().map_err(ReasoningError::NotConfigured)?;
        let body = self.build_request(request);
        let url = self.generate_url();
        debug!(url = %url, model = %self.model, "Sending generateContent request");

        let response = self
            .client
            .post(&url)
            .header(API_KEY_HEADER, key)
            .json(&body)
            .send()
            .await
            .map_err(|e| ReasoningError::Request(e.to_string()))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| ReasoningError::Request(format!("Failed to read response: {e}")))?;

        if !status.is_success() {
            return Err(ReasoningError::Api {
                status: status.as_u16(),
                message: describe_api_error(status, &text),
            });
        }

        let parsed: GenerateContentResponse = serde_json::from_str(&text)
            .map_err(|e| ReasoningError::Malformed(format!("Failed to parse response: {e}")))?;
        extract_text(parsed)
    }

    fn backend_name(&self) -> &'static str {
        "gemini"
    }
}

// =============================================================================
// RemoteFileBackend Implementation
// =============================================================================

#[async_trait]
impl RemoteFileBackend for GeminiClient {
    async fn upload(
        &self,
        bytes: Vec<u8>,
        mime_type: &str,
        display_name: &str,
    ) -> Result<RemoteFileReference, RemoteFileError> {
        let key = self.key().map_err(RemoteFileError::Upload)?;

        // 1. Open a resumable session
        let start = self
            .client
            .post(format!("{}/files", self.upload_base_url))
            .header(API_KEY_HEADER, key)
            .header("X-Goog-Upload-Protocol", "resumable")
            .header("X-Goog-Upload-Command", "start")
            .header("X-Goog-Upload-Header-Content-Length", bytes.len().to_string())
            .header("X-Goog-Upload-Header-Content-Type", mime_type)
            .json(&CreateFileRequest {
                file: CreateFileMetadata { display_name },
            })
            .send()
            .await
            .map_err(|e| RemoteFileError::Upload(e.to_string()))?;

        let status = start.status();
        if !status.is_success() {
            let body = start.text().await.unwrap_or_default();
            return Err(RemoteFileError::Upload(describe_api_error(status, &body)));
        }
        let upload_url = start
            .headers()
            .get(UPLOAD_URL_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
            .ok_or_else(|| {
                RemoteFileError::Upload("upload session returned no upload URL".to_string())
            })?;

        // 2. Send all bytes and finalize in one request
        let finish = self
            .client
            .post(&upload_url)
            .header(API_KEY_HEADER, key)
            .header("X-Goog-Upload-Offset", "0")
            .header("X-Goog-Upload-Command", "upload, finalize")
            .body(bytes)
            .send()
            .await
            .map_err(|e| RemoteFileError::Upload(e.to_string()))?;

        let status = finish.status();
        let body = finish
            .text()
            .await
            .map_err(|e| RemoteFileError::Upload(e.to_string()))?;
        if !status.is_success() {
            return Err(RemoteFileError::Upload(describe_api_error(status, &body)));
        }

        let parsed: UploadFileResponse = serde_json::from_str(&body)
            .map_err(|e| RemoteFileError::Upload(format!("Failed to parse upload response: {e}")))?;
        Ok(parsed.file.into_reference())
    }

    async fn get(&self, remote_id: &str) -> Result<RemoteFileReference, RemoteFileError> {
        let key = self.key().map_err(RemoteFileError::Poll)?;
        let response = self
            .client
            .get(self.file_url(remote_id))
            .header(API_KEY_HEADER, key)
            .send()
            .await
            .map_err(|e| RemoteFileError::Poll(e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| RemoteFileError::Poll(e.to_string()))?;
        if !status.is_success() {
            return Err(RemoteFileError::Poll(describe_api_error(status, &body)));
        }

        let file: FileResource = serde_json::from_str(&body)
            .map_err(|e| RemoteFileError::Poll(format!("Failed to parse file resource: {e}")))?;
        Ok(file.into_reference())
    }

    async fn delete(&self, remote_id: &str) -> Result<(), RemoteFileError> {
        let key = self.key().map_err(RemoteFileError::Delete)?;
        let response = self
            .client
            .delete(self.file_url(remote_id))
            .header(API_KEY_HEADER, key)
            .send()
            .await
            .map_err(|e| RemoteFileError::Delete(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(RemoteFileError::Delete(describe_api_error(status, &body)));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ReadyFile;

    fn client(json_response: bool) -> GeminiClient {
        let config = ReasoningConfig {
            json_response,
            ..ReasoningConfig::default()
        };
        GeminiClient::with_api_key(&config, Some("test-key".to_string())).unwrap()
    }

    fn active_file() -> ReadyFile {
        ReadyFile::from_active(&RemoteFileReference {
            remote_id: "files/abc".to_string(),
            uri: "https://generativelanguage.googleapis.com/v1beta/files/abc".to_string(),
            mime_type: "video/mp4".to_string(),
            state: RemoteFileState::Active,
        })
        .unwrap()
    }

    #[test]
    fn test_urls() {
        let c = client(true);
        assert_eq!(
            c.generate_url(),
            "https://generativelanguage.googleapis.com/v1beta/models/gemini-2.5-pro:generateContent"
        );
        assert_eq!(
            c.file_url("files/abc"),
            "https://generativelanguage.googleapis.com/v1beta/files/abc"
        );
    }

    #[test]
    fn test_video_request_uses_file_data_part() {
        let c = client(true);
        let req = AnalysisRequest::video("be a coach", active_file());
        let json = serde_json::to_value(c.build_request(&req)).unwrap();

        let part = &json["contents"][0]["parts"][0];
        assert_eq!(part["fileData"]["mimeType"], "video/mp4");
        assert_eq!(
            part["fileData"]["fileUri"],
            "https://generativelanguage.googleapis.com/v1beta/files/abc"
        );
        assert!(part.get("text").is_none());
        assert_eq!(json["systemInstruction"]["parts"][0]["text"], "be a coach");
        assert!(json["systemInstruction"].get("role").is_none());
        assert_eq!(json["generationConfig"]["responseMimeType"], "application/json");
    }

    #[test]
    fn test_text_request_wraps_evidence() {
        let c = client(false);
        let req = AnalysisRequest::text("rate this", "[{\"frame\":0}]");
        let json = serde_json::to_value(c.build_request(&req)).unwrap();
        let text = json["contents"][0]["parts"][0]["text"].as_str().unwrap();
        assert!(text.contains("[{\"frame\":0}]"));
        assert!(json["generationConfig"].get("responseMimeType").is_none());
    }

    #[test]
    fn test_file_state_mapping() {
        assert_eq!(map_file_state(Some("PROCESSING")), RemoteFileState::Processing);
        assert_eq!(map_file_state(Some("ACTIVE")), RemoteFileState::Active);
        assert_eq!(map_file_state(Some("FAILED")), RemoteFileState::Failed);
        assert_eq!(map_file_state(Some("STATE_UNSPECIFIED")), RemoteFileState::Pending);
        assert_eq!(map_file_state(None), RemoteFileState::Pending);
    }

    #[test]
    fn test_upload_response_parses_into_reference() {
        let body = r#"{"file":{"name":"files/xyz","displayName":"clip.mp4","mimeType":"video/mp4","sizeBytes":"1024","uri":"https://host/v1beta/files/xyz","state":"PROCESSING"}}"#;
        let parsed: UploadFileResponse = serde_json::from_str(body).unwrap();
        let r = parsed.file.into_reference();
        assert_eq!(r.remote_id, "files/xyz");
        assert_eq!(r.state, RemoteFileState::Processing);
        assert_eq!(r.uri, "https://host/v1beta/files/xyz");
    }

    #[test]
    fn test_extract_text_joins_parts() {
        let body = r#"{"candidates":[{"content":{"role":"model","parts":[{"text":"{\"ntrp_level\":"},{"text":"\"3.5\"}"}]},"finishReason":"STOP"}]}"#;
        let parsed: GenerateContentResponse = serde_json::from_str(body).unwrap();
        assert_eq!(extract_text(parsed).unwrap(), "{\"ntrp_level\":\"3.5\"}");
    }

    #[test]
    fn test_extract_text_reports_block_reason() {
        let body = r#"{"promptFeedback":{"blockReason":"SAFETY"}}"#;
        let parsed: GenerateContentResponse = serde_json::from_str(body).unwrap();
        assert!(matches!(extract_text(parsed), Err(ReasoningError::Blocked(r)) if r == "SAFETY"));
    }

    #[test]
    fn test_extract_text_rejects_empty_answer() {
        let body = r#"{"candidates":[{"finishReason":"MAX_TOKENS"}]}"#;
        let parsed: GenerateContentResponse = serde_json::from_str(body).unwrap();
        let err = extract_text(parsed).unwrap_err();
        assert!(err.to_string().contains("MAX_TOKENS"));
    }

    #[test]
    fn test_api_error_body_is_described() {
        let body = r#"{"error":{"code":400,"message":"API key not valid","status":"INVALID_ARGUMENT"}}"#;
        let msg = describe_api_error(reqwest::StatusCode::BAD_REQUEST, body);
        assert!(msg.contains("INVALID_ARGUMENT"));
        assert!(msg.contains("API key not valid"));
        let raw = describe_api_error(reqwest::StatusCode::BAD_GATEWAY, "upstream down");
        assert!(raw.contains("upstream down"));
    }

    #[tokio::test]
    async fn test_missing_key_fails_before_any_request() {
        let c = GeminiClient::with_api_key(&ReasoningConfig::default(), None).unwrap();
        assert!(!c.has_credentials());
        let err = c
            .generate(&AnalysisRequest::text("x", "y"))
            .await
            .unwrap_err();
        assert!(matches!(err, ReasoningError::NotConfigured(m) if m.contains("GOOGLE_API_KEY")));
    }
}
