//! Reasoning Service Module
//!
//! The multimodal model that turns evidence into an NTRP assessment.
//!
//! ## Architecture
//!
//! - **ReasoningService**: one call per analysis, system instruction plus
//!   either a ready video reference or landmark text
//! - **GeminiClient**: production backend over the Gemini REST API; also
//!   serves as the remote file backend (Files API)
//! - **prompts**: the fixed instructions for each strategy

use async_trait::async_trait;

mod gemini;
pub mod prompts;

pub use gemini::GeminiClient;

use crate::types::AnalysisRequest;

#[derive(Debug, thiserror::Error)]
pub enum ReasoningError {
    #[error("Reasoning service is not configured: {0}")]
    NotConfigured(String),

    #[error("Reasoning request failed: {0}")]
    Request(String),

    #[error("Reasoning service error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("Reasoning response blocked: {0}")]
    Blocked(String),

    #[error("Malformed reasoning response: {0}")]
    Malformed(String),
}

/// Unified trait for reasoning backends
#[async_trait]
pub trait ReasoningService: Send + Sync {
    /// Send one request and return the raw text of the model's answer.
    async fn generate(&self, request: &AnalysisRequest) -> Result<String, ReasoningError>;

    /// Backend name for logging
    fn backend_name(&self) -> &'static str;
}
