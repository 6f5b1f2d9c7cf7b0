//! Application Configuration - every tunable of the analysis service as TOML
//!
//! Each struct implements `Default` with the values in `config::defaults`,
//! so a missing file or a partial file behaves identically to the built-ins.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

use super::defaults;
use crate::types::Strategy;

// ============================================================================
// Top-Level Config
// ============================================================================

/// Root configuration for one deployment of the service.
///
/// Load with `AppConfig::load()` which searches:
/// 1. `$NTRP_CONFIG` env var
/// 2. `./ntrp_config.toml`
/// 3. Built-in defaults
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// HTTP server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Strategy selection
    #[serde(default)]
    pub analysis: AnalysisConfig,

    /// Frame sampling and pose model
    #[serde(default)]
    pub sampling: SamplingConfig,

    /// Text evidence bounds
    #[serde(default)]
    pub evidence: EvidenceConfig,

    /// Remote file processing wait
    #[serde(default)]
    pub remote: RemoteConfig,

    /// Reasoning service endpoint and model
    #[serde(default)]
    pub reasoning: ReasoningConfig,
}

// ============================================================================
// Sections
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub addr: String,
    pub upload_dir: PathBuf,
    pub max_upload_bytes: usize,
    pub request_timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            addr: defaults::SERVER_ADDR.to_string(),
            upload_dir: PathBuf::from(defaults::UPLOAD_DIR),
            max_upload_bytes: defaults::MAX_UPLOAD_BYTES,
            request_timeout_secs: defaults::REQUEST_TIMEOUT_SECS,
        }
    }
}

impl ServerConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    /// Used when a request does not name a strategy
    pub strategy: Strategy,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SamplingConfig {
    pub stride: u64,
    /// Person-presence score at or above which a frame counts as a detection
    pub min_confidence: f32,
    pub model_path: PathBuf,
    pub ffmpeg_path: PathBuf,
    pub ffprobe_path: PathBuf,
    pub intra_threads: usize,
}

impl Default for SamplingConfig {
    fn default() -> Self {
        Self {
            stride: defaults::SAMPLE_STRIDE,
            min_confidence: defaults::MIN_PERSON_CONFIDENCE,
            model_path: PathBuf::from(defaults::POSE_MODEL_PATH),
            ffmpeg_path: PathBuf::from(defaults::FFMPEG_PATH),
            ffprobe_path: PathBuf::from(defaults::FFPROBE_PATH),
            intra_threads: defaults::POSE_INTRA_THREADS,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EvidenceConfig {
    pub max_frames: usize,
    pub precision: u32,
}

impl Default for EvidenceConfig {
    fn default() -> Self {
        Self {
            max_frames: defaults::EVIDENCE_MAX_FRAMES,
            precision: defaults::EVIDENCE_PRECISION,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RemoteConfig {
    pub poll_interval_secs: u64,
    pub processing_timeout_secs: u64,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: defaults::REMOTE_POLL_INTERVAL_SECS,
            processing_timeout_secs: defaults::REMOTE_PROCESSING_TIMEOUT_SECS,
        }
    }
}

impl RemoteConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn processing_timeout(&self) -> Duration {
        Duration::from_secs(self.processing_timeout_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReasoningConfig {
    pub base_url: String,
    pub upload_base_url: String,
    pub model: String,
    /// Name of the environment variable that holds the API key.
    /// The key itself never lives in the config file.
    pub api_key_env: String,
    pub request_timeout_secs: u64,
    /// Ask the service for `application/json` output
    pub json_response: bool,
    pub temperature: Option<f32>,
}

impl Default for ReasoningConfig {
    fn default() -> Self {
        Self {
            base_url: defaults::REASONING_BASE_URL.to_string(),
            upload_base_url: defaults::REASONING_UPLOAD_BASE_URL.to_string(),
            model: defaults::REASONING_MODEL.to_string(),
            api_key_env: defaults::REASONING_API_KEY_ENV.to_string(),
            request_timeout_secs: defaults::REASONING_REQUEST_TIMEOUT_SECS,
            json_response: true,
            temperature: None,
        }
    }
}

impl ReasoningConfig {
    /// Read the API key from the configured environment variable.
    pub fn api_key(&self) -> Option<String> {
        std::env::var(&self.api_key_env)
            .ok()
            .filter(|k| !k.trim().is_empty())
    }
}

// ============================================================================
// Loading
// ============================================================================

impl AppConfig {
    /// Load configuration using the standard search order:
    /// 1. `$NTRP_CONFIG` environment variable
    /// 2. `./ntrp_config.toml` in the current working directory
    /// 3. Built-in defaults
    ///
    /// A file that exists but fails to parse or validate is an error; silently
    /// falling back would run the service with thresholds the operator did not ask for.
    pub fn load() -> Result<Self, ConfigError> {
        if let Ok(path) = std::env::var("NTRP_CONFIG") {
            let p = PathBuf::from(&path);
            if p.exists() {
                let config = Self::load_from_file(&p)?;
                info!(path = %p.display(), "Loaded config from NTRP_CONFIG");
                return Ok(config);
            }
            warn!(path = %path, "NTRP_CONFIG points to non-existent file, falling back");
        }

        let local = PathBuf::from("ntrp_config.toml");
        if local.exists() {
            let config = Self::load_from_file(&local)?;
            info!("Loaded config from ./ntrp_config.toml");
            return Ok(config);
        }

        info!("No ntrp_config.toml found, using built-in defaults");
        Ok(Self::default())
    }

    /// Load from a specific TOML file path.
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::Io(path.to_path_buf(), e))?;
        Self::from_toml_str(&contents).map_err(|e| match e {
            ConfigError::Parse(_, inner) => ConfigError::Parse(path.to_path_buf(), inner),
            other => other,
        })
    }

    /// Parse and validate a TOML document. Unknown keys only warn.
    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        for w in super::validation::validate_unknown_keys(contents) {
            warn!("{}", w);
        }

        let config: Self =
            toml::from_str(contents).map_err(|e| ConfigError::Parse(PathBuf::new(), e))?;
        config.validate()?;
        Ok(config)
    }

    /// Serialize the current config to a TOML string.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(ConfigError::Serialize)
    }

    /// Validate all values for internal consistency.
    ///
    /// Rules:
    /// - Stride, poll interval, evidence frame cap must be > 0
    /// - Confidence must lie in [0, 1]
    /// - The processing timeout must allow at least one poll
    /// - The request deadline must outlast the processing timeout
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut errors: Vec<String> = Vec::new();

        if self.sampling.stride == 0 {
            errors.push("sampling.stride must be > 0".to_string());
        }
        let c = self.sampling.min_confidence;
        if !c.is_finite() || !(0.0..=1.0).contains(&c) {
            errors.push(format!("sampling.min_confidence = {c} must be within [0, 1]"));
        }
        if self.sampling.intra_threads == 0 {
            errors.push("sampling.intra_threads must be > 0".to_string());
        }

        if self.evidence.max_frames == 0 {
            errors.push("evidence.max_frames must be > 0".to_string());
        }
        if self.evidence.precision > 8 {
            errors.push(format!(
                "evidence.precision = {} exceeds 8 decimal places (f32 has no more)",
                self.evidence.precision
            ));
        }

        let r = &self.remote;
        if r.poll_interval_secs == 0 {
            errors.push("remote.poll_interval_secs must be > 0".to_string());
        }
        if r.processing_timeout_secs < r.poll_interval_secs {
            errors.push(format!(
                "remote.processing_timeout_secs ({}) must be >= poll_interval_secs ({})",
                r.processing_timeout_secs, r.poll_interval_secs
            ));
        }

        if self.server.max_upload_bytes == 0 {
            errors.push("server.max_upload_bytes must be > 0".to_string());
        }
        if self.server.request_timeout_secs <= r.processing_timeout_secs {
            errors.push(format!(
                "server.request_timeout_secs ({}) must be > remote.processing_timeout_secs ({})",
                self.server.request_timeout_secs, r.processing_timeout_secs
            ));
        }

        if self.reasoning.model.trim().is_empty() {
            errors.push("reasoning.model must not be empty".to_string());
        }
        if self.reasoning.request_timeout_secs == 0 {
            errors.push("reasoning.request_timeout_secs must be > 0".to_string());
        }
        if let Some(t) = self.reasoning.temperature {
            if !t.is_finite() || !(0.0..=2.0).contains(&t) {
                errors.push(format!("reasoning.temperature = {t} must be within [0, 2]"));
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Validation(errors))
        }
    }
}

// ============================================================================
// Error Type
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Config I/O error ({}): {1}", .0.display())]
    Io(PathBuf, std::io::Error),
    #[error("Config parse error ({}): {1}", .0.display())]
    Parse(PathBuf, toml::de::Error),
    #[error("Config serialization error: {0}")]
    Serialize(toml::ser::Error),
    #[error("Config validation failed:\n  - {}", .0.join("\n  - "))]
    Validation(Vec<String>),
}
