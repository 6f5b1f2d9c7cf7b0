//! Analysis request/response types: Strategy, AnalysisRequest, AnalysisResult

use serde::{Deserialize, Serialize};

use super::ReadyFile;

/// Which evidence path the orchestrator takes for a video.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    /// Upload the raw video and let the reasoning service watch it
    DirectVideo,
    /// Extract pose landmarks locally and send them as text
    #[default]
    PoseBased,
}

impl std::fmt::Display for Strategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Strategy::DirectVideo => write!(f, "direct_video"),
            Strategy::PoseBased => write!(f, "pose_based"),
        }
    }
}

/// Returned for strategy names that are neither `direct_video` nor `pose_based`.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown analysis strategy '{0}' (expected 'direct_video' or 'pose_based')")]
pub struct UnknownStrategy(pub String);

impl std::str::FromStr for Strategy {
    type Err = UnknownStrategy;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "direct_video" | "video" => Ok(Strategy::DirectVideo),
            "pose_based" | "pose" => Ok(Strategy::PoseBased),
            _ => Err(UnknownStrategy(s.to_string())),
        }
    }
}

/// Evidence carried to the reasoning service.
#[derive(Debug, Clone, PartialEq)]
pub enum Evidence {
    /// A remote video that reached ACTIVE
    Video(ReadyFile),
    /// Serialized pose landmarks
    Text(String),
}

/// A single request to the reasoning service.
#[derive(Debug, Clone, PartialEq)]
pub struct AnalysisRequest {
    /// Fixed system instruction for the chosen strategy
    pub instruction: String,
    pub evidence: Evidence,
}

impl AnalysisRequest {
    pub fn video(instruction: impl Into<String>, file: ReadyFile) -> Self {
        Self {
            instruction: instruction.into(),
            evidence: Evidence::Video(file),
        }
    }

    pub fn text(instruction: impl Into<String>, evidence_text: impl Into<String>) -> Self {
        Self {
            instruction: instruction.into(),
            evidence: Evidence::Text(evidence_text.into()),
        }
    }
}

/// Raw text returned by the reasoning service.
///
/// Expected to be a JSON object with `ntrp_level`, `justification` and
/// `training_advice`, but never parsed or validated here.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnalysisResult(pub String);

impl AnalysisResult {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_inner(self) -> String {
        self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strategy_parse_accepts_aliases() {
        assert_eq!("direct_video".parse::<Strategy>().unwrap(), Strategy::DirectVideo);
        assert_eq!("Direct-Video".parse::<Strategy>().unwrap(), Strategy::DirectVideo);
        assert_eq!("pose".parse::<Strategy>().unwrap(), Strategy::PoseBased);
        assert!("frames".parse::<Strategy>().is_err());
    }

    #[test]
    fn test_strategy_display_round_trips_through_parse() {
        for s in [Strategy::DirectVideo, Strategy::PoseBased] {
            assert_eq!(s.to_string().parse::<Strategy>().unwrap(), s);
        }
    }
}
