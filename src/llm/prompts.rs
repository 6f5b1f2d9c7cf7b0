//! Fixed instructions sent with every analysis.

/// Shape the model must answer in. Clients decode exactly these keys.
pub const RESPONSE_SHAPE: &str = r#"{"ntrp_level": "...", "justification": "...", "training_advice": {"forehand": "...", "backhand": "...", "serve": "...", "footwork": "..."}}"#;

/// System instruction for the direct video path.
pub fn video_instruction() -> String {
    format!(
        "You are an experienced tennis coach and a certified NTRP (National Tennis Rating Program) evaluator.\n\
         You will be shown a video of a single tennis player. Study their forehand, backhand and serve, \
         their footwork and court positioning, and the overall shape of their game.\n\n\
         Provide:\n\
         1. An estimated NTRP rating between 1.0 and 7.0.\n\
         2. A short justification grounded in what is visible in the video.\n\
         3. Concrete, actionable practice advice for the forehand, backhand, serve and footwork.\n\n\
         Reply with a single minified JSON object and nothing else, using exactly this structure:\n{RESPONSE_SHAPE}"
    )
}

/// System instruction for the pose landmark path.
pub fn pose_instruction() -> String {
    format!(
        "You are an experienced tennis coach and a certified NTRP (National Tennis Rating Program) evaluator.\n\
         You will receive body-pose data for a single tennis player, extracted from sampled video frames. \
         The data is a JSON array; each entry has a `frame` number and 33 `landmarks` in BlazePose order \
         (0 nose, 11/12 shoulders, 13/14 elbows, 15/16 wrists, 23/24 hips, 25/26 knees, 27/28 ankles). \
         Each landmark has `x` and `y` normalized to the frame (origin top-left), a relative depth `z`, \
         and a `visibility` score between 0 and 1.\n\
         Infer the player's forehand, backhand, serve and movement patterns from how these points change over time.\n\n\
         Provide:\n\
         1. An estimated NTRP rating between 1.0 and 7.0.\n\
         2. A short justification that refers to the inferred mechanics (for example racket-arm extension \
         from elbow and wrist positions, or hip and shoulder rotation).\n\
         3. Concrete, actionable practice advice for the forehand, backhand, serve and footwork.\n\n\
         Reply with a single minified JSON object and nothing else, using exactly this structure:\n{RESPONSE_SHAPE}"
    )
}

/// User turn wrapping the serialized landmarks.
pub fn pose_evidence_prompt(evidence: &str) -> String {
    format!("Pose data:\n{evidence}")
}
