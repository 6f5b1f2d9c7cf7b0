//! API route definitions
//!
//! - POST /analyze - upload a video, get an NTRP assessment
//! - GET /health - liveness and capability report

use axum::{routing::{get, post}, Router};

use super::handlers::{self, AppState};

pub fn api_routes(state: AppState) -> Router {
    Router::new()
        .route("/analyze", post(handlers::analyze))
        .route("/health", get(handlers::health))
        .with_state(state)
}
