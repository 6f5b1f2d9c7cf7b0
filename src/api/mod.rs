//! REST API module using Axum
//!
//! Serves the analysis endpoint for the mobile client:
//! - `POST /analyze` multipart upload, raw assessment JSON back
//! - `GET /health` liveness probe
//! - `{"error": ...}` envelope on every failure

pub mod envelope;
pub mod handlers;
mod routes;

pub use handlers::AppState;

use axum::extract::DefaultBodyLimit;
use axum::http::{header, Method};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;

/// Restrictive CORS by default (native clients need none).
///
/// Set `NTRP_CORS_ORIGINS` to a comma-separated list of origins to allow
/// browser uploads during development.
fn build_cors_layer() -> CorsLayer {
    let base = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([header::CONTENT_TYPE]);

    match std::env::var("NTRP_CORS_ORIGINS") {
        Ok(origins) => {
            let allowed: Vec<_> = origins
                .split(',')
                .filter_map(|o| o.trim().parse().ok())
                .collect();
            tracing::info!(origins = %origins, "CORS: allowing configured origins");
            base.allow_origin(allowed)
        }
        Err(_) => base,
    }
}

/// Create the complete application router.
///
/// Axum's 2 MB default body limit is replaced by `server.max_upload_bytes`;
/// larger uploads get `413 Payload Too Large`.
pub fn create_app(state: AppState) -> Router {
    let max_upload = state.orchestrator.config().server.max_upload_bytes;

    Router::new()
        .merge(routes::api_routes(state))
        .layer(DefaultBodyLimit::disable())
        .layer(RequestBodyLimitLayer::new(max_upload))
        .layer(TraceLayer::new_for_http())
        .layer(build_cors_layer())
}
