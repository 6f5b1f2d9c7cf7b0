//! Error envelope for every non-2xx response: `{ "error": "<message>" }`.
//!
//! Successful analyses return the reasoning service's text untouched, so
//! there is no success envelope.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;

use crate::analysis::AnalysisError;

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: String,
}

/// Build `(status, {"error": msg})`.
pub fn error_response(status: StatusCode, msg: impl Into<String>) -> Response {
    (status, axum::Json(ErrorBody { error: msg.into() })).into_response()
}

impl IntoResponse for AnalysisError {
    fn into_response(self) -> Response {
        let status = if self.is_client_error() {
            StatusCode::BAD_REQUEST
        } else {
            StatusCode::INTERNAL_SERVER_ERROR
        };
        error_response(status, self.to_string())
    }
}
