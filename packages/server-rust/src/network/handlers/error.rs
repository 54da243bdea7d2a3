//! Maps registry errors onto HTTP responses.
//!
//! Every failure becomes `{"error": {"kind": ..., "message": ...}}` with a
//! status chosen by kind. Internal errors are logged in full and reported
//! to the client without detail.

use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use tracing::error;

use crate::error::ScoringError;

/// HTTP status for each error kind.
#[must_use]
pub fn status_for(err: &ScoringError) -> StatusCode {
    match err {
        ScoringError::InvalidArgument(_) | ScoringError::MalformedMetainfo { .. } => {
            StatusCode::BAD_REQUEST
        }
        ScoringError::NotFound { .. } => StatusCode::NOT_FOUND,
        ScoringError::Conflict { .. } => StatusCode::CONFLICT,
        ScoringError::Timeout { .. } => StatusCode::GATEWAY_TIMEOUT,
        ScoringError::InvalidOutput { .. } => StatusCode::BAD_GATEWAY,
        ScoringError::Overloaded { .. } | ScoringError::Cancelled { .. } => {
            StatusCode::SERVICE_UNAVAILABLE
        }
        ScoringError::ExecutionError { .. } | ScoringError::Internal(_) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

impl IntoResponse for ScoringError {
    fn into_response(self) -> Response {
        let status = status_for(&self);
        let message = match &self {
            ScoringError::Internal(e) => {
                error!(error = ?e, "internal error");
                "internal error".to_string()
            }
            other => other.to_string(),
        };
        let body = json!({
            "error": {
                "kind": self.kind(),
                "message": message,
            }
        });
        (status, Json(body)).into_response()
    }
}

impl From<JsonRejection> for ScoringError {
    fn from(rejection: JsonRejection) -> Self {
        Self::InvalidArgument(rejection.body_text())
    }
}

impl From<QueryRejection> for ScoringError {
    fn from(rejection: QueryRejection) -> Self {
        Self::InvalidArgument(rejection.body_text())
    }
}
