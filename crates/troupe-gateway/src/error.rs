//! Mapping of team errors to HTTP responses.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use tracing::{error, warn};
use troupe_core::TeamError;

/// Wrapper so handlers can `?` any [`TeamError`].
#[derive(Debug)]
pub struct ApiError(pub TeamError);

pub type ApiResult<T> = Result<T, ApiError>;

impl From<TeamError> for ApiError {
    fn from(e: TeamError) -> Self {
        ApiError(e)
    }
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match &self.0 {
            TeamError::NotFound { .. } => StatusCode::NOT_FOUND,
            TeamError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            TeamError::Conflict(_) => StatusCode::CONFLICT,
            TeamError::Generation(_) | TeamError::InvalidOutput(_) => StatusCode::BAD_GATEWAY,
            TeamError::Timeout { .. } => StatusCode::GATEWAY_TIMEOUT,
            TeamError::Configuration(_) => StatusCode::SERVICE_UNAVAILABLE,
            TeamError::Persistence(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let detail = self.0.to_string();
        if status.is_server_error() {
            error!(status = status.as_u16(), "Request failed: {detail}");
        } else {
            warn!(status = status.as_u16(), "Request rejected: {detail}");
        }
        let body = json!({
            "status": "error",
            "kind": self.0.kind(),
            "detail": detail,
        });
        (status, axum::Json(body)).into_response()
    }
}
