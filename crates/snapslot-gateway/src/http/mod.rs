pub mod classes;
pub mod health;
pub mod reservations;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

use snapslot_scheduler::SchedulerError;

/// JSON error body shared by every API route: `{ "error", "error_type" }`.
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub error: String,
    pub error_type: &'static str,
}

impl ApiError {
    pub fn invalid_request(error: impl Into<String>) -> Self {
        Self {
            status: StatusCode::UNPROCESSABLE_ENTITY,
            error: error.into(),
            error_type: "INVALID_REQUEST",
        }
    }
}

impl From<SchedulerError> for ApiError {
    fn from(e: SchedulerError) -> Self {
        let status = match &e {
            SchedulerError::InvalidRequest(_) | SchedulerError::TooLate { .. } => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            SchedulerError::Duplicate { .. } | SchedulerError::AlreadyFinished { .. } => {
                StatusCode::CONFLICT
            }
            SchedulerError::RunNotFound { .. } => StatusCode::NOT_FOUND,
        };
        Self {
            status,
            error: e.to_string(),
            error_type: e.code(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(json!({
            "error": self.error,
            "error_type": self.error_type,
        }));
        (self.status, body).into_response()
    }
}
