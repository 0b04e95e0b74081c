use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;
use tracing::{error, warn};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SchedulerError {
    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl SchedulerError {
    pub fn validation<T: Into<String>>(msg: T) -> Self {
        SchedulerError::Validation(msg.into())
    }

    pub fn not_found<T: Into<String>>(msg: T) -> Self {
        SchedulerError::NotFound(msg.into())
    }

    pub fn conflict<T: Into<String>>(msg: T) -> Self {
        SchedulerError::Conflict(msg.into())
    }

    pub fn unauthorized<T: Into<String>>(msg: T) -> Self {
        SchedulerError::Unauthorized(msg.into())
    }

    pub fn internal<T: Into<String>>(msg: T) -> Self {
        SchedulerError::Internal(msg.into())
    }

    pub fn kind(&self) -> &'static str {
        match self {
            SchedulerError::Validation(_) => "validation",
            SchedulerError::NotFound(_) => "not_found",
            SchedulerError::Conflict(_) => "conflict",
            SchedulerError::Unauthorized(_) => "unauthorized",
            SchedulerError::Internal(_) => "internal",
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            SchedulerError::Validation(_) => StatusCode::BAD_REQUEST,
            SchedulerError::NotFound(_) => StatusCode::NOT_FOUND,
            SchedulerError::Conflict(_) => StatusCode::CONFLICT,
            SchedulerError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            SchedulerError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<validator::ValidationErrors> for SchedulerError {
    fn from(errors: validator::ValidationErrors) -> Self {
        SchedulerError::Validation(errors.to_string())
    }
}

impl IntoResponse for SchedulerError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            error!(err = %self, "Request failed");
        } else {
            warn!(err = %self, "Request rejected");
        }

        let body = Json(json!({
            "success": false,
            "message": self.to_string(),
            "kind": self.kind(),
        }));

        (status, body).into_response()
    }
}
