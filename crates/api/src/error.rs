use axum::{Json, http::StatusCode, response::IntoResponse};
use dernek_domain::error::WorkflowError;
use dernek_domain::ports::applications::StoreError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("validation failed: {0}")]
    Validation(String),
    #[error("{0}")]
    InvalidTransition(String),
    #[error("unauthorized")]
    Unauthorized,
    #[error("forbidden: {0}")]
    Forbidden(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("storage timed out; re-read before retrying")]
    Timeout,
    #[error("internal error")]
    Internal,
}

impl ApiError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::Validation(_) | ApiError::InvalidTransition(_) => StatusCode::BAD_REQUEST,
            ApiError::Unauthorized => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden(_) => StatusCode::FORBIDDEN,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::Timeout => StatusCode::GATEWAY_TIMEOUT,
            ApiError::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn error_code(&self) -> &'static str {
        match self {
            ApiError::Validation(_) => "VALIDATION",
            ApiError::InvalidTransition(_) => "INVALID_TRANSITION",
            ApiError::Unauthorized => "UNAUTHORIZED",
            ApiError::Forbidden(_) => "FORBIDDEN",
            ApiError::NotFound(_) => "NOT_FOUND",
            ApiError::Conflict(_) => "CONFLICT",
            ApiError::Timeout => "TIMEOUT",
            ApiError::Internal => "INTERNAL",
        }
    }

    /// Whether a retry with the same request id could succeed. Such
    /// outcomes are not recorded for replay.
    pub fn is_transient(&self) -> bool {
        matches!(self, ApiError::Timeout | ApiError::Internal)
    }

    pub fn envelope(&self) -> serde_json::Value {
        serde_json::json!({
            "error": {
                "code": self.error_code(),
                "message": self.to_string(),
            }
        })
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(id) => ApiError::NotFound(format!("application {id}")),
            err @ (StoreError::StaleStage { .. } | StoreError::Conflict(_)) => {
                ApiError::Conflict(err.to_string())
            }
            StoreError::Timeout => ApiError::Timeout,
            err @ (StoreError::Unavailable(_) | StoreError::Operation(_)) => {
                tracing::error!(error = %err, "application store failed");
                ApiError::Internal
            }
        }
    }
}

impl From<WorkflowError> for ApiError {
    fn from(err: WorkflowError) -> Self {
        match err {
            err @ WorkflowError::InvalidTransition { .. } => {
                ApiError::InvalidTransition(err.to_string())
            }
            WorkflowError::Forbidden(message) => ApiError::Forbidden(message),
            WorkflowError::Validation(message) => ApiError::Validation(message),
            WorkflowError::Store(err) => err.into(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        (self.status_code(), Json(self.envelope())).into_response()
    }
}
