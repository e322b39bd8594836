use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("permission denied: {0}")]
    PermissionDenied(String),

    #[error("invalid transition: {0}")]
    InvalidTransition(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("no courier available for request {0}")]
    NoCourierAvailable(String),

    #[error("collaborator unavailable: {0}")]
    CollaboratorUnavailable(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl DispatchError {
    /// Stable machine-readable kind, independent of the human message.
    pub fn kind(&self) -> &'static str {
        match self {
            DispatchError::Validation(_) => "validation",
            DispatchError::NotFound(_) => "not_found",
            DispatchError::PermissionDenied(_) => "permission_denied",
            DispatchError::InvalidTransition(_) => "invalid_transition",
            DispatchError::Conflict(_) => "conflict",
            DispatchError::NoCourierAvailable(_) => "no_courier_available",
            DispatchError::CollaboratorUnavailable(_) => "collaborator_unavailable",
            DispatchError::Internal(_) => "internal",
        }
    }
}

impl IntoResponse for DispatchError {
    fn into_response(self) -> Response {
        let status = match &self {
            DispatchError::Validation(_) => StatusCode::BAD_REQUEST,
            DispatchError::NotFound(_) => StatusCode::NOT_FOUND,
            DispatchError::PermissionDenied(_) => StatusCode::FORBIDDEN,
            DispatchError::InvalidTransition(_) | DispatchError::Conflict(_) => {
                StatusCode::CONFLICT
            }
            // an expected operational outcome, not an infrastructure fault;
            // the kind field lets callers tell the two apart
            DispatchError::NoCourierAvailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            DispatchError::CollaboratorUnavailable(_) => StatusCode::BAD_GATEWAY,
            DispatchError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let body = Json(json!({
            "kind": self.kind(),
            "error": self.to_string(),
        }));

        (status, body).into_response()
    }
}
