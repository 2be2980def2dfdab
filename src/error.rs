use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::users::repo::StoreError;

/// Client-facing error taxonomy. Every variant maps to one status code and
/// renders as a `{"detail": ...}` JSON body.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    Conflict(String),
    #[error("{0}")]
    NotFound(String),
    #[error("Invalid credentials")]
    InvalidCredentials,
    #[error("{0}")]
    Unauthorized(String),
    #[error("{0}")]
    BadRequest(String),
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::InvalidCredentials | ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let detail = match &self {
            // Storage failures carry connection details; log them, return a
            // generic message.
            ApiError::Internal(e) => {
                tracing::error!(error = %e, "internal error");
                "Internal server error".to_string()
            }
            other => other.to_string(),
        };
        (status, Json(json!({ "detail": detail }))).into_response()
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Conflict(field) => ApiError::Conflict(format!("{field} already taken")),
            StoreError::NotFound => ApiError::NotFound("User not found".into()),
            StoreError::Sqlx(e) => ApiError::Internal(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn conflict_maps_to_409() {
        let err = ApiError::from(StoreError::Conflict("username".into()));
        assert_eq!(err.status(), StatusCode::CONFLICT);
        assert_eq!(err.to_string(), "username already taken");
    }

    #[test]
    fn not_found_maps_to_404() {
        assert_eq!(
            ApiError::from(StoreError::NotFound).status(),
            StatusCode::NOT_FOUND
        );
    }

    #[test]
    fn invalid_credentials_does_not_leak_which_part_failed() {
        assert_eq!(ApiError::InvalidCredentials.to_string(), "Invalid credentials");
        assert_eq!(ApiError::InvalidCredentials.status(), StatusCode::UNAUTHORIZED);
    }
}
