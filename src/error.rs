use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use tracing::error;

use crate::auth::repo::RepoError;

/// Request-level failure, rendered as `{ "message": ... }` with the matching status.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    PayloadTooLarge(String),

    #[error("{0}")]
    Conflict(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Unauthorized(String),

    /// Internal failure with a message that is safe to show the client.
    #[error("{0}")]
    Internal(String),

    #[error(transparent)]
    Unexpected(#[from] anyhow::Error),
}

impl AppError {
    /// Maps an extractor rejection, keeping 413 for bodies over the limit.
    pub fn from_rejection(status: StatusCode, message: String) -> Self {
        if status == StatusCode::PAYLOAD_TOO_LARGE {
            AppError::PayloadTooLarge(message)
        } else {
            AppError::Validation(message)
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::Internal(_) | AppError::Unexpected(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<RepoError> for AppError {
    fn from(e: RepoError) -> Self {
        match e {
            RepoError::Duplicate => AppError::Conflict("User already exists".into()),
            RepoError::Database(e) => AppError::Unexpected(anyhow::Error::new(e).context("user store")),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match self {
            AppError::Unexpected(e) => {
                error!(error = ?e, "unexpected error");
                "Internal server error".to_string()
            }
            AppError::Internal(msg) => {
                error!(error = %msg, "internal error");
                msg
            }
            other => other.to_string(),
        };
        (status, Json(json!({ "message": message }))).into_response()
    }
}

pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    async fn body_of(err: AppError) -> (StatusCode, serde_json::Value) {
        let response = err.into_response();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn client_errors_keep_their_message() {
        let (status, body) = body_of(AppError::Conflict("User already exists".into())).await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["message"], "User already exists");

        let (status, _) = body_of(AppError::Validation("x".into())).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        let (status, _) = body_of(AppError::NotFound("x".into())).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        let (status, _) = body_of(AppError::Unauthorized("x".into())).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn unexpected_errors_hide_details() {
        let err = AppError::from(anyhow::anyhow!("connection reset by peer at 10.0.0.3"));
        let (status, body) = body_of(err).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["message"], "Internal server error");
    }

    #[test]
    fn rejections_keep_payload_too_large() {
        let err = AppError::from_rejection(StatusCode::PAYLOAD_TOO_LARGE, "too big".into());
        assert_eq!(err.status(), StatusCode::PAYLOAD_TOO_LARGE);

        let err = AppError::from_rejection(StatusCode::UNSUPPORTED_MEDIA_TYPE, "bad type".into());
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn duplicate_store_error_maps_to_conflict() {
        let err = AppError::from(RepoError::Duplicate);
        assert_eq!(err.status(), StatusCode::CONFLICT);
    }
}
