use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::{json, Value};

use crate::feed::domain::FieldError;
use crate::feed::repository::RepositoryError;
use crate::feed::service::FeedError;

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Not authenticated.")]
    Unauthenticated,

    #[error("Invalid email or password.")]
    InvalidCredentials,

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Validation failed, entered data is incorrect.")]
    Validation(Vec<FieldError>),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error(transparent)]
    Feed(#[from] FeedError),

    #[error("Storage error: {0}")]
    Storage(#[from] RepositoryError),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    fn internal(detail: &dyn std::fmt::Display) -> (StatusCode, String, Option<Value>) {
        tracing::error!("Request failed: {}", detail);
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            "Internal server error".to_string(),
            None,
        )
    }

    fn parts(&self) -> (StatusCode, String, Option<Value>) {
        match self {
            AppError::Unauthenticated | AppError::InvalidCredentials => {
                (StatusCode::UNAUTHORIZED, self.to_string(), None)
            }
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg.clone(), None),
            AppError::Validation(problems) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                self.to_string(),
                Some(json!(problems)),
            ),
            AppError::Conflict(msg) => (StatusCode::CONFLICT, msg.clone(), None),
            AppError::Feed(err) => match err {
                FeedError::Validation(problems) => (
                    StatusCode::UNPROCESSABLE_ENTITY,
                    err.to_string(),
                    Some(json!(problems)),
                ),
                FeedError::MissingAsset => {
                    (StatusCode::UNPROCESSABLE_ENTITY, err.to_string(), None)
                }
                FeedError::NotFound => (StatusCode::NOT_FOUND, err.to_string(), None),
                FeedError::Forbidden => (StatusCode::FORBIDDEN, err.to_string(), None),
                FeedError::Storage(_) | FeedError::Asset(_) => Self::internal(err),
            },
            AppError::Storage(e) => Self::internal(e),
            AppError::Internal(msg) => Self::internal(msg),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message, data) = self.parts();

        let body = match data {
            Some(data) => json!({ "message": message, "data": data }),
            None => json!({ "message": message }),
        };

        (status, Json(body)).into_response()
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        AppError::BadRequest(rejection.body_text())
    }
}

pub type AppResult<T> = Result<T, AppError>;
