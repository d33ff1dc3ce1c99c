use crate::services::providers::ProviderError;
use crate::services::upload_service::UploadServiceError;
use crate::services::uploader::UploadError;
use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Database error: {0}")]
    Database(#[from] sea_orm::DbErr),

    #[error("Bad Request: {0}")]
    BadRequest(String),

    #[error("Not Found: {0}")]
    NotFound(String),

    #[error("Internal Server Error: {0}")]
    Internal(String),

    #[error("Payload Too Large: {0}")]
    PayloadTooLarge(String),

    #[error("Request Timeout: {0}")]
    Timeout(String),

    #[error("Upstream Transfer Failed: {0}")]
    Transport(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Anyhow error: {0}")]
    Anyhow(#[from] anyhow::Error),
}

impl From<ProviderError> for AppError {
    fn from(err: ProviderError) -> Self {
        match err {
            ProviderError::LoadFailed(e) => AppError::Database(e),
            other => AppError::Configuration(other.to_string()),
        }
    }
}

impl From<UploadServiceError> for AppError {
    fn from(err: UploadServiceError) -> Self {
        match err {
            UploadServiceError::MissingExtension => AppError::BadRequest(err.to_string()),
            UploadServiceError::FileTooLarge { .. } => AppError::PayloadTooLarge(err.to_string()),
            UploadServiceError::Provider(e) => e.into(),
            // Transport failures keep a kind of their own so callers can
            // tell a retryable transfer problem from a validation reject.
            UploadServiceError::Transfer(e) => match e {
                UploadError::TimedOut => {
                    AppError::Timeout("upload timed out; retry or use a smaller file".into())
                }
                UploadError::Cancelled => {
                    AppError::Transport("upload was cancelled before it completed".into())
                }
                UploadError::Failed(source) => AppError::Internal(source.to_string()),
            },
            UploadServiceError::Database(e) => AppError::Database(e),
            UploadServiceError::FileNotFound => AppError::NotFound("file not found".into()),
            UploadServiceError::Internal(e) => AppError::Anyhow(e),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            AppError::Database(e) => {
                tracing::error!("Database error: {:?}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal Server Error".to_string(),
                )
            }
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            AppError::Internal(msg) => {
                tracing::error!("Internal error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal Server Error".to_string(),
                )
            }
            AppError::PayloadTooLarge(msg) => (StatusCode::PAYLOAD_TOO_LARGE, msg),
            AppError::Timeout(msg) => (StatusCode::REQUEST_TIMEOUT, msg),
            AppError::Transport(msg) => (StatusCode::BAD_GATEWAY, msg),
            AppError::Configuration(msg) => {
                tracing::error!("Configuration error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal Server Error".to_string(),
                )
            }
            AppError::Anyhow(e) => {
                tracing::error!("Anyhow error: {:?}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal Server Error".to_string(),
                )
            }
        };

        let body = Json(json!({
            "error": message
        }));

        (status, body).into_response()
    }
}
