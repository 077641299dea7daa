use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

/// Error taxonomy for the whole service, mapped to HTTP status codes per the
/// "Error Handling Design" contract: anything that happens before a
/// successful metadata-transaction commit leaves no observable effect.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("not found")]
    NotFound,
    #[error("validation error: {0}")]
    ValidationError(String),
    #[error("payload too large")]
    TooLarge,
    #[error("unsupported mime type: {0}")]
    UnsupportedMime(String),
    #[error("source blob missing")]
    SourceMissing,
    #[error("codec error: {0}")]
    CodecError(String),
    #[error("storage error: {0}")]
    StorageError(String),
    #[error("metadata error: {0}")]
    MetadataError(#[from] sqlx::Error),
    #[error("cache error: {0}")]
    CacheError(String),
    #[error("lock not acquired before timeout")]
    ConcurrencyError,
    #[error("protocol error: {0}")]
    ProtocolError(String),
    #[error("nothing to undo")]
    NothingToUndo,
    #[error("cannot undo the original")]
    CannotUndoOriginal,
    #[error("revision history corrupted: {0}")]
    Corrupted(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            AppError::NotFound => (StatusCode::NOT_FOUND, self.to_string()),
            AppError::ValidationError(_) => (StatusCode::BAD_REQUEST, self.to_string()),
            AppError::TooLarge => (StatusCode::PAYLOAD_TOO_LARGE, self.to_string()),
            AppError::UnsupportedMime(_) => (StatusCode::UNSUPPORTED_MEDIA_TYPE, self.to_string()),
            AppError::SourceMissing => {
                tracing::error!("source blob missing");
                (StatusCode::INTERNAL_SERVER_ERROR, "internal server error".into())
            }
            AppError::CodecError(msg) => {
                tracing::warn!("codec error: {msg}");
                (StatusCode::UNPROCESSABLE_ENTITY, "cannot decode image".into())
            }
            AppError::StorageError(msg) => {
                tracing::error!("storage error: {msg}");
                (StatusCode::INTERNAL_SERVER_ERROR, "internal server error".into())
            }
            AppError::MetadataError(e) => {
                tracing::error!("metadata error: {e:?}");
                (StatusCode::INTERNAL_SERVER_ERROR, "internal server error".into())
            }
            AppError::CacheError(msg) => {
                tracing::error!("cache error: {msg}");
                (StatusCode::INTERNAL_SERVER_ERROR, "internal server error".into())
            }
            AppError::ConcurrencyError => (StatusCode::SERVICE_UNAVAILABLE, self.to_string()),
            AppError::ProtocolError(_) => (StatusCode::BAD_REQUEST, self.to_string()),
            AppError::NothingToUndo | AppError::CannotUndoOriginal => {
                (StatusCode::BAD_REQUEST, self.to_string())
            }
            AppError::Corrupted(msg) => {
                tracing::error!("corrupted revision history: {msg}");
                (StatusCode::INTERNAL_SERVER_ERROR, "internal server error".into())
            }
        };
        let body = Json(json!({ "error": message }));
        (status, body).into_response()
    }
}

pub type AppResult<T> = Result<T, AppError>;
