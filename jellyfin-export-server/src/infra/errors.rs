use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use std::fmt;

use jellyfin_export_core::{ExportError, sync::SyncError};

pub type AppResult<T> = Result<T, AppError>;

#[derive(Debug)]
pub struct AppError {
    pub status: StatusCode,
    pub message: String,
}

impl AppError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, message)
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, message)
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new(StatusCode::CONFLICT, message)
    }

    pub fn unprocessable(message: impl Into<String>) -> Self {
        Self::new(StatusCode::UNPROCESSABLE_ENTITY, message)
    }

    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::new(StatusCode::SERVICE_UNAVAILABLE, message)
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for AppError {}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = Json(json!({
            "error": {
                "message": self.message,
                "status": self.status.as_u16(),
            }
        }));

        (self.status, body).into_response()
    }
}

impl From<ExportError> for AppError {
    fn from(err: ExportError) -> Self {
        match err {
            ExportError::NotFound(msg) => Self::not_found(msg),
            ExportError::InvalidSettings(msg) => Self::bad_request(msg),
            ExportError::LockUnavailable(msg) => Self::unavailable(msg),
            ExportError::Database(msg) => {
                tracing::error!(error = %msg, "database operation failed");
                Self::internal("Database operation failed")
            }
            other => Self::internal(other.to_string()),
        }
    }
}

impl From<SyncError> for AppError {
    fn from(err: SyncError) -> Self {
        match err {
            SyncError::Disabled => Self::conflict(err.to_string()),
            SyncError::LibraryNotFound(_) => Self::not_found(err.to_string()),
            SyncError::LibraryRootMissing(_) => Self::unprocessable(err.to_string()),
            SyncError::Storage(inner) => inner.into(),
        }
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        Self::internal(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sync_errors_keep_their_message() {
        let disabled = AppError::from(SyncError::Disabled);
        assert_eq!(disabled.status, StatusCode::CONFLICT);
        assert_eq!(disabled.message, "Jellyfin Export is disabled.");

        let missing = AppError::from(SyncError::LibraryNotFound("Anime".into()));
        assert_eq!(missing.status, StatusCode::NOT_FOUND);
        assert_eq!(missing.message, "Library not found or disabled: Anime");
    }

    #[test]
    fn database_details_are_not_leaked() {
        let err = AppError::from(SyncError::Storage(ExportError::Database(
            "password authentication failed".into(),
        )));
        assert_eq!(err.status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(err.message, "Database operation failed");
    }
}
