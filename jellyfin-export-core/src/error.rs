use thiserror::Error;

#[derive(Error, Debug)]
pub enum ExportError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid settings: {0}")]
    InvalidSettings(String),

    #[error("Lock unavailable: {0}")]
    LockUnavailable(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Operation cancelled: {0}")]
    Cancelled(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

#[cfg(feature = "database")]
impl From<sqlx::Error> for ExportError {
    fn from(err: sqlx::Error) -> Self {
        ExportError::Database(err.to_string())
    }
}

#[cfg(feature = "database")]
impl From<sqlx::migrate::MigrateError> for ExportError {
    fn from(err: sqlx::migrate::MigrateError) -> Self {
        ExportError::Database(format!("migration failed: {err}"))
    }
}

#[cfg(feature = "database")]
impl From<redis::RedisError> for ExportError {
    fn from(err: redis::RedisError) -> Self {
        ExportError::LockUnavailable(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, ExportError>;
