//! Unified error handling for the app.

use crate::config::ConfigError;

/// Application error type.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("engine error: {0}")]
    Engine(#[from] hexmemo_engine::Error),

    #[error("storage error: {0}")]
    Storage(#[from] hexmemo_engine::BackendError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("unknown command: {0}")]
    UnknownCommand(String),

    #[error("usage: {0}")]
    Usage(&'static str),
}

impl AppError {
    /// Whether the loop can report this error and keep going.
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, AppError::Config(_) | AppError::Io(_))
    }
}

/// Result type alias for the app.
pub type Result<T> = std::result::Result<T, AppError>;
