//! Error types for the hexmemo engine.
//!
//! Every failure carries an [`ErrorKind`] category so it can be logged and
//! stored (see [`ErrorRecord`]) with a severity and structured context.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

/// All possible errors from the engine.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum Error {
    // Validation errors
    #[error("invalid color format: {0}")]
    InvalidFormat(String),

    #[error("unknown difficulty: {0}")]
    UnknownDifficulty(String),

    #[error("validation failed for '{field}': {reason}")]
    Validation { field: String, reason: String },

    // Storage errors
    #[error("storage unavailable: {0}")]
    StorageUnavailable(String),

    #[error("failed to write '{key}': {reason}")]
    StorageWrite { key: String, reason: String },

    #[error("invalid import: {0}")]
    InvalidImport(String),

    // State errors
    #[error("invalid state transition on {action}: {reason}")]
    InvalidStateTransition { action: String, reason: String },

    #[error("history index {index} out of range (len {len})")]
    IndexOutOfRange { index: usize, len: usize },

    #[error("serialization failed: {0}")]
    Serialization(String),
}

impl Error {
    /// Shorthand for a [`Error::Validation`].
    pub fn validation(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Error::Validation {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Shorthand for a [`Error::InvalidStateTransition`].
    pub fn transition(action: impl Into<String>, reason: impl Into<String>) -> Self {
        Error::InvalidStateTransition {
            action: action.into(),
            reason: reason.into(),
        }
    }

    /// The category this error belongs to.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::InvalidFormat(_)
            | Error::UnknownDifficulty(_)
            | Error::Validation { .. }
            | Error::InvalidImport(_) => ErrorKind::Validation,
            Error::StorageUnavailable(_) => ErrorKind::StorageUnavailable,
            Error::StorageWrite { .. } => ErrorKind::StorageWrite,
            Error::InvalidStateTransition { .. } | Error::IndexOutOfRange { .. } => {
                ErrorKind::InvalidStateTransition
            }
            Error::Serialization(_) => ErrorKind::Serialization,
        }
    }
}

/// Error category, used for logging and the in-state error buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Validation,
    StorageUnavailable,
    StorageWrite,
    InvalidStateTransition,
    Subscriber,
    Migration,
    Serialization,
}

impl ErrorKind {
    /// Default severity for errors of this kind.
    pub fn severity(self) -> Severity {
        match self {
            ErrorKind::StorageUnavailable | ErrorKind::Migration | ErrorKind::Subscriber => {
                Severity::Warning
            }
            ErrorKind::Validation | ErrorKind::InvalidStateTransition => Severity::Error,
            ErrorKind::StorageWrite | ErrorKind::Serialization => Severity::Critical,
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ErrorKind::Validation => "validation",
            ErrorKind::StorageUnavailable => "storage_unavailable",
            ErrorKind::StorageWrite => "storage_write",
            ErrorKind::InvalidStateTransition => "invalid_state_transition",
            ErrorKind::Subscriber => "subscriber",
            ErrorKind::Migration => "migration",
            ErrorKind::Serialization => "serialization",
        };
        f.write_str(name)
    }
}

/// How bad an error is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
    Error,
    Critical,
}

/// A loggable error with category, severity and structured context.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorRecord {
    pub kind: ErrorKind,
    pub severity: Severity,
    pub message: String,
    #[serde(default)]
    pub context: BTreeMap<String, String>,
    pub timestamp: DateTime<Utc>,
}

impl ErrorRecord {
    /// Build a record from an engine error.
    pub fn from_error(error: &Error, timestamp: DateTime<Utc>) -> Self {
        let kind = error.kind();
        Self {
            kind,
            severity: kind.severity(),
            message: error.to_string(),
            context: BTreeMap::new(),
            timestamp,
        }
    }

    /// Build a record with an explicit kind and message.
    pub fn new(kind: ErrorKind, message: impl Into<String>, timestamp: DateTime<Utc>) -> Self {
        Self {
            kind,
            severity: kind.severity(),
            message: message.into(),
            context: BTreeMap::new(),
            timestamp,
        }
    }

    /// Attach a context entry (action, key, field...).
    pub fn with_context(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.context.insert(key.into(), value.into());
        self
    }
}

/// Result type for engine operations.
pub type Result<T> = std::result::Result<T, Error>;
