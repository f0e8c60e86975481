//! Error types for mltracker
//!
//! Every variant resolves to an [`ErrorKind`] so callers can decide whether to
//! retry, fetch-and-continue, or abort.

use std::path::PathBuf;

use rusqlite::ErrorCode;
use thiserror::Error;

use crate::storage::ParamsCodecError;

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// Coarse classification of an [`Error`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// A lookup by name or id found nothing.
    NotFound,
    /// A uniqueness or foreign-key constraint rejected a write.
    ConstraintViolation,
    /// A directory that must be fresh already exists.
    FilesystemConflict,
    /// One half of a two-store operation failed.
    PartialFailure,
    /// The caller used the API out of order or with invalid input.
    Precondition,
    /// The database, filesystem, or codec failed underneath us.
    Backend,
}

/// mltracker error types
#[derive(Error, Debug)]
pub enum Error {
    /// Experiment or run lookup found nothing
    #[error("{entity} not found: {key}")]
    NotFound {
        /// Entity kind ("experiment", "run")
        entity: &'static str,
        /// Name or id that was looked up
        key: String,
    },

    /// Duplicate experiment name, duplicate (experiment, run name), or dangling reference
    #[error("Constraint violation: {0}")]
    ConstraintViolation(String),

    /// Fresh run directory collided with an existing path
    #[error("Directory already exists: {}", .0.display())]
    DirectoryExists(PathBuf),

    /// Experiment deletion only partly succeeded
    #[error(
        "Partial deletion of experiment '{experiment}': directory removed = {directory_removed}, rows deleted = {rows_deleted}\nRun `Session::reconcile` to repair the directory tree."
    )]
    PartialDeletion {
        /// Experiment name
        experiment: String,
        /// Whether the experiment directory was removed
        directory_removed: bool,
        /// Whether the experiment row was deleted
        rows_deleted: bool,
    },

    /// Operation needs a bound experiment
    #[error("No experiment bound: call `bind_experiment`, `start` or `resume` first")]
    NoExperimentBound,

    /// Operation needs a bound run
    #[error("No run bound: call `start` or `resume` before logging metrics or params")]
    NoRunBound,

    /// Database connection was closed
    #[error("Database connection is closed")]
    Closed,

    /// Experiment or run name cannot be used as a directory name
    #[error("Invalid name '{name}': {reason}")]
    InvalidName {
        /// Offending name
        name: String,
        /// Why it was rejected
        reason: &'static str,
    },

    /// Configuration failed validation
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Params blob could not be encoded or decoded
    #[error("Params codec error: {0}")]
    Params(#[from] ParamsCodecError),

    /// SQLite error other than a constraint violation
    #[error("Database error: {0}")]
    Database(rusqlite::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Classify this error.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::ConstraintViolation(_) => ErrorKind::ConstraintViolation,
            Self::DirectoryExists(_) => ErrorKind::FilesystemConflict,
            Self::PartialDeletion { .. } => ErrorKind::PartialFailure,
            Self::NoExperimentBound
            | Self::NoRunBound
            | Self::Closed
            | Self::InvalidName { .. }
            | Self::InvalidConfig(_) => ErrorKind::Precondition,
            Self::Params(_) | Self::Database(_) | Self::Io(_) => ErrorKind::Backend,
        }
    }

    /// Shorthand for a [`Error::NotFound`].
    pub fn not_found(entity: &'static str, key: impl ToString) -> Self {
        Self::NotFound {
            entity,
            key: key.to_string(),
        }
    }

    /// True when the error is a constraint violation (fetch-after-conflict candidates).
    #[must_use]
    pub const fn is_constraint_violation(&self) -> bool {
        matches!(self, Self::ConstraintViolation(_))
    }
}

impl From<rusqlite::Error> for Error {
    fn from(err: rusqlite::Error) -> Self {
        match err {
            rusqlite::Error::SqliteFailure(ref failure, ref message)
                if failure.code == ErrorCode::ConstraintViolation =>
            {
                Self::ConstraintViolation(
                    message.clone().unwrap_or_else(|| failure.to_string()),
                )
            }
            other => Self::Database(other),
        }
    }
}
