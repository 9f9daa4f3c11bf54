use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum BackupError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Cannot open archive {}: {reason}", path.display())]
    ArchiveOpen { path: PathBuf, reason: String },

    #[error("Cannot commit archive {}: {reason}", path.display())]
    ArchiveCommit { path: PathBuf, reason: String },

    #[error("Cannot scan {}: {reason}", path.display())]
    Scan { path: PathBuf, reason: String },

    #[error("Stream copy failed for {}: {reason}", path.display())]
    Stream { path: PathBuf, reason: String },

    #[error("Invalid folder filter '{pattern}': {reason}")]
    InvalidFilter { pattern: String, reason: String },

    #[error("Invalid backup name '{name}'")]
    InvalidName { name: String },

    #[error("Blocked unsafe entry path '{entry}'")]
    UnsafeEntryPath { entry: String },
}

impl BackupError {
    pub(crate) fn stream(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        BackupError::Stream {
            path: path.into(),
            reason: reason.to_string(),
        }
    }

    pub(crate) fn open(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        BackupError::ArchiveOpen {
            path: path.into(),
            reason: reason.to_string(),
        }
    }

    pub(crate) fn commit(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        BackupError::ArchiveCommit {
            path: path.into(),
            reason: reason.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, BackupError>;
