use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ComicMergeError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Archive error: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Unreadable archive {}: {reason}", path.display())]
    UnreadableArchive { path: PathBuf, reason: String },

    #[error("Archive {} contains no pages", path.display())]
    EmptyArchive { path: PathBuf },

    #[error("Nothing to merge: no pages found in {sources} sources ({skipped} skipped)")]
    NothingToMerge { sources: usize, skipped: usize },

    #[error("Failed to write chunk {chunk} to {}: {reason}", path.display())]
    WriteError {
        path: PathBuf,
        chunk: usize,
        reason: String,
    },

    #[error("Invalid configuration: {reason}")]
    InvalidConfiguration { reason: String },

    #[error("Anyhow error: {0}")]
    Anyhow(#[from] anyhow::Error),
}

impl ComicMergeError {
    pub(crate) fn unreadable(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        ComicMergeError::UnreadableArchive {
            path: path.into(),
            reason: reason.to_string(),
        }
    }

    pub(crate) fn invalid(reason: impl Into<String>) -> Self {
        ComicMergeError::InvalidConfiguration {
            reason: reason.into(),
        }
    }

    /// Failures that abort a whole merge invocation.
    pub fn is_fatal(&self) -> bool {
        !matches!(
            self,
            ComicMergeError::UnreadableArchive { .. } | ComicMergeError::EmptyArchive { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, ComicMergeError>;
