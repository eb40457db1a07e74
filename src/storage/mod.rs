//! Persistent storage
//!
//! Settings persistence and loading of the local document set used as prompt context.

pub mod documents;
pub mod settings;

use directories::ProjectDirs;
use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while reading or writing local files
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Could not determine the data directory")]
    NoDataDir,

    #[error("Not a directory: {}", .0.display())]
    NotADirectory(PathBuf),
}

/// Platform data directory of the application
pub fn get_data_dir() -> Result<PathBuf, StorageError> {
    ProjectDirs::from("", "", "textgen")
        .map(|dirs| dirs.data_dir().to_path_buf())
        .ok_or(StorageError::NoDataDir)
}
