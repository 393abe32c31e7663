use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DuiError {
    #[error("Path does not exist: {0}")]
    PathNotFound(PathBuf),

    #[error("Path is not a directory: {0}")]
    NotADirectory(PathBuf),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to start {program}: {source}")]
    ProbeSpawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Scan failed: {0}")]
    ScanFailed(String),

    #[error("Volume probe failed: {0}")]
    VolumeProbeFailed(String),

    #[error("Deletion failed: {0}")]
    DeletionFailed(String),

    #[error("Cache error: {0}")]
    Cache(String),
}

pub type Result<T> = std::result::Result<T, DuiError>;
