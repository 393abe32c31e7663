use std::path::{Path, PathBuf};

use tracing::info;

use crate::{DuiError, Result};

/// Destructive filesystem operation for a batch of paths. The batch either
/// succeeds as a whole or reports failure.
pub trait Deleter: Send + Sync {
    fn delete(&self, paths: &[PathBuf]) -> Result<()>;
}

/// Permanently removes files and directory trees
#[derive(Debug, Clone, Copy, Default)]
pub struct FsDeleter;

impl Deleter for FsDeleter {
    fn delete(&self, paths: &[PathBuf]) -> Result<()> {
        for path in paths {
            remove_path(path)
                .map_err(|e| DuiError::DeletionFailed(format!("{}: {}", path.display(), e)))?;
            info!(path = %path.display(), "deleted");
        }
        Ok(())
    }
}

fn remove_path(path: &Path) -> std::io::Result<()> {
    let meta = std::fs::symlink_metadata(path)?;
    if meta.is_dir() {
        std::fs::remove_dir_all(path)
    } else {
        std::fs::remove_file(path)
    }
}
