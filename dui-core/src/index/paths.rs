use std::path::{Component, Path, PathBuf};

/// Lexically normalize a path: drops `.` components, resolves `..` against
/// the preceding component and strips trailing separators. Never touches the
/// filesystem, so it works for paths that no longer exist.
pub fn normalize_path(path: impl AsRef<Path>) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.as_ref().components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() && !out.has_root() {
                    out.push("..");
                }
            }
            other => out.push(other.as_os_str()),
        }
    }
    if out.as_os_str().is_empty() {
        out.push(".");
    }
    out
}

/// Absolute, lexically normalized form of `path`, resolved against the
/// current directory when relative. Falls back to the normalized input when
/// the current directory is unavailable.
pub fn absolute_path(path: impl AsRef<Path>) -> PathBuf {
    let path = path.as_ref();
    match std::path::absolute(path) {
        Ok(abs) => normalize_path(abs),
        Err(_) => normalize_path(path),
    }
}

/// Whether `path` is `root` or lies below it (component-wise, both normalized)
pub fn is_within(path: &Path, root: &Path) -> bool {
    path.starts_with(root)
}

/// Whether `path` lies strictly below `root`
pub fn is_strictly_within(path: &Path, root: &Path) -> bool {
    path != root && path.starts_with(root)
}

/// Display name of a path: its last component, or the whole path for `/`
pub fn entry_name(path: &Path) -> String {
    path.file_name()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| path.to_string_lossy().to_string())
}
