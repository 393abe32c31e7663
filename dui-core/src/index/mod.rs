mod entry;
mod paths;

pub use entry::{FolderSnapshot, RESTRICTED_LABEL, UsageEntry};
pub use paths::{absolute_path, entry_name, is_strictly_within, is_within, normalize_path};

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Disk usage index: normalized parent directory -> its listing.
///
/// Folders whose listing is empty are never stored, so every key names at
/// least one entry's parent.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageIndex {
    folders: BTreeMap<PathBuf, FolderSnapshot>,
}

impl UsageIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert the listing for `parent`, replacing any previous one. Empty
    /// listings are not stored (and remove an existing key).
    pub fn insert_folder(&mut self, parent: PathBuf, mut folder: FolderSnapshot) {
        if folder.is_empty() {
            self.folders.remove(&parent);
            return;
        }
        folder.sort_accessible();
        self.folders.insert(parent, folder);
    }

    /// Listing for a directory
    pub fn folder(&self, parent: &Path) -> Option<&FolderSnapshot> {
        self.folders.get(parent)
    }

    pub fn contains_folder(&self, parent: &Path) -> bool {
        self.folders.contains_key(parent)
    }

    /// Number of folders
    pub fn len(&self) -> usize {
        self.folders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.folders.is_empty()
    }

    /// Number of entries (accessible and restricted) across all folders
    pub fn entry_count(&self) -> usize {
        self.folders.values().map(FolderSnapshot::len).sum()
    }

    /// Iterator over `(parent, listing)` in path order
    pub fn iter(&self) -> impl Iterator<Item = (&PathBuf, &FolderSnapshot)> {
        self.folders.iter()
    }

    /// The `limit` largest accessible entries anywhere in the index
    pub fn largest(&self, limit: usize) -> Vec<&UsageEntry> {
        let mut entries: Vec<&UsageEntry> = self
            .folders
            .values()
            .flat_map(|f| f.accessible.iter())
            .collect();
        entries.sort_by(|a, b| {
            b.size_bytes
                .cmp(&a.size_bytes)
                .then_with(|| a.path.cmp(&b.path))
        });
        entries.truncate(limit);
        entries
    }

    pub(crate) fn into_folders(self) -> BTreeMap<PathBuf, FolderSnapshot> {
        self.folders
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn folder(entries: &[(&str, u64)]) -> FolderSnapshot {
        FolderSnapshot {
            accessible: entries
                .iter()
                .map(|(p, s)| UsageEntry::accessible(PathBuf::from(p), *s))
                .collect(),
            restricted: Vec::new(),
        }
    }

    #[test]
    fn test_empty_folder_is_not_stored() {
        let mut index = UsageIndex::new();
        index.insert_folder(PathBuf::from("/r"), FolderSnapshot::default());
        assert!(index.is_empty());
        assert!(!index.contains_folder(Path::new("/r")));
    }

    #[test]
    fn test_empty_folder_removes_existing_key() {
        let mut index = UsageIndex::new();
        index.insert_folder(PathBuf::from("/r"), folder(&[("/r/a", 1024)]));
        assert_eq!(index.len(), 1);
        index.insert_folder(PathBuf::from("/r"), FolderSnapshot::default());
        assert!(index.is_empty());
    }

    #[test]
    fn test_insert_sorts_accessible() {
        let mut index = UsageIndex::new();
        index.insert_folder(
            PathBuf::from("/r"),
            folder(&[("/r/a", 1024), ("/r/b", 8192), ("/r/c", 2048)]),
        );
        let sizes: Vec<u64> = index
            .folder(Path::new("/r"))
            .unwrap()
            .accessible
            .iter()
            .map(|e| e.size_bytes)
            .collect();
        assert_eq!(sizes, [8192, 2048, 1024]);
    }

    #[test]
    fn test_largest_across_folders() {
        let mut index = UsageIndex::new();
        index.insert_folder(PathBuf::from("/r"), folder(&[("/r/a", 1024), ("/r/d", 9216)]));
        index.insert_folder(PathBuf::from("/r/d"), folder(&[("/r/d/x", 8192)]));
        let top: Vec<&str> = index.largest(2).iter().map(|e| e.name.as_str()).collect();
        assert_eq!(top, ["d", "x"]);
        assert_eq!(index.entry_count(), 3);
    }
}
