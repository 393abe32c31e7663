use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use super::paths::entry_name;
use crate::size::format_size;

/// Label shown instead of a size for paths the probe could not measure
pub const RESTRICTED_LABEL: &str = "Access denied";

/// A single sized (or unsizable) path below the scan root
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageEntry {
    /// Absolute, normalized path
    pub path: PathBuf,
    /// Last path component
    pub name: String,
    /// Disk usage in bytes (always a multiple of 1024 for probe records)
    pub size_bytes: u64,
    /// Human readable size, or [`RESTRICTED_LABEL`]
    pub size_label: String,
}

impl UsageEntry {
    pub fn accessible(path: PathBuf, size_bytes: u64) -> Self {
        Self {
            name: entry_name(&path),
            size_label: format_size(size_bytes),
            path,
            size_bytes,
        }
    }

    pub fn restricted(path: PathBuf) -> Self {
        Self {
            name: entry_name(&path),
            size_label: RESTRICTED_LABEL.to_string(),
            path,
            size_bytes: 0,
        }
    }

    /// Reduce the size after bytes below this entry were freed. Sizes only
    /// ever go down, and never below zero.
    pub(crate) fn shrink_by(&mut self, bytes: u64) {
        self.size_bytes = self.size_bytes.saturating_sub(bytes);
        self.size_label = format_size(self.size_bytes);
    }
}

/// Accessible and restricted entries directly inside one directory
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FolderSnapshot {
    /// Sorted by size descending
    pub accessible: Vec<UsageEntry>,
    /// Always zero-sized
    pub restricted: Vec<UsageEntry>,
}

impl FolderSnapshot {
    pub fn is_empty(&self) -> bool {
        self.accessible.is_empty() && self.restricted.is_empty()
    }

    pub fn len(&self) -> usize {
        self.accessible.len() + self.restricted.len()
    }

    /// Sum of accessible entry sizes
    pub fn total_size(&self) -> u64 {
        self.accessible.iter().map(|e| e.size_bytes).sum()
    }

    /// Sort accessible entries by size descending, ties broken by path
    pub(crate) fn sort_accessible(&mut self) {
        self.accessible.sort_by(|a, b| {
            b.size_bytes
                .cmp(&a.size_bytes)
                .then_with(|| a.path.cmp(&b.path))
        });
    }
}
