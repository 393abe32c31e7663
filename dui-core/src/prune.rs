use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::index::{UsageIndex, is_within, normalize_path};

/// Result of pruning deleted paths out of an index
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PruneOutcome {
    pub index: UsageIndex,
    /// Sum of the indexed sizes of the deleted entries
    pub freed_bytes: u64,
}

/// Remove `deleted` paths from `index` without rescanning.
///
/// Every surviving ancestor directory entry, up to and including the root,
/// shrinks by the bytes freed below it (never below zero). Folders that are
/// deleted, or lie inside a deleted directory, disappear with their listing.
/// A path requested together with one of its ancestors is folded into the
/// ancestor, whose size already accounts for it.
pub fn prune<P: AsRef<Path>>(index: &UsageIndex, deleted: &[P], root: &Path) -> PruneOutcome {
    let root = normalize_path(root);
    let deleted = collapse_nested(deleted.iter().map(normalize_path).collect());
    if deleted.is_empty() {
        return PruneOutcome {
            index: index.clone(),
            freed_bytes: 0,
        };
    }

    let mut freed_bytes = 0u64;
    let mut adjustments: HashMap<PathBuf, u64> = HashMap::new();
    for (_, folder) in index.iter() {
        for entry in folder.accessible.iter().filter(|e| deleted.contains(&e.path)) {
            freed_bytes = freed_bytes.saturating_add(entry.size_bytes);
            let mut ancestor = entry.path.parent();
            while let Some(dir) = ancestor {
                if !is_within(dir, &root) {
                    break;
                }
                let slot = adjustments.entry(dir.to_path_buf()).or_default();
                *slot = slot.saturating_add(entry.size_bytes);
                if dir == root {
                    break;
                }
                ancestor = dir.parent();
            }
        }
    }

    let mut pruned = UsageIndex::new();
    for (key, folder) in index.iter() {
        if key.ancestors().any(|a| deleted.contains(a)) {
            continue;
        }
        let mut folder = folder.clone();
        folder.accessible.retain(|e| !deleted.contains(&e.path));
        folder.restricted.retain(|e| !deleted.contains(&e.path));
        for entry in &mut folder.accessible {
            if let Some(&bytes) = adjustments.get(&entry.path) {
                entry.shrink_by(bytes);
            }
        }
        pruned.insert_folder(key.clone(), folder);
    }

    debug!(
        deleted = deleted.len(),
        freed_bytes,
        folders_before = index.len(),
        folders_after = pruned.len(),
        "index pruned"
    );

    PruneOutcome {
        index: pruned,
        freed_bytes,
    }
}

/// Drop paths that have an ancestor in the same set
fn collapse_nested(paths: BTreeSet<PathBuf>) -> BTreeSet<PathBuf> {
    paths
        .iter()
        .filter(|p| !p.ancestors().skip(1).any(|a| paths.contains(a)))
        .cloned()
        .collect()
}
