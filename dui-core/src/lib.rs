pub mod cache;
pub mod config;
pub mod delete;
pub mod error;
pub mod index;
pub mod lifecycle;
pub mod prune;
pub mod scanner;
pub mod size;
pub mod volume;

#[cfg(test)]
pub(crate) mod testing;

pub use cache::{Snapshot, SnapshotStore, cache_path_for};
pub use config::{DEFAULT_EXCLUDED_DIRS, DEFAULT_MIN_SIZE_KB, ScanConfig};
pub use delete::{Deleter, FsDeleter};
pub use error::{DuiError, Result};
pub use index::{FolderSnapshot, RESTRICTED_LABEL, UsageEntry, UsageIndex, normalize_path};
pub use lifecycle::{
    Collaborators, LifecycleHandle, LifecycleView, Phase, ScanLifecycle, SessionStats,
};
pub use prune::{PruneOutcome, prune};
pub use scanner::{DuProbe, ScanProgress, Scanner, SizeProbe, validate_root};
pub use size::{format_count, format_size, kb_to_bytes};
pub use volume::{DfVolumeProbe, VolumeProbe, VolumeSpace, VolumeStats};
