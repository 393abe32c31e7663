use std::path::PathBuf;
use std::time::SystemTime;

use serde::{Deserialize, Serialize};

use crate::config::ScanConfig;
use crate::index::UsageIndex;
use crate::volume::VolumeStats;

/// Current snapshot format version - increment when format changes
pub const SNAPSHOT_VERSION: u32 = 2;

/// Magic bytes identifying a dui snapshot file
pub const SNAPSHOT_MAGIC: [u8; 4] = *b"DUIS";

/// Metadata stored in front of the compressed payload
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotMetadata {
    /// Snapshot format version
    pub version: u32,
    /// Root path the index was built for
    pub root_path: PathBuf,
    /// When the snapshot was written
    pub saved_at: SystemTime,
    /// Number of folders in the index
    pub folder_count: usize,
    /// Number of entries in the index
    pub entry_count: usize,
    /// Settings the index was filtered with
    pub config: CachedScanConfig,
}

/// Scan settings that affect snapshot validity
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CachedScanConfig {
    /// Minimum entry size in kilobytes
    pub min_size_kb: u64,
    /// Excluded directory names, sorted and deduplicated
    pub excluded_dirs: Vec<String>,
}

impl From<&ScanConfig> for CachedScanConfig {
    fn from(config: &ScanConfig) -> Self {
        let mut excluded_dirs = config.excluded_dirs.clone();
        excluded_dirs.sort();
        excluded_dirs.dedup();
        Self {
            min_size_kb: config.min_size_kb,
            excluded_dirs,
        }
    }
}

/// Index and volume stats restored from disk
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    pub index: UsageIndex,
    pub volume: VolumeStats,
}

/// Borrowed form of [`Snapshot`] for encoding without cloning the index
#[derive(Serialize)]
pub(crate) struct SnapshotRef<'a> {
    pub index: &'a UsageIndex,
    pub volume: &'a VolumeStats,
}
