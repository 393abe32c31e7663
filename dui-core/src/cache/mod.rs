mod metadata;

pub use metadata::{
    CachedScanConfig, SNAPSHOT_MAGIC, SNAPSHOT_VERSION, Snapshot, SnapshotMetadata,
};

use std::collections::hash_map::DefaultHasher;
use std::fs::{self, File};
use std::hash::{Hash, Hasher};
use std::io::{ErrorKind, Read, Write};
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use flate2::Compression;
use flate2::read::DeflateDecoder;
use flate2::write::DeflateEncoder;
use tracing::{debug, info, warn};

use metadata::SnapshotRef;

use crate::config::ScanConfig;
use crate::index::{UsageIndex, absolute_path};
use crate::volume::VolumeStats;
use crate::{DuiError, Result};

/// Get the snapshot file path for a given root directory
pub fn cache_path_for(root: &Path, cache_dir: &Path) -> PathBuf {
    let hash = hash_path(root);
    cache_dir.join(format!("{:016x}.dui", hash))
}

/// Hash a path to a u64 for the snapshot filename
fn hash_path(path: &Path) -> u64 {
    let mut hasher = DefaultHasher::new();
    path.hash(&mut hasher);
    hasher.finish()
}

/// Encode a snapshot
///
/// File format:
/// [4B] Magic "DUIS"
/// [4B] Version (u32 LE)
/// [4B] Metadata length (u32 LE)
/// [NB] Metadata (postcard)
/// [4B] Payload length (u32 LE)
/// [MB] Payload (postcard, then DEFLATE)
/// [4B] CRC32 checksum of all preceding bytes
pub fn encode_snapshot(
    root: &Path,
    config: &CachedScanConfig,
    index: &UsageIndex,
    volume: &VolumeStats,
) -> Result<Vec<u8>> {
    let meta = SnapshotMetadata {
        version: SNAPSHOT_VERSION,
        root_path: root.to_path_buf(),
        saved_at: SystemTime::now(),
        folder_count: index.len(),
        entry_count: index.entry_count(),
        config: config.clone(),
    };

    let mut data = Vec::new();
    data.extend_from_slice(&SNAPSHOT_MAGIC);
    data.extend_from_slice(&SNAPSHOT_VERSION.to_le_bytes());

    let meta_bytes = postcard::to_allocvec(&meta)
        .map_err(|e| DuiError::Cache(format!("Failed to serialize metadata: {}", e)))?;
    push_section(&mut data, &meta_bytes)?;

    let raw = postcard::to_allocvec(&SnapshotRef { index, volume })
        .map_err(|e| DuiError::Cache(format!("Failed to serialize index: {}", e)))?;
    let mut encoder = DeflateEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(&raw)?;
    let payload = encoder.finish()?;
    push_section(&mut data, &payload)?;

    let checksum = crc32fast::hash(&data);
    data.extend_from_slice(&checksum.to_le_bytes());

    debug!(raw = raw.len(), compressed = payload.len(), "snapshot encoded");
    Ok(data)
}

/// Decode a snapshot produced by [`encode_snapshot`]. Any other version is
/// rejected outright.
pub fn decode_snapshot(data: &[u8]) -> Result<(SnapshotMetadata, Snapshot)> {
    // magic(4) + version(4) + meta_len(4) + payload_len(4) + checksum(4)
    if data.len() < 20 {
        return Err(DuiError::Cache("Snapshot too small".to_string()));
    }
    if data[..4] != SNAPSHOT_MAGIC {
        return Err(DuiError::Cache("Invalid snapshot magic".to_string()));
    }
    let version = read_u32(data, 4)?;
    if version != SNAPSHOT_VERSION {
        return Err(DuiError::Cache(format!(
            "Snapshot version mismatch: expected {}, got {}",
            SNAPSHOT_VERSION, version
        )));
    }

    let checksum_offset = data.len() - 4;
    let stored_checksum = read_u32(data, checksum_offset)?;
    if stored_checksum != crc32fast::hash(&data[..checksum_offset]) {
        return Err(DuiError::Cache("Snapshot checksum mismatch".to_string()));
    }
    let body = &data[..checksum_offset];

    let (meta_bytes, offset) = read_section(body, 8, "metadata")?;
    let meta: SnapshotMetadata = postcard::from_bytes(meta_bytes)
        .map_err(|e| DuiError::Cache(format!("Failed to deserialize metadata: {}", e)))?;

    let (payload, _) = read_section(body, offset, "payload")?;
    let mut raw = Vec::new();
    DeflateDecoder::new(payload)
        .read_to_end(&mut raw)
        .map_err(|e| DuiError::Cache(format!("Failed to decompress payload: {}", e)))?;
    let snapshot: Snapshot = postcard::from_bytes(&raw)
        .map_err(|e| DuiError::Cache(format!("Failed to deserialize index: {}", e)))?;

    Ok((meta, snapshot))
}

fn push_section(data: &mut Vec<u8>, bytes: &[u8]) -> Result<()> {
    let len = u32::try_from(bytes.len())
        .map_err(|_| DuiError::Cache("Snapshot section too large".to_string()))?;
    data.extend_from_slice(&len.to_le_bytes());
    data.extend_from_slice(bytes);
    Ok(())
}

fn read_section<'a>(body: &'a [u8], offset: usize, what: &str) -> Result<(&'a [u8], usize)> {
    let len = read_u32(body, offset)? as usize;
    let start = offset + 4;
    let end = start
        .checked_add(len)
        .filter(|&end| end <= body.len())
        .ok_or_else(|| DuiError::Cache(format!("Invalid {} length", what)))?;
    Ok((&body[start..end], end))
}

fn read_u32(data: &[u8], offset: usize) -> Result<u32> {
    data.get(offset..offset + 4)
        .and_then(|b| b.try_into().ok())
        .map(u32::from_le_bytes)
        .ok_or_else(|| DuiError::Cache("Truncated snapshot".to_string()))
}

/// Durable, per-root snapshot of the usage index.
///
/// The payload lives next to an empty marker file; availability is answered
/// from the marker alone so the payload is only read on hydrate. A snapshot
/// written with different scan settings is treated as absent.
#[derive(Debug, Clone)]
pub struct SnapshotStore {
    root: PathBuf,
    config: CachedScanConfig,
    payload_path: PathBuf,
    marker_path: PathBuf,
}

impl SnapshotStore {
    /// Store for `root` (made absolute) scanned with `config`
    pub fn new(cache_dir: &Path, root: &Path, config: &ScanConfig) -> Self {
        let root = absolute_path(root);
        let payload_path = cache_path_for(&root, cache_dir);
        let marker_path = payload_path.with_extension("present");
        Self {
            root,
            config: CachedScanConfig::from(config),
            payload_path,
            marker_path,
        }
    }

    pub fn payload_path(&self) -> &Path {
        &self.payload_path
    }

    /// Whether a snapshot is stored. Unreadable storage counts as absent.
    pub fn is_available(&self) -> bool {
        matches!(self.marker_path.try_exists(), Ok(true))
    }

    /// Store the index and volume stats. Failures are logged, never returned.
    pub fn persist(&self, index: &UsageIndex, volume: &VolumeStats) {
        match self.try_persist(index, volume) {
            Ok(()) => info!(path = %self.payload_path.display(), "snapshot saved"),
            Err(e) => warn!(path = %self.payload_path.display(), "failed to save snapshot: {}", e),
        }
    }

    /// Write the payload atomically, then raise the marker
    pub fn try_persist(&self, index: &UsageIndex, volume: &VolumeStats) -> Result<()> {
        if let Some(parent) = self.payload_path.parent() {
            fs::create_dir_all(parent)?;
        }
        let data = encode_snapshot(&self.root, &self.config, index, volume)?;

        let temp_path = self.payload_path.with_extension("tmp");
        let mut file = File::create(&temp_path)?;
        file.write_all(&data)?;
        file.sync_all()?;
        drop(file);
        fs::rename(&temp_path, &self.payload_path)?;

        File::create(&self.marker_path)?;
        Ok(())
    }

    /// Remove the snapshot; a no-op when nothing is stored
    pub fn invalidate(&self) {
        for path in [&self.marker_path, &self.payload_path] {
            match fs::remove_file(path) {
                Ok(()) => {}
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => warn!(path = %path.display(), "failed to remove snapshot file: {}", e),
            }
        }
        debug!(root = %self.root.display(), "snapshot invalidated");
    }

    /// Load the stored snapshot. Anything unreadable is treated as absent
    /// and removed so later availability checks report false.
    pub fn hydrate(&self) -> Option<Snapshot> {
        if !self.is_available() {
            return None;
        }
        match self.load() {
            Ok(snapshot) => Some(snapshot),
            Err(e) => {
                warn!(path = %self.payload_path.display(), "discarding unusable snapshot: {}", e);
                self.invalidate();
                None
            }
        }
    }

    fn load(&self) -> Result<Snapshot> {
        let data = fs::read(&self.payload_path)?;
        let (meta, snapshot) = decode_snapshot(&data)?;
        if meta.root_path != self.root {
            return Err(DuiError::Cache(format!(
                "Snapshot belongs to {}",
                meta.root_path.display()
            )));
        }
        if meta.config != self.config {
            return Err(DuiError::Cache(format!(
                "Snapshot scan settings differ (min size {} KB, {} exclusions)",
                meta.config.min_size_kb,
                meta.config.excluded_dirs.len()
            )));
        }
        debug!(
            folders = meta.folder_count,
            entries = meta.entry_count,
            saved_at = ?meta.saved_at,
            "snapshot loaded"
        );
        Ok(snapshot)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::{FolderSnapshot, UsageEntry};
    use tempfile::TempDir;

    fn sample_index() -> UsageIndex {
        let mut index = UsageIndex::new();
        index.insert_folder(
            PathBuf::from("/home/user"),
            FolderSnapshot {
                accessible: vec![UsageEntry::accessible(
                    PathBuf::from("/home/user/big.bin"),
                    5_120_000,
                )],
                restricted: vec![UsageEntry::restricted(PathBuf::from("/home/user/Private"))],
            },
        );
        index.insert_folder(
            PathBuf::from("/home/user/docs"),
            FolderSnapshot {
                accessible: vec![
                    UsageEntry::accessible(PathBuf::from("/home/user/docs/a"), 2048 * 1024),
                    UsageEntry::accessible(PathBuf::from("/home/user/docs/b"), 1024 * 1024),
                ],
                restricted: Vec::new(),
            },
        );
        index
    }

    fn store(temp: &TempDir) -> SnapshotStore {
        SnapshotStore::new(
            &temp.path().join("cache"),
            Path::new("/home/user"),
            &ScanConfig::default(),
        )
    }

    fn default_settings() -> CachedScanConfig {
        CachedScanConfig::from(&ScanConfig::default())
    }

    fn with_fixed_checksum(mut data: Vec<u8>) -> Vec<u8> {
        let body_len = data.len() - 4;
        let checksum = crc32fast::hash(&data[..body_len]);
        data[body_len..].copy_from_slice(&checksum.to_le_bytes());
        data
    }

    #[test]
    fn test_cache_path_generation() {
        let cache_dir = PathBuf::from("/tmp/dui-cache");
        let path1 = cache_path_for(Path::new("/home/user/data"), &cache_dir);
        let path2 = cache_path_for(Path::new("/home/user/other"), &cache_dir);

        assert!(path1.to_string_lossy().ends_with(".dui"));
        assert_ne!(path1, path2);
    }

    #[test]
    fn test_round_trip() {
        let temp = TempDir::new().unwrap();
        let store = store(&temp);
        let index = sample_index();
        let volume = VolumeStats::new(1000, 4000);

        assert!(!store.is_available());
        store.persist(&index, &volume);
        assert!(store.is_available());

        let snapshot = store.hydrate().unwrap();
        assert_eq!(snapshot.index, index);
        assert_eq!(snapshot.volume, volume);
    }

    #[test]
    fn test_payload_is_compressed() {
        let mut index = UsageIndex::new();
        let entries = (0..500)
            .map(|i| UsageEntry::accessible(PathBuf::from(format!("/home/user/dir/file-{i}")), 4096))
            .collect();
        index.insert_folder(
            PathBuf::from("/home/user/dir"),
            FolderSnapshot {
                accessible: entries,
                restricted: Vec::new(),
            },
        );
        let volume = VolumeStats::new(1, 2);
        let raw = postcard::to_allocvec(&SnapshotRef { index: &index, volume: &volume }).unwrap();
        let encoded = encode_snapshot(Path::new("/home/user"), &default_settings(), &index, &volume).unwrap();
        assert!(encoded.len() < raw.len() / 2);
    }

    #[test]
    fn test_invalidate_is_idempotent() {
        let temp = TempDir::new().unwrap();
        let store = store(&temp);
        store.invalidate();
        store.persist(&sample_index(), &VolumeStats::new(1, 2));
        store.invalidate();
        store.invalidate();
        assert!(!store.is_available());
        assert!(!store.payload_path().exists());
        assert!(store.hydrate().is_none());
    }

    #[test]
    fn test_truncated_snapshot_is_discarded() {
        let temp = TempDir::new().unwrap();
        let store = store(&temp);
        store.persist(&sample_index(), &VolumeStats::new(1, 2));

        let data = fs::read(store.payload_path()).unwrap();
        fs::write(store.payload_path(), &data[..data.len() / 2]).unwrap();

        assert!(store.is_available());
        assert!(store.hydrate().is_none());
        assert!(!store.is_available());
    }

    #[test]
    fn test_version_mismatch_is_discarded() {
        let temp = TempDir::new().unwrap();
        let store = store(&temp);
        store.persist(&sample_index(), &VolumeStats::new(1, 2));

        let mut data = fs::read(store.payload_path()).unwrap();
        data[4..8].copy_from_slice(&(SNAPSHOT_VERSION + 1).to_le_bytes());
        let data = with_fixed_checksum(data);
        let err = decode_snapshot(&data).unwrap_err();
        assert!(err.to_string().contains("version mismatch"));
        fs::write(store.payload_path(), &data).unwrap();

        assert!(store.hydrate().is_none());
        assert!(!store.is_available());
    }

    #[test]
    fn test_flipped_byte_fails_checksum() {
        let data = encode_snapshot(
            Path::new("/home/user"),
            &default_settings(),
            &sample_index(),
            &VolumeStats::new(1, 2),
        )
        .unwrap();
        let mut corrupt = data.clone();
        let mid = corrupt.len() / 2;
        corrupt[mid] ^= 0xff;
        let err = decode_snapshot(&corrupt).unwrap_err();
        assert!(err.to_string().contains("checksum"));
    }

    #[test]
    fn test_snapshot_for_other_root_is_discarded() {
        let temp = TempDir::new().unwrap();
        let store = store(&temp);
        let other = encode_snapshot(
            Path::new("/srv"),
            &default_settings(),
            &sample_index(),
            &VolumeStats::new(1, 2),
        )
        .unwrap();
        fs::create_dir_all(store.payload_path().parent().unwrap()).unwrap();
        fs::write(store.payload_path(), other).unwrap();
        fs::write(store.payload_path().with_extension("present"), "").unwrap();

        assert!(store.hydrate().is_none());
        assert!(!store.is_available());
    }

    #[test]
    fn test_persist_failure_is_swallowed() {
        let temp = TempDir::new().unwrap();
        // A regular file where the cache directory should be
        let blocker = temp.path().join("cache");
        fs::write(&blocker, "not a directory").unwrap();
        let store = SnapshotStore::new(&blocker, Path::new("/home/user"), &ScanConfig::default());

        store.persist(&sample_index(), &VolumeStats::new(1, 2));
        assert!(store.try_persist(&sample_index(), &VolumeStats::new(1, 2)).is_err());
        assert!(!store.is_available());
    }

    #[test]
    fn test_snapshot_with_other_scan_settings_is_discarded() {
        let temp = TempDir::new().unwrap();
        let cache_dir = temp.path().join("cache");
        let root = Path::new("/home/user");
        SnapshotStore::new(&cache_dir, root, &ScanConfig::default())
            .persist(&sample_index(), &VolumeStats::new(1, 2));

        let smaller_floor = ScanConfig {
            min_size_kb: 0,
            ..ScanConfig::default()
        };
        let store = SnapshotStore::new(&cache_dir, root, &smaller_floor);
        assert!(store.is_available());
        assert!(store.hydrate().is_none());
        assert!(!store.is_available());

        SnapshotStore::new(&cache_dir, root, &ScanConfig::default())
            .persist(&sample_index(), &VolumeStats::new(1, 2));
        let mut fewer_exclusions = ScanConfig::default();
        fewer_exclusions.excluded_dirs.retain(|name| name != "target");
        assert!(
            SnapshotStore::new(&cache_dir, root, &fewer_exclusions)
                .hydrate()
                .is_none()
        );
    }

    #[test]
    fn test_exclusion_order_does_not_matter() {
        let temp = TempDir::new().unwrap();
        let cache_dir = temp.path().join("cache");
        let root = Path::new("/home/user");
        SnapshotStore::new(&cache_dir, root, &ScanConfig::default())
            .persist(&sample_index(), &VolumeStats::new(1, 2));

        let mut reordered = ScanConfig::default();
        reordered.excluded_dirs.reverse();
        reordered.excluded_dirs.push("node_modules".to_string());
        let snapshot = SnapshotStore::new(&cache_dir, root, &reordered)
            .hydrate()
            .unwrap();
        assert_eq!(snapshot.index, sample_index());
    }

    #[test]
    fn test_relative_root_is_made_absolute() {
        let temp = TempDir::new().unwrap();
        let store = SnapshotStore::new(temp.path(), Path::new("."), &ScanConfig::default());
        let expected = cache_path_for(
            &absolute_path(std::env::current_dir().unwrap()),
            temp.path(),
        );
        assert_eq!(store.payload_path(), expected.as_path());
    }
}
