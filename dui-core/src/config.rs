use std::path::Path;
use std::time::Duration;

/// Directory names whose subtrees are never indexed: version control
/// metadata, dependency caches and build output.
pub const DEFAULT_EXCLUDED_DIRS: &[&str] = &[
    ".git",
    ".hg",
    ".svn",
    "node_modules",
    "target",
    ".gradle",
    "__pycache__",
    ".venv",
    "DerivedData",
    ".next",
    ".nuxt",
    "Pods",
];

/// Entries smaller than this many kilobytes are not indexed
pub const DEFAULT_MIN_SIZE_KB: u64 = 1024;

/// Scanner configuration
#[derive(Debug, Clone)]
pub struct ScanConfig {
    /// Minimum entry size in kilobytes
    pub min_size_kb: u64,
    /// Directory names excluded from the index at any depth below the root
    pub excluded_dirs: Vec<String>,
    /// Minimum time between two progress notifications
    pub progress_interval: Duration,
    /// Recursive size enumeration program (`du`-compatible)
    pub probe_program: String,
    /// Free space program (`df`-compatible)
    pub volume_program: String,
    /// Capacity of the channel between the probe and the parser
    pub channel_capacity: usize,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            min_size_kb: DEFAULT_MIN_SIZE_KB,
            excluded_dirs: DEFAULT_EXCLUDED_DIRS.iter().map(|s| s.to_string()).collect(),
            progress_interval: Duration::from_millis(100),
            probe_program: "du".to_string(),
            volume_program: "df".to_string(),
            channel_capacity: 256,
        }
    }
}

impl ScanConfig {
    /// Whether any component of `path` below `root` is an excluded name.
    /// Components of the root itself never count.
    pub fn is_excluded(&self, path: &Path, root: &Path) -> bool {
        let Ok(relative) = path.strip_prefix(root) else {
            return false;
        };
        relative.components().any(|c| {
            let name = c.as_os_str().to_string_lossy();
            self.excluded_dirs.iter().any(|ex| *ex == name)
        })
    }
}
