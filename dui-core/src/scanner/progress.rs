use std::path::PathBuf;
use std::time::{Duration, Instant};

/// Scanning progress statistics
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanProgress {
    /// Well-formed probe records inside the root
    pub records_parsed: u64,
    /// Accessible entries kept in the index
    pub entries_indexed: u64,
    /// Distinct restricted paths found
    pub restricted_found: u64,
    /// Records dropped by the exclusion list
    pub excluded: u64,
    /// Lines that could not be parsed or fell outside the root
    pub lines_skipped: u64,
    /// Last path reported by the probe
    pub current_path: Option<PathBuf>,
}

/// Time box for progress notifications: at most one per interval
#[derive(Debug)]
pub struct ProgressThrottle {
    interval: Duration,
    last: Option<Instant>,
}

impl ProgressThrottle {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last: None,
        }
    }

    /// Whether a notification may be sent now. Marks the slot as used.
    pub fn ready(&mut self) -> bool {
        self.ready_at(Instant::now())
    }

    fn ready_at(&mut self, now: Instant) -> bool {
        match self.last {
            Some(last) if now.duration_since(last) < self.interval => false,
            _ => {
                self.last = Some(now);
                true
            }
        }
    }
}
