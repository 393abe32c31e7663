mod parser;
mod probe;
mod progress;

pub use parser::{ScanParser, parse_accessible_line, parse_restricted_line};
pub use probe::{DuProbe, ProbeMessage, SizeProbe};
pub use progress::{ProgressThrottle, ScanProgress};

use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use tracing::info;

use crate::config::ScanConfig;
use crate::index::{UsageIndex, normalize_path};
use crate::{DuiError, Result};

/// Drives one probe run through the parser
pub struct Scanner {
    config: ScanConfig,
    probe: Arc<dyn SizeProbe>,
}

impl Scanner {
    pub fn new(config: ScanConfig, probe: Arc<dyn SizeProbe>) -> Self {
        Self { config, probe }
    }

    /// Scan `root` to completion on the calling thread. The probe runs on a
    /// helper thread feeding a bounded channel; `on_progress` is called at
    /// most once per configured interval.
    pub fn run(
        &self,
        root: &Path,
        mut on_progress: impl FnMut(&ScanProgress),
    ) -> Result<UsageIndex> {
        let root = normalize_path(root);
        let started = Instant::now();
        let (tx, rx) = crossbeam_channel::bounded(self.config.channel_capacity.max(1));

        let probe = Arc::clone(&self.probe);
        let probe_root = root.clone();
        let producer = std::thread::spawn(move || probe.run(&probe_root, tx));

        let mut parser = ScanParser::new(&root, self.config.clone());
        let mut throttle = ProgressThrottle::new(self.config.progress_interval);
        let mut exit = None;

        for msg in rx.iter() {
            match msg {
                ProbeMessage::Stdout(chunk) => parser.push_stdout(&chunk),
                ProbeMessage::Stderr(chunk) => parser.push_stderr(&chunk),
                ProbeMessage::Exited { code } => {
                    exit = Some(code);
                    break;
                }
            }
            if throttle.ready() {
                on_progress(parser.progress());
            }
        }

        producer
            .join()
            .map_err(|_| DuiError::ScanFailed("size probe thread panicked".to_string()))??;

        let Some(code) = exit else {
            return Err(DuiError::ScanFailed(
                "size probe output ended without an exit status".to_string(),
            ));
        };

        let index = parser.finish(code)?;
        info!(
            root = %root.display(),
            folders = index.len(),
            entries = index.entry_count(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "scan finished"
        );
        Ok(index)
    }
}

/// Check that `path` exists and is a directory
pub fn validate_root(path: &Path) -> Result<()> {
    if !path.exists() {
        return Err(DuiError::PathNotFound(path.to_path_buf()));
    }
    if !path.is_dir() {
        return Err(DuiError::NotADirectory(path.to_path_buf()));
    }
    Ok(())
}
