use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};

use tracing::debug;

use super::progress::ScanProgress;
use crate::config::ScanConfig;
use crate::index::{FolderSnapshot, UsageEntry, UsageIndex, is_within, normalize_path};
use crate::size::kb_to_bytes;
use crate::{DuiError, Result};

const PERMISSION_DENIED: &str = "Permission denied";

/// GNU du wording in front of the offending path
const DIAGNOSTIC_PHRASES: &[&str] = &[
    "cannot read directory ",
    "cannot open directory ",
    "cannot access ",
];

/// Split an accessible record `"<kilobytes><ws><path>"`
pub fn parse_accessible_line(line: &str) -> Option<(u64, &str)> {
    let line = line.trim_start();
    let split = line.find(char::is_whitespace)?;
    let (size, rest) = line.split_at(split);
    let path = rest.trim_start();
    if path.is_empty() {
        return None;
    }
    let kb = size.parse::<u64>().ok()?;
    Some((kb, path))
}

/// Extract the path from a permission-denied diagnostic. The path follows
/// the `<program>: ` prefix and ends at the next colon.
pub fn parse_restricted_line(line: &str) -> Option<&str> {
    if !line.contains(PERMISSION_DENIED) {
        return None;
    }
    let (_, rest) = line.split_once(": ")?;
    let raw = rest.split(':').next()?;
    let raw = DIAGNOSTIC_PHRASES
        .iter()
        .find_map(|phrase| raw.strip_prefix(phrase))
        .unwrap_or(raw);
    let path = raw
        .trim()
        .trim_matches(|c| matches!(c, '\'' | '"' | '\u{2018}' | '\u{2019}'));
    (!path.is_empty()).then_some(path)
}

/// Splits a byte stream into lines, holding back an unterminated tail
#[derive(Debug, Default)]
struct LineBuffer {
    pending: Vec<u8>,
}

impl LineBuffer {
    fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.pending.extend_from_slice(chunk);
        let mut lines = Vec::new();
        let mut start = 0;
        while let Some(pos) = self.pending[start..].iter().position(|&b| b == b'\n') {
            lines.push(decode_line(&self.pending[start..start + pos]));
            start += pos + 1;
        }
        self.pending.drain(..start);
        lines
    }

    /// The trailing partial line, if the stream did not end with a newline
    fn finish(&mut self) -> Option<String> {
        if self.pending.is_empty() {
            return None;
        }
        let line = decode_line(&self.pending);
        self.pending.clear();
        Some(line)
    }
}

fn decode_line(bytes: &[u8]) -> String {
    let bytes = bytes.strip_suffix(b"\r").unwrap_or(bytes);
    String::from_utf8_lossy(bytes).into_owned()
}

/// Incremental parser turning probe output into a [`UsageIndex`]
#[derive(Debug)]
pub struct ScanParser {
    root: PathBuf,
    config: ScanConfig,
    stdout: LineBuffer,
    stderr: LineBuffer,
    accessible: HashMap<PathBuf, Vec<UsageEntry>>,
    restricted: HashMap<PathBuf, BTreeSet<PathBuf>>,
    progress: ScanProgress,
}

impl ScanParser {
    pub fn new(root: &Path, config: ScanConfig) -> Self {
        Self {
            root: normalize_path(root),
            config,
            stdout: LineBuffer::default(),
            stderr: LineBuffer::default(),
            accessible: HashMap::new(),
            restricted: HashMap::new(),
            progress: ScanProgress::default(),
        }
    }

    pub fn progress(&self) -> &ScanProgress {
        &self.progress
    }

    pub fn push_stdout(&mut self, chunk: &[u8]) {
        for line in self.stdout.push(chunk) {
            self.accept_accessible(&line);
        }
    }

    pub fn push_stderr(&mut self, chunk: &[u8]) {
        for line in self.stderr.push(chunk) {
            self.accept_restricted(&line);
        }
    }

    /// Flush partial lines, apply the exit status and build the index.
    ///
    /// A non-zero (or missing) exit code is fatal only when the probe
    /// produced no usable record at all.
    pub fn finish(mut self, exit_code: Option<i32>) -> Result<UsageIndex> {
        if let Some(line) = self.stdout.finish() {
            self.accept_accessible(&line);
        }
        if let Some(line) = self.stderr.finish() {
            self.accept_restricted(&line);
        }

        if exit_code != Some(0) && self.progress.records_parsed == 0 {
            return Err(DuiError::ScanFailed(match exit_code {
                Some(code) => format!("size probe exited with code {} and no output", code),
                None => "size probe was terminated before producing output".to_string(),
            }));
        }

        debug!(
            records = self.progress.records_parsed,
            indexed = self.progress.entries_indexed,
            restricted = self.progress.restricted_found,
            excluded = self.progress.excluded,
            skipped = self.progress.lines_skipped,
            "scan output parsed"
        );

        Ok(self.into_index())
    }

    fn accept_accessible(&mut self, line: &str) {
        let Some((kb, raw_path)) = parse_accessible_line(line) else {
            self.progress.lines_skipped += 1;
            return;
        };
        let path = normalize_path(raw_path);
        if !is_within(&path, &self.root) {
            self.progress.lines_skipped += 1;
            return;
        }
        self.progress.records_parsed += 1;
        self.progress.current_path = Some(path.clone());

        // The root's own total has no parent inside the index
        if path == self.root {
            return;
        }
        if self.config.is_excluded(&path, &self.root) {
            self.progress.excluded += 1;
            return;
        }
        if kb < self.config.min_size_kb {
            return;
        }
        let Some(parent) = path.parent().map(Path::to_path_buf) else {
            return;
        };
        self.progress.entries_indexed += 1;
        self.accessible
            .entry(parent)
            .or_default()
            .push(UsageEntry::accessible(path, kb_to_bytes(kb)));
    }

    fn accept_restricted(&mut self, line: &str) {
        let Some(raw_path) = parse_restricted_line(line) else {
            return;
        };
        let path = normalize_path(raw_path);
        let Some(parent) = path.parent() else {
            return;
        };
        if !is_within(parent, &self.root) {
            debug!(path = %path.display(), "ignoring permission error outside root");
            return;
        }
        if self.config.is_excluded(&path, &self.root) {
            self.progress.excluded += 1;
            return;
        }
        let parent = parent.to_path_buf();
        if self.restricted.entry(parent).or_default().insert(path) {
            self.progress.restricted_found += 1;
        }
    }

    fn into_index(self) -> UsageIndex {
        let mut accessible = self.accessible;
        let mut restricted = self.restricted;
        let keys: BTreeSet<PathBuf> = accessible
            .keys()
            .chain(restricted.keys())
            .cloned()
            .collect();

        let mut index = UsageIndex::new();
        for key in keys {
            let folder = FolderSnapshot {
                accessible: accessible.remove(&key).unwrap_or_default(),
                restricted: restricted
                    .remove(&key)
                    .map(|paths| paths.into_iter().map(UsageEntry::restricted).collect())
                    .unwrap_or_default(),
            };
            index.insert_folder(key, folder);
        }
        index
    }
}
