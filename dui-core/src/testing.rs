//! In-process doubles for the subprocess and filesystem seams.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use crossbeam_channel::Sender;

use crate::delete::Deleter;
use crate::scanner::{ProbeMessage, SizeProbe};
use crate::volume::{VolumeProbe, VolumeSpace};
use crate::{DuiError, Result};

/// Replays fixed du output in chunks of a configurable size
pub(crate) struct ScriptedProbe {
    stdout: Vec<u8>,
    stderr: Vec<u8>,
    code: Option<i32>,
    chunk_size: usize,
    runs: AtomicUsize,
}

impl ScriptedProbe {
    pub fn new(stdout: &str, stderr: &str, code: Option<i32>) -> Self {
        Self {
            stdout: stdout.as_bytes().to_vec(),
            stderr: stderr.as_bytes().to_vec(),
            code,
            chunk_size: 4096,
            runs: AtomicUsize::new(0),
        }
    }

    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    pub fn runs(&self) -> usize {
        self.runs.load(Ordering::SeqCst)
    }
}

impl SizeProbe for ScriptedProbe {
    fn run(&self, _root: &Path, sink: Sender<ProbeMessage>) -> Result<()> {
        self.runs.fetch_add(1, Ordering::SeqCst);
        for chunk in self.stderr.chunks(self.chunk_size) {
            let _ = sink.send(ProbeMessage::Stderr(chunk.to_vec()));
        }
        for chunk in self.stdout.chunks(self.chunk_size) {
            let _ = sink.send(ProbeMessage::Stdout(chunk.to_vec()));
        }
        let _ = sink.send(ProbeMessage::Exited { code: self.code });
        Ok(())
    }
}

/// Volume probe returning queued results; the last one repeats
pub(crate) struct ScriptedVolume {
    results: Mutex<VecDeque<std::result::Result<VolumeSpace, String>>>,
    calls: AtomicUsize,
}

impl ScriptedVolume {
    pub fn fixed(free_bytes: u64, total_bytes: u64) -> Self {
        Self::sequence(vec![Ok(VolumeSpace {
            free_bytes,
            total_bytes,
        })])
    }

    pub fn sequence(results: Vec<std::result::Result<VolumeSpace, String>>) -> Self {
        Self {
            results: Mutex::new(results.into()),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl VolumeProbe for ScriptedVolume {
    fn probe(&self, _root: &Path) -> Result<VolumeSpace> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let mut results = self.results.lock().unwrap();
        let next = if results.len() > 1 {
            results.pop_front()
        } else {
            results.front().cloned()
        };
        match next {
            Some(Ok(space)) => Ok(space),
            Some(Err(message)) => Err(DuiError::VolumeProbeFailed(message)),
            None => Err(DuiError::VolumeProbeFailed("no scripted volume".to_string())),
        }
    }
}

/// Records deletion batches without touching the filesystem
#[derive(Default)]
pub(crate) struct RecordingDeleter {
    failure: Option<String>,
    batches: Mutex<Vec<Vec<PathBuf>>>,
}

impl RecordingDeleter {
    pub fn failing(message: &str) -> Self {
        Self {
            failure: Some(message.to_string()),
            batches: Mutex::new(Vec::new()),
        }
    }

    pub fn batches(&self) -> Vec<Vec<PathBuf>> {
        self.batches.lock().unwrap().clone()
    }
}

impl Deleter for RecordingDeleter {
    fn delete(&self, paths: &[PathBuf]) -> Result<()> {
        self.batches.lock().unwrap().push(paths.to_vec());
        match &self.failure {
            Some(message) => Err(DuiError::DeletionFailed(message.clone())),
            None => Ok(()),
        }
    }
}
