use std::io::{ErrorKind, Read};
use std::path::Path;
use std::process::{Command, Stdio};
use std::thread::JoinHandle;

use crossbeam_channel::Sender;
use tracing::{debug, warn};

use crate::{DuiError, Result};

/// Raw output of a running size probe
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeMessage {
    /// Chunk of standard output (`<kilobytes>\t<path>` lines)
    Stdout(Vec<u8>),
    /// Chunk of standard error (permission diagnostics)
    Stderr(Vec<u8>),
    /// Both streams are drained and the process has exited. Always the last
    /// message of a run; `code` is `None` when the process was killed.
    Exited { code: Option<i32> },
}

/// Recursive disk usage enumeration for one root
pub trait SizeProbe: Send + Sync {
    /// Run one enumeration of `root` to completion, streaming output into
    /// `sink` and finishing with [`ProbeMessage::Exited`].
    fn run(&self, root: &Path, sink: Sender<ProbeMessage>) -> Result<()>;
}

/// Size probe backed by `du -ak`
#[derive(Debug, Clone)]
pub struct DuProbe {
    program: String,
}

impl DuProbe {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

impl Default for DuProbe {
    fn default() -> Self {
        Self::new("du")
    }
}

impl SizeProbe for DuProbe {
    fn run(&self, root: &Path, sink: Sender<ProbeMessage>) -> Result<()> {
        let mut child = Command::new(&self.program)
            .arg("-ak")
            .arg(root)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|source| DuiError::ProbeSpawn {
                program: self.program.clone(),
                source,
            })?;

        debug!(program = %self.program, root = %root.display(), pid = child.id(), "size probe started");

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| DuiError::ScanFailed("probe stdout was not captured".to_string()))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| DuiError::ScanFailed("probe stderr was not captured".to_string()))?;

        let out_handle = forward(stdout, sink.clone(), ProbeMessage::Stdout);
        let err_handle = forward(stderr, sink.clone(), ProbeMessage::Stderr);
        let _ = out_handle.join();
        let _ = err_handle.join();

        let status = child.wait()?;
        debug!(code = ?status.code(), "size probe exited");
        let _ = sink.send(ProbeMessage::Exited {
            code: status.code(),
        });

        Ok(())
    }
}

/// Pump a pipe into the sink in chunks. Keeps draining after the receiver
/// goes away so the child never blocks on a full pipe.
fn forward<R>(
    mut reader: R,
    sink: Sender<ProbeMessage>,
    wrap: fn(Vec<u8>) -> ProbeMessage,
) -> JoinHandle<()>
where
    R: Read + Send + 'static,
{
    std::thread::spawn(move || {
        let mut buf = [0u8; 8192];
        let mut receiver_gone = false;
        loop {
            match reader.read(&mut buf) {
                Ok(0) => break,
                Ok(n) => {
                    if !receiver_gone && sink.send(wrap(buf[..n].to_vec())).is_err() {
                        receiver_gone = true;
                    }
                }
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => {
                    warn!("failed reading size probe output: {}", e);
                    break;
                }
            }
        }
    })
}
