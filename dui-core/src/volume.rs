use std::path::Path;
use std::process::Command;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::size::{kb_to_bytes, usage_percent_label};
use crate::{DuiError, Result};

/// Raw free/total space of the filesystem hosting the root
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VolumeSpace {
    pub free_bytes: u64,
    pub total_bytes: u64,
}

/// Volume statistics with the derived usage label
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VolumeStats {
    pub free_bytes: u64,
    pub total_bytes: u64,
    /// Rounded used share, e.g. "42%"
    pub usage_percent_label: String,
}

impl VolumeStats {
    pub fn new(free_bytes: u64, total_bytes: u64) -> Self {
        Self {
            free_bytes,
            total_bytes,
            usage_percent_label: usage_percent_label(free_bytes, total_bytes),
        }
    }

    /// Stats after `freed` bytes were released on the volume. Free space
    /// never exceeds the volume size.
    pub fn with_freed(&self, freed: u64) -> Self {
        let free = self.free_bytes.saturating_add(freed);
        let free = if self.total_bytes > 0 {
            free.min(self.total_bytes)
        } else {
            free
        };
        Self::new(free, self.total_bytes)
    }

    pub fn used_bytes(&self) -> u64 {
        self.total_bytes.saturating_sub(self.free_bytes)
    }
}

impl From<VolumeSpace> for VolumeStats {
    fn from(space: VolumeSpace) -> Self {
        Self::new(space.free_bytes, space.total_bytes)
    }
}

/// Free/total space lookup for the volume hosting a path
pub trait VolumeProbe: Send + Sync {
    fn probe(&self, root: &Path) -> Result<VolumeSpace>;
}

/// Volume probe backed by POSIX `df -Pk`
#[derive(Debug, Clone)]
pub struct DfVolumeProbe {
    program: String,
}

impl DfVolumeProbe {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

impl Default for DfVolumeProbe {
    fn default() -> Self {
        Self::new("df")
    }
}

impl VolumeProbe for DfVolumeProbe {
    fn probe(&self, root: &Path) -> Result<VolumeSpace> {
        let output = Command::new(&self.program)
            .arg("-Pk")
            .arg(root)
            .output()
            .map_err(|e| DuiError::VolumeProbeFailed(format!("failed to run {}: {}", self.program, e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(DuiError::VolumeProbeFailed(format!(
                "{} exited with {}: {}",
                self.program,
                output.status,
                stderr.trim()
            )));
        }

        let space = parse_df_output(&String::from_utf8_lossy(&output.stdout))?;
        debug!(free = space.free_bytes, total = space.total_bytes, "volume probed");
        Ok(space)
    }
}

/// Parse POSIX `df -Pk` output: header line, then
/// `<fs> <total-kb> <used-kb> <available-kb> <capacity> <mount>`.
pub fn parse_df_output(raw: &str) -> Result<VolumeSpace> {
    let row = raw
        .lines()
        .skip(1)
        .find(|line| !line.trim().is_empty())
        .ok_or_else(|| DuiError::VolumeProbeFailed("df printed no data row".to_string()))?;

    let fields: Vec<&str> = row.split_whitespace().collect();
    if fields.len() < 6 {
        return Err(DuiError::VolumeProbeFailed(format!("malformed df row: {row}")));
    }
    let parse = |field: &str| {
        field
            .parse::<u64>()
            .map_err(|e| DuiError::VolumeProbeFailed(format!("invalid df value {field:?}: {e}")))
    };

    // Filesystem names may contain spaces; the numeric columns are counted
    // from the end of the row.
    let n = fields.len();
    let total_kb = parse(fields[n - 5])?;
    let available_kb = parse(fields[n - 3])?;

    Ok(VolumeSpace {
        free_bytes: kb_to_bytes(available_kb),
        total_bytes: kb_to_bytes(total_kb),
    })
}
