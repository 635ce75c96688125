//! Optional run log: a JSON array with one summary object per run.
//!
//! ```json
//! [
//!   {
//!     "timestamp": "2025-02-26T09:14:03.512Z",
//!     "input": "inbox/",
//!     "output_dir": "processed_invoices",
//!     "transfer_mode": "copy",
//!     "files": 12,
//!     "succeeded": 11,
//!     "failed": 1,
//!     "skipped": 0,
//!     "total_duration_ms": 48210
//!   }
//! ]
//! ```

use crate::config::{ProcessorConfig, TransferMode};
use crate::output::RunMetrics;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// One run's summary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunLogEntry {
    pub timestamp: DateTime<Utc>,
    pub input: PathBuf,
    pub output_dir: PathBuf,
    pub transfer_mode: TransferMode,
    pub files: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub skipped: usize,
    pub total_duration_ms: u64,
}

impl RunLogEntry {
    pub fn new(input: &Path, config: &ProcessorConfig, metrics: &RunMetrics) -> Self {
        Self {
            timestamp: Utc::now(),
            input: input.to_path_buf(),
            output_dir: config.output_dir.clone(),
            transfer_mode: config.transfer_mode,
            files: metrics.attempted + metrics.skipped,
            succeeded: metrics.succeeded,
            failed: metrics.failed,
            skipped: metrics.skipped,
            total_duration_ms: metrics.total_duration_ms,
        }
    }
}

/// Append `entry` to the log at `path`, creating it if needed.
///
/// A file that is not a JSON array is replaced, with a warning. The new
/// content is written to a temp file and renamed into place.
pub fn append(path: &Path, entry: &RunLogEntry) -> io::Result<()> {
    let mut entries: Vec<serde_json::Value> = match std::fs::read_to_string(path) {
        Ok(text) if text.trim().is_empty() => Vec::new(),
        Ok(text) => match serde_json::from_str::<Vec<serde_json::Value>>(&text) {
            Ok(v) => v,
            Err(e) => {
                warn!("{} is not a JSON array ({}); starting a new log", path.display(), e);
                Vec::new()
            }
        },
        Err(e) if e.kind() == io::ErrorKind::NotFound => Vec::new(),
        Err(e) => return Err(e),
    };

    entries.push(serde_json::to_value(entry).map_err(io::Error::other)?);
    let json = serde_json::to_string_pretty(&entries).map_err(io::Error::other)?;

    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    };
    std::fs::create_dir_all(&parent)?;
    let mut tmp = tempfile::NamedTempFile::new_in(&parent)?;
    tmp.write_all(json.as_bytes())?;
    tmp.write_all(b"\n")?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| e.error)?;

    debug!("Appended run to {} ({} entries)", path.display(), entries.len());
    Ok(())
}
