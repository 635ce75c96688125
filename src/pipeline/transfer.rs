//! Copy or move an invoice into the output directory.
//!
//! Bytes are first written to a temp file inside the destination directory,
//! synced, then linked into place with no-clobber semantics. A destination
//! name therefore either does not exist or holds the complete file; a
//! cancelled or failed transfer only ever leaves a temp file behind, and
//! `tempfile` removes that on drop.
//!
//! Choosing a free name and creating it are the same step: the no-clobber
//! rename either claims the candidate or reports `AlreadyExists`, in which
//! case the next `-N` candidate is tried with the same temp file. Two workers
//! racing for one base name can never both win.

use crate::config::TransferMode;
use crate::error::FileError;
use crate::pipeline::filename::{candidate, MAX_COLLISION_SUFFIX};
use std::fs::File;
use std::io::{self, ErrorKind};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::{debug, warn};

/// Place `source` in `dir` under `base_name`, or the first free `-N`
/// variant of it. Returns the final destination.
pub async fn place(
    source: &Path,
    dir: &Path,
    base_name: &str,
    mode: TransferMode,
) -> Result<PathBuf, FileError> {
    let source = source.to_path_buf();
    let dir = dir.to_path_buf();
    let base = base_name.to_string();
    let fallback = dir.join(&base);

    tokio::task::spawn_blocking(move || place_blocking(&source, &dir, &base, mode))
        .await
        .map_err(|e| FileError::TransferFailed {
            path: fallback,
            detail: format!("transfer task panicked: {e}"),
        })?
}

/// Transfer `source` to exactly `destination`.
///
/// Fails with [`FileError::DestinationExists`] rather than overwrite.
pub async fn transfer(source: &Path, destination: &Path, mode: TransferMode) -> Result<(), FileError> {
    let source = source.to_path_buf();
    let destination = destination.to_path_buf();
    let dest = destination.clone();

    tokio::task::spawn_blocking(move || {
        let dir = parent_dir(&destination);
        let staged = stage(&source, &dir)?;
        match staged.tmp.persist_noclobber(&destination) {
            Ok(_) => finish(&source, &destination, staged.len, mode),
            Err(e) if e.error.kind() == ErrorKind::AlreadyExists => {
                Err(FileError::DestinationExists { path: destination })
            }
            Err(e) => Err(failed(&destination, e.error)),
        }
    })
    .await
    .map_err(|e| FileError::TransferFailed {
        path: dest,
        detail: format!("transfer task panicked: {e}"),
    })?
}

/// A complete, synced copy of the source waiting to be linked into place.
struct Staged {
    tmp: NamedTempFile,
    len: u64,
}

fn place_blocking(
    source: &Path,
    dir: &Path,
    base: &str,
    mode: TransferMode,
) -> Result<PathBuf, FileError> {
    let mut tmp = stage(source, dir)?;

    for n in 0..MAX_COLLISION_SUFFIX {
        let dest = dir.join(candidate(base, n));
        match tmp.tmp.persist_noclobber(&dest) {
            Ok(_) => {
                finish(source, &dest, tmp.len, mode)?;
                return Ok(dest);
            }
            Err(e) if e.error.kind() == ErrorKind::AlreadyExists => {
                debug!("{} taken, trying next name", dest.display());
                tmp.tmp = e.file;
            }
            Err(e) => return Err(failed(&dest, e.error)),
        }
    }

    Err(FileError::DestinationExists {
        path: dir.join(base),
    })
}

/// Copy `source` into a temp file in `dir` and sync it.
fn stage(source: &Path, dir: &Path) -> Result<Staged, FileError> {
    std::fs::create_dir_all(dir).map_err(|e| failed(dir, e))?;

    let mut src = File::open(source).map_err(|e| failed(source, e))?;
    let mut tmp = NamedTempFile::new_in(dir).map_err(|e| failed(dir, e))?;
    let len = io::copy(&mut src, tmp.as_file_mut()).map_err(|e| failed(tmp.path(), e))?;
    tmp.as_file().sync_all().map_err(|e| failed(tmp.path(), e))?;

    Ok(Staged { tmp, len })
}

/// For a move, verify the placed copy and remove the source.
fn finish(source: &Path, dest: &Path, expected_len: u64, mode: TransferMode) -> Result<(), FileError> {
    if mode == TransferMode::Copy {
        return Ok(());
    }

    let placed = std::fs::metadata(dest).map_err(|e| failed(dest, e))?.len();
    let original = std::fs::metadata(source).map_err(|e| failed(source, e))?.len();
    if placed != expected_len || placed != original {
        // Keep the source; drop the suspect copy.
        let _ = std::fs::remove_file(dest);
        return Err(FileError::TransferFailed {
            path: dest.to_path_buf(),
            detail: format!("size mismatch after copy: source {original} bytes, destination {placed} bytes"),
        });
    }

    if let Err(e) = std::fs::remove_file(source) {
        warn!(
            "Copied {} but could not remove the source: {}",
            source.display(),
            e
        );
    }
    Ok(())
}

fn parent_dir(path: &Path) -> PathBuf {
    match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    }
}

fn failed(path: &Path, e: io::Error) -> FileError {
    FileError::TransferFailed {
        path: path.to_path_buf(),
        detail: e.to_string(),
    }
}
