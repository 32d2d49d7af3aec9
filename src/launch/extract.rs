//! Hash-gated materialization of the embedded archive.
//!
//! The sentinel file is the only record that a previous extraction finished.
//! It is removed before any existing contents are touched and written back
//! only after every entry has been expanded.

use std::fs::{self, File};
use std::io::{self, BufWriter, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use crate::util::paths::{sentinel_path, LOG_FILE_NAME};

use super::payload::EmbeddedPayload;
use super::LaunchError;

/// Why an existing extraction is not trusted
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StaleReason {
    /// Contents exist but no sentinel (e.g. an interrupted extraction)
    MissingSentinel,
    /// The artifact was rebuilt since the last extraction
    HashMismatch { stored: String, current: String },
}

/// Observed state of the extraction directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExtractState {
    Absent,
    Empty,
    Stale(StaleReason),
    Current,
}

impl ExtractState {
    pub fn needs_extraction(&self) -> bool {
        !matches!(self, ExtractState::Current)
    }
}

/// Result of [`ensure_extracted`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractOutcome {
    /// State found before any work was done
    pub state: ExtractState,
    /// Number of archive entries expanded (0 when skipped)
    pub entries: usize,
}

impl ExtractOutcome {
    pub fn extracted(&self) -> bool {
        self.state.needs_extraction()
    }
}

fn is_empty_ignoring_log(target: &Path) -> io::Result<bool> {
    for entry in fs::read_dir(target)? {
        if entry?.file_name() != LOG_FILE_NAME {
            return Ok(false);
        }
    }
    Ok(true)
}

/// Decide whether `target` holds a current extraction of `payload`
pub fn inspect(target: &Path, payload: &EmbeddedPayload) -> io::Result<ExtractState> {
    if !target.exists() {
        return Ok(ExtractState::Absent);
    }

    if is_empty_ignoring_log(target)? {
        return Ok(ExtractState::Empty);
    }

    let sentinel = sentinel_path(target);
    if !sentinel.is_file() {
        return Ok(ExtractState::Stale(StaleReason::MissingSentinel));
    }

    let stored = fs::read_to_string(&sentinel)?.trim().to_string();
    let current = payload.sha256_hex()?;
    if stored != current {
        return Ok(ExtractState::Stale(StaleReason::HashMismatch { stored, current }));
    }

    Ok(ExtractState::Current)
}

/// Persist the payload hash as the sentinel
pub fn save_payload_hash(target: &Path, payload: &EmbeddedPayload) -> io::Result<String> {
    let hash = payload.sha256_hex()?;
    fs::write(sentinel_path(target), &hash)?;
    Ok(hash)
}

/// Remove everything in `target` except the launcher log and `keep`
fn clear_contents(target: &Path, keep: &Path) -> io::Result<()> {
    for entry in fs::read_dir(target)? {
        let entry = entry?;
        let path = entry.path();
        if entry.file_name() == LOG_FILE_NAME || path == keep {
            continue;
        }
        if entry.file_type()?.is_dir() {
            fs::remove_dir_all(&path)?;
        } else {
            fs::remove_file(&path)?;
        }
    }
    Ok(())
}

fn extraction_error(target: &Path, source: io::Error) -> LaunchError {
    LaunchError::Extraction {
        path: target.to_path_buf(),
        source,
    }
}

/// Expand `payload` into `target` and record its hash.
///
/// The archive bytes are first copied to a temporary file inside `target`,
/// which is removed on every exit path. A payload that does not open as a zip
/// is reported as [`LaunchError::InvalidArchive`] before the existing
/// contents are touched.
pub fn extract(target: &Path, payload: &EmbeddedPayload) -> Result<usize, LaunchError> {
    tracing::info!(dir = %target.display(), "Extracting payload");

    fs::create_dir_all(target).map_err(|e| extraction_error(target, e))?;

    let temp = tempfile::Builder::new()
        .prefix(".satchel-payload")
        .suffix(".zip")
        .tempfile_in(target)
        .map_err(|e| extraction_error(target, e))?;
    let temp_path: PathBuf = temp.path().to_path_buf();

    {
        let mut writer = BufWriter::new(temp.as_file());
        payload
            .copy_to(&mut writer)
            .and_then(|_| writer.flush())
            .map_err(|e| extraction_error(target, e))?;
    }

    let mut file: File = temp.reopen().map_err(|e| extraction_error(target, e))?;
    file.seek(SeekFrom::Start(0))
        .map_err(|e| extraction_error(target, e))?;
    let mut archive =
        zip::ZipArchive::new(file).map_err(|e| LaunchError::InvalidArchive {
            artifact: payload.artifact().to_path_buf(),
            reason: e.to_string(),
        })?;

    let sentinel = sentinel_path(target);
    if sentinel.exists() {
        fs::remove_file(&sentinel).map_err(|e| extraction_error(target, e))?;
    }
    clear_contents(target, &temp_path).map_err(|e| extraction_error(target, e))?;

    tracing::info!(entries = archive.len(), "Extracting archive contents");
    archive
        .extract(target)
        .map_err(|e| extraction_error(target, io::Error::other(e)))?;
    let entries = archive.len();
    drop(archive);

    let hash = save_payload_hash(target, payload).map_err(|e| extraction_error(target, e))?;
    tracing::info!(entries, hash = %hash, "Extraction complete");

    Ok(entries)
}

/// Extract `payload` into `target` unless the sentinel says it is current
pub fn ensure_extracted(
    target: &Path,
    payload: &EmbeddedPayload,
) -> Result<ExtractOutcome, LaunchError> {
    let state = inspect(target, payload).map_err(|e| extraction_error(target, e))?;

    match &state {
        ExtractState::Absent => {
            tracing::info!("Target directory does not exist, extraction needed")
        }
        ExtractState::Empty => tracing::info!("Target directory is empty, extraction needed"),
        ExtractState::Stale(StaleReason::MissingSentinel) => {
            tracing::info!("Payload hash file missing, extraction needed")
        }
        ExtractState::Stale(StaleReason::HashMismatch { stored, current }) => {
            tracing::info!(
                stored = %stored,
                current = %current,
                "Payload hash changed, re-extraction needed"
            )
        }
        ExtractState::Current => {
            tracing::info!("Payload unchanged, skipping extraction");
            return Ok(ExtractOutcome { state, entries: 0 });
        }
    }

    let entries = extract(target, payload)?;
    Ok(ExtractOutcome { state, entries })
}
