//! Concatenation of launcher, marker and archive into one artifact, and the
//! post-build verifier.

use std::fs::File;
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use crate::launch::payload::EmbeddedPayload;

use super::PackError;

/// Result of verifying a combined artifact
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactReport {
    pub path: PathBuf,
    /// Offset of the first archive byte
    pub archive_offset: u64,
    pub archive_len: u64,
    /// Lowercase hex SHA-256 of the archive bytes
    pub archive_sha256: String,
    pub total_len: u64,
}

/// Where the launcher bytes come from
#[derive(Debug, Clone)]
pub enum LauncherSource {
    /// A file copied verbatim
    File(PathBuf),
    /// The first `len` bytes of a file
    Prefix { path: PathBuf, len: u64 },
}

impl LauncherSource {
    /// Use `path` as the launcher; if it is itself a combined artifact only
    /// the bytes before its payload marker are kept.
    pub fn strip_payload(path: &Path, marker: &[u8]) -> io::Result<Self> {
        if let Some(payload) = EmbeddedPayload::locate(path, marker)? {
            if payload.has_archive_magic()? {
                let len = payload.offset() - marker.len() as u64;
                tracing::debug!(
                    path = %path.display(),
                    len,
                    "Launcher already carries a payload, using its launcher bytes only"
                );
                return Ok(Self::Prefix {
                    path: path.to_path_buf(),
                    len,
                });
            }
        }
        Ok(Self::File(path.to_path_buf()))
    }

    pub fn path(&self) -> &Path {
        match self {
            Self::File(path) | Self::Prefix { path, .. } => path,
        }
    }

    fn copy_to<W: Write>(&self, out: &mut W) -> io::Result<u64> {
        let mut reader = BufReader::new(File::open(self.path())?);
        match self {
            Self::File(_) => io::copy(&mut reader, out),
            Self::Prefix { len, .. } => io::copy(&mut reader.take(*len), out),
        }
    }
}

/// Write launcher bytes, marker bytes and archive bytes, in that order, to
/// `output`. Nothing is transformed.
pub fn assemble(
    launcher: &LauncherSource,
    marker: &[u8],
    archive: &Path,
    output: &Path,
) -> Result<u64, PackError> {
    if !launcher.path().is_file() {
        return Err(PackError::LauncherNotFound(launcher.path().to_path_buf()));
    }

    tracing::info!(output = %output.display(), "Creating self-extracting artifact");
    let mut out = BufWriter::new(File::create(output)?);

    tracing::info!(launcher = %launcher.path().display(), "Writing launcher");
    let mut written = launcher.copy_to(&mut out)?;

    out.write_all(marker)?;
    written += marker.len() as u64;

    tracing::info!(archive = %archive.display(), "Writing payload archive");
    let mut archive_reader = BufReader::new(File::open(archive)?);
    written += io::copy(&mut archive_reader, &mut out)?;

    out.flush()?;
    drop(out);

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(output, std::fs::Permissions::from_mode(0o755))?;
    }

    Ok(written)
}

/// Check that a zip magic number follows the last marker of `path` and hash
/// the trailing archive bytes
pub fn verify_artifact(path: &Path, marker: &[u8]) -> Result<ArtifactReport, PackError> {
    let verification = |reason: &str| PackError::Verification {
        path: path.to_path_buf(),
        reason: reason.to_string(),
    };

    let payload = EmbeddedPayload::locate(path, marker)?
        .ok_or_else(|| verification("payload marker not found"))?;
    if !payload.has_archive_magic()? {
        return Err(verification(
            "no zip magic number immediately follows the payload marker",
        ));
    }

    Ok(ArtifactReport {
        path: path.to_path_buf(),
        archive_offset: payload.offset(),
        archive_len: payload.len(),
        archive_sha256: payload.sha256_hex()?,
        total_len: path.metadata()?.len(),
    })
}
