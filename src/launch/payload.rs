//! Marker-based discovery of the archive embedded in a combined artifact.

use std::fs::File;
use std::io::{self, BufReader, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};

/// Local file header magic, the first bytes of any non-empty zip
pub const ZIP_LOCAL_HEADER_MAGIC: &[u8] = b"PK\x03\x04";
/// End of central directory magic, the first bytes of an empty zip
pub const ZIP_EMPTY_ARCHIVE_MAGIC: &[u8] = b"PK\x05\x06";

const SCAN_CHUNK: usize = 64 * 1024;
const COPY_BUFFER: usize = 8 * 1024;

/// Find where the archive starts in an in-memory artifact.
///
/// Returns the offset just past the *last* occurrence of `marker`.
pub fn find_payload_offset(content: &[u8], marker: &[u8]) -> Option<usize> {
    if marker.is_empty() || content.len() < marker.len() {
        return None;
    }
    content
        .windows(marker.len())
        .rposition(|window| window == marker)
        .map(|pos| pos + marker.len())
}

/// Find where the archive starts in an artifact on disk.
///
/// Same result as [`find_payload_offset`] over the whole file, computed by
/// scanning backwards in fixed-size chunks. Each chunk is searched together
/// with the first `marker.len() - 1` bytes of the chunk after it, so markers
/// straddling a chunk boundary are found.
pub fn locate_in_file(path: &Path, marker: &[u8]) -> io::Result<Option<u64>> {
    if marker.is_empty() {
        return Ok(None);
    }

    let mut file = File::open(path)?;
    let len = file.metadata()?.len();
    let overlap = marker.len() - 1;

    let mut end = len;
    let mut carry: Vec<u8> = Vec::new();
    let mut buf: Vec<u8> = Vec::with_capacity(SCAN_CHUNK + overlap);

    while end > 0 {
        let start = end.saturating_sub(SCAN_CHUNK as u64);
        let chunk_len = (end - start) as usize;

        buf.clear();
        buf.resize(chunk_len, 0);
        file.seek(SeekFrom::Start(start))?;
        file.read_exact(&mut buf)?;
        let head: Vec<u8> = buf[..overlap.min(chunk_len)].to_vec();
        buf.extend_from_slice(&carry);

        if let Some(offset) = find_payload_offset(&buf, marker) {
            return Ok(Some(start + offset as u64));
        }

        carry = head;
        end = start;
    }

    Ok(None)
}

/// Archive bytes embedded at the tail of a combined artifact
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmbeddedPayload {
    artifact: PathBuf,
    offset: u64,
    len: u64,
}

impl EmbeddedPayload {
    /// Locate the payload inside `artifact`, or `None` when the marker is absent
    pub fn locate(artifact: &Path, marker: &[u8]) -> io::Result<Option<Self>> {
        let Some(offset) = locate_in_file(artifact, marker)? else {
            return Ok(None);
        };
        let total = artifact.metadata()?.len();
        Ok(Some(Self {
            artifact: artifact.to_path_buf(),
            offset,
            len: total - offset,
        }))
    }

    pub fn artifact(&self) -> &Path {
        &self.artifact
    }

    /// Byte offset of the first archive byte
    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// Number of archive bytes after the marker
    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    fn open_at_offset(&self) -> io::Result<BufReader<File>> {
        let mut file = File::open(&self.artifact)?;
        file.seek(SeekFrom::Start(self.offset))?;
        Ok(BufReader::with_capacity(COPY_BUFFER, file))
    }

    /// Whether the payload starts with a zip magic number
    pub fn has_archive_magic(&self) -> io::Result<bool> {
        let mut magic = [0u8; 4];
        let mut reader = self.open_at_offset()?.take(magic.len() as u64);
        let mut read = 0;
        while read < magic.len() {
            let n = reader.read(&mut magic[read..])?;
            if n == 0 {
                return Ok(false);
            }
            read += n;
        }
        Ok(magic == ZIP_LOCAL_HEADER_MAGIC || magic == ZIP_EMPTY_ARCHIVE_MAGIC)
    }

    /// Lowercase hex SHA-256 of the raw archive bytes
    pub fn sha256_hex(&self) -> io::Result<String> {
        let mut reader = self.open_at_offset()?;
        let mut hasher = Sha256::new();
        let mut buf = [0u8; COPY_BUFFER];
        loop {
            let n = reader.read(&mut buf)?;
            if n == 0 {
                break;
            }
            hasher.update(&buf[..n]);
        }
        Ok(format!("{:x}", hasher.finalize()))
    }

    /// Stream the archive bytes into `out`
    pub fn copy_to<W: Write>(&self, out: &mut W) -> io::Result<u64> {
        let mut reader = self.open_at_offset()?;
        io::copy(&mut reader, out)
    }
}
