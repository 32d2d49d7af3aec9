//! Path utilities for the extraction directory

use std::path::{Path, PathBuf};

/// Sentinel holding the hash of the last successfully extracted archive
pub const SENTINEL_FILE_NAME: &str = ".payload_hash";

/// Launcher log kept inside the extraction directory
pub const LOG_FILE_NAME: &str = "launcher.log";

/// Get the per-user local data root.
///
/// `%LOCALAPPDATA%` on Windows, `~/.local/share` on Linux,
/// `~/Library/Application Support` on macOS.
pub fn data_root() -> PathBuf {
    dirs::data_local_dir()
        .or_else(|| dirs::home_dir().map(|h| h.join(".local").join("share")))
        .unwrap_or_else(|| PathBuf::from("."))
}

/// Get the default extraction directory (<data root>/<app name>)
pub fn default_extraction_dir(app_name: &str) -> PathBuf {
    data_root().join(app_name)
}

/// Get the sentinel file path inside an extraction directory
pub fn sentinel_path(target: &Path) -> PathBuf {
    target.join(SENTINEL_FILE_NAME)
}

/// Get the launcher log path inside an extraction directory
pub fn log_file_path(target: &Path) -> PathBuf {
    target.join(LOG_FILE_NAME)
}

/// Render a relative path as an archive entry name (always `/`-separated)
pub fn archive_entry_name(prefix: Option<&str>, rel: &Path) -> String {
    let mut parts: Vec<String> = Vec::new();
    if let Some(prefix) = prefix {
        parts.push(prefix.to_string());
    }
    parts.extend(
        rel.components()
            .map(|c| c.as_os_str().to_string_lossy().into_owned()),
    );
    parts.join("/")
}
