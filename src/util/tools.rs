//! Executable detection helpers
//!
//! Used by the packager to resolve the runner given on the command line and by
//! the launcher to make sure an extracted runner can actually be started.

use std::io;
use std::path::{Path, PathBuf};

/// Resolve a program argument to a path.
///
/// An argument that exists on disk is returned unchanged. A bare name that
/// does not exist is looked up in `PATH` with `which`; if that fails too the
/// original argument is returned so the caller can report it as missing.
pub fn resolve_program(arg: &Path) -> PathBuf {
    if arg.exists() {
        return arg.to_path_buf();
    }

    let is_bare_name = arg.components().count() == 1;
    if is_bare_name {
        if let Ok(found) = which::which(arg) {
            tracing::debug!(
                name = %arg.display(),
                path = %found.display(),
                "Resolved program from PATH"
            );
            return found;
        }
    }

    arg.to_path_buf()
}

/// Check if a path points to a valid executable
pub fn is_valid_executable(path: &Path) -> bool {
    if !path.is_file() {
        return false;
    }

    // On Unix, check if the file is executable
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        if let Ok(metadata) = path.metadata() {
            return metadata.permissions().mode() & 0o111 != 0;
        }
        false
    }

    // On Windows, just check if the file exists
    #[cfg(not(unix))]
    {
        true
    }
}

/// Add execute bits to a file that has none.
///
/// Archives written by other tools may not carry Unix modes, so an extracted
/// runner can come out as `0o644`.
pub fn ensure_executable(path: &Path) -> io::Result<()> {
    if is_valid_executable(path) {
        return Ok(());
    }

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let mut permissions = path.metadata()?.permissions();
        let mode = permissions.mode();
        // Mirror read bits into execute bits (0o644 -> 0o755)
        permissions.set_mode(mode | ((mode & 0o444) >> 2));
        std::fs::set_permissions(path, permissions)?;
        tracing::info!(path = %path.display(), "Marked runner as executable");
    }

    Ok(())
}
