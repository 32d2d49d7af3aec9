//! Packager side: builds the payload archive and the combined artifact.

pub mod archive;
pub mod assemble;
pub mod filter;

use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::config::{Layout, LayoutError, Settings};
use crate::util::tools::resolve_program;

pub use archive::{validate_inputs, ArchiveBuilder, ArchiveSummary};
pub use assemble::{assemble, verify_artifact, ArtifactReport, LauncherSource};
pub use filter::{ExcludeRules, IncludeAll, PathFilter};

#[derive(Error, Debug)]
pub enum PackError {
    #[error("Runner executable not found: {0}")]
    RunnerNotFound(PathBuf),
    #[error("Runner path is not a file: {0}")]
    RunnerNotAFile(PathBuf),
    #[error("Project directory not found: {0}")]
    ProjectNotFound(PathBuf),
    #[error("Project path is not a directory: {0}")]
    ProjectNotADirectory(PathBuf),
    #[error("Launcher not found: {0}")]
    LauncherNotFound(PathBuf),
    #[error("Artifact verification failed for {path}: {reason}")]
    Verification { path: PathBuf, reason: String },
    #[error(transparent)]
    Layout(#[from] LayoutError),
    #[error("Zip error: {0}")]
    Zip(#[from] zip::result::ZipError),
    #[error("Failed to walk directory: {0}")]
    Walk(#[from] walkdir::Error),
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

/// Inputs of one packager run
#[derive(Debug, Clone)]
pub struct BuildRequest {
    /// Runner executable (a bare name is looked up in `PATH`)
    pub runner: PathBuf,
    /// Optional pre-materialized cache directory
    pub cache_dir: Option<PathBuf>,
    pub project: PathBuf,
    pub output: PathBuf,
    /// Launcher payload; the running executable when `None`
    pub launcher: Option<PathBuf>,
    /// Directory for the intermediate archive; a fresh temp dir when `None`
    pub temp_dir: Option<PathBuf>,
    pub layout: Layout,
}

impl BuildRequest {
    pub fn new(runner: PathBuf, project: PathBuf, output: PathBuf) -> Self {
        Self {
            runner,
            cache_dir: None,
            project,
            output,
            launcher: None,
            temp_dir: None,
            layout: Layout::default(),
        }
    }
}

/// Builds combined artifacts
#[derive(Debug, Clone, Default)]
pub struct Packager {
    settings: Settings,
}

impl Packager {
    pub fn new(settings: Settings) -> Self {
        Self { settings }
    }

    fn launcher_source(&self, launcher: Option<&Path>) -> Result<LauncherSource, PackError> {
        let path = match launcher {
            Some(path) => path.to_path_buf(),
            None => std::env::current_exe()?,
        };
        if !path.is_file() {
            return Err(PackError::LauncherNotFound(path));
        }
        Ok(LauncherSource::strip_payload(&path, &self.settings.marker)?)
    }

    /// Build the archive, assemble the artifact and verify it
    pub fn build(&self, request: &BuildRequest) -> Result<ArtifactReport, PackError> {
        let runner = resolve_program(&request.runner);
        let layout = request.layout.clone().with_runner_from(&runner);
        let launcher = self.launcher_source(request.launcher.as_deref())?;

        // Keep the TempDir guard alive until the artifact is assembled.
        let (_guard, temp_dir) = match &request.temp_dir {
            Some(dir) => {
                std::fs::create_dir_all(dir)?;
                (None, dir.clone())
            }
            None => {
                let dir = tempfile::Builder::new().prefix("satchel_build_").tempdir()?;
                let path = dir.path().to_path_buf();
                (Some(dir), path)
            }
        };
        tracing::info!(temp_dir = %temp_dir.display(), "Using temp directory");

        let payload_zip = temp_dir.join("payload.zip");
        ArchiveBuilder::new(layout).build(
            &runner,
            request.cache_dir.as_deref(),
            &request.project,
            &payload_zip,
        )?;

        assemble(
            &launcher,
            &self.settings.marker,
            &payload_zip,
            &request.output,
        )?;

        let report = verify_artifact(&request.output, &self.settings.marker)?;
        tracing::info!(
            output = %report.path.display(),
            bytes = report.total_len,
            archive_sha256 = %report.archive_sha256,
            "Self-extracting artifact created"
        );
        Ok(report)
    }
}
