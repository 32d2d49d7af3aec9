//! Launcher side of a combined artifact.
//!
//! At startup the artifact reads itself, finds the archive after the last
//! payload marker, materializes it into the extraction directory when the
//! stored hash says it is missing or outdated, then runs the embedded runner
//! against the embedded project.

pub mod extract;
pub mod locate;
pub mod payload;
pub mod runner;

use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::config::{Layout, LayoutError, Manifest, Settings};

pub use extract::{ensure_extracted, inspect, ExtractOutcome, ExtractState, StaleReason};
pub use locate::{locate_members, EntryKind, PayloadMembers, SearchStrategy};
pub use payload::{find_payload_offset, locate_in_file, EmbeddedPayload};
pub use runner::RunnerInvocation;

#[derive(Error, Debug)]
pub enum LaunchError {
    #[error("No embedded payload found in {artifact} (expected marker {marker})")]
    MarkerNotFound { artifact: PathBuf, marker: String },
    #[error("Embedded payload in {artifact} is not a valid archive: {reason}")]
    InvalidArchive { artifact: PathBuf, reason: String },
    #[error("Invalid archive manifest: {0}")]
    Manifest(#[from] LayoutError),
    #[error("Extraction into {path} failed: {source}")]
    Extraction {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("Runner executable '{name}' not found under {root}")]
    RunnerNotFound {
        name: String,
        root: PathBuf,
        searched: Vec<PathBuf>,
    },
    #[error("Configuration file '{name}' not found under {root}")]
    ConfigNotFound {
        name: String,
        root: PathBuf,
        searched: Vec<PathBuf>,
    },
    #[error("Failed to execute runner {path}: {source}")]
    Spawn {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

impl LaunchError {
    /// Fixed process exit code for each failure class
    pub fn exit_code(&self) -> i32 {
        match self {
            LaunchError::MarkerNotFound { .. } => 2,
            LaunchError::InvalidArchive { .. } | LaunchError::Manifest(_) => 3,
            LaunchError::Extraction { .. } => 4,
            LaunchError::RunnerNotFound { .. } => 5,
            LaunchError::ConfigNotFound { .. } => 6,
            LaunchError::Spawn { .. } => 7,
            LaunchError::Io(_) => 1,
        }
    }
}

/// Everything needed to start the runner, resolved from an artifact
#[derive(Debug, Clone)]
pub struct LaunchPlan {
    pub payload: EmbeddedPayload,
    pub extraction: ExtractOutcome,
    pub layout: Layout,
    pub members: PayloadMembers,
    pub invocation: RunnerInvocation,
}

/// Runs combined artifacts
#[derive(Debug, Clone, Default)]
pub struct Launcher {
    settings: Settings,
}

impl Launcher {
    pub fn new(settings: Settings) -> Self {
        Self { settings }
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Locate and validate the embedded payload of `artifact`
    pub fn find_payload(&self, artifact: &Path) -> Result<EmbeddedPayload, LaunchError> {
        tracing::info!(artifact = %artifact.display(), "Searching for embedded payload");
        let payload = EmbeddedPayload::locate(artifact, &self.settings.marker)?.ok_or_else(|| {
            LaunchError::MarkerNotFound {
                artifact: artifact.to_path_buf(),
                marker: self.settings.marker_display(),
            }
        })?;
        tracing::info!(
            offset = payload.offset(),
            bytes = payload.len(),
            "Payload found"
        );

        if !payload.has_archive_magic()? {
            return Err(LaunchError::InvalidArchive {
                artifact: artifact.to_path_buf(),
                reason: if payload.is_empty() {
                    "no bytes follow the payload marker".to_string()
                } else {
                    "bytes after the payload marker are not a zip archive".to_string()
                },
            });
        }

        Ok(payload)
    }

    /// Extract (if needed) and resolve the runner command without running it
    pub fn prepare(&self, artifact: &Path) -> Result<LaunchPlan, LaunchError> {
        let payload = self.find_payload(artifact)?;
        let target = self.settings.extraction_dir();

        let extraction = ensure_extracted(&target, &payload)?;

        let layout = match Manifest::read_from(&target)? {
            Some(manifest) => manifest.layout,
            None => {
                tracing::debug!("Archive carries no manifest, using default layout");
                Layout::default()
            }
        };

        let members = locate_members(&target, &layout)?;
        let invocation = RunnerInvocation::new(&members, &layout);

        Ok(LaunchPlan {
            payload,
            extraction,
            layout,
            members,
            invocation,
        })
    }

    /// Prepare and run; returns the runner's exit code
    pub fn run(&self, artifact: &Path) -> Result<i32, LaunchError> {
        let plan = self.prepare(artifact)?;
        plan.invocation.run()
    }
}
