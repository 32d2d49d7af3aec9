use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::util::paths::default_extraction_dir;

/// Example layout file contents (bundled with the binary)
pub const EXAMPLE_LAYOUT: &str = include_str!("satchel.toml.example");

/// Separator between the launcher bytes and the embedded archive.
///
/// The launcher carries this constant in its own image, so only the last
/// occurrence inside a combined artifact is authoritative.
pub const PAYLOAD_MARKER: &[u8] = b"===SATCHEL_PAYLOAD_START===";

/// Directory name used under the per-user data root
pub const DEFAULT_APP_NAME: &str = "satchel";

/// Name of the manifest entry stored at the archive root
pub const MANIFEST_FILE_NAME: &str = "satchel.toml";

#[derive(Error, Debug)]
pub enum LayoutError {
    #[error("Failed to read layout file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Invalid layout TOML: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("Failed to serialize manifest: {0}")]
    Serialize(#[from] toml::ser::Error),
}

/// Runtime settings shared by the packager and the launcher
#[derive(Debug, Clone)]
pub struct Settings {
    /// Application name, used as the extraction directory name
    pub app_name: String,
    /// Marker token separating launcher bytes from archive bytes
    pub marker: Vec<u8>,
    /// Explicit extraction directory (overrides the platform default)
    pub target_dir: Option<PathBuf>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            app_name: DEFAULT_APP_NAME.to_string(),
            marker: PAYLOAD_MARKER.to_vec(),
            target_dir: None,
        }
    }
}

impl Settings {
    pub fn with_app_name(mut self, name: impl Into<String>) -> Self {
        self.app_name = name.into();
        self
    }

    pub fn with_target_dir(mut self, dir: PathBuf) -> Self {
        self.target_dir = Some(dir);
        self
    }

    pub fn with_marker(mut self, marker: impl Into<Vec<u8>>) -> Self {
        self.marker = marker.into();
        self
    }

    /// Directory the embedded archive is materialized into, always absolute
    pub fn extraction_dir(&self) -> PathBuf {
        let dir = self
            .target_dir
            .clone()
            .unwrap_or_else(|| default_extraction_dir(&self.app_name));
        std::path::absolute(&dir).unwrap_or(dir)
    }

    /// Marker rendered for log and error messages
    pub fn marker_display(&self) -> String {
        String::from_utf8_lossy(&self.marker).into_owned()
    }
}

/// Names shared between the packager and the launcher.
///
/// Missing keys in a layout file fall back to the defaults below.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Layout {
    /// Runner executable name, without any platform suffix
    pub runner_name: String,
    /// Entry configuration file expected inside the project
    pub config_file: String,
    /// Top-level archive directory holding the project tree
    pub project_dir: String,
    /// Top-level archive directory holding the cached environment
    pub cache_dir: String,
    /// Environment variable pointing the runner at the cache directory
    pub cache_env: String,
    /// Runner arguments; `{config}` is replaced by the configuration path
    pub run_args: Vec<String>,
    /// Project path components starting with this prefix are not archived
    pub hidden_prefix: String,
    /// Project directories that hold build intermediates
    pub exclude_dirs: Vec<String>,
}

impl Default for Layout {
    fn default() -> Self {
        Self {
            runner_name: "rcc".into(),
            config_file: "robot.yaml".into(),
            project_dir: "robot".into(),
            cache_dir: ".rcc_home".into(),
            cache_env: "ROBOCORP_HOME".into(),
            run_args: vec!["run".into(), "--robot".into(), "{config}".into()],
            hidden_prefix: ".".into(),
            exclude_dirs: vec!["__pycache__".into()],
        }
    }
}

impl Layout {
    /// Parse a layout from TOML text
    pub fn from_toml_str(contents: &str) -> Result<Self, LayoutError> {
        Ok(toml::from_str(contents)?)
    }

    /// Load a layout file, or the defaults when no path is given
    pub fn load(path: Option<&Path>) -> Result<Self, LayoutError> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        let contents = fs::read_to_string(path).map_err(|source| LayoutError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&contents)
    }

    /// Take the runner name from the executable that is being packaged.
    ///
    /// `rcc.exe` and `rcc` both yield `rcc`.
    pub fn with_runner_from(mut self, runner: &Path) -> Self {
        if let Some(name) = runner.file_name().and_then(|n| n.to_str()) {
            let stem = name
                .strip_suffix(".exe")
                .or_else(|| name.strip_suffix(".EXE"))
                .unwrap_or(name);
            if !stem.is_empty() {
                self.runner_name = stem.to_string();
            }
        }
        self
    }
}

/// Build provenance recorded next to the layout in the archive manifest
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildInfo {
    pub created_at: DateTime<Utc>,
    pub satchel_version: String,
    pub runner_source: String,
    pub project_source: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cache_source: Option<String>,
}

/// Contents of `satchel.toml` at the archive root
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    #[serde(default)]
    pub layout: Layout,
    pub build: Option<BuildInfo>,
}

impl Manifest {
    pub fn new(layout: Layout, build: BuildInfo) -> Self {
        Self {
            layout,
            build: Some(build),
        }
    }

    pub fn to_toml(&self) -> Result<String, LayoutError> {
        Ok(toml::to_string_pretty(self)?)
    }

    pub fn from_toml_str(contents: &str) -> Result<Self, LayoutError> {
        Ok(toml::from_str(contents)?)
    }

    /// Read the manifest from an extracted tree.
    ///
    /// Returns `Ok(None)` when the archive carried no manifest.
    pub fn read_from(root: &Path) -> Result<Option<Self>, LayoutError> {
        let path = root.join(MANIFEST_FILE_NAME);
        if !path.is_file() {
            return Ok(None);
        }
        let contents = fs::read_to_string(&path).map_err(|source| LayoutError::Read {
            path: path.clone(),
            source,
        })?;
        Self::from_toml_str(&contents).map(Some)
    }
}
