//! Packager input fixtures
//!
//! Provides temporary runner/cache/project trees and helpers to turn them
//! into combined artifacts.

use std::fs;
use std::path::{Path, PathBuf};

use satchel::config::{Layout, Settings, PAYLOAD_MARKER};
use satchel::{ArtifactReport, BuildRequest, Packager};
use tempfile::TempDir;

/// File the fixture runner writes its invocation details to, relative to
/// its working directory
pub const RECORD_FILE_NAME: &str = "invocation.txt";

/// Exit code of the fixture runner
pub const RUNNER_EXIT_CODE: i32 = 0;

/// A temporary set of packager inputs
///
/// Everything lives under one temp dir that is removed when the
/// `TestInputs` is dropped:
/// - `inputs/runner`: shell script recording cwd, args and cache env
/// - `inputs/cache/`: one file plus a nested file
/// - `inputs/project/`: `config.yaml`, `task.src`, a nested file, and
///   entries the packager must exclude (`.secret`, `__pycache__/`)
/// - `inputs/launcher`: launcher stand-in that contains the marker literally
/// - `target/`: extraction directory (not created)
pub struct TestInputs {
    /// TempDir handle (keeps directory alive until dropped)
    _dir: TempDir,
    /// Root of the temp tree
    pub root: PathBuf,
    pub runner: PathBuf,
    pub cache: PathBuf,
    pub project: PathBuf,
    pub launcher: PathBuf,
    pub target: PathBuf,
}

impl TestInputs {
    pub fn new() -> Self {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let root = dir.path().to_path_buf();
        let inputs = root.join("inputs");

        let runner = inputs.join("runner");
        write(
            &runner,
            format!(
                "#!/bin/sh\n\
                 {{\n\
                 echo \"cwd=$(pwd)\"\n\
                 echo \"home=${{ROBOCORP_HOME:-unset}}\"\n\
                 for arg in \"$@\"; do echo \"arg=$arg\"; done\n\
                 }} > {RECORD_FILE_NAME}\n\
                 exit {RUNNER_EXIT_CODE}\n"
            ),
        );

        let cache = inputs.join("cache");
        write(cache.join("x"), "cached environment\n");
        write(cache.join("envs").join("env.lock"), "lock\n");

        let project = inputs.join("project");
        write(project.join("config.yaml"), "tasks:\n  Run:\n    shell: task\n");
        write(project.join("task.src"), "print('hello')\n");
        write(project.join("lib").join("helpers.src"), "def helper(): pass\n");
        write(project.join(".secret"), "token=abc\n");
        write(project.join(".git").join("HEAD"), "ref: refs/heads/main\n");
        write(project.join("__pycache__").join("task.pyc"), b"\x00\x01\x02");
        write(
            project.join("lib").join("__pycache__").join("helpers.pyc"),
            b"\x00\x01\x02",
        );

        let launcher = inputs.join("launcher");
        write(&launcher, launcher_bytes(b"launcher stand-in"));

        Self {
            _dir: dir,
            target: root.join("target"),
            root,
            runner,
            cache,
            project,
            launcher,
        }
    }

    /// Layout matching the fixture tree
    pub fn layout(&self) -> Layout {
        Layout {
            runner_name: "runner".to_string(),
            config_file: "config.yaml".to_string(),
            project_dir: "project".to_string(),
            cache_dir: "cache".to_string(),
            ..Layout::default()
        }
    }

    /// Settings extracting into this fixture's `target/`
    pub fn settings(&self) -> Settings {
        Settings::default().with_target_dir(self.target.clone())
    }

    /// Build request for the fixture inputs, cache included
    pub fn request(&self, output: &Path) -> BuildRequest {
        BuildRequest {
            cache_dir: Some(self.cache.clone()),
            launcher: Some(self.launcher.clone()),
            temp_dir: Some(self.root.join("build")),
            layout: self.layout(),
            ..BuildRequest::new(
                self.runner.clone(),
                self.project.clone(),
                output.to_path_buf(),
            )
        }
    }

    /// Build a combined artifact named `name` from the fixture inputs
    pub fn build(&self, name: &str) -> ArtifactReport {
        let output = self.root.join(name);
        Packager::new(self.settings())
            .build(&self.request(&output))
            .expect("Failed to build artifact")
    }

    /// Build without the cache directory
    pub fn build_without_cache(&self, name: &str) -> ArtifactReport {
        let output = self.root.join(name);
        let request = BuildRequest {
            cache_dir: None,
            ..self.request(&output)
        };
        Packager::new(self.settings())
            .build(&request)
            .expect("Failed to build artifact")
    }

    /// Project files that must come back byte-identical, relative to the
    /// project root
    pub fn kept_project_files(&self) -> Vec<PathBuf> {
        ["config.yaml", "task.src", "lib/helpers.src"]
            .iter()
            .map(PathBuf::from)
            .collect()
    }

    /// Project entries the packager must leave out
    pub fn excluded_project_entries(&self) -> Vec<PathBuf> {
        [".secret", ".git", "__pycache__", "lib/__pycache__"]
            .iter()
            .map(PathBuf::from)
            .collect()
    }
}

impl Default for TestInputs {
    fn default() -> Self {
        Self::new()
    }
}

/// Launcher-like bytes: a prologue, the marker as an embedded constant, and
/// non-UTF-8 trailing bytes
pub fn launcher_bytes(prologue: &[u8]) -> Vec<u8> {
    let mut bytes = prologue.to_vec();
    bytes.extend_from_slice(b"\0const MARKER: &[u8] = b\"");
    bytes.extend_from_slice(PAYLOAD_MARKER);
    bytes.extend_from_slice(b"\";\0\xff\xfe\xfd");
    bytes
}

/// Write `contents` to `path`, creating parent directories
pub fn write(path: impl AsRef<Path>, contents: impl AsRef<[u8]>) {
    let path = path.as_ref();
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).expect("Failed to create parent dir");
    }
    fs::write(path, contents).expect("Failed to write fixture file");
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        if path.file_name().is_some_and(|n| n == "runner") {
            fs::set_permissions(path, fs::Permissions::from_mode(0o755))
                .expect("Failed to chmod runner");
        }
    }
}

/// Parse the fixture runner's record file into `key=value` lines
pub fn read_record(dir: &Path) -> Vec<(String, String)> {
    let contents = fs::read_to_string(dir.join(RECORD_FILE_NAME)).expect("Runner did not run");
    contents
        .lines()
        .filter_map(|line| line.split_once('='))
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}
