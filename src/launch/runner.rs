//! Invoking the runner against the extracted project.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::{Command, ExitStatus};

use crate::config::Layout;
use crate::util::tools::ensure_executable;

use super::locate::PayloadMembers;
use super::LaunchError;

/// Placeholder in `Layout::run_args` replaced by the configuration path
pub const CONFIG_PLACEHOLDER: &str = "{config}";

/// A fully resolved runner command
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunnerInvocation {
    pub program: PathBuf,
    pub args: Vec<OsString>,
    pub cwd: PathBuf,
    pub envs: Vec<(String, PathBuf)>,
}

fn expand_arg(arg: &str, config: &Path) -> OsString {
    if arg == CONFIG_PLACEHOLDER {
        return config.as_os_str().to_os_string();
    }
    if arg.contains(CONFIG_PLACEHOLDER) {
        return arg
            .replace(CONFIG_PLACEHOLDER, &config.to_string_lossy())
            .into();
    }
    arg.into()
}

impl RunnerInvocation {
    pub fn new(members: &PayloadMembers, layout: &Layout) -> Self {
        let args = layout
            .run_args
            .iter()
            .map(|arg| expand_arg(arg, &members.config))
            .collect();

        let cwd = members
            .config
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));

        let envs = members
            .cache_dir
            .iter()
            .map(|dir| (layout.cache_env.clone(), dir.clone()))
            .collect();

        Self {
            program: members.runner.clone(),
            args,
            cwd,
            envs,
        }
    }

    /// Value of an environment variable this invocation sets
    pub fn env(&self, key: &str) -> Option<&Path> {
        self.envs
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_path())
    }

    /// Build the process command; stdio is inherited so output streams live
    pub fn command(&self) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args).current_dir(&self.cwd);
        for (key, value) in &self.envs {
            cmd.env(key, value);
        }
        cmd
    }

    /// Run to completion and return the runner's exit code
    pub fn run(&self) -> Result<i32, LaunchError> {
        ensure_executable(&self.program).map_err(|source| LaunchError::Spawn {
            path: self.program.clone(),
            source,
        })?;

        for (key, value) in &self.envs {
            tracing::info!(key = %key, value = %value.display(), "Setting runner environment");
        }
        tracing::info!(
            program = %self.program.display(),
            args = ?self.args,
            cwd = %self.cwd.display(),
            "Executing runner"
        );

        let status = self
            .command()
            .status()
            .map_err(|source| LaunchError::Spawn {
                path: self.program.clone(),
                source,
            })?;

        let code = exit_code(status);
        if code == 0 {
            tracing::info!("Runner completed successfully");
        } else {
            tracing::error!(code, "Runner exited with non-zero code");
        }
        Ok(code)
    }
}

/// Map an exit status to a process exit code.
///
/// A runner killed by a signal reports `128 + signal` on Unix.
pub fn exit_code(status: ExitStatus) -> i32 {
    if let Some(code) = status.code() {
        return code;
    }

    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return 128 + signal;
        }
    }

    1
}
