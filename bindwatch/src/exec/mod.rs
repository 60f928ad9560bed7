//! Running commands inside containers.
//!
//! - [`CommandExecutor`]: capability to run one shell command line in a container
//! - [`DockerCliExecutor`]: implementation backed by `docker exec`
//! - [`ProcessTracker`]: set of in-flight forwarded commands, drained on teardown

mod docker_cli;
mod tracker;

pub use docker_cli::DockerCliExecutor;
pub use tracker::{ProcessTracker, TrackedProcess};

use async_trait::async_trait;

use bindwatch_shared::errors::ForwarderResult;

use crate::runtime::types::ContainerID;

/// Captured result of a command run inside a container.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecOutput {
    /// Whether the command exited with status 0.
    pub success: bool,
    /// Exit code, if the process exited normally.
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl ExecOutput {
    pub fn success(stdout: impl Into<String>) -> Self {
        Self {
            success: true,
            exit_code: Some(0),
            stdout: stdout.into(),
            stderr: String::new(),
        }
    }

    pub fn failure(exit_code: i32, stderr: impl Into<String>) -> Self {
        Self {
            success: false,
            exit_code: Some(exit_code),
            stdout: String::new(),
            stderr: stderr.into(),
        }
    }
}

/// Runs a single command line inside a target container.
///
/// `command_line` is interpreted by the container's shell, so callers must
/// escape any path they interpolate into it.
#[async_trait]
pub trait CommandExecutor: Send + Sync {
    /// Run `command_line` in `container` and wait for it to exit.
    ///
    /// A non-zero exit is reported through [`ExecOutput::success`]; `Err` means
    /// the command could not be launched at all.
    async fn run(&self, container: &ContainerID, command_line: &str)
    -> ForwarderResult<ExecOutput>;
}
