//! `docker exec` backed command executor.

use std::path::PathBuf;
use std::process::Stdio;

use async_trait::async_trait;
use tokio::process::Command;

use bindwatch_shared::errors::{ForwarderError, ForwarderResult};

use super::{CommandExecutor, ExecOutput};
use crate::runtime::types::ContainerID;

/// Runs commands through the container runtime CLI:
/// `docker [--host <endpoint>] exec <id> sh -c <command_line>`.
#[derive(Debug, Clone)]
pub struct DockerCliExecutor {
    program: PathBuf,
    endpoint: Option<String>,
}

impl DockerCliExecutor {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            endpoint: None,
        }
    }

    /// Pin the CLI to the endpoint the supervisor connects to.
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = Some(endpoint.into());
        self
    }

    fn command(&self, container: &ContainerID, command_line: &str) -> Command {
        let mut cmd = Command::new(&self.program);
        if let Some(ref endpoint) = self.endpoint {
            cmd.arg("--host").arg(endpoint);
        }
        cmd.arg("exec")
            .arg(container.as_str())
            .arg("sh")
            .arg("-c")
            .arg(command_line)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        cmd
    }
}

#[async_trait]
impl CommandExecutor for DockerCliExecutor {
    async fn run(
        &self,
        container: &ContainerID,
        command_line: &str,
    ) -> ForwarderResult<ExecOutput> {
        tracing::info!(
            container_id = %container.short(),
            command = %command_line,
            "Executing: {} exec {} {}",
            self.program.display(),
            container.short(),
            command_line
        );

        let output = self
            .command(container, command_line)
            .output()
            .await
            .map_err(|e| {
                ForwarderError::Execution(format!(
                    "Failed to launch {}: {}",
                    self.program.display(),
                    e
                ))
            })?;

        let result = ExecOutput {
            success: output.status.success(),
            exit_code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        };

        tracing::debug!(
            container_id = %container.short(),
            command = %command_line,
            success = result.success,
            exit_code = ?result.exit_code,
            "Command finished"
        );

        Ok(result)
    }
}
