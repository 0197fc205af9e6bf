//! [`ProcessRunner`] backed by `tokio::process`.

use async_trait::async_trait;
use std::process::Stdio;
use tokio::process::Command;
use tokio_util::sync::CancellationToken;
use toolvm_core::ports::{CommandOutput, CommandSpec, ProcessRunner};
use toolvm_core::{Error, Result};
use tracing::{debug, trace};

/// Runs commands as child processes, killing them on cancellation or
/// timeout.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioProcessRunner;

#[async_trait]
impl ProcessRunner for TokioProcessRunner {
    async fn run(&self, spec: &CommandSpec, cancel: &CancellationToken) -> Result<CommandOutput> {
        let command_display = spec.display();
        let mut cmd = Command::new(&spec.program);
        cmd.args(&spec.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(cwd) = &spec.cwd {
            cmd.current_dir(cwd);
        }
        for (key, value) in &spec.env {
            cmd.env(key, value);
        }

        debug!(command = %command_display, cwd = ?spec.cwd, "Running command");
        let output = async {
            let finished = match spec.timeout {
                Some(limit) => tokio::time::timeout(limit, cmd.output())
                    .await
                    .map_err(|_| Error::command(&command_display, format!("timed out after {limit:?}")))?,
                None => cmd.output().await,
            };
            finished.map_err(|e| Error::command(&command_display, format!("failed to start: {e}")))
        };

        let output = tokio::select! {
            biased;
            () = cancel.cancelled() => return Err(Error::Cancelled),
            output = output => output?,
        };

        let result = CommandOutput {
            code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        };
        trace!(command = %command_display, code = ?result.code, "Command finished");
        Ok(result)
    }
}
