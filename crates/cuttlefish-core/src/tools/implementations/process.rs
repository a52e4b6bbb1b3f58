//! Subprocess execution shared by the shell and interpreter tools

use std::process::{ExitStatus, Stdio};

use anyhow::{Context, Result};
use tokio::process::Command;
use tracing::debug;

/// Combined output of a finished command
pub(super) struct CommandOutput {
    pub status: ExitStatus,
    /// stdout followed by stderr
    pub output: String,
}

impl CommandOutput {
    /// `successfully executed ...` on success, the exit status otherwise
    pub fn summary(&self, what: &str) -> String {
        if self.status.success() {
            format!("successfully executed `{}`", what)
        } else {
            match self.status.code() {
                Some(code) => format!("exit status {}", code),
                None => "terminated by signal".to_string(),
            }
        }
    }
}

/// Run to completion, capturing output.
///
/// The child is killed if the returned future is dropped, which is how run
/// cancellation reaches it.
pub(super) async fn run_captured(mut cmd: Command) -> Result<CommandOutput> {
    cmd.kill_on_drop(true)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());

    let output = cmd.output().await.context("Failed to start process")?;
    debug!(status = ?output.status, "Process finished");

    let mut combined = String::from_utf8_lossy(&output.stdout).into_owned();
    combined.push_str(&String::from_utf8_lossy(&output.stderr));
    Ok(CommandOutput {
        status: output.status,
        output: combined,
    })
}

/// Resolve a program on PATH, or check an explicit path exists
pub(super) fn resolve_program(program: &str) -> Result<std::path::PathBuf> {
    which::which(program).with_context(|| format!("`{}` not found", program))
}
