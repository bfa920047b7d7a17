// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! External git command execution.
//!
//! Network operations are delegated to the git binary so that the user's own
//! transport and credential setup applies. Commands never prompt: a command
//! that would need input fails instead of blocking the scheduler.

use crate::gateway::failure::GitFailure;

use std::{
    ffi::OsString,
    future::Future,
    path::Path,
    process::Output,
    time::Duration,
};
use tokio::process::Command;
use tracing::{debug, instrument};

/// Run git commands against a working directory.
pub trait GitCli: Send + Sync + 'static {
    /// Run git with given arguments inside `workdir`.
    ///
    /// Returns combined stdout and stderr on success.
    fn run(
        &self,
        workdir: &Path,
        args: Vec<OsString>,
    ) -> impl Future<Output = Result<String>> + Send;
}

/// Git binary found on `PATH`.
#[derive(Debug, Clone, Default)]
pub struct SystemGit {
    timeout: Option<Duration>,
}

impl SystemGit {
    /// Construct new git binary runner.
    ///
    /// Each command is killed once it runs longer than `timeout`.
    pub fn new(timeout: Option<Duration>) -> Self {
        Self { timeout }
    }
}

impl GitCli for SystemGit {
    #[instrument(skip(self, workdir), level = "debug")]
    async fn run(&self, workdir: &Path, args: Vec<OsString>) -> Result<String> {
        let mut command = Command::new("git");
        command
            .arg("-C")
            .arg(workdir)
            .args(&args)
            .env("LC_ALL", "C")
            .env("GIT_TERMINAL_PROMPT", "0")
            .kill_on_drop(true);

        let output = match self.timeout {
            Some(limit) => tokio::time::timeout(limit, command.output())
                .await
                .map_err(|_| GitCliError::TimedOut {
                    command: render(&args),
                    limit,
                })??,
            None => command.output().await?,
        };

        collect_output(&args, output)
    }
}

fn collect_output(args: &[OsString], output: Output) -> Result<String> {
    let stdout = String::from_utf8_lossy(output.stdout.as_slice()).into_owned();
    let stderr = String::from_utf8_lossy(output.stderr.as_slice()).into_owned();
    let mut message = String::new();

    if !stdout.is_empty() {
        message.push_str(format!("stdout: {stdout}").as_str());
    }

    if !stderr.is_empty() {
        message.push_str(format!("stderr: {stderr}").as_str());
    }

    // INVARIANT: Chomp trailing newlines.
    let message = message
        .strip_suffix("\r\n")
        .or(message.strip_suffix('\n'))
        .map(ToString::to_string)
        .unwrap_or(message);

    if !output.status.success() {
        return Err(GitCliError::Failed {
            command: render(args),
            message,
        });
    }

    debug!("git {} succeeded", render(args));
    Ok(message)
}

fn render(args: &[OsString]) -> String {
    args.iter()
        .map(|arg| arg.to_string_lossy().into_owned())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Git command error types.
#[derive(Debug, thiserror::Error)]
pub enum GitCliError {
    /// Git binary could not be spawned.
    #[error("failed to run git binary")]
    Spawn(#[from] std::io::Error),

    /// Git exited unsuccessfully.
    #[error("command \"git {command}\" failed:\n{message}")]
    Failed { command: String, message: String },

    /// Git ran longer than allowed.
    #[error("command \"git {command}\" timed out after {limit:?}")]
    TimedOut { command: String, limit: Duration },
}

impl GitCliError {
    /// Classify failure for recovery decisions.
    pub fn classify(&self) -> GitFailure {
        match self {
            Self::Failed { message, .. } => GitFailure::classify(message),
            Self::Spawn(_) | Self::TimedOut { .. } => GitFailure::Other,
        }
    }
}

/// Friendly result alias :3
pub type Result<T, E = GitCliError> = std::result::Result<T, E>;
