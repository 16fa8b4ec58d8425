//! Command runner backed by real subprocesses.

use std::process::Stdio;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tokio_util::sync::CancellationToken;

use crate::error::{Error, ExitCode, Result};

use super::{CommandRunner, CommandSpec};

/// Runs commands with `tokio::process`.
///
/// Stdout and stderr are read concurrently and merged line by line in the
/// order they arrive.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemRunner;

impl SystemRunner {
    /// Creates a new system runner.
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl CommandRunner for SystemRunner {
    async fn run(&self, spec: &CommandSpec, cancel: &CancellationToken) -> Result<String> {
        let command_line = spec.display();
        tracing::debug!(command = %command_line, working_dir = ?spec.working_dir, "running command");

        let mut command = Command::new(&spec.program);
        command
            .args(&spec.args)
            .envs(&spec.env)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = &spec.working_dir {
            command.current_dir(dir);
        }

        let mut child = command.spawn().map_err(|source| Error::Spawn {
            command: command_line.clone(),
            source,
        })?;

        let (Some(stdout), Some(stderr)) = (child.stdout.take(), child.stderr.take()) else {
            return Err(Error::Spawn {
                command: command_line,
                source: std::io::Error::other("stdio was not captured"),
            });
        };

        let mut stdout_reader = BufReader::new(stdout).split(b'\n');
        let mut stderr_reader = BufReader::new(stderr).split(b'\n');
        let mut stdout_done = false;
        let mut stderr_done = false;
        let mut lines: Vec<String> = Vec::new();
        let mut stdout_lines: Vec<String> = Vec::new();

        while !(stdout_done && stderr_done) {
            tokio::select! {
                segment = stdout_reader.next_segment(), if !stdout_done => {
                    match segment {
                        Ok(Some(bytes)) => {
                            let line = String::from_utf8_lossy(&bytes).into_owned();
                            stdout_lines.push(line.clone());
                            lines.push(line);
                        }
                        Ok(None) => stdout_done = true,
                        Err(e) => {
                            tracing::warn!(command = %command_line, error = %e, "error reading stdout");
                            stdout_done = true;
                        }
                    }
                }
                segment = stderr_reader.next_segment(), if !stderr_done => {
                    match segment {
                        Ok(Some(bytes)) => lines.push(String::from_utf8_lossy(&bytes).into_owned()),
                        Ok(None) => stderr_done = true,
                        Err(e) => {
                            tracing::warn!(command = %command_line, error = %e, "error reading stderr");
                            stderr_done = true;
                        }
                    }
                }
                _ = cancel.cancelled() => {
                    if let Err(e) = child.kill().await {
                        tracing::warn!(command = %command_line, error = %e, "failed to kill cancelled command");
                    }
                    return Err(Error::Cancelled(command_line));
                }
            }
        }

        let status = tokio::select! {
            status = child.wait() => status?,
            _ = cancel.cancelled() => {
                if let Err(e) = child.kill().await {
                    tracing::warn!(command = %command_line, error = %e, "failed to kill cancelled command");
                }
                return Err(Error::Cancelled(command_line));
            }
        };

        if !status.success() {
            return Err(Error::CommandFailed {
                command: command_line,
                output: lines.join("\n"),
                status: ExitCode::from(status),
            });
        }

        if spec.stdout_only {
            Ok(stdout_lines.join("\n"))
        } else {
            Ok(lines.join("\n"))
        }
    }
}
