//! External command execution.
//!
//! Every subprocess the harness starts (git, the orchestration binary,
//! kubectl) goes through a [`CommandRunner`], so tests can swap in a
//! [`ScriptedRunner`] and assert on the exact invocations.

mod scripted;
mod system;

pub use scripted::{ScriptedResponse, ScriptedRunner};
pub use system::SystemRunner;

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::error::Result;

/// A single command invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    /// Program name or path, resolved against `PATH` when not absolute.
    pub program: String,
    /// Arguments, in order.
    pub args: Vec<String>,
    /// Working directory. Inherits the caller's when `None`.
    pub working_dir: Option<PathBuf>,
    /// Variables set on top of the inherited environment.
    pub env: BTreeMap<String, String>,
    /// Return only stdout on success. Failures still carry both streams.
    pub stdout_only: bool,
}

impl CommandSpec {
    /// Creates a spec for `program` with no arguments.
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            working_dir: None,
            env: BTreeMap::new(),
            stdout_only: false,
        }
    }

    /// Appends arguments.
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Sets the working directory.
    pub fn current_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.working_dir = Some(dir.as_ref().to_path_buf());
        self
    }

    /// Adds environment overrides.
    pub fn envs<'a, I>(mut self, vars: I) -> Self
    where
        I: IntoIterator<Item = (&'a String, &'a String)>,
    {
        self.env
            .extend(vars.into_iter().map(|(k, v)| (k.clone(), v.clone())));
        self
    }

    /// Keeps stderr out of the successful output, for callers that parse it.
    pub fn stdout_only(mut self) -> Self {
        self.stdout_only = true;
        self
    }

    /// Renders the command line for logs and error messages.
    pub fn display(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Runs commands to completion and returns their combined output.
#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Runs `spec` and returns combined stdout/stderr on a zero exit status,
    /// or stdout alone when `spec.stdout_only` is set.
    ///
    /// A non-zero exit is `Error::CommandFailed` carrying the captured
    /// output. Cancelling `cancel` kills the process and returns
    /// `Error::Cancelled`.
    async fn run(&self, spec: &CommandSpec, cancel: &CancellationToken) -> Result<String>;
}
