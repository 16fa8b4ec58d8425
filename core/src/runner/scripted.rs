//! Scripted command runner for tests.

use std::sync::Mutex;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::error::{Error, ExitCode, Result};

use super::{CommandRunner, CommandSpec};

/// Canned reply for a scripted command.
#[derive(Debug, Clone)]
pub enum ScriptedResponse {
    /// Exit 0 with the given output.
    Success(String),
    /// Exit 0 with separate streams. Stderr precedes stdout in merged
    /// output and is dropped for `stdout_only` specs.
    Streams { stdout: String, stderr: String },
    /// Exit 0 after creating `dir` (and empty `files` inside it) in the
    /// working directory, the way `git clone` materialises a checkout.
    CreateDir {
        dir: String,
        files: Vec<String>,
        output: String,
    },
    /// Exit with `code` and the given output.
    Failure { output: String, code: i32 },
}

#[derive(Debug)]
struct Rule {
    prefix: Vec<String>,
    response: ScriptedResponse,
}

/// A [`CommandRunner`] that matches invocations against registered
/// prefixes instead of spawning processes.
///
/// The most recently registered matching rule wins, so tests can set a
/// default and override it later. Unmatched commands fail with exit
/// code 127. Every invocation is recorded.
#[derive(Debug, Default)]
pub struct ScriptedRunner {
    rules: Mutex<Vec<Rule>>,
    calls: Mutex<Vec<CommandSpec>>,
}

impl ScriptedRunner {
    /// Creates a runner with no rules.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `response` for commands whose program and leading
    /// arguments equal `prefix`.
    pub fn respond(&self, prefix: &[&str], response: ScriptedResponse) {
        if let Ok(mut rules) = self.rules.lock() {
            rules.push(Rule {
                prefix: prefix.iter().map(|s| s.to_string()).collect(),
                response,
            });
        }
    }

    /// Returns the recorded invocations in order.
    pub fn calls(&self) -> Vec<CommandSpec> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    /// Returns the recorded command lines in order.
    pub fn command_lines(&self) -> Vec<String> {
        self.calls().iter().map(CommandSpec::display).collect()
    }

    fn lookup(&self, spec: &CommandSpec) -> Option<ScriptedResponse> {
        let line: Vec<&str> = std::iter::once(spec.program.as_str())
            .chain(spec.args.iter().map(String::as_str))
            .collect();

        let rules = self.rules.lock().ok()?;
        rules
            .iter()
            .rev()
            .find(|rule| {
                rule.prefix.len() <= line.len()
                    && rule.prefix.iter().zip(&line).all(|(a, b)| a == b)
            })
            .map(|rule| rule.response.clone())
    }
}

#[async_trait]
impl CommandRunner for ScriptedRunner {
    async fn run(&self, spec: &CommandSpec, cancel: &CancellationToken) -> Result<String> {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(spec.clone());
        }

        if cancel.is_cancelled() {
            return Err(Error::Cancelled(spec.display()));
        }

        match self.lookup(spec) {
            Some(ScriptedResponse::Success(output)) => Ok(output),
            Some(ScriptedResponse::Streams { stdout, stderr }) => {
                if spec.stdout_only {
                    Ok(stdout)
                } else {
                    Ok(format!("{}\n{}", stderr, stdout))
                }
            }
            Some(ScriptedResponse::CreateDir { dir, files, output }) => {
                let base = match &spec.working_dir {
                    Some(working_dir) => working_dir.clone(),
                    None => std::env::current_dir()?,
                };
                let root = base.join(dir);
                std::fs::create_dir_all(&root)?;
                for file in files {
                    std::fs::write(root.join(file), "")?;
                }
                Ok(output)
            }
            Some(ScriptedResponse::Failure { output, code }) => Err(Error::CommandFailed {
                command: spec.display(),
                output,
                status: ExitCode::Code(code),
            }),
            None => Err(Error::CommandFailed {
                command: spec.display(),
                output: format!("{}: command not scripted", spec.program),
                status: ExitCode::Code(127),
            }),
        }
    }
}
