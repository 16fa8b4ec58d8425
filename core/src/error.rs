//! Error types for the stack lifecycle harness.

use std::path::PathBuf;
use thiserror::Error;

/// Top-level error type for harness operations.
#[derive(Error, Debug)]
pub enum Error {
    /// A subprocess exited with a non-zero status.
    #[error("command `{command}` failed ({status}): {output}")]
    CommandFailed {
        command: String,
        output: String,
        status: ExitCode,
    },

    /// A subprocess could not be launched at all.
    #[error("failed to launch `{command}`: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    /// `git clone` failed.
    #[error("cloning git repo {remote} failed: {output} - {cause}")]
    CloneFailed {
        remote: String,
        output: String,
        cause: String,
    },

    /// Removing the local checkout failed.
    #[error("delete git repo {path} failed: {source}")]
    CleanupFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The stack deploy action failed.
    #[error("stack deploy failed: {output} - {cause}")]
    DeployFailed { output: String, cause: String },

    /// The stack destroy action failed.
    #[error("stack destroy failed: {output} - {cause}")]
    DestroyFailed { output: String, cause: String },

    /// Creating or deleting a namespace failed.
    #[error("{action} namespace {namespace} failed: {output} - {cause}")]
    NamespaceFailed {
        action: &'static str,
        namespace: String,
        output: String,
        cause: String,
    },

    /// The reachability probe exhausted its budget.
    #[error("{endpoint} not reachable after {attempts} attempts: {last_error}")]
    Unreachable {
        endpoint: String,
        attempts: u32,
        last_error: String,
    },

    /// A scenario expectation did not hold.
    #[error("assertion failed: {0}")]
    AssertionFailed(String),

    /// A lookup failed for a reason other than not-found.
    #[error("unexpected error: {0}")]
    UnexpectedError(String),

    /// The operation was cancelled before it completed.
    #[error("{0} cancelled")]
    Cancelled(String),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    /// HTTP client could not be constructed.
    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Rewraps a command-runner error as a step-specific error.
    ///
    /// `wrap` receives the captured output and the cause. Cancellation passes
    /// through untouched.
    pub fn wrap_command(self, wrap: impl FnOnce(String, String) -> Error) -> Error {
        match self {
            Error::CommandFailed { output, status, .. } => wrap(output, status.to_string()),
            Error::Cancelled(_) => self,
            other => wrap(String::new(), other.to_string()),
        }
    }

    /// Returns true if this error came from cancellation.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Error::Cancelled(_))
    }
}

/// Exit status of a finished subprocess.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitCode {
    /// Exited normally with the given code.
    Code(i32),
    /// Terminated without an exit code (killed by a signal).
    Signal,
}

impl From<std::process::ExitStatus> for ExitCode {
    fn from(status: std::process::ExitStatus) -> Self {
        match status.code() {
            Some(code) => ExitCode::Code(code),
            None => ExitCode::Signal,
        }
    }
}

impl std::fmt::Display for ExitCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExitCode::Code(code) => write!(f, "exit status {}", code),
            ExitCode::Signal => write!(f, "terminated by signal"),
        }
    }
}

/// Result type alias for harness operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wrap_command_keeps_output_and_status() {
        let err = Error::CommandFailed {
            command: "okteto stack deploy".to_string(),
            output: "build failed".to_string(),
            status: ExitCode::Code(1),
        };
        let wrapped = err.wrap_command(|output, cause| Error::DeployFailed { output, cause });
        assert_eq!(
            wrapped.to_string(),
            "stack deploy failed: build failed - exit status 1"
        );
    }

    #[test]
    fn wrap_command_passes_cancellation_through() {
        let err = Error::Cancelled("okteto stack deploy".to_string());
        let wrapped = err.wrap_command(|output, cause| Error::DeployFailed { output, cause });
        assert!(wrapped.is_cancelled());
    }
}
