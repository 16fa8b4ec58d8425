//! Deploy and destroy stacks with the orchestration binary.
//!
//! Both actions are single-shot: a failure leaves the cluster in an unknown
//! state, so nothing here retries.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::error::{Error, Result};
use crate::runner::{CommandRunner, CommandSpec};

/// Drives `<binary> stack deploy|destroy` inside a checkout.
pub struct StackController {
    runner: Arc<dyn CommandRunner>,
    binary: PathBuf,
    env: BTreeMap<String, String>,
}

impl StackController {
    /// Creates a controller invoking `binary`.
    pub fn new(runner: Arc<dyn CommandRunner>, binary: impl Into<PathBuf>) -> Self {
        Self {
            runner,
            binary: binary.into(),
            env: BTreeMap::new(),
        }
    }

    /// Adds environment variables passed to every invocation.
    pub fn with_env(mut self, env: BTreeMap<String, String>) -> Self {
        self.env = env;
        self
    }

    fn command(&self, work_dir: &Path) -> CommandSpec {
        CommandSpec::new(self.binary.display().to_string())
            .current_dir(work_dir)
            .envs(&self.env)
    }

    /// Deploys `manifest`, building images and waiting until services are ready.
    pub async fn deploy(
        &self,
        manifest: &Path,
        work_dir: &Path,
        cancel: &CancellationToken,
    ) -> Result<()> {
        if !work_dir.join(manifest).is_file() {
            return Err(Error::DeployFailed {
                output: String::new(),
                cause: format!(
                    "manifest {} not found in {}",
                    manifest.display(),
                    work_dir.display()
                ),
            });
        }

        tracing::info!(manifest = ?manifest, "stack deploy");

        let spec = self.command(work_dir).args([
            "stack".to_string(),
            "deploy".to_string(),
            "-f".to_string(),
            manifest.display().to_string(),
            "--build".to_string(),
            "--wait".to_string(),
        ]);

        self.runner
            .run(&spec, cancel)
            .await
            .map_err(|e| e.wrap_command(|output, cause| Error::DeployFailed { output, cause }))?;

        tracing::info!(manifest = ?manifest, "stack deploy success");
        Ok(())
    }

    /// Destroys the stack described by `manifest`.
    pub async fn destroy(
        &self,
        manifest: &Path,
        work_dir: &Path,
        cancel: &CancellationToken,
    ) -> Result<()> {
        tracing::info!(manifest = ?manifest, "stack destroy");

        let spec = self.command(work_dir).args([
            "stack".to_string(),
            "destroy".to_string(),
            "-f".to_string(),
            manifest.display().to_string(),
        ]);

        self.runner
            .run(&spec, cancel)
            .await
            .map_err(|e| e.wrap_command(|output, cause| Error::DestroyFailed { output, cause }))?;

        tracing::info!(manifest = ?manifest, "stack destroy success");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runner::{ScriptedResponse, ScriptedRunner};
    use tempfile::TempDir;

    fn checkout_with_manifest() -> TempDir {
        let temp = TempDir::new().unwrap();
        std::fs::write(temp.path().join("okteto-stack.yml"), "name: voting-app\n").unwrap();
        temp
    }

    #[tokio::test]
    async fn deploy_builds_and_waits_inside_checkout() {
        let checkout = checkout_with_manifest();
        let runner = Arc::new(ScriptedRunner::new());
        runner.respond(&["okteto", "stack", "deploy"], ScriptedResponse::Success(String::new()));

        let mut env = BTreeMap::new();
        env.insert("OKTETO_TOKEN".to_string(), "t".to_string());

        let controller = StackController::new(runner.clone(), "okteto").with_env(env);
        controller
            .deploy(Path::new("okteto-stack.yml"), checkout.path(), &CancellationToken::new())
            .await
            .unwrap();

        let calls = runner.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(
            calls[0].display(),
            "okteto stack deploy -f okteto-stack.yml --build --wait"
        );
        assert_eq!(calls[0].working_dir.as_deref(), Some(checkout.path()));
        assert_eq!(calls[0].env.get("OKTETO_TOKEN").map(String::as_str), Some("t"));
    }

    #[tokio::test]
    async fn deploy_failure_carries_output() {
        let checkout = checkout_with_manifest();
        let runner = Arc::new(ScriptedRunner::new());
        runner.respond(
            &["okteto", "stack", "deploy"],
            ScriptedResponse::Failure {
                output: "error building image 'vote'".to_string(),
                code: 1,
            },
        );

        let err = StackController::new(runner, "okteto")
            .deploy(Path::new("okteto-stack.yml"), checkout.path(), &CancellationToken::new())
            .await
            .unwrap_err();

        match err {
            Error::DeployFailed { output, cause } => {
                assert_eq!(output, "error building image 'vote'");
                assert_eq!(cause, "exit status 1");
            }
            other => panic!("expected DeployFailed, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn deploy_without_manifest_never_invokes_binary() {
        let checkout = TempDir::new().unwrap();
        let runner = Arc::new(ScriptedRunner::new());

        let err = StackController::new(runner.clone(), "okteto")
            .deploy(Path::new("okteto-stack.yml"), checkout.path(), &CancellationToken::new())
            .await
            .unwrap_err();

        assert!(matches!(err, Error::DeployFailed { .. }));
        assert!(runner.calls().is_empty());
    }

    #[tokio::test]
    async fn destroy_uses_same_manifest() {
        let checkout = checkout_with_manifest();
        let runner = Arc::new(ScriptedRunner::new());
        runner.respond(
            &["okteto", "stack", "destroy"],
            ScriptedResponse::Failure {
                output: "namespace not ready".to_string(),
                code: 1,
            },
        );

        let err = StackController::new(runner.clone(), "okteto")
            .destroy(Path::new("okteto-stack.yml"), checkout.path(), &CancellationToken::new())
            .await
            .unwrap_err();

        assert!(matches!(err, Error::DestroyFailed { .. }));
        assert_eq!(
            runner.command_lines(),
            vec!["okteto stack destroy -f okteto-stack.yml"]
        );
    }
}
