//! Namespace provisioning for a scenario.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::error::{Error, Result};
use crate::runner::{CommandRunner, CommandSpec};

/// Creates and deletes namespaces with `<binary> create|delete namespace`.
pub struct NamespaceProvisioner {
    runner: Arc<dyn CommandRunner>,
    binary: PathBuf,
    env: BTreeMap<String, String>,
}

impl NamespaceProvisioner {
    /// Creates a provisioner invoking `binary`.
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

    /// Creates `namespace`.
    pub async fn create(&self, namespace: &str, cancel: &CancellationToken) -> Result<()> {
        self.run("create", namespace, cancel).await?;
        tracing::info!(namespace = %namespace, "created namespace");
        Ok(())
    }

    /// Deletes `namespace`.
    pub async fn delete(&self, namespace: &str, cancel: &CancellationToken) -> Result<()> {
        self.run("delete", namespace, cancel).await?;
        tracing::info!(namespace = %namespace, "deleted namespace");
        Ok(())
    }

    async fn run(
        &self,
        action: &'static str,
        namespace: &str,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let spec = CommandSpec::new(self.binary.display().to_string())
            .args([action, "namespace", namespace])
            .envs(&self.env);

        self.runner.run(&spec, cancel).await.map(|_| ()).map_err(|e| {
            e.wrap_command(|output, cause| Error::NamespaceFailed {
                action,
                namespace: namespace.to_string(),
                output,
                cause,
            })
        })
    }
}
