//! Cluster resource lookups.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::error::{Error, Result};
use crate::runner::{CommandRunner, CommandSpec};

/// Text a lookup error carries when the resource does not exist.
pub const NOT_FOUND: &str = "not found";

/// A resource to look up, e.g. `deployment/vote`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceRef {
    /// Resource kind as the cluster CLI names it.
    #[serde(default = "default_kind")]
    pub kind: String,
    /// Resource name.
    pub name: String,
}

fn default_kind() -> String {
    "deployment".to_string()
}

impl ResourceRef {
    /// A deployment reference.
    pub fn deployment(name: impl Into<String>) -> Self {
        Self {
            kind: default_kind(),
            name: name.into(),
        }
    }
}

impl std::fmt::Display for ResourceRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.kind, self.name)
    }
}

/// What the cluster reports about an existing resource.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceDescriptor {
    pub kind: String,
    pub name: String,
    pub namespace: String,
    pub uid: Option<String>,
}

/// Queries the cluster for a resource.
///
/// A missing resource is reported as an error whose text contains
/// [`NOT_FOUND`].
#[async_trait]
pub trait ResourceLookup: Send + Sync {
    /// Looks up `resource` in `namespace`.
    async fn get(
        &self,
        namespace: &str,
        resource: &ResourceRef,
        cancel: &CancellationToken,
    ) -> Result<ResourceDescriptor>;
}

#[derive(Debug, Deserialize)]
struct KubeObject {
    kind: Option<String>,
    metadata: KubeMetadata,
}

#[derive(Debug, Deserialize)]
struct KubeMetadata {
    name: String,
    namespace: Option<String>,
    uid: Option<String>,
}

/// Looks resources up with `kubectl get -o json`.
pub struct KubectlLookup {
    runner: Arc<dyn CommandRunner>,
    kubectl: String,
    context: Option<String>,
}

impl KubectlLookup {
    /// Creates a lookup using the `kubectl` program at `kubectl`.
    pub fn new(runner: Arc<dyn CommandRunner>, kubectl: impl Into<String>) -> Self {
        Self {
            runner,
            kubectl: kubectl.into(),
            context: None,
        }
    }

    /// Targets a specific kubeconfig context.
    pub fn with_context(mut self, context: Option<String>) -> Self {
        self.context = context;
        self
    }
}

#[async_trait]
impl ResourceLookup for KubectlLookup {
    async fn get(
        &self,
        namespace: &str,
        resource: &ResourceRef,
        cancel: &CancellationToken,
    ) -> Result<ResourceDescriptor> {
        let mut spec = CommandSpec::new(&self.kubectl).args([
            "get",
            resource.kind.as_str(),
            resource.name.as_str(),
            "--namespace",
            namespace,
            "-o",
            "json",
        ]);
        if let Some(context) = &self.context {
            spec = spec.args(["--context", context.as_str()]);
        }
        // kubectl prints version-skew and deprecation warnings on stderr
        spec = spec.stdout_only();

        let output = self.runner.run(&spec, cancel).await?;

        let object: KubeObject = serde_json::from_str(&output).map_err(|e| {
            Error::UnexpectedError(format!("failed to decode {} as JSON: {}", resource, e))
        })?;

        Ok(ResourceDescriptor {
            kind: object.kind.unwrap_or_else(|| resource.kind.clone()),
            name: object.metadata.name,
            namespace: object
                .metadata
                .namespace
                .unwrap_or_else(|| namespace.to_string()),
            uid: object.metadata.uid,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runner::{ScriptedResponse, ScriptedRunner};

    const DEPLOYMENT_JSON: &str = r#"{
        "apiVersion": "apps/v1",
        "kind": "Deployment",
        "metadata": {
            "name": "vote",
            "namespace": "testk8-1700000000-alice",
            "uid": "5b1c0c1e-0000-4000-8000-000000000001"
        },
        "status": { "readyReplicas": 1 }
    }"#;

    #[tokio::test]
    async fn decodes_existing_deployment() {
        let runner = Arc::new(ScriptedRunner::new());
        runner.respond(
            &["kubectl", "get", "deployment", "vote"],
            ScriptedResponse::Success(DEPLOYMENT_JSON.to_string()),
        );

        let lookup = KubectlLookup::new(runner.clone(), "kubectl")
            .with_context(Some("okteto-cloud".to_string()));
        let descriptor = lookup
            .get(
                "testk8-1700000000-alice",
                &ResourceRef::deployment("vote"),
                &CancellationToken::new(),
            )
            .await
            .unwrap();

        assert_eq!(descriptor.kind, "Deployment");
        assert_eq!(descriptor.name, "vote");
        assert_eq!(descriptor.namespace, "testk8-1700000000-alice");
        assert_eq!(
            runner.command_lines(),
            vec!["kubectl get deployment vote --namespace testk8-1700000000-alice -o json --context okteto-cloud"]
        );
    }

    #[tokio::test]
    async fn stderr_warnings_do_not_break_decoding() {
        let runner = Arc::new(ScriptedRunner::new());
        runner.respond(
            &["kubectl", "get"],
            ScriptedResponse::Streams {
                stdout: DEPLOYMENT_JSON.to_string(),
                stderr: "Warning: version difference between client (1.30) and server (1.26) exceeds the supported minor version skew of +/-1".to_string(),
            },
        );

        let descriptor = KubectlLookup::new(runner.clone(), "kubectl")
            .get("ns", &ResourceRef::deployment("vote"), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(descriptor.name, "vote");
        assert!(runner.calls()[0].stdout_only);
    }

    #[tokio::test]
    async fn missing_deployment_error_mentions_not_found() {
        let runner = Arc::new(ScriptedRunner::new());
        runner.respond(
            &["kubectl", "get"],
            ScriptedResponse::Failure {
                output: r#"Error from server (NotFound): deployments.apps "vote" not found"#
                    .to_string(),
                code: 1,
            },
        );

        let err = KubectlLookup::new(runner, "kubectl")
            .get("ns", &ResourceRef::deployment("vote"), &CancellationToken::new())
            .await
            .unwrap_err();

        assert!(err.to_string().contains(NOT_FOUND));
    }

    #[test]
    fn resource_ref_defaults_to_deployment() {
        let resource: ResourceRef = serde_yaml::from_str("name: vote").unwrap();
        assert_eq!(resource, ResourceRef::deployment("vote"));
        assert_eq!(resource.to_string(), "deployment/vote");
    }
}
