//! Harness settings and configuration validation.
//!
//! Settings come from an optional TOML file and are then overridden by
//! environment variables:
//!
//! - `STACK_E2E_BINARY` - orchestration binary (default `okteto` on `PATH`)
//! - `STACK_E2E_GIT` - git program (default `git`)
//! - `STACK_E2E_KUBECTL` - kubectl program (default `kubectl`)
//! - `STACK_E2E_KUBE_CONTEXT` - kubeconfig context for lookups
//! - `STACK_E2E_USER` - user tag in namespace names (falls back to `USER`)
//! - `STACK_E2E_DOMAIN` - platform domain of public endpoints
//! - `STACK_E2E_WORKDIR` - directory checkouts are cloned into

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::e2e::fixture::Fixture;
use crate::error::{Error, Result};
use crate::scenario::{ScenarioIdentity, MAX_NAMESPACE_LEN};

/// Settings shared by every scenario of a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HarnessSettings {
    /// Orchestration binary.
    pub binary: PathBuf,
    /// Git program.
    pub git: String,
    /// Kubectl program.
    pub kubectl: String,
    /// Kubeconfig context for resource lookups.
    pub kube_context: Option<String>,
    /// User tag appended to namespaces.
    pub user: String,
    /// Domain public endpoints live under.
    pub domain: String,
    /// Parent directory for checkouts.
    pub workdir: PathBuf,
}

impl Default for HarnessSettings {
    fn default() -> Self {
        Self {
            binary: PathBuf::from("okteto"),
            git: "git".to_string(),
            kubectl: "kubectl".to_string(),
            kube_context: None,
            user: "ci".to_string(),
            domain: "cloud.okteto.net".to_string(),
            workdir: PathBuf::from("."),
        }
    }
}

impl HarnessSettings {
    /// Defaults overridden by the environment.
    pub fn from_env() -> Self {
        Self::default().with_env_overrides(|key| std::env::var(key).ok())
    }

    /// Loads a TOML settings file, then applies environment overrides.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Ok(Self::from_toml_str(&content)?.with_env_overrides(|key| std::env::var(key).ok()))
    }

    /// Parses settings from TOML without consulting the environment.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content)
            .map_err(|e| Error::Config(format!("failed to parse settings: {}", e)))
    }

    /// Applies overrides from `lookup`, which maps variable names to values.
    pub fn with_env_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(binary) = get("STACK_E2E_BINARY") {
            self.binary = PathBuf::from(binary);
        }
        if let Some(git) = get("STACK_E2E_GIT") {
            self.git = git;
        }
        if let Some(kubectl) = get("STACK_E2E_KUBECTL") {
            self.kubectl = kubectl;
        }
        if let Some(context) = get("STACK_E2E_KUBE_CONTEXT") {
            self.kube_context = Some(context);
        }
        if let Some(user) = get("STACK_E2E_USER").or_else(|| get("USER")) {
            self.user = user;
        }
        if let Some(domain) = get("STACK_E2E_DOMAIN") {
            self.domain = domain;
        }
        if let Some(workdir) = get("STACK_E2E_WORKDIR") {
            self.workdir = PathBuf::from(workdir);
        }
        self
    }
}

/// Validation result containing all found issues.
#[derive(Debug, Clone, Default)]
pub struct ValidationResult {
    /// List of validation errors (fatal).
    pub errors: Vec<String>,
    /// List of validation warnings (non-fatal).
    pub warnings: Vec<String>,
}

impl ValidationResult {
    /// Returns true if validation passed (no errors).
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    /// Adds an error to the result.
    pub fn add_error(&mut self, msg: impl Into<String>) {
        self.errors.push(msg.into());
    }

    /// Adds a warning to the result.
    pub fn add_warning(&mut self, msg: impl Into<String>) {
        self.warnings.push(msg.into());
    }

    /// Merges another validation result into this one.
    pub fn merge(&mut self, other: ValidationResult) {
        self.errors.extend(other.errors);
        self.warnings.extend(other.warnings);
    }

    /// Converts to a Result, failing if there are errors.
    pub fn into_result(self) -> Result<Vec<String>> {
        if self.is_valid() {
            Ok(self.warnings)
        } else {
            Err(Error::Config(self.errors.join("; ")))
        }
    }
}

/// Trait for validatable configuration types.
pub trait Validate {
    /// Validates the configuration and returns any issues found.
    fn validate(&self) -> ValidationResult;
}

impl Validate for Fixture {
    fn validate(&self) -> ValidationResult {
        let mut result = ValidationResult::default();

        if self.name.trim().is_empty() {
            result.add_error("name cannot be empty");
        }
        if self.repository.trim().is_empty() {
            result.add_error("repository cannot be empty");
        } else if crate::e2e::repo::checkout_dir_name(&self.repository).is_none() {
            result.add_error(format!(
                "cannot derive checkout directory from repository '{}'",
                self.repository
            ));
        }
        if self.manifest.as_os_str().is_empty() {
            result.add_error("manifest cannot be empty");
        }
        if self.manifest.is_absolute() {
            result.add_error("manifest must be relative to the repository root");
        }
        if self.service.trim().is_empty() {
            result.add_error("service cannot be empty");
        }
        if self.expected_content.is_empty() {
            result.add_error("expected_content cannot be empty");
        }

        if self.probe.max_attempts == 0 {
            result.add_error("probe.max_attempts must be at least 1");
        }
        if self.probe.request_timeout_secs == 0 {
            result.add_error("probe.request_timeout_secs must be at least 1");
        }
        if self.probe.max_elapsed_secs.is_none() && self.probe.max_attempts > 600 {
            result.add_warning("probe has no deadline and more than 600 attempts");
        }

        if self.absence.max_attempts == 0 {
            result.add_error("absence.max_attempts must be at least 1");
        }
        if self.absence.max_attempts == 1 {
            result.add_warning("absence check performs a single lookup after the settle delay");
        }

        if let Some(endpoint) = &self.endpoint {
            if !endpoint.starts_with("http://") && !endpoint.starts_with("https://") {
                result.add_error(format!("endpoint '{}' must be an http(s) URL", endpoint));
            }
        }

        result
    }
}

impl Validate for HarnessSettings {
    fn validate(&self) -> ValidationResult {
        let mut result = ValidationResult::default();

        if self.binary.as_os_str().is_empty() {
            result.add_error("binary cannot be empty");
        }
        if self.user.trim().is_empty() {
            result.add_error("user cannot be empty");
        }
        if self.domain.trim().is_empty() {
            result.add_error("domain cannot be empty");
        }
        if !self.workdir.is_dir() {
            result.add_error(format!(
                "workdir {} does not exist",
                self.workdir.display()
            ));
        }
        if self.user == "ci" {
            result.add_warning("user tag not set; namespaces may collide across CI runs");
        }

        result
    }
}

impl Validate for ScenarioIdentity {
    fn validate(&self) -> ValidationResult {
        let mut result = ValidationResult::default();
        let namespace = self.namespace();

        if namespace.is_empty() {
            result.add_error("namespace cannot be empty");
        }
        if namespace.len() > MAX_NAMESPACE_LEN {
            result.add_error(format!(
                "namespace '{}' is longer than {} characters",
                namespace, MAX_NAMESPACE_LEN
            ));
        }

        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::TempDir;

    fn fixture() -> Fixture {
        serde_yaml::from_str(
            r#"
name: TestStacks
repository: git@github.com:okteto/stacks-getting-started.git
manifest: okteto-stack.yml
service: vote
expected_content: "Cats vs Dogs!"
"#,
        )
        .unwrap()
    }

    #[test]
    fn valid_fixture_passes() {
        let result = fixture().validate();
        assert!(result.is_valid(), "errors: {:?}", result.errors);
    }

    #[test]
    fn fixture_rejects_absolute_manifest_and_zero_attempts() {
        let mut f = fixture();
        f.manifest = PathBuf::from("/etc/okteto-stack.yml");
        f.probe.max_attempts = 0;

        let result = f.validate();
        assert_eq!(result.errors.len(), 2);
        assert!(result.into_result().is_err());
    }

    #[test]
    fn fixture_rejects_non_http_endpoint() {
        let mut f = fixture();
        f.endpoint = Some("ftp://vote".to_string());
        assert!(!f.validate().is_valid());
    }

    #[test]
    fn env_overrides_replace_defaults() {
        let env: HashMap<&str, &str> = [
            ("STACK_E2E_BINARY", "/opt/okteto"),
            ("STACK_E2E_DOMAIN", "cloud.example.net"),
            ("STACK_E2E_KUBE_CONTEXT", "cloud"),
            ("USER", "alice"),
        ]
        .into_iter()
        .collect();

        let settings = HarnessSettings::default()
            .with_env_overrides(|key| env.get(key).map(|v| v.to_string()));

        assert_eq!(settings.binary, PathBuf::from("/opt/okteto"));
        assert_eq!(settings.domain, "cloud.example.net");
        assert_eq!(settings.kube_context.as_deref(), Some("cloud"));
        assert_eq!(settings.user, "alice");
        assert_eq!(settings.git, "git");
    }

    #[test]
    fn stack_e2e_user_wins_over_user() {
        let settings = HarnessSettings::default().with_env_overrides(|key| match key {
            "STACK_E2E_USER" => Some("bob".to_string()),
            "USER" => Some("root".to_string()),
            _ => None,
        });
        assert_eq!(settings.user, "bob");
    }

    #[test]
    fn settings_parse_from_toml_with_defaults() {
        let settings = HarnessSettings::from_toml_str(
            "binary = \"/usr/local/bin/okteto\"\ndomain = \"cloud.example.net\"\n",
        )
        .unwrap();

        assert_eq!(settings.binary, PathBuf::from("/usr/local/bin/okteto"));
        assert_eq!(settings.domain, "cloud.example.net");
        assert_eq!(settings.kubectl, "kubectl");
        assert_eq!(settings.workdir, PathBuf::from("."));
    }

    #[test]
    fn settings_load_reads_file() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("stack-e2e.toml");
        std::fs::write(&path, "git = \"/usr/bin/git\"\n").unwrap();

        assert!(HarnessSettings::load(&path).is_ok());
        assert!(HarnessSettings::load(temp.path().join("missing.toml")).is_err());
        assert!(HarnessSettings::from_toml_str("binary = [").is_err());
    }

    #[test]
    fn long_namespace_is_rejected() {
        let identity = ScenarioIdentity::at("TestStacks", "linux", 1_700_000_000, "a".repeat(60));
        assert!(!identity.validate().is_valid());
    }
}
