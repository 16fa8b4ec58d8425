//! Scenario fixture loading and parsing.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::e2e::validator::AbsencePolicy;
use crate::error::{Error, Result};
use crate::lookup::ResourceRef;
use crate::probe::ProbePolicy;

/// A stack lifecycle scenario.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Fixture {
    /// Base test name, e.g. `TestStacks`.
    pub name: String,

    /// Description of what this fixture tests.
    #[serde(default)]
    pub description: String,

    /// Git remote holding the stack sources.
    pub repository: String,

    /// Stack manifest, relative to the checkout root.
    pub manifest: PathBuf,

    /// Service whose public endpoint is probed.
    pub service: String,

    /// Text the service's response must contain.
    pub expected_content: String,

    /// Namespace prefix used instead of the run name.
    #[serde(default)]
    pub namespace_prefix: Option<String>,

    /// Explicit probe URL, replacing the derived public endpoint.
    #[serde(default)]
    pub endpoint: Option<String>,

    /// Resources that must be gone after destroy. Defaults to the
    /// deployment named after `service`.
    #[serde(default)]
    pub verify_absent: Vec<ResourceRef>,

    /// Reachability probe policy.
    #[serde(default)]
    pub probe: ProbePolicy,

    /// Post-destroy absence check policy.
    #[serde(default)]
    pub absence: AbsencePolicy,

    /// Extra environment for orchestration-binary invocations.
    #[serde(default)]
    pub env: BTreeMap<String, String>,
}

impl Fixture {
    /// Loads a fixture from a YAML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(Error::Io)?;

        serde_yaml::from_str(&content)
            .map_err(|e| Error::Config(format!("failed to parse fixture: {}", e)))
    }

    /// Resources to check after destroy.
    pub fn absent_resources(&self) -> Vec<ResourceRef> {
        if self.verify_absent.is_empty() {
            vec![ResourceRef::deployment(&self.service)]
        } else {
            self.verify_absent.clone()
        }
    }
}
