//! Per-run scenario identity.
//!
//! Built once at scenario start and passed by reference to every step, so
//! the test name and namespace never drift within a run.

use std::time::{SystemTime, UNIX_EPOCH};

/// Longest namespace name the cluster accepts (DNS-1123 label).
pub const MAX_NAMESPACE_LEN: usize = 63;

/// Identity of one scenario run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScenarioIdentity {
    base_name: String,
    platform: String,
    timestamp: u64,
    user: String,
    namespace_prefix: Option<String>,
}

impl ScenarioIdentity {
    /// Creates an identity for the current platform and time.
    pub fn new(base_name: impl Into<String>, user: impl Into<String>) -> Self {
        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs();
        Self::at(base_name, std::env::consts::OS, timestamp, user)
    }

    /// Creates an identity with explicit platform and timestamp.
    pub fn at(
        base_name: impl Into<String>,
        platform: impl Into<String>,
        timestamp: u64,
        user: impl Into<String>,
    ) -> Self {
        Self {
            base_name: base_name.into(),
            platform: platform.into(),
            timestamp,
            user: user.into(),
            namespace_prefix: None,
        }
    }

    /// Uses `prefix` instead of the run name when deriving the namespace.
    pub fn with_namespace_prefix(mut self, prefix: Option<String>) -> Self {
        self.namespace_prefix = prefix;
        self
    }

    /// Test name, e.g. `TestStacks-linux`.
    pub fn test_name(&self) -> String {
        format!("{}-{}", self.base_name, self.platform)
    }

    /// Unique run name, e.g. `teststacks-linux-1700000000`.
    pub fn run_name(&self) -> String {
        sanitize(&format!("{}-{}", self.test_name(), self.timestamp))
    }

    /// Namespace for this run, e.g. `teststacks-linux-1700000000-alice`.
    pub fn namespace(&self) -> String {
        match &self.namespace_prefix {
            Some(prefix) => sanitize(&format!("{}-{}-{}", prefix, self.timestamp, self.user)),
            None => sanitize(&format!("{}-{}", self.run_name(), self.user)),
        }
    }

    /// Unix timestamp the run was started at.
    pub fn timestamp(&self) -> u64 {
        self.timestamp
    }

    /// User tag.
    pub fn user(&self) -> &str {
        &self.user
    }
}

/// Lowercases and replaces anything outside `[a-z0-9-]` with a dash.
fn sanitize(raw: &str) -> String {
    raw.chars()
        .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_lowercase() } else { '-' })
        .collect::<String>()
        .trim_matches('-')
        .to_string()
}
