//! Post-deploy and post-destroy checks.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::backoff::BackoffPolicy;
use crate::error::{Error, Result};
use crate::lookup::{ResourceLookup, ResourceRef, NOT_FOUND};

/// Fails unless `body` contains `marker`.
pub fn check_content(body: &str, marker: &str) -> Result<()> {
    if body.contains(marker) {
        Ok(())
    } else {
        Err(Error::AssertionFailed(format!(
            "wrong stack content, expected '{}': {}",
            marker, body
        )))
    }
}

/// True when `message` reports `resource` itself as not found, as in
/// `deployments.apps "vote" not found`. Other not-found errors, such as an
/// unknown kubeconfig context, do not count.
fn names_missing_resource(message: &str, resource: &ResourceRef) -> bool {
    message.contains(&format!("\"{}\" {}", resource.name, NOT_FOUND))
}

/// How long to wait for destroyed resources to disappear.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AbsencePolicy {
    /// Wait before the first lookup, in seconds.
    #[serde(default = "default_settle_delay")]
    pub settle_delay_secs: u64,

    /// Lookups allowed while the resource is still present. 1 means a
    /// single lookup after the settle delay.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Delay between lookups.
    #[serde(default = "default_backoff")]
    pub backoff: BackoffPolicy,
}

fn default_settle_delay() -> u64 {
    5
}

fn default_max_attempts() -> u32 {
    12
}

fn default_backoff() -> BackoffPolicy {
    BackoffPolicy::fixed(Duration::from_secs(5))
}

impl Default for AbsencePolicy {
    fn default() -> Self {
        Self {
            settle_delay_secs: default_settle_delay(),
            max_attempts: default_max_attempts(),
            backoff: default_backoff(),
        }
    }
}

/// Confirms resources are gone after a destroy.
pub struct AbsenceVerifier<'a> {
    lookup: &'a dyn ResourceLookup,
    policy: AbsencePolicy,
}

impl<'a> AbsenceVerifier<'a> {
    /// Creates a verifier over `lookup`.
    pub fn new(lookup: &'a dyn ResourceLookup, policy: AbsencePolicy) -> Self {
        Self { lookup, policy }
    }

    /// Succeeds once a lookup of `resource` fails with a not-found error.
    ///
    /// A resource still present after every attempt is `AssertionFailed`.
    /// Any other lookup error is `UnexpectedError` and is not retried.
    pub async fn assert_absent(
        &self,
        namespace: &str,
        resource: &ResourceRef,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let cancelled = || Error::Cancelled(format!("absence check of {}", resource));

        tokio::select! {
            _ = tokio::time::sleep(Duration::from_secs(self.policy.settle_delay_secs)) => {}
            _ = cancel.cancelled() => return Err(cancelled()),
        }

        let max_attempts = self.policy.max_attempts.max(1);
        let mut backoff = self.policy.backoff.start();

        for attempt in 1..=max_attempts {
            match self.lookup.get(namespace, resource, cancel).await {
                Ok(descriptor) => {
                    tracing::debug!(
                        namespace = %namespace,
                        resource = %resource,
                        uid = ?descriptor.uid,
                        attempt,
                        "resource still present"
                    );
                }
                Err(e) if e.is_cancelled() => return Err(e),
                Err(e) if names_missing_resource(&e.to_string(), resource) => {
                    tracing::info!(namespace = %namespace, resource = %resource, "resource is gone");
                    return Ok(());
                }
                Err(e) => {
                    return Err(Error::UnexpectedError(format!(
                        "error getting {} in namespace {}: {}",
                        resource, namespace, e
                    )));
                }
            }

            if attempt < max_attempts {
                tokio::select! {
                    _ = tokio::time::sleep(backoff.current()) => {}
                    _ = cancel.cancelled() => return Err(cancelled()),
                }
                backoff.next();
            }
        }

        Err(Error::AssertionFailed(format!(
            "{} not deleted from namespace {} after stack destroy ({} lookups)",
            resource, namespace, max_attempts
        )))
    }
}
