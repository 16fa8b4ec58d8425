//! HTTP reachability probe for deployed stacks.
//!
//! Ingress, DNS and certificates settle some time after the deploy wait
//! returns, so the probe tolerates a bounded number of failed attempts.

use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::backoff::BackoffPolicy;
use crate::error::{Error, Result};

/// Retry policy for the reachability probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProbePolicy {
    /// Maximum number of GET attempts.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Delay between attempts.
    #[serde(default = "default_backoff")]
    pub backoff: BackoffPolicy,

    /// Timeout for a single request, in seconds.
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// Overall wall-clock budget in seconds. `None` means attempts only.
    #[serde(default = "default_max_elapsed")]
    pub max_elapsed_secs: Option<u64>,
}

fn default_max_attempts() -> u32 {
    150
}

fn default_backoff() -> BackoffPolicy {
    BackoffPolicy::fixed(Duration::from_secs(1))
}

fn default_request_timeout() -> u64 {
    5
}

fn default_max_elapsed() -> Option<u64> {
    Some(300)
}

impl Default for ProbePolicy {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            backoff: default_backoff(),
            request_timeout_secs: default_request_timeout(),
            max_elapsed_secs: default_max_elapsed(),
        }
    }
}

impl ProbePolicy {
    /// Returns the per-request timeout.
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Returns the overall deadline, if any.
    pub fn max_elapsed(&self) -> Option<Duration> {
        self.max_elapsed_secs.map(Duration::from_secs)
    }
}

/// Successful probe outcome.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeResult {
    /// URL that was probed.
    pub endpoint: String,
    /// Response body of the successful attempt.
    pub body: String,
    /// Attempts made, including the successful one.
    pub attempts: u32,
}

/// Builds the public URL of a stack service.
pub fn service_endpoint(service: &str, namespace: &str, domain: &str) -> String {
    format!("https://{}-{}.{}", service, namespace, domain)
}

/// Polls an endpoint until it serves a 2xx response.
pub struct Prober {
    client: reqwest::Client,
    policy: ProbePolicy,
}

impl Prober {
    /// Creates a prober with the given policy.
    pub fn new(policy: ProbePolicy) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(policy.request_timeout())
            .build()?;
        Ok(Self { client, policy })
    }

    /// Returns the policy in use.
    pub fn policy(&self) -> &ProbePolicy {
        &self.policy
    }

    /// GETs `endpoint` until a 2xx body is read or the budget runs out.
    ///
    /// Fails with `Error::Unreachable` after `max_attempts` attempts, or
    /// earlier if the wall-clock budget is spent first.
    pub async fn probe(&self, endpoint: &str, cancel: &CancellationToken) -> Result<ProbeResult> {
        let start = Instant::now();
        let mut backoff = self.policy.backoff.start();
        let mut attempts = 0u32;
        let mut last_error = String::from("no attempt made");

        tracing::info!(
            endpoint = %endpoint,
            max_attempts = self.policy.max_attempts,
            "probing endpoint"
        );

        while attempts < self.policy.max_attempts {
            attempts += 1;

            match self.fetch(endpoint, cancel).await? {
                Ok(body) => {
                    tracing::info!(endpoint = %endpoint, attempts, "endpoint reachable");
                    return Ok(ProbeResult {
                        endpoint: endpoint.to_string(),
                        body,
                        attempts,
                    });
                }
                Err(e) => {
                    tracing::debug!(endpoint = %endpoint, attempt = attempts, error = %e, "probe attempt failed");
                    last_error = e;
                }
            }

            if attempts >= self.policy.max_attempts {
                break;
            }
            if let Some(max_elapsed) = self.policy.max_elapsed() {
                if start.elapsed() >= max_elapsed {
                    tracing::warn!(endpoint = %endpoint, attempts, "probe deadline reached");
                    break;
                }
            }

            tokio::select! {
                _ = tokio::time::sleep(backoff.current()) => {}
                _ = cancel.cancelled() => return Err(Error::Cancelled(format!("probe of {}", endpoint))),
            }
            backoff.next();
        }

        Err(Error::Unreachable {
            endpoint: endpoint.to_string(),
            attempts,
            last_error,
        })
    }

    /// One attempt. The outer error is cancellation; the inner one is a
    /// transient failure worth retrying.
    async fn fetch(
        &self,
        endpoint: &str,
        cancel: &CancellationToken,
    ) -> Result<std::result::Result<String, String>> {
        let attempt = async {
            let response = self
                .client
                .get(endpoint)
                .send()
                .await
                .map_err(|e| format!("request failed: {}", e))?;

            let status = response.status();
            if !status.is_success() {
                return Err(format!("status {}", status));
            }

            response
                .text()
                .await
                .map_err(|e| format!("failed to read body: {}", e))
        };

        tokio::select! {
            outcome = attempt => Ok(outcome),
            _ = cancel.cancelled() => Err(Error::Cancelled(format!("probe of {}", endpoint))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn fast_policy(max_attempts: u32) -> ProbePolicy {
        ProbePolicy {
            max_attempts,
            backoff: BackoffPolicy::fixed(Duration::from_millis(5)),
            request_timeout_secs: 2,
            max_elapsed_secs: None,
        }
    }

    #[test]
    fn endpoint_follows_service_namespace_domain() {
        assert_eq!(
            service_endpoint("vote", "testk8-1700000000-alice", "cloud.example.net"),
            "https://vote-testk8-1700000000-alice.cloud.example.net"
        );
    }

    #[test]
    fn default_policy_budget() {
        let policy = ProbePolicy::default();
        assert_eq!(policy.max_attempts, 150);
        assert_eq!(policy.backoff, BackoffPolicy::Fixed { delay_ms: 1000 });
        assert_eq!(policy.max_elapsed(), Some(Duration::from_secs(300)));
    }

    #[tokio::test]
    async fn returns_body_on_first_success() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<h1>Cats vs Dogs!</h1>"))
            .expect(1)
            .mount(&server)
            .await;

        let result = Prober::new(fast_policy(5))
            .unwrap()
            .probe(&server.uri(), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(result.attempts, 1);
        assert!(result.body.contains("Cats vs Dogs!"));
    }

    #[tokio::test]
    async fn retries_through_transient_errors() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503))
            .up_to_n_times(2)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("ready"))
            .mount(&server)
            .await;

        let result = Prober::new(fast_policy(10))
            .unwrap()
            .probe(&server.uri(), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(result.attempts, 3);
        assert_eq!(result.body, "ready");
    }

    #[tokio::test]
    async fn makes_exactly_max_attempts_before_unreachable() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(502))
            .expect(4)
            .mount(&server)
            .await;

        let err = Prober::new(fast_policy(4))
            .unwrap()
            .probe(&server.uri(), &CancellationToken::new())
            .await
            .unwrap_err();

        match err {
            Error::Unreachable {
                attempts,
                last_error,
                ..
            } => {
                assert_eq!(attempts, 4);
                assert!(last_error.contains("502"));
            }
            other => panic!("expected Unreachable, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn deadline_stops_before_attempt_budget() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let policy = ProbePolicy {
            max_elapsed_secs: Some(0),
            ..fast_policy(50)
        };
        let err = Prober::new(policy)
            .unwrap()
            .probe(&server.uri(), &CancellationToken::new())
            .await
            .unwrap_err();

        assert!(matches!(err, Error::Unreachable { attempts: 1, .. }));
    }

    #[tokio::test]
    async fn cancellation_stops_probe() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = Prober::new(fast_policy(100))
            .unwrap()
            .probe(&server.uri(), &cancel)
            .await
            .unwrap_err();

        assert!(err.is_cancelled());
    }
}
