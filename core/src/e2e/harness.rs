//! Stack lifecycle scenario orchestrator.
//!
//! Runs one scenario end to end:
//!
//! ```text
//! create namespace -> clone -> deploy -> probe -> destroy -> verify absent
//!     -> delete namespace (best effort) -> remove checkout (always)
//! ```
//!
//! Every external call is a [`Step`] and every step belongs to exactly one
//! [`Lane`]. A fatal step failure ends the main line and becomes the
//! scenario error. A warning step failure is recorded and the run goes on.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::config::HarnessSettings;
use crate::error::{Error, Result};
use crate::lookup::{KubectlLookup, ResourceLookup};
use crate::namespace::NamespaceProvisioner;
use crate::probe::{service_endpoint, ProbeResult, Prober};
use crate::runner::{CommandRunner, SystemRunner};
use crate::scenario::ScenarioIdentity;
use crate::stack::StackController;

use super::fixture::Fixture;
use super::repo::RepoCheckout;
use super::validator::{check_content, AbsenceVerifier};

/// How a step's failure is handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lane {
    /// Aborts the scenario with the step's error.
    Fatal,
    /// Recorded as a warning; the scenario continues.
    Warn,
}

/// External call sites of a scenario.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    CreateNamespace,
    CloneRepo,
    Deploy,
    Probe,
    CheckContent,
    Destroy,
    VerifyAbsent,
    /// Destroy issued after a failed deploy or probe so the stack does not
    /// leak.
    CleanupDestroy,
    DeleteNamespace,
    RemoveRepo,
}

impl Step {
    /// The lane this step's failures go to.
    pub const fn lane(self) -> Lane {
        match self {
            Step::CreateNamespace
            | Step::CloneRepo
            | Step::Deploy
            | Step::Probe
            | Step::CheckContent
            | Step::Destroy
            | Step::VerifyAbsent => Lane::Fatal,
            Step::CleanupDestroy | Step::DeleteNamespace | Step::RemoveRepo => Lane::Warn,
        }
    }
}

/// Milestones of the main line, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Phase {
    Init,
    NamespaceCreated,
    RepoCloned,
    Deployed,
    VerifiedReachable,
    Destroyed,
    VerifiedAbsent,
    NamespaceDeleted,
    RepoRemoved,
}

/// Outcome of one step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepRecord {
    pub step: Step,
    /// `None` on success, the error text otherwise.
    pub error: Option<String>,
}

/// Result of a scenario run.
#[derive(Debug)]
pub struct ScenarioReport {
    /// Test name, e.g. `TestStacks-linux`.
    pub test_name: String,
    /// Namespace the stack was deployed to.
    pub namespace: String,
    /// Endpoint that was probed.
    pub endpoint: String,
    /// Last main-line milestone reached.
    pub phase: Phase,
    /// Steps in execution order.
    pub steps: Vec<StepRecord>,
    /// Failures from the warning lane.
    pub warnings: Vec<String>,
    /// Successful probe outcome, if the probe ran and succeeded.
    pub probe: Option<ProbeResult>,
    /// The fatal error, if any.
    pub error: Option<Error>,
}

impl ScenarioReport {
    fn new(test_name: String, namespace: String, endpoint: String) -> Self {
        Self {
            test_name,
            namespace,
            endpoint,
            phase: Phase::Init,
            steps: Vec::new(),
            warnings: Vec::new(),
            probe: None,
            error: None,
        }
    }

    /// Returns true if no fatal step failed.
    pub fn passed(&self) -> bool {
        self.error.is_none()
    }

    /// Returns true if `step` ran.
    pub fn ran(&self, step: Step) -> bool {
        self.steps.iter().any(|r| r.step == step)
    }

    /// Steps that ran, in order.
    pub fn step_names(&self) -> Vec<Step> {
        self.steps.iter().map(|r| r.step).collect()
    }

    /// Converts into the fatal error, if there was one.
    pub fn into_result(mut self) -> Result<Self> {
        match self.error.take() {
            Some(e) => Err(e),
            None => Ok(self),
        }
    }

    /// Records a step outcome and routes a failure to its lane.
    ///
    /// Returns the value on success, `None` on failure.
    fn record<T>(&mut self, step: Step, result: Result<T>) -> Option<T> {
        match result {
            Ok(value) => {
                self.steps.push(StepRecord { step, error: None });
                Some(value)
            }
            Err(e) => {
                self.steps.push(StepRecord {
                    step,
                    error: Some(e.to_string()),
                });
                match step.lane() {
                    Lane::Fatal => {
                        tracing::error!(step = ?step, error = %e, "scenario step failed");
                        if self.error.is_none() {
                            self.error = Some(e);
                        }
                    }
                    Lane::Warn => {
                        tracing::warn!(step = ?step, error = %e, "cleanup step failed");
                        self.warnings.push(format!("{:?}: {}", step, e));
                    }
                }
                None
            }
        }
    }

    /// Advances the main line while no fatal error has occurred.
    fn advance(&mut self, phase: Phase) {
        if self.error.is_none() && phase > self.phase {
            tracing::debug!(phase = ?phase, "scenario phase reached");
            self.phase = phase;
        }
    }
}

/// Runs stack lifecycle scenarios.
pub struct StackHarness {
    settings: HarnessSettings,
    runner: Arc<dyn CommandRunner>,
    lookup: Arc<dyn ResourceLookup>,
    cancel: CancellationToken,
}

impl StackHarness {
    /// Creates a harness that runs real subprocesses.
    pub fn new(settings: HarnessSettings) -> Self {
        let runner: Arc<dyn CommandRunner> = Arc::new(SystemRunner::new());
        Self::with_runner(settings, runner)
    }

    /// Creates a harness over `runner`, looking resources up with kubectl
    /// through the same runner.
    pub fn with_runner(settings: HarnessSettings, runner: Arc<dyn CommandRunner>) -> Self {
        let lookup = Arc::new(
            KubectlLookup::new(runner.clone(), settings.kubectl.clone())
                .with_context(settings.kube_context.clone()),
        );
        Self {
            settings,
            runner,
            lookup,
            cancel: CancellationToken::new(),
        }
    }

    /// Replaces the resource lookup.
    pub fn with_lookup(mut self, lookup: Arc<dyn ResourceLookup>) -> Self {
        self.lookup = lookup;
        self
    }

    /// Uses `cancel` to stop the main line early.
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Returns the settings in use.
    pub fn settings(&self) -> &HarnessSettings {
        &self.settings
    }

    /// Endpoint probed for `fixture` in `namespace`.
    pub fn endpoint_for(&self, fixture: &Fixture, namespace: &str) -> String {
        fixture
            .endpoint
            .clone()
            .unwrap_or_else(|| service_endpoint(&fixture.service, namespace, &self.settings.domain))
    }

    /// Runs `fixture` under `identity`.
    ///
    /// The checkout is removed on every path. Namespace deletion is
    /// attempted whenever the namespace was created. Cleanup steps ignore
    /// cancellation so a cancelled run still releases what it acquired.
    pub async fn run(&self, fixture: &Fixture, identity: &ScenarioIdentity) -> ScenarioReport {
        let namespace = identity.namespace();
        let endpoint = self.endpoint_for(fixture, &namespace);
        let mut report = ScenarioReport::new(identity.test_name(), namespace.clone(), endpoint);

        tracing::info!(
            test = %report.test_name,
            namespace = %namespace,
            repository = %fixture.repository,
            "running stack scenario"
        );

        let namespaces = NamespaceProvisioner::new(self.runner.clone(), &self.settings.binary)
            .with_env(fixture.env.clone());
        let cleanup = CancellationToken::new();

        let created = namespaces.create(&namespace, &self.cancel).await;
        if report.record(Step::CreateNamespace, created).is_none() {
            return report;
        }
        report.advance(Phase::NamespaceCreated);

        let mut checkout = None;
        let cloned = match RepoCheckout::prepare(&fixture.repository, &self.settings.workdir) {
            Ok(mut prepared) => {
                let fetched = prepared
                    .fetch(self.runner.as_ref(), &self.settings.git, &self.cancel)
                    .await;
                checkout = Some(prepared);
                fetched
            }
            Err(e) => Err(e),
        };

        if report.record(Step::CloneRepo, cloned).is_some() {
            report.advance(Phase::RepoCloned);
            if let Some(checkout) = &checkout {
                self.run_stack(fixture, &namespace, checkout, &cleanup, &mut report)
                    .await;
            }
        }

        let deleted = namespaces.delete(&namespace, &cleanup).await;
        if report.record(Step::DeleteNamespace, deleted).is_some() {
            report.advance(Phase::NamespaceDeleted);
        }

        // Also runs after a failed clone, which can leave a partial checkout.
        if let Some(checkout) = checkout.as_mut() {
            if report.record(Step::RemoveRepo, checkout.remove()).is_some() {
                report.advance(Phase::RepoRemoved);
            }
        }

        if report.passed() {
            tracing::info!(test = %report.test_name, "stack scenario passed");
        } else {
            tracing::error!(
                test = %report.test_name,
                phase = ?report.phase,
                "stack scenario failed"
            );
        }
        report
    }

    /// Deploy through verify-absent, inside the checkout.
    async fn run_stack(
        &self,
        fixture: &Fixture,
        namespace: &str,
        checkout: &RepoCheckout,
        cleanup: &CancellationToken,
        report: &mut ScenarioReport,
    ) {
        let stacks = StackController::new(self.runner.clone(), &self.settings.binary)
            .with_env(fixture.env.clone());

        let deployed = stacks
            .deploy(&fixture.manifest, checkout.path(), &self.cancel)
            .await;
        if report.record(Step::Deploy, deployed).is_none() {
            // A deploy that ran may have created part of the stack.
            if checkout.path().join(&fixture.manifest).is_file() {
                let destroyed = stacks
                    .destroy(&fixture.manifest, checkout.path(), cleanup)
                    .await;
                report.record(Step::CleanupDestroy, destroyed);
            }
            return;
        }
        report.advance(Phase::Deployed);

        if !self.verify_reachable(fixture, report).await {
            let destroyed = stacks
                .destroy(&fixture.manifest, checkout.path(), cleanup)
                .await;
            report.record(Step::CleanupDestroy, destroyed);
            return;
        }
        report.advance(Phase::VerifiedReachable);

        let destroyed = stacks
            .destroy(&fixture.manifest, checkout.path(), &self.cancel)
            .await;
        if report.record(Step::Destroy, destroyed).is_none() {
            return;
        }
        report.advance(Phase::Destroyed);

        let verifier = AbsenceVerifier::new(self.lookup.as_ref(), fixture.absence);
        for resource in fixture.absent_resources() {
            let absent = verifier
                .assert_absent(namespace, &resource, &self.cancel)
                .await;
            if report.record(Step::VerifyAbsent, absent).is_none() {
                return;
            }
        }
        report.advance(Phase::VerifiedAbsent);
    }

    /// Probes the endpoint and checks the body. Returns false on failure.
    async fn verify_reachable(&self, fixture: &Fixture, report: &mut ScenarioReport) -> bool {
        let endpoint = report.endpoint.clone();
        let probed = match Prober::new(fixture.probe) {
            Ok(prober) => prober.probe(&endpoint, &self.cancel).await,
            Err(e) => Err(e),
        };

        let Some(result) = report.record(Step::Probe, probed) else {
            return false;
        };

        let matched = check_content(&result.body, &fixture.expected_content);
        report.probe = Some(result);
        report.record(Step::CheckContent, matched).is_some()
    }
}
