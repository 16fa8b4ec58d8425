//! Stack Lifecycle E2E - end-to-end harness for multi-service stacks
//!
//! This library deploys an application stack from a git repository with an
//! orchestration binary, checks that it serves traffic, destroys it and
//! confirms the cluster no longer holds its resources.

pub mod backoff;
pub mod config;
pub mod e2e;
pub mod error;
pub mod lookup;
pub mod namespace;
pub mod probe;
pub mod runner;
pub mod scenario;
pub mod stack;

pub use error::{Error, ExitCode, Result};

pub use backoff::{Backoff, BackoffPolicy};
pub use config::{HarnessSettings, Validate, ValidationResult};
pub use e2e::{Fixture, Lane, Phase, ScenarioReport, StackHarness, Step};
pub use lookup::{KubectlLookup, ResourceDescriptor, ResourceLookup, ResourceRef, NOT_FOUND};
pub use namespace::NamespaceProvisioner;
pub use probe::{service_endpoint, ProbePolicy, ProbeResult, Prober};
pub use runner::{CommandRunner, CommandSpec, ScriptedResponse, ScriptedRunner, SystemRunner};
pub use scenario::ScenarioIdentity;
pub use stack::StackController;
