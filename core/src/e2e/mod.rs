//! End-to-end stack lifecycle scenarios.
//!
//! Fixture-driven scenarios that deploy a stack from a cloned repository,
//! probe it, destroy it and confirm it is gone.

pub mod fixture;
pub mod harness;
pub mod repo;
pub mod validator;

pub use fixture::Fixture;
pub use harness::{Lane, Phase, ScenarioReport, StackHarness, Step, StepRecord};
pub use repo::{checkout_dir_name, RepoCheckout};
pub use validator::{check_content, AbsencePolicy, AbsenceVerifier};
