//! Live stack lifecycle test.
//!
//! Deploys the voting app to a real cluster. It requires:
//! - the orchestration binary on `PATH` and logged in
//! - `git` with access to the stack repository
//! - `kubectl` pointed at the same cluster
//!
//! Run with: `cargo test --test e2e_test -- --ignored`
//!
//! Settings are read from the `STACK_E2E_*` environment variables.

use std::path::PathBuf;

use stack_e2e::{Fixture, HarnessSettings, ScenarioIdentity, ScenarioReport, StackHarness};

fn fixtures_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("e2e")
        .join("fixtures")
}

fn print_report(report: &ScenarioReport) {
    println!("\n=== Stack Scenario ===");
    println!("Test: {}", report.test_name);
    println!("Namespace: {}", report.namespace);
    println!("Endpoint: {}", report.endpoint);
    println!("Phase: {:?}", report.phase);
    for record in &report.steps {
        match &record.error {
            None => println!("  ok   {:?}", record.step),
            Some(e) => println!("  FAIL {:?}: {}", record.step, e),
        }
    }
    for warning in &report.warnings {
        println!("Warning: {}", warning);
    }
}

#[test]
fn stacks_fixture_loads() {
    let fixture = Fixture::load(fixtures_dir().join("stacks.yaml")).expect("fixture should load");
    assert_eq!(fixture.name, "TestStacks");
    assert_eq!(fixture.service, "vote");
    assert_eq!(fixture.expected_content, "Cats vs Dogs!");
    assert_eq!(fixture.namespace_prefix.as_deref(), Some("testk8"));
}

#[tokio::test]
#[ignore] // Requires a cluster, git access and the orchestration binary
async fn stacks_lifecycle() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("stack_e2e=debug")
        .with_test_writer()
        .try_init();

    let fixture = Fixture::load(fixtures_dir().join("stacks.yaml")).expect("fixture should load");
    let settings = HarnessSettings::from_env();
    let identity = ScenarioIdentity::new(&fixture.name, &settings.user)
        .with_namespace_prefix(fixture.namespace_prefix.clone());

    let report = StackHarness::new(settings).run(&fixture, &identity).await;
    print_report(&report);

    let report = report.into_result().expect("stack scenario should pass");
    assert!(report.probe.is_some_and(|p| p.body.contains("Cats vs Dogs!")));
}
