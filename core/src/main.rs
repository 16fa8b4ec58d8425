//! Stack Lifecycle E2E CLI
//!
//! Runs one stack lifecycle scenario from a fixture file.

use stack_e2e::{
    Fixture, HarnessSettings, ScenarioIdentity, ScenarioReport, StackHarness, Validate,
    ValidationResult,
};
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let args: Vec<String> = std::env::args().collect();

    if args.len() < 2 {
        let program = args.first().map(String::as_str).unwrap_or("stack-e2e");
        eprintln!("Usage: {} <fixture.yaml> [settings.toml]", program);
        eprintln!("\nDeploys, probes and destroys the stack described by the fixture.");
        eprintln!("\nEnvironment variables:");
        eprintln!("  STACK_E2E_BINARY        Orchestration binary (default: okteto)");
        eprintln!("  STACK_E2E_USER          User tag for namespaces (default: $USER)");
        eprintln!("  STACK_E2E_DOMAIN        Platform domain of public endpoints");
        eprintln!("  STACK_E2E_KUBE_CONTEXT  Kubeconfig context for lookups");
        eprintln!("  STACK_E2E_WORKDIR       Directory checkouts are cloned into");
        std::process::exit(2);
    }

    let fixture = match Fixture::load(&args[1]) {
        Ok(fixture) => fixture,
        Err(e) => {
            eprintln!("Failed to load fixture {}: {}", args[1], e);
            std::process::exit(2);
        }
    };

    let settings = match args.get(2) {
        Some(path) => HarnessSettings::load(path),
        None => Ok(HarnessSettings::from_env()),
    };
    let settings = match settings {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("Failed to load settings: {}", e);
            std::process::exit(2);
        }
    };

    let identity = ScenarioIdentity::new(&fixture.name, &settings.user)
        .with_namespace_prefix(fixture.namespace_prefix.clone());

    let mut validation = ValidationResult::default();
    validation.merge(fixture.validate());
    validation.merge(settings.validate());
    validation.merge(identity.validate());
    match validation.into_result() {
        Ok(warnings) => {
            for warning in warnings {
                tracing::warn!(warning = %warning, "configuration warning");
            }
        }
        Err(e) => {
            eprintln!("Invalid configuration: {}", e);
            std::process::exit(2);
        }
    }

    // Ctrl-C stops the main line; cleanup still runs
    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("interrupt received, cancelling scenario");
            on_signal.cancel();
        }
    });

    let harness = StackHarness::new(settings).with_cancellation(cancel);
    let report = harness.run(&fixture, &identity).await;

    print_report(&report);

    if !report.passed() {
        std::process::exit(1);
    }
}

fn print_report(report: &ScenarioReport) {
    println!("\n{}", "=".repeat(60));
    println!("Scenario: {}", report.test_name);
    println!("{}", "=".repeat(60));
    println!();
    println!("Namespace: {}", report.namespace);
    println!("Endpoint: {}", report.endpoint);
    println!("Phase: {:?}", report.phase);

    if let Some(probe) = &report.probe {
        println!("Probe attempts: {}", probe.attempts);
    }

    println!();
    println!("Steps:");
    for record in &report.steps {
        match &record.error {
            None => println!("  ok   {:?}", record.step),
            Some(error) => println!("  FAIL {:?}: {}", record.step, error),
        }
    }

    if !report.warnings.is_empty() {
        println!();
        println!("Warnings:");
        for warning in &report.warnings {
            println!("  - {}", warning);
        }
    }

    println!();
    match &report.error {
        None => println!("Result: PASSED"),
        Some(e) => println!("Result: FAILED - {}", e),
    }
}
