//! `stackrun` binary: one EMR job on a throwaway CloudFormation stack.

use clap::Parser;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{info, warn};

use stackrun::cancellation::CancellationToken;
use stackrun::events::LoggingEventSink;
use stackrun::lifecycle::LifecycleOrchestrator;
use stackrun::ports::ControlPlane;
use stackrun_cli::args::Cli;
use stackrun_cli::aws::AwsControlPlane;
use stackrun_cli::env::{credential_report, load_env_file, resolve_region};
use stackrun_cli::terminal::TerminalOperator;
use stackrun_cli::logging;

const EXIT_FAILURE: u8 = 1;
const EXIT_VALIDATION: u8 = 2;
const EXIT_INTERRUPTED: i32 = 130;

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    logging::init(cli.log_format);

    if let Err(e) = load_env_file(cli.env_file.as_deref()) {
        warn!(error = %e, "Continuing without env file");
    }
    for line in credential_report(|name| std::env::var(name).ok()) {
        println!("{line}");
    }

    let request = match cli.run_request() {
        Ok(request) => request,
        Err(e) => {
            eprintln!("Error: {e}");
            return ExitCode::from(EXIT_VALIDATION);
        }
    };

    let region = resolve_region(cli.region.as_deref(), |name| std::env::var(name).ok());
    let plane = match AwsControlPlane::connect(region).await {
        Ok(plane) => plane,
        Err(e) => {
            eprintln!("Error: {e:#}");
            return ExitCode::from(EXIT_FAILURE);
        }
    };
    let config = cli.run_config(plane.region());

    let token = Arc::new(CancellationToken::new());
    tokio::spawn(watch_interrupts(token.clone()));

    let orchestrator = LifecycleOrchestrator::new(
        ControlPlane::uniform(Arc::new(plane)),
        config,
        Arc::new(TerminalOperator::new()),
        Arc::new(LoggingEventSink::default()),
    );
    let outcome = orchestrator.run(&request, &token).await;
    info!(run_id = %outcome.run_id, exit_code = outcome.exit_code, "Run finished");

    ExitCode::from(u8::try_from(outcome.exit_code).unwrap_or(EXIT_FAILURE))
}

/// First Ctrl-C cancels the run and lets cleanup proceed; a second one exits.
async fn watch_interrupts(token: Arc<CancellationToken>) {
    if tokio::signal::ctrl_c().await.is_err() {
        return;
    }
    eprintln!("\nInterrupted. Cleaning up (press Ctrl-C again to exit immediately)...");
    token.cancel("Interrupted by operator");

    if tokio::signal::ctrl_c().await.is_ok() {
        eprintln!("Exiting without cleanup.");
        std::process::exit(EXIT_INTERRUPTED);
    }
}
