//! testrail-simple CLI
//!
//! Reports a recorded `after:spec` event to TestRail, or closes the run.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use eyre::{WrapErr, eyre};
use tracing::{info, warn};

use testrail_simple::client::{AttachmentOutcome, TestRailClient};
use testrail_simple::config::{self, Env, TestRailConfig};
use testrail_simple::plugin::{self, AfterSpecEvent, LocalEvents, Registration};

/// testrail-simple - report test runner results to TestRail
#[derive(Parser, Debug)]
#[command(name = "testrail-simple")]
#[command(about = "Sends spec results to a TestRail run, matching cases by C<id> in test titles")]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Report one after:spec event read from a JSON file
    Report {
        /// Path to the event JSON ({"spec": ..., "results": ...})
        #[arg(short, long)]
        event: PathBuf,

        /// Do not report anything
        #[arg(long)]
        skip: bool,
    },
    /// Close the TestRail run
    CloseRun,
}

#[tokio::main]
async fn main() -> eyre::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let args = Args::parse();
    let env = Env::from_process();
    let cwd = std::env::current_dir().wrap_err("failed to read current directory")?;

    match args.command {
        Command::Report { event, skip } => report(&env, cwd, event, skip).await,
        Command::CloseRun => close_run(&env, cwd).await,
    }
}

async fn report(env: &Env, cwd: PathBuf, event: PathBuf, skip: bool) -> eyre::Result<()> {
    let mut events = LocalEvents::new();
    let registration = plugin::register(&mut events, env, &cwd, skip)
        .wrap_err("failed to register TestRail reporter")?;

    let Registration::Registered { run_id } = registration else {
        info!(?registration, "TestRail reporting disabled");
        return Ok(());
    };

    let content = std::fs::read_to_string(&event)
        .wrap_err_with(|| format!("failed to read {}", event.display()))?;
    let event: AfterSpecEvent =
        serde_json::from_str(&content).wrap_err("failed to parse after:spec event")?;

    let submission = events
        .emit_after_spec(&event.spec, &event.results)
        .await
        .wrap_err_with(|| format!("failed to send results for {}", event.spec.relative))?;

    match submission {
        Some(submission) => {
            if let Some(AttachmentOutcome::Failed(e)) = &submission.attachment {
                warn!(error = %e, "screenshot was not attached");
            }
            info!(run_id, "TestRail results sent");
        }
        None => info!(spec = %event.spec.relative, "no TestRail cases found"),
    }

    Ok(())
}

async fn close_run(env: &Env, cwd: PathBuf) -> eyre::Result<()> {
    let testrail = TestRailConfig::from_env(env)?;
    let run_id = config::resolve_run_id(env, &cwd)?
        .ok_or_else(|| eyre!("Missing test rail run ID"))?;
    let allow_partial = config::allow_closing_partial_run(env);

    let client = TestRailClient::new(testrail);
    client
        .close_run_checked(run_id, allow_partial)
        .await
        .wrap_err_with(|| format!("failed to close run {run_id}"))?;

    info!(run_id, "TestRail run closed");
    Ok(())
}
