//! stork-operator: handles one hook event for the Stork server.
//!
//! The hosting runtime invokes the binary once per event with the current
//! relation context. The pass report goes to stdout. A deferred pass exits
//! successfully with `"deferred": true`; a failed pass exits non-zero and is
//! retried by the runtime.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Parser;
use tokio::io::AsyncReadExt;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use stork_operator::clients::render::DEFAULT_ENV_FILE;
use stork_operator::clients::workload::PACKAGE;
use stork_operator::clients::{EnvFileRenderer, StorkServer};
use stork_operator::reconciler::requested_database_name;
use stork_operator::{HookContext, HookEvent, Reconciler};

/// Stork operator
#[derive(Parser, Debug)]
#[command(name = "stork-operator", version, about)]
struct Args {
    /// Hook event to handle
    #[arg(long, value_enum)]
    event: HookEvent,

    /// Hook context JSON file ("-" reads stdin)
    #[arg(long, default_value = "-")]
    context: PathBuf,

    /// Environment file read by the Stork server unit
    #[arg(long, default_value = DEFAULT_ENV_FILE)]
    env_file: PathBuf,

    /// systemd unit of the Stork server
    #[arg(long, default_value = PACKAGE)]
    service: String,

    /// Application name, used to derive the requested database name
    #[arg(long, default_value = "stork")]
    app_name: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Logs go to stderr, stdout carries the pass report
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "stork_operator=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let args = Args::parse();

    info!(
        event = %args.event,
        database = %requested_database_name(&args.app_name),
        "Starting stork-operator"
    );

    let ctx = read_context(&args.context).await?;

    let reconciler = Reconciler::new(
        StorkServer::new(args.service.clone()),
        EnvFileRenderer::new(args.env_file, args.service),
    );

    let outcome = match reconciler.handle(args.event, &ctx).await {
        Ok(outcome) => outcome,
        Err(e) => {
            error!("Reconciliation of {} failed: {:#}", args.event, e);
            return Err(e);
        }
    };

    let report = serde_json::to_string(&outcome.report()).context("Failed to encode report")?;
    println!("{}", report);

    Ok(())
}

async fn read_context(path: &Path) -> Result<HookContext> {
    let json = if path.as_os_str() == "-" {
        let mut buf = String::new();
        tokio::io::stdin()
            .read_to_string(&mut buf)
            .await
            .context("Failed to read hook context from stdin")?;
        buf
    } else {
        tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read hook context {}", path.display()))?
    };

    HookContext::from_json(&json).context("Invalid hook context")
}
