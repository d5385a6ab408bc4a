mod config;
mod error;
mod gate;
mod heartbeat;
mod metrics;
mod orchestrator;
mod resolver;
mod rpc;
mod schedule;
mod scheduler;
mod task;

use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::{Secrets, Settings};
use crate::rpc::{NodeConnection, WrpcClient};
use crate::task::{CommandTaskManager, TaskManager};

#[derive(Parser, Debug)]
#[clap(author, version, about = "Scheduled treasury payout orchestrator")]
struct Args {
    /// Path to config file
    #[clap(short, long, default_value = "config.json")]
    config: String,

    /// Generate default config file
    #[clap(short, long)]
    init: bool,

    /// Connect and verify the node, then exit without scheduling
    #[clap(long)]
    check: bool,

    /// Trigger one payout run right after startup
    #[clap(long)]
    run_now: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "payout_scheduler=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();

    if args.init {
        Settings::template().save(&args.config)?;
        println!("Default config generated at: {}", args.config);
        println!("Set TREASURY_PRIVATE_KEY, PUSHGATEWAY and DATABASE_URL before starting");
        return Ok(());
    }

    let settings = Settings::load(&args.config)?;
    let secrets = Secrets::from_env();

    let ready = orchestrator::bootstrap(
        &settings,
        &secrets,
        |config| {
            Arc::new(WrpcClient::new(config.network_id.clone(), config.resolver.clone()))
                as Arc<dyn NodeConnection>
        },
        |config, context| {
            let manager = CommandTaskManager::new(
                config.payout_command.clone(),
                config.payout_args.clone(),
                context,
            )?;
            Ok(Arc::new(manager) as Arc<dyn TaskManager>)
        },
    )
    .await
    .inspect_err(|e| tracing::error!(error = %e, "Startup failed"))?;

    if args.check {
        tracing::info!(
            url = ready.connection().url().as_deref().unwrap_or(""),
            interval_hours = ready.config().interval.hours(),
            state = ?ready.gate().state(),
            "Startup check passed"
        );
        return Ok(());
    }

    let cancel = CancellationToken::new();
    let running = ready.spawn(cancel.clone(), args.run_now);

    orchestrator::shutdown_signal().await;
    cancel.cancel();
    running.join().await;

    tracing::info!("Payout scheduler stopped");
    Ok(())
}
