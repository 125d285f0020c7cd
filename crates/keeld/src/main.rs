//! keeld — Keel controller daemon.
//!
//! Serves the `/api/v1` HTTP surface and runs one control loop per
//! registered auto-scaling group.

use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use keel_api::{router, ApiState};
use keel_config::Config;
use keel_core::{IaasDriver, Supervisor};
use keel_driver::{DropletDriver, LocalDriver};
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "keeld")]
#[command(about = "Keel autoscaling controller daemon")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the controller (HTTP API + ASG supervisor)
    Run {
        /// Use the in-memory local driver instead of the droplet cloud API
        #[arg(long)]
        local: bool,

        /// Override the configured bind address
        #[arg(long)]
        ip: Option<String>,

        /// Override the configured bind port
        #[arg(long)]
        port: Option<u16>,
    },

    /// Print the effective configuration and exit
    Config,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Run { local, ip, port } => run(local, ip, port).await,
        Commands::Config => {
            let config = Config::from_env()?;
            println!("{}", serde_json::to_string_pretty(&config)?);
            Ok(())
        }
    }
}

async fn run(local: bool, ip: Option<String>, port: Option<u16>) -> anyhow::Result<()> {
    let mut config = Config::from_env()?;
    if let Some(ip) = ip {
        config.ip = ip;
    }
    if let Some(port) = port {
        config.port = port;
    }

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(
            EnvFilter::from_default_env().add_directive(config.log_filter().parse()?),
        )
        .init();

    let driver: Arc<dyn IaasDriver> = if local {
        Arc::new(LocalDriver::new())
    } else {
        Arc::new(DropletDriver::new())
    };
    info!(driver = driver.name(), "starting keeld");

    let supervisor = Arc::new(Supervisor::new(driver));
    let state = ApiState {
        supervisor: supervisor.clone(),
        config: Arc::new(config.clone()),
    };

    let loops = supervisor.clone();
    tokio::spawn(async move {
        info!("starting ASG supervisor");
        loops.run().await;
    });

    let addr = config.bind_addr();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("unable to bind {addr}"))?;
    info!(%addr, "serving HTTP API");

    axum::serve(listener, router(state))
        .await
        .context("HTTP server failed")?;

    Ok(())
}
