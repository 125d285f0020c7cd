//! keel-metricsd — pushes health samples for one node to a controller.
//!
//! Useful for demos and smoke tests: point it at `/api/v1/metrics` and it
//! reports the given health value every interval until stopped.

use std::time::Duration;

use chrono::Utc;
use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "keel-metricsd")]
#[command(about = "Push node health samples to a Keel controller")]
#[command(version)]
struct Cli {
    /// Metrics endpoint, e.g. http://127.0.0.1:8080/api/v1/metrics
    #[arg(long)]
    url: String,

    /// Auto-scaling group id
    #[arg(long)]
    asg: String,

    /// Node id to report for
    #[arg(long)]
    node: String,

    /// Health value per sample (1.0 healthy, 0.0 unhealthy)
    #[arg(long, default_value_t = 1.0)]
    value: f64,

    /// Seconds between pushes
    #[arg(long, default_value_t = 1)]
    interval_secs: u64,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env().add_directive("keel_metricsd=info".parse()?))
        .init();

    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(10))
        .build()?;

    info!(url = %cli.url, asg = %cli.asg, node = %cli.node, "pushing health samples");

    loop {
        let body = serde_json::json!({
            "id": cli.asg,
            "node_id": cli.node,
            "metrics": [{ "value": cli.value, "time": Utc::now() }],
        });

        match client.post(&cli.url).json(&body).send().await {
            Ok(resp) => {
                if resp.status().is_success() {
                    info!(status = %resp.status(), value = cli.value, "sample pushed");
                } else {
                    let status = resp.status();
                    let text = resp.text().await.unwrap_or_default();
                    warn!(%status, %text, "controller rejected sample");
                }
            }
            Err(e) => warn!(error = %e, "push failed"),
        }

        tokio::time::sleep(Duration::from_secs(cli.interval_secs)).await;
    }
}
