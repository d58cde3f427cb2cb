use anyhow::{Context, Result};
use simwatch::api::SimulationApi;
use simwatch::config::{load_config, SimwatchConfig};
use simwatch::nats::NatsBus;
use simwatch::session::SimulationSession;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

const SUMMARY_INTERVAL: Duration = Duration::from_secs(10);

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing subscriber
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "simwatch=info".into()),
        )
        .init();

    let mut args = std::env::args().skip(1);
    let sim_id = args
        .next()
        .context("usage: simwatch <simulation-id> [config.toml]")?;
    let config = match args.next() {
        Some(path) => load_config(&path)?,
        None => SimwatchConfig::default(),
    };

    info!(
        simulation = %sim_id,
        nats_url = %config.nats.url,
        api_url = %config.api.base_url,
        "Simwatch starting..."
    );

    let bus = Arc::new(
        NatsBus::connect(&config.nats)
            .await
            .context("Failed to connect to NATS")?,
    );
    let api = Arc::new(SimulationApi::new(&config.api)?);

    let session = SimulationSession::mount(&config, bus, api, &sim_id).await;

    let reporter = {
        let session = Arc::clone(&session);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(SUMMARY_INTERVAL);
            loop {
                interval.tick().await;
                let summary = session.summary();
                info!(
                    tick = summary.tick,
                    running = summary.running,
                    agents = summary.agents,
                    alive = summary.alive,
                    delivered = summary.subscriptions.delivered,
                    malformed = summary.subscriptions.malformed,
                    "Simulation status"
                );
            }
        })
    };

    // Wait for shutdown signal
    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for ctrl_c signal")?;
    info!("Shutdown signal received");

    reporter.abort();
    session.teardown();
    info!("Simwatch stopped");

    Ok(())
}
