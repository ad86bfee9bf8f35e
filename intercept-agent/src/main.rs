//! Interception Agent Binary Entry Point

use anyhow::Context;
use clap::Parser;
use intercept_agent::{init_logging, load_agent_config, Agent, Args};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let config = load_agent_config(&args).context("failed to load configuration")?;
    let _log_guard = init_logging(&config.logging).context("failed to initialize logging")?;

    let agent = Agent::start(config).await.context("failed to start agent")?;

    let served = agent
        .serve(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("Shutdown signal received, resuming paused responses...");
        })
        .await;

    agent.shutdown().await;
    if let Err(e) = &served {
        tracing::error!("Message boundary failed: {}", e);
    }
    served.context("message boundary failed")
}
