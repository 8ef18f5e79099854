use std::time::Duration;

use anyhow::Context;
use server::config::AppConfig;
use server::orchestrator::recover_abandoned_flows;
use server::state::AppState;
use tracing::{Level, error, info};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt().with_max_level(Level::INFO).init();

    let config = AppConfig::load().context("Failed to load config")?;
    let addr = format!("{}:{}", config.server.host, config.server.port);
    let state = AppState::from_config(config)
        .await
        .context("Failed to initialize application state")?;

    if state.config.orchestrator.recovery_on_startup {
        let stale_after = Duration::from_secs(state.config.orchestrator.lock_ttl_secs);
        match recover_abandoned_flows(&state.journal, state.platform.as_ref(), stale_after).await {
            Ok(0) => {}
            Ok(count) => info!(count, "Recovered abandoned creation flows"),
            Err(e) => error!(error = %e, "Flow recovery failed"),
        }
    }

    let app = server::build_router(state);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;
    info!("devdb server listening on http://{addr}");

    axum::serve(listener, app).await?;
    Ok(())
}
