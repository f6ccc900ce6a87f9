use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tracing::{info, warn};

use snapslot_automation::RemoteBrowser;
use snapslot_core::config::SnapslotConfig;
use snapslot_scheduler::{Orchestrator, OrchestratorSettings, SystemClock};

mod app;
mod autobook;
mod http;
#[cfg(test)]
mod test_support;

/// How long shutdown waits for cancelled runs to finish their cleanup.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(10);

#[derive(Parser)]
#[command(name = "snapslot-gateway", version, about = "Scheduled booking gateway")]
struct Cli {
    /// Path to the TOML config (default: ~/.snapslot/snapslot.toml)
    #[arg(long, env = "SNAPSLOT_CONFIG")]
    config: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "snapslot_gateway=info,snapslot_scheduler=info,tower_http=debug".into()
            }),
        )
        .init();

    let cli = Cli::parse();
    let config = SnapslotConfig::load(cli.config.as_deref()).unwrap_or_else(|e| {
        warn!("Config load failed ({}), using defaults", e);
        SnapslotConfig::default()
    });

    if !config.automation.has_credentials() {
        warn!("automation site or credentials missing; preparations will fail");
    }

    let settings = OrchestratorSettings::from_config(&config.scheduler)
        .context("invalid [scheduler] section")?;
    let timezone = settings.default_timezone;
    let browser = Arc::new(
        RemoteBrowser::new(&config.automation).context("failed to build automation client")?,
    );
    let orchestrator = Orchestrator::with_adapter(settings, browser, Arc::new(SystemClock));

    let addr: SocketAddr = format!("{}:{}", config.gateway.bind, config.gateway.port).parse()?;
    let auto_book = config.scheduler.auto_book_on_start;
    let state = Arc::new(app::AppState::new(config, orchestrator.clone()));
    info!(classes = state.catalog.len(), %timezone, "class catalog loaded");

    if auto_book {
        autobook::book_today(&orchestrator, &state.catalog, timezone, chrono::Utc::now());
    }

    let router = app::build_router(state);
    info!("Snapslot gateway listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // Every in-flight run ends CANCELLED and releases its browser session.
    let pending: Vec<_> = orchestrator
        .list()
        .into_iter()
        .filter(|run| !run.state.is_terminal())
        .map(|run| run.id)
        .collect();
    let cancelled = orchestrator.cancel_all();
    info!(cancelled, "in-flight runs cancelled");

    let drain = async {
        for id in &pending {
            orchestrator.wait_for_outcome(id).await;
        }
    };
    if tokio::time::timeout(SHUTDOWN_GRACE, drain).await.is_err() {
        warn!("shutdown grace elapsed before all runs finished cleanup");
    }
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "failed to listen for ctrl-c");
        std::future::pending::<()>().await;
    }
    info!("shutdown requested");
}
