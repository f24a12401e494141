//! linkpulse agent
//!
//! Runs the stream engine against a stats relay WebSocket and:
//! - Logs connection and quality changes as they happen
//! - Serves engine status, the plot window and Prometheus metrics over HTTP

mod config;
mod http;
mod transport;

use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use tokio::sync::{broadcast, oneshot};
use tracing_subscriber::EnvFilter;

use linkpulse_core::EngineEvent;

/// Link telemetry agent.
#[derive(Parser, Debug)]
#[command(name = "linkpulse", about = "Link telemetry stream agent")]
struct Cli {
    /// TOML config file.
    #[arg(long, env = "LINKPULSE_CONFIG")]
    config: Option<PathBuf>,

    /// Stats relay WebSocket URL. Takes precedence over --ws-port.
    #[arg(long, env = "LINKPULSE_ENDPOINT")]
    endpoint: Option<String>,

    /// Relay port on localhost, connects to ws://localhost:<PORT>/ws [default: 8888].
    #[arg(long)]
    ws_port: Option<u16>,

    /// HTTP listen address [default: 0.0.0.0:9999].
    #[arg(long, env = "LINKPULSE_HTTP_ADDR")]
    http_addr: Option<String>,

    /// Log filter used when RUST_LOG is unset [default: info].
    #[arg(long)]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let file = match &cli.config {
        Some(path) => config::FileConfig::load(path)?,
        None => config::FileConfig::default(),
    };
    let cfg = file.merge(config::Overrides {
        endpoint: cli.endpoint,
        ws_port: cli.ws_port,
        http_addr: cli.http_addr,
        log_level: cli.log_level,
    })?;

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cfg.log_level)),
        )
        .init();

    tracing::info!(
        endpoint = %cfg.engine.endpoint,
        http_addr = %cfg.http_addr,
        "linkpulse starting"
    );

    let engine = linkpulse_core::spawn(cfg.engine.clone(), transport::WsTransport);

    // ── Task 1: Event log ───────────────────────────────────────
    let events_task = tokio::spawn(log_events(engine.subscribe()));

    // ── Task 2: HTTP status server ──────────────────────────────
    let state = http::AppState {
        window: engine.window(),
        status: engine.status(),
    };
    let (stop_tx, stop_rx) = oneshot::channel::<()>();
    let mut server = tokio::spawn(http::serve(state, cfg.http_addr, async move {
        let _ = stop_rx.await;
    }));

    // ── Shutdown handling ───────────────────────────────────────
    let finished = tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("received SIGINT, shutting down");
            None
        }
        result = &mut server => Some(result),
    };

    engine.shutdown().await;
    if let Err(e) = events_task.await {
        tracing::error!("event log task failed: {e}");
    }

    let _ = stop_tx.send(());
    let result = match finished {
        Some(result) => result,
        None => server.await,
    };
    result.context("http server task failed")??;

    tracing::info!("linkpulse stopped");
    Ok(())
}

/// Log every engine event until the engine goes away.
async fn log_events(mut events: broadcast::Receiver<EngineEvent>) {
    loop {
        match events.recv().await {
            Ok(event) => match event {
                EngineEvent::Connected => tracing::info!(?event, "connected"),
                EngineEvent::Disconnected => tracing::warn!(?event, "disconnected"),
                EngineEvent::QualityRecovered => tracing::info!(?event, "good connection"),
                EngineEvent::QualityDegraded => tracing::warn!(?event, "poor connection"),
            },
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                tracing::warn!(skipped, "event log fell behind");
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}
