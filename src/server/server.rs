use std::sync::Arc;

use anyhow::{Context, Result};
use axum::Router;
use tokio::select;
use tokio::signal::unix::{signal, SignalKind};
use tracing::{error, info};

use crate::config::settings::SettingsConfig;
use crate::observability::metrics::{get_metrics, Metrics};
use crate::observability::routes::MetricsState;
use crate::server::routes::{RelayCoordinator, RelayState};

#[derive(Clone)]
pub struct AppState {
    pub metrics_state: MetricsState,
    pub relay_state: RelayState,
}

impl AppState {
    pub fn new(metrics: &Metrics, coordinator: Arc<RelayCoordinator>) -> Self {
        Self {
            metrics_state: MetricsState::new(metrics.registry.clone()),
            relay_state: RelayState::new(coordinator),
        }
    }
}

/// Relay routes plus the metrics route when enabled.
pub fn build_router(
    settings_config: &SettingsConfig,
    metrics: &Metrics,
    coordinator: Arc<RelayCoordinator>,
) -> Router {
    let state = AppState::new(metrics, coordinator);
    Router::new()
        .merge(state.metrics_state.router(&settings_config.metrics))
        .merge(state.relay_state.router())
        .with_state(state)
}

/// Serve until SIGINT / SIGTERM.
pub async fn start(settings_config: &SettingsConfig, coordinator: Arc<RelayCoordinator>) -> Result<()> {
    let metrics = get_metrics().await;
    let app = build_router(settings_config, metrics, coordinator);

    let address = format!("{}:{}", settings_config.server.host, settings_config.server.port);
    let listener = tokio::net::TcpListener::bind(&address)
        .await
        .with_context(|| format!("binding {}", address))?;
    info!("listening on {}", address);

    metrics.up.set(1);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("http server failed")?;
    metrics.up.set(0);

    info!("server stopped");
    Ok(())
}

async fn shutdown_signal() {
    let mut sigterm = match signal(SignalKind::terminate()) {
        Ok(sigterm) => sigterm,
        Err(err) => {
            error!("cannot listen for SIGTERM: {}", err);
            let _ = tokio::signal::ctrl_c().await;
            return;
        }
    };
    select! {
        _ = tokio::signal::ctrl_c() => {
            info!("Received SIGINT (Ctrl+C). Initiating graceful shutdown...");
        }
        _ = sigterm.recv() => {
            info!("Received SIGTERM. Initiating graceful shutdown...");
        }
    }
}
