//! incidentmedic -- incident triage and escalation for on-call teams.
//!
//! Incoming incident reports are triaged (severity, responsible teams,
//! suggested runbook steps) and then tracked through an escalation state
//! machine that notifies teams, waits for acknowledgement and escalates to a
//! broader audience when nobody responds in time.

pub mod api;
pub mod catalog;
pub mod config;
pub mod desk;
pub mod escalation;
pub mod notify;
pub mod triage;

use anyhow::{Context, Result};

use crate::api::state::AppState;
use crate::config::AppConfig;
use crate::desk::IncidentDesk;

/// Run the HTTP API until ctrl-c, then stop timers and drain notifications.
pub async fn serve(config: AppConfig) -> Result<()> {
    let desk = IncidentDesk::from_config(&config)?;

    let addr: std::net::SocketAddr = config
        .server
        .bind
        .parse()
        .with_context(|| format!("invalid bind address: {}", config.server.bind))?;
    let app = api::router(AppState::new(desk.clone()));

    tracing::info!(%addr, "incidentmedic listening");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    desk.manager().shutdown().await;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "failed to listen for ctrl-c");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutdown requested");
}
