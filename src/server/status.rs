use anyhow::Context;
use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use crate::scan::NodeStatus;

pub async fn status_handler(State(status): State<watch::Receiver<NodeStatus>>) -> Json<NodeStatus> {
    Json(status.borrow().clone())
}

pub fn router(status: watch::Receiver<NodeStatus>) -> Router {
    Router::new()
        .route("/status", get(status_handler))
        .with_state(status)
}

/// Serve the status endpoint until `shutdown` is cancelled.
pub async fn serve(
    port: u16,
    status: watch::Receiver<NodeStatus>,
    shutdown: CancellationToken,
) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(("0.0.0.0", port))
        .await
        .with_context(|| format!("failed to bind status port {port}"))?;
    tracing::info!(port, "status server listening");

    axum::serve(listener, router(status))
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await
        .context("status server failed")?;
    Ok(())
}
