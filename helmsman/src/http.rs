use std::net::SocketAddr;

use axum::extract::State;
use axum::{routing::get, Router};
use http::StatusCode;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::Result;

/// Serves `/metrics` and `/readyz` until cancelled. `synced` is flipped by
/// the watch loops once every resource store has seen its initial listing;
/// the xDS listener is already bound by the time this is spawned.
pub async fn serve(
    addr: SocketAddr,
    synced: watch::Receiver<bool>,
    cancel: CancellationToken,
) -> Result<()> {
    let listener = TcpListener::bind(addr).await?;
    info!("telemetry listening on {}", addr);

    let app = Router::new()
        .route("/metrics", get(metrics))
        .route("/readyz", get(readyz))
        .with_state(synced);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown(cancel))
        .await?;
    Ok(())
}

async fn shutdown(cancel: CancellationToken) {
    cancel.cancelled().await
}

async fn metrics() -> Result<String, StatusCode> {
    let mut buffer = String::new();
    let registry = &*crate::metrics::REGISTRY.read().unwrap();
    if let Err(e) = prometheus_client::encoding::text::encode(&mut buffer, registry) {
        error!(%e, "failed to encode metrics");
        return Err(StatusCode::INTERNAL_SERVER_ERROR);
    }
    Ok(buffer)
}

async fn readyz(State(synced): State<watch::Receiver<bool>>) -> (StatusCode, &'static str) {
    if *synced.borrow() {
        (StatusCode::OK, "ready")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "waiting for initial sync")
    }
}
