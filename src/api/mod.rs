//! JSON control API over axum.
//!
//! Every handler is a thin adapter onto [`OrchestratorHandle`]; rejected
//! operations surface as [`ApiError`] with a 4xx status.

mod error;
mod routes;

pub use error::ApiError;

use anyhow::{Context, Result};
use axum::Router;
use axum::routing::{get, post};
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tracing::info;

use synthflow_orchestrator::OrchestratorHandle;

/// All control routes, sharing `handle`.
pub fn router(handle: OrchestratorHandle) -> Router {
    Router::new()
        .route("/api/research/initiate", post(routes::initiate))
        .route(
            "/api/research/{id}",
            get(routes::details).delete(routes::delete),
        )
        .route("/api/research/{id}/status", get(routes::status))
        .route("/api/research/{id}/retry", post(routes::retry))
        .route("/api/research/{id}/stop", post(routes::stop))
        .route(
            "/api/research/{id}/outcome",
            post(routes::submit_outcome).put(routes::update_outcome),
        )
        .route("/api/research/{id}/reconcile", post(routes::reconcile))
        .route("/api/report/{id}", get(routes::report))
        .route("/api/health", get(routes::health))
        .with_state(handle)
}

/// Bind `addr` and serve until the listener fails.
pub async fn serve(handle: OrchestratorHandle, addr: SocketAddr) -> Result<()> {
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind control API on {addr}"))?;
    serve_on(handle, listener).await
}

/// Serve on an already-bound listener.
pub async fn serve_on(handle: OrchestratorHandle, listener: TcpListener) -> Result<()> {
    let local = listener.local_addr().context("listener has no local address")?;
    info!(addr = %local, "Control API listening");
    axum::serve(listener, router(handle))
        .await
        .context("control API server error")?;
    Ok(())
}
