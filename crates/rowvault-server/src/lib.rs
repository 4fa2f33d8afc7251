//! Metrics & health HTTP surface: `/health`, `/ready`, and `/metrics`. A
//! run orchestrator spawns this alongside a run when `server` is configured
//! and feeds it the run's outcome via [`ServerState`]; it is not a
//! standalone long-running service of its own.

mod handlers;
mod state;

pub use state::ServerState;

use anyhow::Context;
use axum::routing::get;
use axum::Router;
use std::sync::Arc;
use tokio::signal;
use tracing::info;

/// Builds the router without binding a listener, for use in tests.
pub fn router(state: Arc<ServerState>) -> Router {
    Router::new()
        .route("/health", get(handlers::health_check))
        .route("/ready", get(handlers::ready_check))
        .route("/metrics", get(handlers::metrics_handler))
        .with_state(state)
}

/// Binds `listen_addr` and serves until a shutdown signal arrives.
pub async fn serve(listen_addr: &str, state: Arc<ServerState>) -> anyhow::Result<()> {
    let app = router(state);
    let listener = tokio::net::TcpListener::bind(listen_addr)
        .await
        .with_context(|| format!("failed to bind metrics/health listener on {listen_addr}"))?;

    info!("metrics/health endpoint listening on http://{}", listen_addr);
    info!("  GET http://{}/health  - liveness", listen_addr);
    info!("  GET http://{}/ready   - readiness", listen_addr);
    info!("  GET http://{}/metrics - Prometheus text exposition", listen_addr);

    axum::serve(listener, app).with_graceful_shutdown(shutdown_signal()).await.context("metrics/health server error")?;
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c().await.expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("received Ctrl+C, shutting down metrics/health server"),
        _ = terminate => info!("received SIGTERM, shutting down metrics/health server"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn health_endpoint_is_always_ok() {
        use axum::body::Body;
        use axum::http::Request;
        use tower::ServiceExt;

        let app = router(Arc::new(ServerState::new()));
        let response = app.oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap()).await.unwrap();
        assert_eq!(response.status(), axum::http::StatusCode::OK);
    }
}
