//! HTTP server hosting the WebSocket endpoint and a health check.

use std::sync::Arc;

use axum::extract::{State, WebSocketUpgrade};
use axum::response::Response;
use axum::routing::get;
use axum::Router;
use tokio_util::sync::CancellationToken;
use tracing::{info, info_span, Instrument};

use crate::{AppError, Result};

use super::session::run_session;
use super::AppState;

/// Routes: `GET /ws` (session upgrade) and `GET /health`.
#[must_use]
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/ws", get(ws_upgrade))
        .route("/health", get(health))
        .with_state(state)
}

/// Bind `config.bind_addr()` and serve until `ct` is cancelled.
///
/// # Errors
///
/// Returns `AppError::Transport` if the listener cannot bind or the
/// server fails.
pub async fn serve(state: Arc<AppState>, ct: CancellationToken) -> Result<()> {
    let bind = state.config.bind_addr();
    let listener = tokio::net::TcpListener::bind(&bind)
        .await
        .map_err(|err| AppError::Transport(format!("failed to bind {bind}: {err}")))?;

    info!(%bind, "gateway listening");

    axum::serve(listener, router(state))
        .with_graceful_shutdown(async move { ct.cancelled().await })
        .await
        .map_err(|err| AppError::Transport(format!("gateway server error: {err}")))?;

    info!("gateway shut down");
    Ok(())
}

async fn ws_upgrade(State(state): State<Arc<AppState>>, ws: WebSocketUpgrade) -> Response {
    ws.on_upgrade(move |socket| run_session(socket, state).instrument(info_span!("ws_session")))
}

async fn health() -> &'static str {
    "ok"
}
