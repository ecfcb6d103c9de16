//! Axum-based WebSocket listener for the browser extension.

use std::sync::Arc;

use axum::{
    extract::{State, WebSocketUpgrade},
    response::IntoResponse,
    routing::get,
    Router,
};
use serde_json::json;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;
use tracing::info;

use tabwire_core::config::RelayConfig;
use tabwire_core::TabwireError;

use crate::bridge::SocketBridge;
use crate::connection::handle_extension_socket;
use crate::port::{ensure_port_free, PortGuard};

/// Routes: the extension may connect on `/` or `/ws`; `/health` reports bridge state.
/// With the `prometheus` feature, `/metrics` serves the exposition text.
pub fn relay_router(bridge: Arc<SocketBridge>) -> Router {
    let router = Router::new()
        .route("/", get(ws_handler))
        .route("/ws", get(ws_handler))
        .route("/health", get(health_handler));
    #[cfg(feature = "prometheus")]
    let router = router.route("/metrics", get(metrics_handler));
    router
        .layer(TraceLayer::new_for_http())
        .with_state(bridge)
}

/// Port pre-flight, then bind the configured address.
pub async fn bind_relay(
    config: &RelayConfig,
    guard: &dyn PortGuard,
) -> Result<TcpListener, TabwireError> {
    ensure_port_free(guard, config.port, config.reclaim_port).await?;
    let addr = format!("{}:{}", config.bind, config.port);
    let listener = TcpListener::bind(&addr).await?;
    info!("Relay listening on ws://{addr}");
    Ok(listener)
}

/// Serve the relay on a bound listener until `shutdown` is cancelled.
pub async fn start_relay(
    bridge: Arc<SocketBridge>,
    listener: TcpListener,
    shutdown: CancellationToken,
) -> anyhow::Result<()> {
    let app = relay_router(bridge);
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown.cancelled().await;
            info!("Relay shutting down");
        })
        .await?;
    Ok(())
}

async fn ws_handler(
    ws: WebSocketUpgrade,
    State(bridge): State<Arc<SocketBridge>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_extension_socket(bridge, socket))
}

async fn health_handler(State(bridge): State<Arc<SocketBridge>>) -> impl IntoResponse {
    let version = env!("CARGO_PKG_VERSION");

    axum::Json(json!({
        "status": "ok",
        "version": version,
        "connected": bridge.is_connected(),
        "pending": bridge.pending_count(),
        "unmatchedReplies": bridge.unmatched_replies(),
    }))
}

#[cfg(feature = "prometheus")]
async fn metrics_handler() -> impl IntoResponse {
    match crate::metrics::render() {
        Some(body) => (axum::http::StatusCode::OK, body),
        None => (
            axum::http::StatusCode::NOT_FOUND,
            "metrics recorder not installed".to_string(),
        ),
    }
}
