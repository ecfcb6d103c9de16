//! Extension WebSocket lifecycle: attach, read/write loops, detach.

use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket};
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::bridge::SocketBridge;
use crate::metrics;

/// Drive one extension connection until it closes.
pub async fn handle_extension_socket(bridge: Arc<SocketBridge>, ws: WebSocket) {
    let (mut ws_tx, mut ws_rx) = ws.split();

    let (frame_tx, mut frame_rx) = mpsc::unbounded_channel::<String>();
    let conn_id = bridge.attach(frame_tx);
    metrics::record_extension_connect();
    info!(conn = %conn_id, "Browser extension connected");

    // Writer: drains the bridge's outbound queue. The queue ends when the
    // bridge drops this link (replacement), at which point the socket is closed.
    let send_task = tokio::spawn(async move {
        while let Some(frame) = frame_rx.recv().await {
            if ws_tx.send(Message::Text(frame.into())).await.is_err() {
                return;
            }
        }
        let _ = ws_tx.send(Message::Close(None)).await;
    });

    while let Some(msg_result) = ws_rx.next().await {
        match msg_result {
            Ok(Message::Text(text)) => {
                bridge.handle_frame(text.as_str());
            }
            Ok(Message::Binary(bytes)) => {
                warn!(conn = %conn_id, len = bytes.len(), "Ignoring binary frame");
            }
            Ok(Message::Close(_)) => {
                debug!(conn = %conn_id, "Extension requested close");
                break;
            }
            Ok(_) => {
                // Ping/pong handled by axum
            }
            Err(e) => {
                error!(conn = %conn_id, %e, "WebSocket error");
                break;
            }
        }
    }

    send_task.abort();
    bridge.detach(conn_id);
    metrics::record_extension_disconnect();
    info!(conn = %conn_id, "Browser extension disconnected");
}
