//! End-to-end: MCP client -> tool registry -> relay -> WebSocket extension.
//!
//! Run with: `cargo test -p tabwire-mcp --test integration`

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::io::{duplex, split, AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;

use tabwire_mcp::McpServer;
use tabwire_relay::{start_relay, BridgeSettings, ConnectPolicy, SocketBridge};
use tabwire_tools::{ToolContext, ToolRegistry};

fn find_free_port() -> u16 {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap().port()
}

/// Answers every request; snapshot requests get a small page.
/// `browser_wait` replies are held back until the next request arrives,
/// so replies go out of order.
async fn run_fake_extension(port: u16) {
    let url = format!("ws://127.0.0.1:{port}/");
    let (mut ws, _) = connect_async(&url).await.expect("WS connect failed");
    let mut held: Option<Value> = None;

    while let Some(Ok(msg)) = ws.next().await {
        let Message::Text(text) = msg else { continue };
        let request: Value = serde_json::from_str(text.as_str()).unwrap();
        let id = request["correlationId"].clone();
        let reply = match request["type"].as_str().unwrap_or_default() {
            "browser_snapshot" => json!({
                "correlationId": id,
                "result": {"snapshot": "- heading \"Welcome\"", "url": "https://example.com/", "title": "Welcome"},
            }),
            "browser_wait" => {
                held = Some(json!({"correlationId": id, "result": {}}));
                continue;
            }
            "browser_click" => json!({
                "correlationId": id,
                "error": {"message": "element not found"},
            }),
            _ => json!({"correlationId": id, "result": {}}),
        };
        ws.send(Message::Text(reply.to_string().into())).await.unwrap();
        if let Some(late) = held.take() {
            ws.send(Message::Text(late.to_string().into())).await.unwrap();
        }
    }
}

struct Harness {
    writer: tokio::io::WriteHalf<tokio::io::DuplexStream>,
    lines: tokio::io::Lines<BufReader<tokio::io::ReadHalf<tokio::io::DuplexStream>>>,
    _shutdown: tokio_util::sync::DropGuard,
}

impl Harness {
    async fn start(capture_snapshot: bool) -> Self {
        let port = find_free_port();
        let bridge = Arc::new(SocketBridge::new(BridgeSettings {
            request_timeout: Duration::from_secs(5),
            connect: ConnectPolicy::Wait(Duration::from_secs(5)),
        }));
        let listener = tokio::net::TcpListener::bind(("127.0.0.1", port))
            .await
            .unwrap();
        let shutdown = CancellationToken::new();
        tokio::spawn(start_relay(bridge.clone(), listener, shutdown.clone()));
        tokio::spawn(run_fake_extension(port));

        let server = McpServer::new(
            Arc::new(ToolRegistry::with_browser_tools().unwrap()),
            ToolContext::new(bridge, capture_snapshot),
        );
        let (client_io, server_io) = duplex(256 * 1024);
        let (server_read, server_write) = split(server_io);
        tokio::spawn(async move { server.serve(BufReader::new(server_read), server_write).await });

        let (client_read, client_write) = split(client_io);
        Self {
            writer: client_write,
            lines: BufReader::new(client_read).lines(),
            _shutdown: shutdown.drop_guard(),
        }
    }

    async fn send(&mut self, value: Value) {
        self.writer
            .write_all(format!("{value}\n").as_bytes())
            .await
            .unwrap();
    }

    async fn recv(&mut self) -> Value {
        let line = tokio::time::timeout(Duration::from_secs(10), self.lines.next_line())
            .await
            .expect("response in time")
            .unwrap()
            .expect("line");
        serde_json::from_str(&line).unwrap()
    }

    async fn call(&mut self, id: u64, name: &str, arguments: Value) {
        self.send(json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": "tools/call",
            "params": {"name": name, "arguments": arguments},
        }))
        .await;
    }
}

#[tokio::test]
async fn test_navigate_end_to_end() {
    let mut h = Harness::start(false).await;
    h.call(1, "navigate", json!({"url": "https://example.com"})).await;
    let resp = h.recv().await;
    assert_eq!(resp["id"], 1);
    assert_eq!(
        resp["result"]["content"],
        json!([{"type": "text", "text": "Navigated to https://example.com"}])
    );
    assert!(resp["result"].get("isError").is_none());
}

#[tokio::test]
async fn test_snapshot_mode_end_to_end() {
    let mut h = Harness::start(true).await;
    h.call(1, "goBack", json!({})).await;
    let resp = h.recv().await;
    let text = resp["result"]["content"][0]["text"].as_str().unwrap();
    assert!(text.contains("- Page Title: Welcome"));
    assert!(text.contains("heading \"Welcome\""));
}

#[tokio::test]
async fn test_concurrent_calls_complete_out_of_order() {
    let mut h = Harness::start(false).await;
    h.call(1, "wait", json!({"time": 1})).await;
    // Give the wait request a head start so it reaches the extension first.
    tokio::time::sleep(Duration::from_millis(100)).await;
    h.call(2, "pressKey", json!({"key": "Enter"})).await;

    let mut responses = HashMap::new();
    for _ in 0..2 {
        let resp = h.recv().await;
        responses.insert(resp["id"].as_u64().unwrap(), resp);
    }
    assert_eq!(
        responses[&1]["result"]["content"][0]["text"],
        "Waited for 1 seconds"
    );
    assert_eq!(
        responses[&2]["result"]["content"][0]["text"],
        "Pressed key Enter"
    );
}

#[tokio::test]
async fn test_remote_error_end_to_end() {
    let mut h = Harness::start(false).await;
    h.call(1, "click", json!({"element": "Missing"})).await;
    let resp = h.recv().await;
    assert_eq!(resp["result"]["isError"], true);
    assert!(resp["result"]["content"][0]["text"]
        .as_str()
        .unwrap()
        .contains("element not found"));
}
