//! Newline-delimited JSON-RPC loop serving the tool catalog.
//!
//! Requests other than `tools/call` are answered inline. Tool calls run as
//! separate tasks so several can be in flight on the bridge at once; their
//! responses are written as they complete.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use serde_json::{json, Value};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use tabwire_core::ToolError;
use tabwire_tools::{ToolContext, ToolRegistry, ToolResult};

use crate::error::McpError;
use crate::protocol::{
    InitializeResult, JsonRpcError, JsonRpcRequest, JsonRpcResponse, DEFAULT_PROTOCOL_VERSION,
};

/// Counter for log correlation of incoming lines.
static REQUEST_COUNTER: AtomicU64 = AtomicU64::new(1);

#[derive(Clone)]
pub struct McpServer {
    registry: Arc<ToolRegistry>,
    ctx: ToolContext,
}

enum Parsed {
    Request(JsonRpcRequest),
    Reject(JsonRpcResponse),
}

fn parse_line(line: &str) -> Parsed {
    let request: JsonRpcRequest = match serde_json::from_str(line) {
        Ok(req) => req,
        Err(e) => {
            error!(error = %e, raw_input = %line, "Failed to parse JSON-RPC request");
            return Parsed::Reject(JsonRpcResponse::error(
                Value::Null,
                JsonRpcError::new(JsonRpcError::PARSE_ERROR, e.to_string()),
            ));
        }
    };
    if request.jsonrpc != "2.0" {
        error!(method = %request.method, got_version = %request.jsonrpc, "Invalid JSON-RPC version");
        return Parsed::Reject(JsonRpcResponse::error(
            request.id.clone(),
            JsonRpcError::with_data(
                JsonRpcError::INVALID_REQUEST,
                "Invalid JSON-RPC version",
                json!({"expected": "2.0", "got": request.jsonrpc}),
            ),
        ));
    }
    Parsed::Request(request)
}

impl McpServer {
    pub fn new(registry: Arc<ToolRegistry>, ctx: ToolContext) -> Self {
        Self { registry, ctx }
    }

    /// Serve until `reader` reaches EOF, then wait for in-flight tool calls.
    pub async fn serve<R, W>(&self, reader: R, writer: W) -> Result<(), McpError>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let (out_tx, mut out_rx) = mpsc::unbounded_channel::<String>();
        let writer_task = tokio::spawn(async move {
            let mut writer = writer;
            while let Some(line) = out_rx.recv().await {
                writer.write_all(line.as_bytes()).await?;
                writer.write_all(b"\n").await?;
                writer.flush().await?;
            }
            Ok::<_, std::io::Error>(())
        });

        info!("MCP server starting");
        let mut in_flight = JoinSet::new();
        let mut lines = reader.lines();

        while let Some(line) = lines.next_line().await? {
            reap_finished(&mut in_flight);
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let req_id = REQUEST_COUNTER.fetch_add(1, Ordering::Relaxed);
            debug!(req_id, raw = %line, "Received raw JSON-RPC request");

            let request = match parse_line(line) {
                Parsed::Request(request) => request,
                Parsed::Reject(response) => {
                    let _ = out_tx.send(serde_json::to_string(&response)?);
                    continue;
                }
            };

            if request.method == "tools/call" && !request.is_notification() {
                let server = self.clone();
                let out = out_tx.clone();
                in_flight.spawn(async move {
                    if let Some(response) = server.handle_request(request).await {
                        if let Ok(json) = serde_json::to_string(&response) {
                            let _ = out.send(json);
                        }
                    }
                });
                continue;
            }

            if let Some(response) = self.handle_request(request).await {
                let _ = out_tx.send(serde_json::to_string(&response)?);
            }
        }

        while let Some(joined) = in_flight.join_next().await {
            log_join_failure(joined);
        }
        drop(out_tx);
        writer_task
            .await
            .map_err(|e| McpError::Internal(e.to_string()))??;

        info!("MCP server shutting down");
        Ok(())
    }

    /// Handle one parsed request. Notifications yield `None`.
    pub async fn handle_request(&self, request: JsonRpcRequest) -> Option<JsonRpcResponse> {
        let start = Instant::now();
        let result = match request.method.as_str() {
            "initialize" => self.handle_initialize(&request.params),
            "ping" => Ok(json!({})),
            "tools/list" => self.handle_tools_list(),
            "tools/call" => self.handle_tools_call(&request.params).await,
            method if method.starts_with("notifications/") => Ok(json!({})),
            _ => Err(McpError::MethodNotFound(request.method.clone())),
        };
        let elapsed_ms = start.elapsed().as_millis() as u64;

        if request.is_notification() {
            match result {
                Ok(_) => debug!(method = %request.method, "Notification handled"),
                Err(e) => warn!(method = %request.method, error = %e, "Notification handling failed"),
            }
            return None;
        }

        Some(match result {
            Ok(value) => {
                info!(method = %request.method, elapsed_ms, "JSON-RPC request completed");
                JsonRpcResponse::success(request.id, value)
            }
            Err(e) => {
                warn!(method = %request.method, elapsed_ms, error = %e, "JSON-RPC request failed");
                JsonRpcResponse::error(request.id, e.into())
            }
        })
    }

    fn handle_initialize(&self, params: &Value) -> Result<Value, McpError> {
        let version = params
            .get("protocolVersion")
            .and_then(Value::as_str)
            .unwrap_or(DEFAULT_PROTOCOL_VERSION);
        if let Some(client) = params.get("clientInfo") {
            info!(client = %client, protocol_version = version, "MCP client initialized");
        }
        Ok(serde_json::to_value(InitializeResult::new(version))?)
    }

    fn handle_tools_list(&self) -> Result<Value, McpError> {
        Ok(json!({ "tools": self.registry.list() }))
    }

    async fn handle_tools_call(&self, params: &Value) -> Result<Value, McpError> {
        let name = params
            .get("name")
            .and_then(Value::as_str)
            .ok_or_else(|| McpError::InvalidParams("Missing 'name' parameter".into()))?;
        let arguments = params.get("arguments").cloned().unwrap_or(Value::Null);

        info!(tool = %name, "Dispatching tool call");
        debug!(tool = %name, arguments = %arguments, "Tool call arguments");

        let result = match self.registry.dispatch(name, arguments, &self.ctx).await {
            Ok(result) => result,
            Err(ToolError::UnknownTool(name)) => {
                return Err(McpError::InvalidParams(format!("Unknown tool: {name}")));
            }
            Err(e) => ToolResult::error(e.to_string()),
        };
        Ok(serde_json::to_value(result)?)
    }
}

/// Serve on the process's stdin/stdout.
pub async fn serve_stdio(server: &McpServer) -> Result<(), McpError> {
    let stdin = BufReader::new(tokio::io::stdin());
    server.serve(stdin, tokio::io::stdout()).await
}

/// Drop finished tool-call tasks so the set tracks only live calls.
fn reap_finished(in_flight: &mut JoinSet<()>) -> usize {
    let mut reaped = 0;
    while let Some(joined) = in_flight.try_join_next() {
        log_join_failure(joined);
        reaped += 1;
    }
    reaped
}

fn log_join_failure(joined: Result<(), tokio::task::JoinError>) {
    if let Err(e) = joined {
        error!(error = %e, "Tool call task failed");
    }
}
