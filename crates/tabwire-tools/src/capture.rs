//! Read-only tools: snapshot, getConsoleLogs, screenshot.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::Value;

use tabwire_core::protocol::BrowserCommand;
use tabwire_core::ToolError;

use crate::{capture_aria_snapshot, BrowserTool, NoArgs, ToolContext, ToolResult};

pub struct Snapshot;

#[async_trait]
impl BrowserTool for Snapshot {
    type Args = NoArgs;

    fn name(&self) -> &'static str {
        "snapshot"
    }

    fn description(&self) -> &'static str {
        "Capture an accessibility (ARIA) snapshot of the current page"
    }

    async fn run(&self, _args: NoArgs, ctx: &ToolContext) -> Result<ToolResult, ToolError> {
        capture_aria_snapshot(ctx).await
    }
}

#[derive(Debug, Deserialize)]
struct ConsoleEntry {
    #[serde(default, rename = "type")]
    level: Option<String>,
    /// Milliseconds since the Unix epoch.
    #[serde(default)]
    timestamp: Option<i64>,
    #[serde(default)]
    message: String,
}

fn format_entry(entry: Value) -> Result<String, String> {
    let entry = match entry {
        Value::String(message) => return Ok(message),
        other => serde_json::from_value::<ConsoleEntry>(other).map_err(|e| e.to_string())?,
    };
    let mut line = String::new();
    if let Some(ts) = entry.timestamp.and_then(DateTime::<Utc>::from_timestamp_millis) {
        line.push_str(&format!("[{}] ", ts.format("%Y-%m-%dT%H:%M:%S%.3fZ")));
    }
    if let Some(level) = entry.level.filter(|l| !l.is_empty()) {
        line.push_str(&format!("[{level}] "));
    }
    line.push_str(&entry.message);
    Ok(line)
}

/// One line per console entry. Accepts a bare array or `{logs: [...]}`.
pub fn render_console_logs(reply: Value) -> Result<String, String> {
    let entries = match reply {
        Value::Array(entries) => entries,
        Value::Object(mut obj) => match obj.remove("logs") {
            Some(Value::Array(entries)) => entries,
            _ => return Err("expected an array of log entries".into()),
        },
        Value::Null => Vec::new(),
        _ => return Err("expected an array of log entries".into()),
    };
    if entries.is_empty() {
        return Ok("No console logs".into());
    }
    let lines = entries
        .into_iter()
        .map(format_entry)
        .collect::<Result<Vec<_>, _>>()?;
    Ok(lines.join("\n"))
}

pub struct GetConsoleLogs;

#[async_trait]
impl BrowserTool for GetConsoleLogs {
    type Args = NoArgs;

    fn name(&self) -> &'static str {
        "getConsoleLogs"
    }

    fn description(&self) -> &'static str {
        "Return console logs produced by the page"
    }

    async fn run(&self, _args: NoArgs, ctx: &ToolContext) -> Result<ToolResult, ToolError> {
        let reply = ctx
            .bridge
            .send_default(BrowserCommand::GetConsoleLogs {})
            .await?;
        let text = render_console_logs(reply).map_err(|reason| ToolError::MalformedReply {
            tool: "getConsoleLogs".into(),
            reason,
        })?;
        Ok(ToolResult::text(text))
    }
}

/// Base64 PNG from either a bare string or `{data}`.
fn screenshot_data(reply: Value) -> Result<String, String> {
    let data = match reply {
        Value::String(data) => data,
        Value::Object(mut obj) => match obj.remove("data") {
            Some(Value::String(data)) => data,
            _ => return Err("missing image data".into()),
        },
        _ => return Err("expected base64 image data".into()),
    };
    if data.is_empty() {
        return Err("empty image data".into());
    }
    Ok(data)
}

pub struct Screenshot;

#[async_trait]
impl BrowserTool for Screenshot {
    type Args = NoArgs;

    fn name(&self) -> &'static str {
        "screenshot"
    }

    fn description(&self) -> &'static str {
        "Capture a PNG screenshot of the current page"
    }

    async fn run(&self, _args: NoArgs, ctx: &ToolContext) -> Result<ToolResult, ToolError> {
        let reply = ctx.bridge.send_default(BrowserCommand::Screenshot {}).await?;
        let data = screenshot_data(reply).map_err(|reason| ToolError::MalformedReply {
            tool: "screenshot".into(),
            reason,
        })?;
        Ok(ToolResult::image(data, "image/png"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{fake_extension, ok, page_responder};
    use crate::{ContentBlock, Tool};
    use serde_json::json;

    #[test]
    fn test_console_lines() {
        let text = render_console_logs(json!([
            {"type": "log", "message": "ready"},
            {"type": "error", "timestamp": 0, "message": "boom"},
            "plain entry",
        ]))
        .unwrap();
        assert_eq!(
            text,
            "[log] ready\n[1970-01-01T00:00:00.000Z] [error] boom\nplain entry"
        );
    }

    #[test]
    fn test_console_wrapped_and_empty() {
        assert_eq!(
            render_console_logs(json!({"logs": [{"message": "hi"}]})).unwrap(),
            "hi"
        );
        assert_eq!(render_console_logs(json!([])).unwrap(), "No console logs");
        assert!(render_console_logs(json!(7)).is_err());
    }

    #[test]
    fn test_screenshot_data_shapes() {
        assert_eq!(screenshot_data(json!("iVBOR")).unwrap(), "iVBOR");
        assert_eq!(screenshot_data(json!({"data": "iVBOR"})).unwrap(), "iVBOR");
        assert!(screenshot_data(json!({})).is_err());
        assert!(screenshot_data(json!("")).is_err());
    }

    #[tokio::test]
    async fn test_snapshot_tool() {
        let ext = fake_extension(false, page_responder);
        let result = Snapshot.execute(json!({}), &ext.ctx).await.unwrap();
        assert_eq!(ext.types(), vec!["browser_snapshot"]);
        assert!(matches!(&result.content[0], ContentBlock::Text { text } if text.contains("Example Domain")));
    }

    #[tokio::test]
    async fn test_get_console_logs_tool() {
        let ext = fake_extension(false, |_| ok(json!([{"type": "warn", "message": "deprecated"}])));
        let result = GetConsoleLogs.execute(json!({}), &ext.ctx).await.unwrap();
        assert_eq!(ext.types(), vec!["browser_get_console_logs"]);
        assert_eq!(result, ToolResult::text("[warn] deprecated"));
    }

    #[tokio::test]
    async fn test_screenshot_tool_returns_png_block() {
        let ext = fake_extension(false, |_| ok(json!("iVBORw0KGgo=")));
        let result = Screenshot.execute(json!({}), &ext.ctx).await.unwrap();
        assert_eq!(
            result.content,
            vec![ContentBlock::Image {
                data: "iVBORw0KGgo=".into(),
                mime_type: "image/png".into(),
            }]
        );
    }

    #[tokio::test]
    async fn test_screenshot_malformed_reply() {
        let ext = fake_extension(false, |_| ok(json!({"width": 100})));
        let err = Screenshot.execute(json!({}), &ext.ctx).await.unwrap_err();
        assert!(matches!(err, ToolError::MalformedReply { ref tool, .. } if tool == "screenshot"));
    }
}
