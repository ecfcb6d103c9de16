//! ARIA snapshot capture.

use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use tabwire_core::protocol::BrowserCommand;
use tabwire_core::ToolError;

use crate::{ToolContext, ToolResult};

#[derive(Debug, Deserialize)]
struct SnapshotReply {
    snapshot: String,
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    title: Option<String>,
}

/// Render the extension's snapshot reply as a single text block.
pub fn render_snapshot(reply: Value) -> Result<String, String> {
    let reply = match reply {
        Value::String(snapshot) => SnapshotReply {
            snapshot,
            url: None,
            title: None,
        },
        other => serde_json::from_value::<SnapshotReply>(other).map_err(|e| e.to_string())?,
    };

    let mut text = String::new();
    if let Some(url) = reply.url.filter(|u| !u.is_empty()) {
        text.push_str(&format!("- Page URL: {url}\n"));
    }
    if let Some(title) = reply.title.filter(|t| !t.is_empty()) {
        text.push_str(&format!("- Page Title: {title}\n"));
    }
    text.push_str("- Page Snapshot\n```yaml\n");
    text.push_str(reply.snapshot.trim_end());
    text.push_str("\n```\n");
    Ok(text)
}

/// One `browser_snapshot` round trip, rendered as text.
pub async fn capture_aria_snapshot(ctx: &ToolContext) -> Result<ToolResult, ToolError> {
    let reply = ctx.bridge.send_default(BrowserCommand::Snapshot {}).await?;
    let text = render_snapshot(reply).map_err(|reason| ToolError::MalformedReply {
        tool: "snapshot".into(),
        reason,
    })?;
    debug!(len = text.len(), "Captured ARIA snapshot");
    Ok(ToolResult::text(text))
}
