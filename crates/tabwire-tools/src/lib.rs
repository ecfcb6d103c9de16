//! Browser tools exposed to MCP clients.
//!
//! Each tool validates its arguments, sends one command to the browser
//! extension through the relay bridge, and shapes the reply into content
//! blocks. Tools implement [`BrowserTool`] with a typed argument struct; the
//! object-safe [`Tool`] trait is derived from it for the registry.

pub mod aria;
pub mod capture;
pub mod interaction;
pub mod navigation;
pub mod registry;
pub mod schema;

use std::sync::Arc;

use async_trait::async_trait;
use schemars::JsonSchema;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use tabwire_core::{FieldViolation, ToolError};
use tabwire_relay::SocketBridge;

pub use aria::capture_aria_snapshot;
pub use registry::{ToolDescriptor, ToolRegistry};

/// Context provided to tools during execution.
#[derive(Clone)]
pub struct ToolContext {
    pub bridge: Arc<SocketBridge>,
    /// Action tools reply with a fresh ARIA snapshot instead of a confirmation.
    pub capture_snapshot: bool,
}

impl ToolContext {
    pub fn new(bridge: Arc<SocketBridge>, capture_snapshot: bool) -> Self {
        Self {
            bridge,
            capture_snapshot,
        }
    }
}

/// One MCP content block.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ContentBlock {
    Text {
        text: String,
    },
    Image {
        data: String,
        #[serde(rename = "mimeType")]
        mime_type: String,
    },
}

/// Output from a tool execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolResult {
    pub content: Vec<ContentBlock>,
    #[serde(rename = "isError", default, skip_serializing_if = "std::ops::Not::not")]
    pub is_error: bool,
}

impl ToolResult {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            content: vec![ContentBlock::Text { text: text.into() }],
            is_error: false,
        }
    }

    pub fn image(data: impl Into<String>, mime_type: impl Into<String>) -> Self {
        Self {
            content: vec![ContentBlock::Image {
                data: data.into(),
                mime_type: mime_type.into(),
            }],
            is_error: false,
        }
    }

    /// A failed call, reported to the client as content rather than a protocol error.
    pub fn error(text: impl Into<String>) -> Self {
        Self {
            is_error: true,
            ..Self::text(text)
        }
    }
}

/// Typed tool arguments.
pub trait ToolArgs: DeserializeOwned + Serialize + JsonSchema + Send + Sync {
    /// Checks the schema cannot express. Empty means valid.
    fn check(&self) -> Vec<FieldViolation> {
        Vec::new()
    }
}

/// Arguments for tools that take none.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct NoArgs {}

impl ToolArgs for NoArgs {}

/// A browser tool with typed arguments.
#[async_trait]
pub trait BrowserTool: Send + Sync {
    type Args: ToolArgs;

    /// Stable tool name as exposed to clients (e.g. "navigate").
    fn name(&self) -> &'static str;

    fn description(&self) -> &'static str;

    async fn run(&self, args: Self::Args, ctx: &ToolContext) -> Result<ToolResult, ToolError>;
}

/// Object-safe view of a tool, used by the registry.
#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;

    fn description(&self) -> &str;

    /// Normalized JSON Schema for the arguments.
    fn parameters_schema(&self) -> Value;

    /// Validate raw arguments, returning their canonical form.
    fn validate(&self, raw: &Value) -> Result<Value, ToolError>;

    /// Validate then run.
    async fn execute(&self, raw: Value, ctx: &ToolContext) -> Result<ToolResult, ToolError>;
}

/// Two-phase validation: structural schema check, then typed parse and `check()`.
fn parse_args<A: ToolArgs>(tool: &str, raw: &Value) -> Result<A, ToolError> {
    let invalid = |violations| ToolError::InvalidArguments {
        tool: tool.to_string(),
        violations,
    };

    // Absent arguments are an empty object.
    let empty = Value::Object(Default::default());
    let raw = if raw.is_null() { &empty } else { raw };

    let violations = schema::validate_against_schema(&schema::argument_schema::<A>(), raw);
    if !violations.is_empty() {
        return Err(invalid(violations));
    }

    let args: A = serde_json::from_value(raw.clone())
        .map_err(|e| invalid(vec![FieldViolation::new("arguments", e.to_string())]))?;

    let violations = args.check();
    if !violations.is_empty() {
        return Err(invalid(violations));
    }
    Ok(args)
}

#[async_trait]
impl<T: BrowserTool> Tool for T {
    fn name(&self) -> &str {
        BrowserTool::name(self)
    }

    fn description(&self) -> &str {
        BrowserTool::description(self)
    }

    fn parameters_schema(&self) -> Value {
        schema::argument_schema::<T::Args>()
    }

    fn validate(&self, raw: &Value) -> Result<Value, ToolError> {
        let args: T::Args = parse_args(BrowserTool::name(self), raw)?;
        serde_json::to_value(&args).map_err(|e| ToolError::InvalidArguments {
            tool: BrowserTool::name(self).to_string(),
            violations: vec![FieldViolation::new("arguments", e.to_string())],
        })
    }

    async fn execute(&self, raw: Value, ctx: &ToolContext) -> Result<ToolResult, ToolError> {
        let args: T::Args = parse_args(BrowserTool::name(self), &raw)?;
        self.run(args, ctx).await
    }
}

/// Confirmation text, or a fresh ARIA snapshot when the context asks for one.
pub(crate) async fn confirm_or_snapshot(
    ctx: &ToolContext,
    confirmation: String,
) -> Result<ToolResult, ToolError> {
    if ctx.capture_snapshot {
        capture_aria_snapshot(ctx).await
    } else {
        Ok(ToolResult::text(confirmation))
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_content_block_wire_shape() {
        let text = serde_json::to_value(ContentBlock::Text { text: "hi".into() }).unwrap();
        assert_eq!(text, json!({"type": "text", "text": "hi"}));

        let image = serde_json::to_value(ContentBlock::Image {
            data: "AAAA".into(),
            mime_type: "image/png".into(),
        })
        .unwrap();
        assert_eq!(
            image,
            json!({"type": "image", "data": "AAAA", "mimeType": "image/png"})
        );
    }

    #[test]
    fn test_tool_result_is_error_only_when_set() {
        let ok = serde_json::to_value(ToolResult::text("done")).unwrap();
        assert!(ok.get("isError").is_none());

        let err = serde_json::to_value(ToolResult::error("boom")).unwrap();
        assert_eq!(err["isError"], true);
        assert_eq!(err["content"][0]["text"], "boom");
    }

    #[test]
    fn test_null_arguments_are_empty_object() {
        assert!(parse_args::<NoArgs>("goBack", &Value::Null).is_ok());

        match parse_args::<navigation::NavigateArgs>("navigate", &Value::Null) {
            Err(ToolError::InvalidArguments { tool, violations }) => {
                assert_eq!(tool, "navigate");
                assert_eq!(violations, vec![FieldViolation::new("url", "is required")]);
            }
            other => panic!("expected invalid arguments, got {other:?}"),
        }
    }
}
