use std::fmt;

use thiserror::Error;

use crate::protocol::RemoteError;

/// Errors raised while loading config or starting the process.
#[derive(Debug, Error)]
pub enum TabwireError {
    #[error("Config error: {0}")]
    Config(String),

    #[error("Port error: {0}")]
    Port(#[from] PortError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, TabwireError>;

/// Failures of a single bridge round trip. Every `send` ends in a reply or one of these.
#[derive(Debug, Clone, Error)]
pub enum BridgeError {
    #[error("Browser extension is not connected")]
    ChannelUnavailable,

    #[error("Connection to the browser extension closed before a reply arrived")]
    ChannelClosed,

    #[error("No reply to '{message_type}' within {timeout_ms}ms")]
    Timeout {
        message_type: &'static str,
        timeout_ms: u64,
    },

    #[error("Could not encode message: {0}")]
    Serialization(String),

    #[error("Browser extension reported an error: {0}")]
    Remote(RemoteError),

    #[error("Could not decode reply from the browser extension: {0}")]
    UndecodableReply(String),
}

impl BridgeError {
    /// Whether the caller may reasonably retry the same call.
    pub fn is_retryable(&self) -> bool {
        matches!(self, BridgeError::Timeout { .. })
    }
}

/// A single argument that failed validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldViolation {
    pub field: String,
    pub message: String,
}

impl FieldViolation {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for FieldViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

fn join_violations(violations: &[FieldViolation]) -> String {
    violations
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Errors surfaced by tool registration, lookup, validation, and execution.
#[derive(Debug, Clone, Error)]
pub enum ToolError {
    #[error("Unknown tool: {0}")]
    UnknownTool(String),

    #[error("Tool already registered: {0}")]
    DuplicateTool(String),

    #[error("Invalid arguments for '{tool}': {}", join_violations(.violations))]
    InvalidArguments {
        tool: String,
        violations: Vec<FieldViolation>,
    },

    #[error(transparent)]
    Bridge(#[from] BridgeError),

    #[error("Unexpected reply for '{tool}': {reason}")]
    MalformedReply { tool: String, reason: String },
}

/// Port pre-flight failures.
#[derive(Debug, Error)]
pub enum PortError {
    #[error("Port {port} is still in use after reclamation")]
    Unavailable { port: u16 },

    #[error("Failed to probe port {port}: {source}")]
    Probe {
        port: u16,
        #[source]
        source: std::io::Error,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_arguments_lists_every_field() {
        let err = ToolError::InvalidArguments {
            tool: "drag".into(),
            violations: vec![
                FieldViolation::new("startElement", "is required"),
                FieldViolation::new("endElement", "expected string, got number"),
            ],
        };
        let msg = err.to_string();
        assert!(msg.contains("drag"));
        assert!(msg.contains("startElement: is required"));
        assert!(msg.contains("endElement: expected string, got number"));
    }

    #[test]
    fn test_only_timeout_is_retryable() {
        assert!(
            BridgeError::Timeout {
                message_type: "browser_wait",
                timeout_ms: 10
            }
            .is_retryable()
        );
        assert!(!BridgeError::ChannelClosed.is_retryable());
        assert!(!BridgeError::ChannelUnavailable.is_retryable());
        assert!(!BridgeError::Serialization("bad".into()).is_retryable());
    }

    #[test]
    fn test_bridge_error_converts_into_tool_error() {
        let err: ToolError = BridgeError::ChannelUnavailable.into();
        assert!(matches!(err, ToolError::Bridge(BridgeError::ChannelUnavailable)));
    }
}
