//! Wire protocol between the relay and the browser extension.
//!
//! Every request is one JSON text frame `{type, payload, correlationId}`.
//! Replies echo the correlation ID and carry either `result` or `error`.

use std::fmt;

use serde::{Deserialize, Serialize};

/// A command understood by the browser extension, one variant per message type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload")]
pub enum BrowserCommand {
    #[serde(rename = "browser_navigate")]
    Navigate { url: String },

    #[serde(rename = "browser_go_back")]
    GoBack {},

    #[serde(rename = "browser_go_forward")]
    GoForward {},

    #[serde(rename = "browser_press_key")]
    PressKey { key: String },

    /// Pause for `time` seconds inside the page.
    #[serde(rename = "browser_wait")]
    Wait { time: u64 },

    #[serde(rename = "browser_click")]
    Click { element: String },

    #[serde(rename = "browser_drag")]
    Drag {
        #[serde(rename = "startElement")]
        start_element: String,
        #[serde(rename = "endElement")]
        end_element: String,
    },

    #[serde(rename = "browser_hover")]
    Hover { element: String },

    #[serde(rename = "browser_type")]
    Type {
        element: String,
        text: String,
        submit: bool,
    },

    #[serde(rename = "browser_select_option")]
    SelectOption { element: String, value: String },

    #[serde(rename = "browser_snapshot")]
    Snapshot {},

    #[serde(rename = "browser_get_console_logs")]
    GetConsoleLogs {},

    #[serde(rename = "browser_screenshot")]
    Screenshot {},
}

impl BrowserCommand {
    /// The `type` field this command carries on the wire.
    pub fn message_type(&self) -> &'static str {
        match self {
            BrowserCommand::Navigate { .. } => "browser_navigate",
            BrowserCommand::GoBack {} => "browser_go_back",
            BrowserCommand::GoForward {} => "browser_go_forward",
            BrowserCommand::PressKey { .. } => "browser_press_key",
            BrowserCommand::Wait { .. } => "browser_wait",
            BrowserCommand::Click { .. } => "browser_click",
            BrowserCommand::Drag { .. } => "browser_drag",
            BrowserCommand::Hover { .. } => "browser_hover",
            BrowserCommand::Type { .. } => "browser_type",
            BrowserCommand::SelectOption { .. } => "browser_select_option",
            BrowserCommand::Snapshot {} => "browser_snapshot",
            BrowserCommand::GetConsoleLogs {} => "browser_get_console_logs",
            BrowserCommand::Screenshot {} => "browser_screenshot",
        }
    }
}

/// Relay -> extension frame.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutboundMessage {
    #[serde(flatten)]
    pub command: BrowserCommand,
    #[serde(rename = "correlationId")]
    pub correlation_id: String,
}

/// Extension -> relay frame. Frames without a correlation ID are unsolicited.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InboundMessage {
    #[serde(
        rename = "correlationId",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub correlation_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<RemoteError>,
}

/// Error object reported by the extension. A bare string is accepted as the message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "RawRemoteError")]
pub struct RemoteError {
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl RemoteError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            code: None,
            details: None,
        }
    }
}

impl fmt::Display for RemoteError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.code {
            Some(code) => write!(f, "{} ({code})", self.message),
            None => f.write_str(&self.message),
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawRemoteError {
    Text(String),
    Shape {
        #[serde(default)]
        message: Option<String>,
        #[serde(default)]
        code: Option<serde_json::Value>,
        #[serde(default)]
        details: Option<serde_json::Value>,
    },
}

/// Extensions report codes as strings (`"E_NO_ELEMENT"`) or numbers (`404`).
fn code_text(code: serde_json::Value) -> Option<String> {
    match code {
        serde_json::Value::Null => None,
        serde_json::Value::String(s) => Some(s),
        other => Some(other.to_string()),
    }
}

impl From<RawRemoteError> for RemoteError {
    fn from(raw: RawRemoteError) -> Self {
        match raw {
            RawRemoteError::Text(message) => RemoteError::new(message),
            RawRemoteError::Shape {
                message,
                code,
                details,
            } => RemoteError {
                message: message.unwrap_or_else(|| "unknown error".to_string()),
                code: code.and_then(code_text),
                details,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_remote_error_code_accepts_numbers_and_strings() {
        let reply: InboundMessage = serde_json::from_value(json!({
            "correlationId": "c1",
            "error": {"message": "not found", "code": 404},
        }))
        .unwrap();
        let error = reply.error.unwrap();
        assert_eq!(error.code.as_deref(), Some("404"));
        assert_eq!(error.to_string(), "not found (404)");

        let reply: InboundMessage = serde_json::from_value(json!({
            "correlationId": "c2",
            "error": {"message": "gone", "code": "E_DETACHED"},
        }))
        .unwrap();
        assert_eq!(reply.error.unwrap().code.as_deref(), Some("E_DETACHED"));
    }

    #[test]
    fn test_outbound_frame_shape() {
        let msg = OutboundMessage {
            command: BrowserCommand::Navigate {
                url: "https://example.com".into(),
            },
            correlation_id: "abc".into(),
        };
        let value = serde_json::to_value(&msg).unwrap();
        assert_eq!(
            value,
            json!({
                "type": "browser_navigate",
                "payload": {"url": "https://example.com"},
                "correlationId": "abc",
            })
        );
    }

    #[test]
    fn test_payloadless_commands_send_empty_object() {
        let msg = OutboundMessage {
            command: BrowserCommand::GoBack {},
            correlation_id: "1".into(),
        };
        let value = serde_json::to_value(&msg).unwrap();
        assert_eq!(value["type"], "browser_go_back");
        assert_eq!(value["payload"], json!({}));
    }

    #[test]
    fn test_drag_payload_is_camel_case() {
        let value = serde_json::to_value(BrowserCommand::Drag {
            start_element: "#a".into(),
            end_element: "#b".into(),
        })
        .unwrap();
        assert_eq!(value["payload"]["startElement"], "#a");
        assert_eq!(value["payload"]["endElement"], "#b");
    }

    #[test]
    fn test_message_type_matches_serialized_tag() {
        let commands = vec![
            BrowserCommand::Navigate { url: "u".into() },
            BrowserCommand::GoBack {},
            BrowserCommand::GoForward {},
            BrowserCommand::PressKey { key: "Enter".into() },
            BrowserCommand::Wait { time: 1 },
            BrowserCommand::Click { element: "e".into() },
            BrowserCommand::Drag {
                start_element: "a".into(),
                end_element: "b".into(),
            },
            BrowserCommand::Hover { element: "e".into() },
            BrowserCommand::Type {
                element: "e".into(),
                text: "t".into(),
                submit: false,
            },
            BrowserCommand::SelectOption {
                element: "e".into(),
                value: "v".into(),
            },
            BrowserCommand::Snapshot {},
            BrowserCommand::GetConsoleLogs {},
            BrowserCommand::Screenshot {},
        ];
        for command in commands {
            let value = serde_json::to_value(&command).unwrap();
            assert_eq!(value["type"], command.message_type());
        }
    }

    #[test]
    fn test_inbound_result_and_error() {
        let ok: InboundMessage =
            serde_json::from_str(r#"{"correlationId":"1","result":{"ok":true}}"#).unwrap();
        assert_eq!(ok.correlation_id.as_deref(), Some("1"));
        assert_eq!(ok.result, Some(json!({"ok": true})));
        assert!(ok.error.is_none());

        let err: InboundMessage = serde_json::from_str(
            r#"{"correlationId":"2","error":{"message":"no tab","code":"E_TAB"}}"#,
        )
        .unwrap();
        let remote = err.error.unwrap();
        assert_eq!(remote.message, "no tab");
        assert_eq!(remote.to_string(), "no tab (E_TAB)");
    }

    #[test]
    fn test_inbound_string_error() {
        let err: InboundMessage =
            serde_json::from_str(r#"{"correlationId":"3","error":"element not found"}"#).unwrap();
        assert_eq!(err.error.unwrap().message, "element not found");
    }

    #[test]
    fn test_unsolicited_frame_has_no_correlation_id() {
        let msg: InboundMessage = serde_json::from_str(r#"{"type":"hello"}"#).unwrap();
        assert!(msg.correlation_id.is_none());
    }
}
