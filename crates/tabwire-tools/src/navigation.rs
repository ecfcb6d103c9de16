//! Navigation and keyboard tools: navigate, goBack, goForward, pressKey, wait.

use std::time::Duration;

use async_trait::async_trait;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use tracing::debug;

use tabwire_core::protocol::BrowserCommand;
use tabwire_core::{FieldViolation, ToolError};
use tabwire_relay::SendOptions;

use crate::{confirm_or_snapshot, BrowserTool, NoArgs, ToolArgs, ToolContext, ToolResult};

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct NavigateArgs {
    /// The URL to navigate to
    pub url: String,
}

impl ToolArgs for NavigateArgs {
    fn check(&self) -> Vec<FieldViolation> {
        match url::Url::parse(&self.url) {
            Ok(parsed) if parsed.cannot_be_a_base() => {
                vec![FieldViolation::new("url", "must be an absolute URL")]
            }
            Ok(_) => Vec::new(),
            Err(e) => vec![FieldViolation::new("url", format!("invalid URL: {e}"))],
        }
    }
}

pub struct Navigate;

#[async_trait]
impl BrowserTool for Navigate {
    type Args = NavigateArgs;

    fn name(&self) -> &'static str {
        "navigate"
    }

    fn description(&self) -> &'static str {
        "Navigate the browser tab to the specified url"
    }

    async fn run(&self, args: NavigateArgs, ctx: &ToolContext) -> Result<ToolResult, ToolError> {
        debug!(url = %args.url, "Navigating");
        ctx.bridge
            .send_default(BrowserCommand::Navigate {
                url: args.url.clone(),
            })
            .await?;
        confirm_or_snapshot(ctx, format!("Navigated to {}", args.url)).await
    }
}

pub struct GoBack;

#[async_trait]
impl BrowserTool for GoBack {
    type Args = NoArgs;

    fn name(&self) -> &'static str {
        "goBack"
    }

    fn description(&self) -> &'static str {
        "Navigate back in the browser history"
    }

    async fn run(&self, _args: NoArgs, ctx: &ToolContext) -> Result<ToolResult, ToolError> {
        ctx.bridge.send_default(BrowserCommand::GoBack {}).await?;
        confirm_or_snapshot(ctx, "Navigated back".into()).await
    }
}

pub struct GoForward;

#[async_trait]
impl BrowserTool for GoForward {
    type Args = NoArgs;

    fn name(&self) -> &'static str {
        "goForward"
    }

    fn description(&self) -> &'static str {
        "Navigate forward in the browser history"
    }

    async fn run(&self, _args: NoArgs, ctx: &ToolContext) -> Result<ToolResult, ToolError> {
        ctx.bridge.send_default(BrowserCommand::GoForward {}).await?;
        confirm_or_snapshot(ctx, "Navigated forward".into()).await
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct PressKeyArgs {
    /// Key to press (e.g. Enter, ArrowDown, a)
    pub key: String,
}

impl ToolArgs for PressKeyArgs {
    fn check(&self) -> Vec<FieldViolation> {
        if self.key.is_empty() {
            vec![FieldViolation::new("key", "must not be empty")]
        } else {
            Vec::new()
        }
    }
}

pub struct PressKey;

#[async_trait]
impl BrowserTool for PressKey {
    type Args = PressKeyArgs;

    fn name(&self) -> &'static str {
        "pressKey"
    }

    fn description(&self) -> &'static str {
        "Simulate pressing a keyboard key on the page"
    }

    async fn run(&self, args: PressKeyArgs, ctx: &ToolContext) -> Result<ToolResult, ToolError> {
        ctx.bridge
            .send_default(BrowserCommand::PressKey {
                key: args.key.clone(),
            })
            .await?;
        Ok(ToolResult::text(format!("Pressed key {}", args.key)))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct WaitArgs {
    /// Seconds to wait
    pub time: u64,
}

impl ToolArgs for WaitArgs {}

pub struct Wait;

#[async_trait]
impl BrowserTool for Wait {
    type Args = WaitArgs;

    fn name(&self) -> &'static str {
        "wait"
    }

    fn description(&self) -> &'static str {
        "Wait for a specified duration (seconds)"
    }

    async fn run(&self, args: WaitArgs, ctx: &ToolContext) -> Result<ToolResult, ToolError> {
        // The extension replies only after the wait, so the deadline stretches with it.
        let timeout = ctx
            .bridge
            .settings()
            .request_timeout
            .saturating_add(Duration::from_secs(args.time));
        ctx.bridge
            .send(
                BrowserCommand::Wait { time: args.time },
                SendOptions::with_timeout(timeout),
            )
            .await?;
        Ok(ToolResult::text(format!("Waited for {} seconds", args.time)))
    }
}
