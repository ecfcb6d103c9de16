//! Element interaction tools: click, drag, hover, type, selectOption.

use async_trait::async_trait;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use tabwire_core::protocol::BrowserCommand;
use tabwire_core::{FieldViolation, ToolError};

use crate::{confirm_or_snapshot, BrowserTool, ToolArgs, ToolContext, ToolResult};

fn require_element(field: &str, value: &str) -> Vec<FieldViolation> {
    if value.trim().is_empty() {
        vec![FieldViolation::new(field, "must not be empty")]
    } else {
        Vec::new()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ElementArgs {
    /// Selector or accessibility identifier of the target element
    pub element: String,
}

impl ToolArgs for ElementArgs {
    fn check(&self) -> Vec<FieldViolation> {
        require_element("element", &self.element)
    }
}

pub struct Click;

#[async_trait]
impl BrowserTool for Click {
    type Args = ElementArgs;

    fn name(&self) -> &'static str {
        "click"
    }

    fn description(&self) -> &'static str {
        "Click an element identified by selector or accessibility identifier"
    }

    async fn run(&self, args: ElementArgs, ctx: &ToolContext) -> Result<ToolResult, ToolError> {
        ctx.bridge
            .send_default(BrowserCommand::Click {
                element: args.element.clone(),
            })
            .await?;
        confirm_or_snapshot(ctx, format!("Clicked \"{}\"", args.element)).await
    }
}

pub struct Hover;

#[async_trait]
impl BrowserTool for Hover {
    type Args = ElementArgs;

    fn name(&self) -> &'static str {
        "hover"
    }

    fn description(&self) -> &'static str {
        "Move the mouse over the specified element"
    }

    async fn run(&self, args: ElementArgs, ctx: &ToolContext) -> Result<ToolResult, ToolError> {
        ctx.bridge
            .send_default(BrowserCommand::Hover {
                element: args.element.clone(),
            })
            .await?;
        confirm_or_snapshot(ctx, format!("Hovered over \"{}\"", args.element)).await
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct DragArgs {
    /// Selector or id for start element
    pub start_element: String,
    /// Selector or id for end element
    pub end_element: String,
}

impl ToolArgs for DragArgs {
    fn check(&self) -> Vec<FieldViolation> {
        let mut violations = require_element("startElement", &self.start_element);
        violations.extend(require_element("endElement", &self.end_element));
        violations
    }
}

pub struct Drag;

#[async_trait]
impl BrowserTool for Drag {
    type Args = DragArgs;

    fn name(&self) -> &'static str {
        "drag"
    }

    fn description(&self) -> &'static str {
        "Drag an element from a start location to an end location"
    }

    async fn run(&self, args: DragArgs, ctx: &ToolContext) -> Result<ToolResult, ToolError> {
        ctx.bridge
            .send_default(BrowserCommand::Drag {
                start_element: args.start_element.clone(),
                end_element: args.end_element.clone(),
            })
            .await?;
        confirm_or_snapshot(
            ctx,
            format!(
                "Dragged \"{}\" to \"{}\"",
                args.start_element, args.end_element
            ),
        )
        .await
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct TypeArgs {
    /// Selector or accessibility identifier of the input
    pub element: String,
    /// Text to type into the element
    pub text: String,
    /// Press Enter after typing
    #[serde(default)]
    pub submit: bool,
}

impl ToolArgs for TypeArgs {
    fn check(&self) -> Vec<FieldViolation> {
        require_element("element", &self.element)
    }
}

pub struct Type;

#[async_trait]
impl BrowserTool for Type {
    type Args = TypeArgs;

    fn name(&self) -> &'static str {
        "type"
    }

    fn description(&self) -> &'static str {
        "Type text into an input or editable element"
    }

    async fn run(&self, args: TypeArgs, ctx: &ToolContext) -> Result<ToolResult, ToolError> {
        ctx.bridge
            .send_default(BrowserCommand::Type {
                element: args.element.clone(),
                text: args.text.clone(),
                submit: args.submit,
            })
            .await?;
        confirm_or_snapshot(
            ctx,
            format!("Typed \"{}\" into \"{}\"", args.text, args.element),
        )
        .await
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct SelectOptionArgs {
    /// Selector of the select element
    pub element: String,
    /// Value of the option to select
    pub value: String,
}

impl ToolArgs for SelectOptionArgs {
    fn check(&self) -> Vec<FieldViolation> {
        require_element("element", &self.element)
    }
}

pub struct SelectOption;

#[async_trait]
impl BrowserTool for SelectOption {
    type Args = SelectOptionArgs;

    fn name(&self) -> &'static str {
        "selectOption"
    }

    fn description(&self) -> &'static str {
        "Select an option inside a select element"
    }

    async fn run(
        &self,
        args: SelectOptionArgs,
        ctx: &ToolContext,
    ) -> Result<ToolResult, ToolError> {
        ctx.bridge
            .send_default(BrowserCommand::SelectOption {
                element: args.element.clone(),
                value: args.value.clone(),
            })
            .await?;
        confirm_or_snapshot(
            ctx,
            format!("Selected option \"{}\" in \"{}\"", args.value, args.element),
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{fake_extension, page_responder};
    use crate::{ContentBlock, Tool};
    use serde_json::json;

    fn text_of(result: &ToolResult) -> String {
        match &result.content[0] {
            ContentBlock::Text { text } => text.clone(),
            other => panic!("expected text, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_click_confirmation() {
        let ext = fake_extension(false, page_responder);
        let result = Click
            .execute(json!({"element": "Submit button"}), &ext.ctx)
            .await
            .unwrap();
        assert_eq!(text_of(&result), "Clicked \"Submit button\"");
        assert_eq!(ext.requests()[0]["type"], "browser_click");
        assert_eq!(ext.requests()[0]["payload"], json!({"element": "Submit button"}));
    }

    #[tokio::test]
    async fn test_drag_sends_both_elements() {
        let ext = fake_extension(false, page_responder);
        let result = Drag
            .execute(json!({"startElement": "#card", "endElement": "#done"}), &ext.ctx)
            .await
            .unwrap();
        assert_eq!(text_of(&result), "Dragged \"#card\" to \"#done\"");
        assert_eq!(
            ext.requests()[0]["payload"],
            json!({"startElement": "#card", "endElement": "#done"})
        );
    }

    #[tokio::test]
    async fn test_drag_reports_all_missing_fields() {
        let ext = fake_extension(false, page_responder);
        let err = Drag.execute(json!({}), &ext.ctx).await.unwrap_err();
        match err {
            ToolError::InvalidArguments { violations, .. } => {
                let fields: Vec<_> = violations.iter().map(|v| v.field.clone()).collect();
                assert_eq!(fields, vec!["startElement", "endElement"]);
            }
            other => panic!("expected invalid arguments, got {other:?}"),
        }
        assert!(ext.requests().is_empty());
    }

    #[tokio::test]
    async fn test_hover_in_snapshot_mode() {
        let ext = fake_extension(true, page_responder);
        let result = Hover
            .execute(json!({"element": "Menu"}), &ext.ctx)
            .await
            .unwrap();
        assert_eq!(ext.types(), vec!["browser_hover", "browser_snapshot"]);
        assert!(text_of(&result).contains("Example Domain"));
    }

    #[tokio::test]
    async fn test_type_defaults_submit_to_false() {
        let ext = fake_extension(false, page_responder);
        let result = Type
            .execute(json!({"element": "Search", "text": "rust"}), &ext.ctx)
            .await
            .unwrap();
        assert_eq!(text_of(&result), "Typed \"rust\" into \"Search\"");
        assert_eq!(
            ext.requests()[0]["payload"],
            json!({"element": "Search", "text": "rust", "submit": false})
        );
    }

    #[tokio::test]
    async fn test_type_rejects_wrong_type() {
        let ext = fake_extension(false, page_responder);
        let err = Type
            .execute(json!({"element": "Search", "text": 5}), &ext.ctx)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("text: expected string, got integer"));
    }

    #[tokio::test]
    async fn test_select_option() {
        let ext = fake_extension(false, page_responder);
        let result = SelectOption
            .execute(json!({"element": "Country", "value": "NZ"}), &ext.ctx)
            .await
            .unwrap();
        assert_eq!(text_of(&result), "Selected option \"NZ\" in \"Country\"");
        assert_eq!(ext.requests()[0]["type"], "browser_select_option");
    }

    #[tokio::test]
    async fn test_blank_element_is_rejected() {
        let ext = fake_extension(false, page_responder);
        let err = Click
            .execute(json!({"element": "  "}), &ext.ctx)
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::InvalidArguments { .. }));
    }
}
