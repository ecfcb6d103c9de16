//! Tool catalog: registration, discovery, validation, and dispatch.

use std::time::Instant;

use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info, warn};

use tabwire_core::ToolError;
use tabwire_relay::metrics;

use crate::capture::{GetConsoleLogs, Screenshot, Snapshot};
use crate::interaction::{Click, Drag, Hover, SelectOption, Type};
use crate::navigation::{GoBack, GoForward, Navigate, PressKey, Wait};
use crate::{Tool, ToolContext, ToolResult};

/// Discovery-facing description of a tool.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolDescriptor {
    pub name: String,
    pub description: String,
    #[serde(rename = "inputSchema")]
    pub input_schema: Value,
}

/// Registry of available tools.
#[derive(Default)]
pub struct ToolRegistry {
    tools: Vec<Box<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// The full browser catalog.
    pub fn with_browser_tools() -> Result<Self, ToolError> {
        let mut registry = Self::new();
        registry.register(Box::new(Navigate))?;
        registry.register(Box::new(GoBack))?;
        registry.register(Box::new(GoForward))?;
        registry.register(Box::new(PressKey))?;
        registry.register(Box::new(Wait))?;
        registry.register(Box::new(Click))?;
        registry.register(Box::new(Drag))?;
        registry.register(Box::new(Hover))?;
        registry.register(Box::new(Type))?;
        registry.register(Box::new(SelectOption))?;
        registry.register(Box::new(Snapshot))?;
        registry.register(Box::new(GetConsoleLogs))?;
        registry.register(Box::new(Screenshot))?;
        Ok(registry)
    }

    pub fn register(&mut self, tool: Box<dyn Tool>) -> Result<(), ToolError> {
        if self.get(tool.name()).is_some() {
            return Err(ToolError::DuplicateTool(tool.name().to_string()));
        }
        debug!(tool = tool.name(), "Registered tool");
        self.tools.push(tool);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&dyn Tool> {
        self.tools.iter().find(|t| t.name() == name).map(|t| t.as_ref())
    }

    fn lookup(&self, name: &str) -> Result<&dyn Tool, ToolError> {
        self.get(name)
            .ok_or_else(|| ToolError::UnknownTool(name.to_string()))
    }

    pub fn names(&self) -> Vec<&str> {
        self.tools.iter().map(|t| t.name()).collect()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    fn descriptor(tool: &dyn Tool) -> ToolDescriptor {
        ToolDescriptor {
            name: tool.name().to_string(),
            description: tool.description().to_string(),
            input_schema: tool.parameters_schema(),
        }
    }

    pub fn describe(&self, name: &str) -> Result<ToolDescriptor, ToolError> {
        self.lookup(name).map(Self::descriptor)
    }

    /// Descriptors for every tool, in registration order.
    pub fn list(&self) -> Vec<ToolDescriptor> {
        self.tools.iter().map(|t| Self::descriptor(t.as_ref())).collect()
    }

    /// Validate arguments without running the tool.
    pub fn validate(&self, name: &str, raw: &Value) -> Result<Value, ToolError> {
        self.lookup(name)?.validate(raw)
    }

    /// Look up, validate, and run a tool.
    pub async fn dispatch(
        &self,
        name: &str,
        raw: Value,
        ctx: &ToolContext,
    ) -> Result<ToolResult, ToolError> {
        let tool = self.lookup(name)?;
        let started = Instant::now();
        let outcome = tool.execute(raw, ctx).await;
        let elapsed = started.elapsed();
        metrics::record_tool_call(name, outcome.is_ok(), elapsed);
        let elapsed_ms = elapsed.as_millis() as u64;
        match &outcome {
            Ok(_) => info!(tool = name, elapsed_ms, "Tool call succeeded"),
            Err(e) => warn!(tool = name, elapsed_ms, error = %e, "Tool call failed"),
        }
        outcome
    }
}
