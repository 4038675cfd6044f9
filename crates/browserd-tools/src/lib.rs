//! Tool façade over the broker core.
//!
//! Each inbound operation is a [`Tool`]: a named capability with a JSON
//! schema for its parameters. Tools are thin — they resolve a session
//! through the registry, forward one action, and format the result. All
//! real invariants live below, in the registry and the meter.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use browserd_core::config::Config;
use browserd_registry::{ResourceStore, SessionRegistry};
use browserd_usage::UsageMeter;

pub mod session;
pub mod screenshot;
pub mod usage;

pub use screenshot::ScreenshotTool;
pub use session::{SessionCloseTool, SessionCreateTool};
pub use usage::UsageStatsTool;

/// Context provided to tools during execution.
pub struct ToolContext {
    /// Session id the inbound request is bound to, when the caller gave one.
    pub session_id: Option<String>,
    pub registry: Arc<SessionRegistry>,
    pub meter: Arc<UsageMeter>,
    pub resources: Arc<ResourceStore>,
    pub config: Arc<Config>,
}

impl ToolContext {
    /// The session id tools should act on: the request binding, or the
    /// current default session if one exists.
    pub async fn target_session_id(&self) -> Option<String> {
        match &self.session_id {
            Some(id) => Some(id.clone()),
            None => self.registry.default_session_id().await,
        }
    }
}

/// Output from a tool execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolOutput {
    pub content: String,
    pub is_error: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub media: Option<Vec<ToolMedia>>,
}

impl ToolOutput {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            is_error: false,
            media: None,
        }
    }

    pub fn error(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            is_error: true,
            media: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolMedia {
    pub mime_type: String,
    pub data: String,
}

/// The tool trait every façade operation implements.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Tool name as exposed to callers (e.g. "session_create").
    fn name(&self) -> &str;

    /// Metering category this tool's calls are bucketed under.
    fn operation(&self) -> &str;

    /// Human-readable description.
    fn description(&self) -> &str;

    /// JSON Schema describing the tool's parameters.
    fn parameters_schema(&self) -> serde_json::Value;

    /// Execute the tool with the given parameters.
    async fn execute(
        &self,
        params: serde_json::Value,
        context: &ToolContext,
    ) -> anyhow::Result<ToolOutput>;
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

    /// All façade tools, in the order callers see them listed.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register(Box::new(SessionCreateTool));
        registry.register(Box::new(SessionCloseTool));
        registry.register(Box::new(ScreenshotTool));
        registry.register(Box::new(UsageStatsTool));
        registry
    }

    pub fn register(&mut self, tool: Box<dyn Tool>) {
        self.tools.push(tool);
    }

    pub fn get(&self, name: &str) -> Option<&dyn Tool> {
        self.tools.iter().find(|t| t.name() == name).map(|t| t.as_ref())
    }

    pub fn list(&self) -> Vec<&str> {
        self.tools.iter().map(|t| t.name()).collect()
    }

    /// Tool definitions for callers that enumerate capabilities.
    pub fn definitions(&self) -> Vec<serde_json::Value> {
        self.tools
            .iter()
            .map(|t| {
                serde_json::json!({
                    "name": t.name(),
                    "description": t.description(),
                    "input_schema": t.parameters_schema(),
                })
            })
            .collect()
    }
}
