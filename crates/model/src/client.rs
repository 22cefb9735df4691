//! The model-client trait and run request.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use lucid_domain::limits::UsageLimits;
use lucid_domain::message::Message;
use lucid_domain::stream::{OutputSpec, RunCompletion, RunEventStream};
use lucid_domain::Result;

use lucid_tools::{tool_error, Tool, ToolContext, Toolset};

/// Everything the model runtime needs for one run.
pub struct RunRequest {
    pub agent_name: String,
    pub system_prompt: String,
    /// Per-request instruction block inserted after the system prompt.
    pub instructions: Option<String>,
    pub prompt: String,
    pub history: Vec<Message>,
    pub output: OutputSpec,
    pub model: Option<String>,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
    pub limits: UsageLimits,
    /// Provider toolsets, each filtered to the agent's allowed names.
    pub toolsets: Vec<Arc<dyn Toolset>>,
    /// Delegate tools registered directly (in-process functions).
    pub tools: Vec<Arc<dyn Tool>>,
    pub context: ToolContext,
}

impl RunRequest {
    pub fn new(agent_name: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self {
            agent_name: agent_name.into(),
            system_prompt: String::new(),
            instructions: None,
            prompt: prompt.into(),
            history: Vec::new(),
            output: OutputSpec::Text,
            model: None,
            temperature: None,
            max_tokens: None,
            limits: UsageLimits::default(),
            toolsets: Vec::new(),
            tools: Vec::new(),
            context: ToolContext::default(),
        }
    }
}

/// The streaming model runtime the core consumes.
#[async_trait]
pub trait ModelClient: Send + Sync {
    /// One-shot run: returns the final output and full message list.
    async fn run(&self, req: RunRequest) -> Result<RunCompletion>;

    /// Streaming run: yields part and tool events, ending with `Completed`.
    async fn iter(&self, req: RunRequest) -> Result<RunEventStream>;
}

/// Resolve and invoke a tool named by the model: delegate tools first (they
/// always shadow provider tools of the same name), then each toolset in
/// order. Unknown names come back as structured errors.
pub async fn invoke_request_tool(req: &RunRequest, name: &str, arguments: Value) -> Value {
    for tool in &req.tools {
        if tool.describe().name == name {
            return tool.invoke(arguments, &req.context).await;
        }
    }
    for toolset in &req.toolsets {
        if toolset.definitions().iter().any(|d| d.name == name) {
            return toolset.invoke(name, arguments, &req.context).await;
        }
    }
    tracing::warn!(tool_name = name, "model called an unknown tool");
    tool_error(format!("Unknown tool: '{name}'"))
}
