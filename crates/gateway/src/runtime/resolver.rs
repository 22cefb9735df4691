//! Tool resolution for an agent's declared tool list.
//!
//! Produces two collections: provider toolsets (each filtered to the names
//! the agent declared) and delegate tools (in-process functions handed to
//! the model runtime directly). A tool with no resolvable provider is
//! logged and omitted, never fatal.

use std::collections::HashMap;
use std::sync::Arc;

use lucid_schema::AgentSchema;
use lucid_tools::{LocalToolset, RemoteToolset, Tool, Toolset};

use crate::runtime::delegate::AskAgentTool;
use crate::state::CoreState;

/// Tool names always resolved in-process, never from a provider, to avoid
/// name collisions with provider-side tools of the same name.
pub const DELEGATE_TOOL_NAMES: &[&str] = &["ask_agent"];

pub struct ResolvedTools {
    pub toolsets: Vec<Arc<dyn Toolset>>,
    pub delegate_tools: Vec<Arc<dyn Tool>>,
}

pub fn resolve_tools(state: &CoreState, schema: &AgentSchema) -> ResolvedTools {
    let mut delegate_tools: Vec<Arc<dyn Tool>> = Vec::new();
    let mut by_provider: HashMap<String, Vec<String>> = HashMap::new();

    for tool in &schema.tools {
        if DELEGATE_TOOL_NAMES.contains(&tool.name.as_str()) {
            if tool.name == "ask_agent" {
                delegate_tools.push(Arc::new(AskAgentTool::new(state.clone())));
            }
            continue;
        }
        let provider = tool.provider.clone().unwrap_or_else(|| "local".into());
        by_provider.entry(provider).or_default().push(tool.name.clone());
    }

    let mut toolsets: Vec<Arc<dyn Toolset>> = Vec::new();
    for (provider, names) in by_provider {
        if provider == "local" {
            for name in &names {
                if !state.tools.contains(name) {
                    tracing::warn!(
                        agent_name = %schema.name,
                        tool_name = %name,
                        "declared local tool is not registered, omitting"
                    );
                }
            }
            toolsets.push(Arc::new(LocalToolset::new(
                state.tools.clone(),
                names.into_iter(),
            )));
            continue;
        }
        match &state.remote_tools_url {
            Some(url) => match RemoteToolset::new(url, &provider, names.into_iter()) {
                Ok(toolset) => toolsets.push(Arc::new(toolset)),
                Err(e) => {
                    tracing::warn!(provider = %provider, error = %e, "remote toolset unavailable");
                }
            },
            None => {
                tracing::warn!(
                    agent_name = %schema.name,
                    provider = %provider,
                    "no endpoint for tool provider, omitting its tools"
                );
            }
        }
    }

    ResolvedTools {
        toolsets,
        delegate_tools,
    }
}
