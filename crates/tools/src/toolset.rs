//! Toolsets: named groups of tools resolved from a provider.
//!
//! The tool resolver hands the model runtime a list of toolsets, each
//! filtered to the names the agent declared. The local toolset wraps the
//! in-process registry; the remote toolset speaks HTTP to an external tool
//! provider, with retry on transient failures.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use lucid_domain::message::ToolDefinition;

use crate::{tool_error, Tool, ToolContext, ToolRegistry};

/// A provider-scoped group of invokable tools.
#[async_trait]
pub trait Toolset: Send + Sync {
    /// Provider alias ("local", or the remote provider name).
    fn provider_id(&self) -> &str;

    /// Definitions of the tools this set exposes (already filtered).
    fn definitions(&self) -> Vec<ToolDefinition>;

    /// Invoke a tool by name. Unknown names and transport failures are
    /// returned as structured error values.
    async fn invoke(&self, name: &str, arguments: Value, ctx: &ToolContext) -> Value;
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Local
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// The in-process registry filtered to an allowed name set.
pub struct LocalToolset {
    registry: Arc<ToolRegistry>,
    allowed: HashSet<String>,
}

impl LocalToolset {
    pub fn new(registry: Arc<ToolRegistry>, allowed: impl IntoIterator<Item = String>) -> Self {
        Self {
            registry,
            allowed: allowed.into_iter().collect(),
        }
    }
}

#[async_trait]
impl Toolset for LocalToolset {
    fn provider_id(&self) -> &str {
        "local"
    }

    fn definitions(&self) -> Vec<ToolDefinition> {
        self.registry
            .definitions()
            .into_iter()
            .filter(|d| self.allowed.contains(&d.name))
            .collect()
    }

    async fn invoke(&self, name: &str, arguments: Value, ctx: &ToolContext) -> Value {
        if !self.allowed.contains(name) {
            return tool_error(format!("tool '{name}' is not allowed for this agent"));
        }
        match self.registry.get(name) {
            Some(tool) => tool.invoke(arguments, ctx).await,
            None => tool_error(format!("tool '{name}' is not registered")),
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Remote
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

const REMOTE_TIMEOUT: Duration = Duration::from_secs(30);
const REMOTE_MAX_RETRIES: u32 = 2;

/// An external tool provider reached over HTTP.
///
/// `POST {base_url}/tools/{name}/invoke` with `{arguments, context}`;
/// retries with exponential back-off on 5xx, never on 4xx.
pub struct RemoteToolset {
    http: reqwest::Client,
    base_url: String,
    provider: String,
    allowed: HashSet<String>,
}

impl RemoteToolset {
    pub fn new(
        base_url: &str,
        provider: &str,
        allowed: impl IntoIterator<Item = String>,
    ) -> lucid_domain::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(REMOTE_TIMEOUT)
            .build()
            .map_err(|e| lucid_domain::Error::Other(e.to_string()))?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_owned(),
            provider: provider.to_owned(),
            allowed: allowed.into_iter().collect(),
        })
    }

    async fn post_invoke(&self, name: &str, body: &Value) -> Result<Value, String> {
        let url = format!("{}/tools/{}/invoke", self.base_url, name);
        let mut last_err = String::new();

        for attempt in 0..=REMOTE_MAX_RETRIES {
            if attempt > 0 {
                tokio::time::sleep(Duration::from_millis(100 * 2u64.pow(attempt - 1))).await;
            }

            let result = self.http.post(&url).json(body).send().await;
            match result {
                Ok(resp) if resp.status().is_server_error() => {
                    last_err = format!("{name} returned {}", resp.status());
                    continue;
                }
                Ok(resp) if resp.status().is_client_error() => {
                    return Err(format!("{name} returned {}", resp.status()));
                }
                Ok(resp) => {
                    return resp
                        .json::<Value>()
                        .await
                        .map_err(|e| format!("{name} returned invalid JSON: {e}"));
                }
                Err(e) => {
                    last_err = format!("{name} transport error: {e}");
                    continue;
                }
            }
        }
        Err(last_err)
    }
}

#[async_trait]
impl Toolset for RemoteToolset {
    fn provider_id(&self) -> &str {
        &self.provider
    }

    fn definitions(&self) -> Vec<ToolDefinition> {
        // Remote providers advertise no parameter schemas up front; expose
        // the allowed names with an open object schema.
        let mut names: Vec<&String> = self.allowed.iter().collect();
        names.sort();
        names
            .into_iter()
            .map(|name| ToolDefinition {
                name: name.clone(),
                description: format!("Tool '{name}' provided by '{}'", self.provider),
                parameters: serde_json::json!({
                    "type": "object",
                    "properties": {},
                    "additionalProperties": true
                }),
            })
            .collect()
    }

    async fn invoke(&self, name: &str, arguments: Value, ctx: &ToolContext) -> Value {
        if !self.allowed.contains(name) {
            return tool_error(format!("tool '{name}' is not allowed for this agent"));
        }
        let body = serde_json::json!({
            "arguments": arguments,
            "context": {
                "user_id": ctx.user_id,
                "session_id": ctx.session_id,
                "tenant_id": ctx.tenant_id,
            },
        });
        match self.post_invoke(name, &body).await {
            Ok(value) => value,
            Err(message) => {
                tracing::warn!(
                    tool_name = name,
                    provider = %self.provider,
                    error = %message,
                    "remote tool invocation failed"
                );
                tool_error(message)
            }
        }
    }
}
