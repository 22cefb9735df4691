//! Tool contracts and built-in tools.
//!
//! Every tool implements the minimal contract: `describe()` returns its
//! definition, `invoke()` takes resolved JSON arguments plus a request
//! context and returns a JSON value. Tools never throw; failures come back
//! as structured `{status: "error", error}` objects so the model can react.

pub mod moments;
pub mod profile;
pub mod registry;
pub mod toolset;

use std::fmt::Display;

use async_trait::async_trait;
use futures_util::future::BoxFuture;
use serde_json::Value;
use uuid::Uuid;

use lucid_domain::message::ToolDefinition;

pub use registry::ToolRegistry;
pub use toolset::{LocalToolset, RemoteToolset, Toolset};

/// Per-request identity threaded into every tool invocation.
#[derive(Debug, Clone, Default)]
pub struct ToolContext {
    pub user_id: Option<Uuid>,
    pub session_id: Option<Uuid>,
    pub tenant_id: Option<String>,
}

/// The minimal contract every tool implements.
#[async_trait]
pub trait Tool: Send + Sync {
    fn describe(&self) -> ToolDefinition;

    /// Invoke with resolved JSON arguments. Errors are returned as
    /// `{status: "error", error}` values, never propagated.
    async fn invoke(&self, arguments: Value, ctx: &ToolContext) -> Value;
}

/// Structured error result.
pub fn tool_error(message: impl Display) -> Value {
    serde_json::json!({
        "status": "error",
        "error": message.to_string(),
    })
}

/// A tool backed by a closure. Used for test fixtures and ad-hoc wiring.
pub struct FnTool {
    definition: ToolDefinition,
    #[allow(clippy::type_complexity)]
    handler: Box<dyn Fn(Value, ToolContext) -> BoxFuture<'static, Value> + Send + Sync>,
}

impl FnTool {
    pub fn new<F, Fut>(name: &str, description: &str, parameters: Value, f: F) -> Self
    where
        F: Fn(Value, ToolContext) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = Value> + Send + 'static,
    {
        Self {
            definition: ToolDefinition {
                name: name.into(),
                description: description.into(),
                parameters,
            },
            handler: Box::new(move |args, ctx| Box::pin(f(args, ctx))),
        }
    }
}

#[async_trait]
impl Tool for FnTool {
    fn describe(&self) -> ToolDefinition {
        self.definition.clone()
    }

    async fn invoke(&self, arguments: Value, ctx: &ToolContext) -> Value {
        (self.handler)(arguments, ctx.clone()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn fn_tool_round_trip() {
        let tool = FnTool::new(
            "echo",
            "Echo the input back.",
            serde_json::json!({"type": "object"}),
            |args, _ctx| async move { args },
        );
        assert_eq!(tool.describe().name, "echo");
        let out = tool
            .invoke(serde_json::json!({"q": "x"}), &ToolContext::default())
            .await;
        assert_eq!(out["q"], "x");
    }

    #[test]
    fn tool_error_shape() {
        let err = tool_error("boom");
        assert_eq!(err["status"], "error");
        assert_eq!(err["error"], "boom");
    }
}
