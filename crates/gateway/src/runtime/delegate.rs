//! Multi-agent delegation.
//!
//! A task-local delegation context connects child agents (producers) to the
//! parent's streaming loop (consumer). The parent's entry point binds a
//! bounded queue sender for the duration of the turn future; the
//! `ask_agent` tool, invoked by the model runtime inside that same task,
//! reads the binding and pushes child events in real time. Without a
//! binding (background and CLI callers) the child runs non-streaming.
//!
//! The context also carries the parent's cancel token, so cancelling a
//! parent reaches a child mid-stream.

use serde::Serialize;
use serde_json::Value;
use tokio::sync::mpsc;

use async_trait::async_trait;
use futures_util::StreamExt;

use lucid_domain::message::ToolDefinition;
use lucid_domain::stream::{RunCompletion, RunEvent, RunOutput};
use lucid_domain::Error;
use lucid_model::{ModelClient, RunRequest};
use lucid_tools::{Tool, ToolContext};

use crate::runtime::cancel::CancelToken;
use crate::runtime::resolver;
use crate::state::CoreState;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Child events
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Events a delegated child pushes onto the parent's queue.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type")]
pub enum ChildEvent {
    #[serde(rename = "child_content")]
    Content { agent_name: String, content: String },
    #[serde(rename = "child_tool_start")]
    ToolStart {
        agent_name: String,
        tool_name: String,
        tool_call_id: String,
        arguments: Value,
    },
    #[serde(rename = "child_tool_result")]
    ToolResult {
        agent_name: String,
        tool_name: String,
        tool_call_id: String,
        result: Value,
    },
    #[serde(rename = "child_done")]
    Done { agent_name: String },
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Task-local binding
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// The ambient delegation binding for the current task.
#[derive(Clone, Default)]
pub struct DelegationContext {
    /// Bounded child-event queue sender; producers block when full.
    pub sink: Option<mpsc::Sender<ChildEvent>>,
    /// The parent turn's cancel token.
    pub cancel: CancelToken,
}

tokio::task_local! {
    static DELEGATION: DelegationContext;
}

/// Run a future with a delegation context bound. The previous binding (if
/// any) is restored when the future completes, which is what makes nested
/// delegation safe.
pub async fn scope<F>(ctx: DelegationContext, f: F) -> F::Output
where
    F: std::future::Future,
{
    DELEGATION.scope(ctx, f).await
}

/// The current task's delegation binding, if one is in scope.
pub fn current() -> Option<DelegationContext> {
    DELEGATION.try_with(|ctx| ctx.clone()).ok()
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// ask_agent
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Invoke another agent by name.
///
/// With a bound sink, the child streams content and tool events onto the
/// parent's queue as they arrive; otherwise it runs non-streaming. Either
/// way the parent model receives a summary object and can continue.
pub struct AskAgentTool {
    state: CoreState,
}

impl AskAgentTool {
    pub fn new(state: CoreState) -> Self {
        Self { state }
    }
}

fn error_summary(agent_name: &str, error: impl std::fmt::Display) -> Value {
    serde_json::json!({
        "status": "error",
        "output": "",
        "text_response": "",
        "agent_schema": agent_name,
        "error": error.to_string(),
    })
}

#[async_trait]
impl Tool for AskAgentTool {
    fn describe(&self) -> ToolDefinition {
        ToolDefinition {
            name: "ask_agent".into(),
            description: "Delegate a task to another agent by name. The \
                          agent runs with its own schema, tools, and system \
                          prompt, and returns its final answer."
                .into(),
            parameters: serde_json::json!({
                "type": "object",
                "properties": {
                    "agent_name": {"type": "string", "description": "Agent schema name"},
                    "input_text": {"type": "string", "description": "The prompt for the agent"},
                    "input_data": {"type": "object", "description": "Optional structured input, appended as JSON"}
                },
                "required": ["agent_name", "input_text"]
            }),
        }
    }

    async fn invoke(&self, arguments: Value, ctx: &ToolContext) -> Value {
        let Some(agent_name) = arguments.get("agent_name").and_then(|v| v.as_str()) else {
            return error_summary("", "missing required argument: agent_name");
        };
        let Some(input_text) = arguments.get("input_text").and_then(|v| v.as_str()) else {
            return error_summary(agent_name, "missing required argument: input_text");
        };

        let schema = match self.state.registry.resolve(agent_name, None).await {
            Ok(schema) => schema,
            Err(_) => {
                return error_summary(agent_name, format!("Agent '{agent_name}' not found"));
            }
        };

        let mut prompt = input_text.to_string();
        if let Some(data) = arguments.get("input_data") {
            if !data.is_null() {
                prompt.push_str(&format!("\n\nInput data: {data}"));
            }
        }

        let resolved = resolver::resolve_tools(&self.state, &schema);
        let mut req = RunRequest::new(schema.name.clone(), prompt);
        req.system_prompt = schema.compile_system_prompt();
        req.output = schema.compile_output_type();
        req.model = Some(
            schema
                .model
                .clone()
                .unwrap_or_else(|| self.state.config.turn.default_model.clone()),
        );
        req.temperature = schema.temperature;
        req.max_tokens = schema.max_tokens;
        req.limits = schema.compile_usage_limits();
        req.toolsets = resolved.toolsets;
        req.tools = resolved.delegate_tools;
        req.context = ctx.clone();

        let delegation = current().unwrap_or_default();
        let completion = match delegation.sink.clone() {
            Some(sink) => {
                match run_child_streaming(&self.state, req, &schema.name, &sink, &delegation.cancel)
                    .await
                {
                    Ok(completion) => completion,
                    Err(summary) => return summary,
                }
            }
            None => match self.state.model.run(req).await {
                Ok(completion) => completion,
                Err(e) => return error_summary(&schema.name, e),
            },
        };

        let (output, is_structured) = match &completion.output {
            RunOutput::Structured(value) => (value.clone(), true),
            RunOutput::Text(text) => (Value::String(text.clone()), false),
        };
        let text_response = if completion.text.is_empty() {
            match &completion.output {
                RunOutput::Text(text) => text.clone(),
                RunOutput::Structured(value) => value.to_string(),
            }
        } else {
            completion.text.clone()
        };

        let mut summary = serde_json::json!({
            "status": "success",
            "output": output.clone(),
            "text_response": text_response,
            "agent_schema": schema.name,
            "is_structured_output": is_structured,
        });

        // A structured child with a chained tool gets its post-processing
        // here; the result rides along in the summary.
        if is_structured {
            if let Some(chained) = &schema.chained_tool {
                match self.state.tools.get(chained) {
                    Some(tool) => {
                        let result = tool.invoke(output.clone(), ctx).await;
                        summary["chained_tool_result"] = result;
                    }
                    None => {
                        tracing::warn!(
                            agent_name = %schema.name,
                            chained_tool = %chained,
                            "chained tool not found, skipping"
                        );
                    }
                }
            }
        }

        summary
    }
}

/// Drive a child run, forwarding its events to the parent's queue.
async fn run_child_streaming(
    state: &CoreState,
    req: RunRequest,
    agent_name: &str,
    sink: &mpsc::Sender<ChildEvent>,
    cancel: &CancelToken,
) -> Result<RunCompletion, Value> {
    let mut stream = state
        .model
        .iter(req)
        .await
        .map_err(|e| error_summary(agent_name, e))?;

    let mut completion = None;
    while let Some(event) = stream.next().await {
        if cancel.is_cancelled() {
            return Err(error_summary(agent_name, Error::Cancelled));
        }
        match event {
            Ok(RunEvent::PartStart { text }) | Ok(RunEvent::PartDelta { text }) => {
                if !text.is_empty() {
                    let _ = sink
                        .send(ChildEvent::Content {
                            agent_name: agent_name.to_owned(),
                            content: text,
                        })
                        .await;
                }
            }
            Ok(RunEvent::ToolCallStarted {
                call_id,
                tool_name,
                arguments,
            }) => {
                let _ = sink
                    .send(ChildEvent::ToolStart {
                        agent_name: agent_name.to_owned(),
                        tool_name,
                        tool_call_id: call_id,
                        arguments,
                    })
                    .await;
            }
            Ok(RunEvent::ToolCallCompleted {
                call_id,
                tool_name,
                result,
            }) => {
                let _ = sink
                    .send(ChildEvent::ToolResult {
                        agent_name: agent_name.to_owned(),
                        tool_name,
                        tool_call_id: call_id,
                        result,
                    })
                    .await;
            }
            Ok(RunEvent::Completed(c)) => completion = Some(c),
            Err(e) => return Err(error_summary(agent_name, e)),
        }
    }

    let _ = sink
        .send(ChildEvent::Done {
            agent_name: agent_name.to_owned(),
        })
        .await;

    completion.ok_or_else(|| {
        error_summary(agent_name, Error::Model("child run ended without completion".into()))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn binding_is_task_scoped() {
        assert!(current().is_none());

        let (tx, _rx) = mpsc::channel(8);
        let ctx = DelegationContext {
            sink: Some(tx),
            cancel: CancelToken::new(),
        };
        scope(ctx, async {
            let bound = current().expect("binding visible inside scope");
            assert!(bound.sink.is_some());

            // Nested scopes shadow and restore.
            scope(DelegationContext::default(), async {
                assert!(current().unwrap().sink.is_none());
            })
            .await;
            assert!(current().unwrap().sink.is_some());
        })
        .await;

        assert!(current().is_none());
    }

    #[tokio::test]
    async fn spawned_tasks_do_not_inherit_the_binding() {
        let (tx, _rx) = mpsc::channel(8);
        let ctx = DelegationContext {
            sink: Some(tx),
            cancel: CancelToken::new(),
        };
        scope(ctx, async {
            let handle = tokio::spawn(async { current().is_none() });
            assert!(handle.await.unwrap());
        })
        .await;
    }
}
