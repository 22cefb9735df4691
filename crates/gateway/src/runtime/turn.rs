//! Turn execution: one user → assistant exchange.
//!
//! Entry point [`run_turn`] spawns the turn task and returns a channel of
//! [`TurnEvent`]s. The task iterates the model runtime's event stream,
//! forwarding text deltas and tool events while accumulating the
//! assistant text and every tool round trip; a structured-output agent
//! with a chained tool gets its post-processing invocation; the whole
//! turn persists in one store call at the end.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures_util::StreamExt;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::{mpsc, OwnedSemaphorePermit};
use uuid::Uuid;

use lucid_domain::stream::{RunCompletion, RunEvent};
use lucid_domain::{Error, Result};
use lucid_model::{ModelClient, RunRequest};
use lucid_schema::AgentSchema;
use lucid_store::{SessionRow, Store, ToolExchange, TurnWrite, UserRow};
use lucid_tools::{tool_error, ToolContext};

use crate::context::{ContextAttributes, ContextInjector};
use crate::history::{self, HistoryCodec};
use crate::runtime::cancel::CancelToken;
use crate::runtime::delegate::{self, DelegationContext};
use crate::runtime::{resolver, summarize};
use crate::state::CoreState;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// TurnEvent
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Events emitted during a single agent turn.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type")]
pub enum TurnEvent {
    /// Incremental assistant text.
    #[serde(rename = "assistant_delta")]
    AssistantDelta { text: String },

    /// The model (or the chained-tool stage) is invoking a tool.
    #[serde(rename = "tool_call")]
    ToolCall {
        tool_call_id: String,
        tool_name: String,
        arguments: Value,
    },

    /// The tool returned.
    #[serde(rename = "tool_result")]
    ToolResult {
        tool_call_id: String,
        tool_name: String,
        result: Value,
    },

    /// The final assistant message.
    #[serde(rename = "final")]
    Final {
        content: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        structured: Option<Value>,
    },

    /// Token usage and latency for the turn.
    #[serde(rename = "usage")]
    Usage {
        input_tokens: u32,
        output_tokens: u32,
        latency_ms: u64,
    },

    /// The turn was stopped by cancellation or deadline.
    #[serde(rename = "stopped")]
    Stopped { content: String },

    /// The turn aborted.
    #[serde(rename = "error")]
    Error { message: String },
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Input
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Everything a turn needs, resolved by the chat entry point.
pub struct TurnInput {
    pub session: SessionRow,
    pub schema: Arc<AgentSchema>,
    pub user: Option<UserRow>,
    pub user_message: String,
    /// The routing table rendered into the context block.
    pub routing_table: Value,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Accumulator
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Short-lived per-turn state, destroyed at turn end.
#[derive(Default)]
struct Accumulator {
    text: String,
    deltas_delivered: bool,
    /// Tool calls the model emitted, in order (for the assistant row).
    model_calls: Vec<lucid_domain::message::ToolCall>,
    /// call_id → (tool_name, arguments) for calls without a result yet.
    pending: HashMap<String, (String, Value)>,
    exchanges: Vec<ToolExchange>,
}

impl Accumulator {
    /// Complete every half-open tool pair with an error response.
    fn close_pending(&mut self, reason: &str) {
        for (id, (name, arguments)) in self.pending.drain() {
            self.exchanges.push(ToolExchange {
                id,
                name,
                arguments,
                result: tool_error(reason),
                is_error: true,
            });
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// run_turn
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Spawn the turn task. The permit serialises turns per session and
/// releases when the task finishes; the delegation context carries the
/// child-event sink and the cancel token into the task's scope. A
/// configured deadline cancels the token from a watchdog.
pub fn run_turn(
    state: CoreState,
    input: TurnInput,
    permit: OwnedSemaphorePermit,
    delegation: DelegationContext,
) -> mpsc::Receiver<TurnEvent> {
    let (tx, rx) = mpsc::channel::<TurnEvent>(64);
    let session_id = input.session.id;
    let cancel = delegation.cancel.clone();

    tokio::spawn(async move {
        let _permit = permit;

        let watchdog = match state.config.turn.deadline_secs {
            0 => None,
            secs => {
                let token = cancel.clone();
                Some(tokio::spawn(async move {
                    tokio::time::sleep(Duration::from_secs(secs)).await;
                    tracing::warn!(session_id = %session_id, "turn deadline reached");
                    token.cancel();
                }))
            }
        };

        tracing::debug!(session_id = %session_id, "turn started");
        let result = delegate::scope(
            delegation,
            run_turn_inner(state.clone(), input, tx.clone(), cancel),
        )
        .await;

        if let Some(watchdog) = watchdog {
            watchdog.abort();
        }
        state.cancel_map.remove(session_id);

        if let Err(e) = result {
            tracing::warn!(session_id = %session_id, error = %e, "turn failed");
            let _ = tx
                .send(TurnEvent::Error {
                    message: e.to_string(),
                })
                .await;
        }
    });

    rx
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// run_turn_inner
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

async fn run_turn_inner(
    state: CoreState,
    input: TurnInput,
    tx: mpsc::Sender<TurnEvent>,
    cancel: CancelToken,
) -> Result<()> {
    let started = Instant::now();
    let schema = input.schema.clone();
    let session = &input.session;

    // ── Phase 1: context, history, tools, request ────────────────────
    let mut attrs = ContextAttributes::now();
    attrs.user_id = session.user_id;
    if let Some(user) = &input.user {
        attrs.user_email = user.email.clone();
        attrs.user_name = user.name.clone();
    }
    attrs.session_id = Some(session.id);
    attrs.agent_name = Some(schema.name.clone());
    if !session.name.is_empty() {
        attrs.session_name = Some(session.name.clone());
    }
    if session.metadata.as_object().map_or(false, |m| !m.is_empty()) {
        attrs.session_metadata = Some(session.metadata.clone());
    }
    attrs.routing_table = input.routing_table.clone();
    let injector = ContextInjector::new(attrs);

    let codec = HistoryCodec::new(state.store.clone(), state.config.history.clone());
    let history = codec.load(session).await?;

    let resolved = resolver::resolve_tools(&state, &schema);
    let model_name = schema
        .model
        .clone()
        .unwrap_or_else(|| state.config.turn.default_model.clone());

    let mut req = RunRequest::new(schema.name.clone(), input.user_message.clone());
    req.system_prompt = schema.compile_system_prompt();
    req.instructions = Some(injector.instructions());
    req.history = history;
    req.output = schema.compile_output_type();
    req.model = Some(model_name.clone());
    req.temperature = schema.temperature;
    req.max_tokens = schema.max_tokens;
    req.limits = schema.compile_usage_limits();
    req.toolsets = resolved.toolsets;
    req.tools = resolved.delegate_tools;
    req.context = ToolContext {
        user_id: session.user_id,
        session_id: Some(session.id),
        tenant_id: None,
    };
    let tool_ctx = req.context.clone();

    // ── Phase 2: stream the run ──────────────────────────────────────
    let mut acc = Accumulator::default();

    let mut stream = match state.model.iter(req).await {
        Ok(stream) => stream,
        Err(e) => {
            persist_partial(&state, &input, acc, None, &model_name, started).await;
            let _ = tx
                .send(TurnEvent::Error {
                    message: e.to_string(),
                })
                .await;
            return Ok(());
        }
    };

    let mut completion: Option<RunCompletion> = None;
    loop {
        if cancel.is_cancelled() {
            return handle_cancellation(&state, &input, acc, &model_name, started, &tx).await;
        }
        let Some(event) = stream.next().await else {
            break;
        };
        match event {
            Ok(RunEvent::PartStart { text }) | Ok(RunEvent::PartDelta { text }) => {
                acc.text.push_str(&text);
                acc.deltas_delivered = true;
                let _ = tx.send(TurnEvent::AssistantDelta { text }).await;
            }
            Ok(RunEvent::ToolCallStarted {
                call_id,
                tool_name,
                arguments,
            }) => {
                acc.pending
                    .insert(call_id.clone(), (tool_name.clone(), arguments.clone()));
                acc.model_calls.push(lucid_domain::message::ToolCall {
                    id: call_id.clone(),
                    name: tool_name.clone(),
                    arguments: arguments.clone(),
                });
                let _ = tx
                    .send(TurnEvent::ToolCall {
                        tool_call_id: call_id,
                        tool_name,
                        arguments,
                    })
                    .await;
            }
            Ok(RunEvent::ToolCallCompleted {
                call_id,
                tool_name,
                result,
            }) => {
                let arguments = acc
                    .pending
                    .remove(&call_id)
                    .map(|(_, arguments)| arguments)
                    .unwrap_or(Value::Null);
                acc.exchanges.push(ToolExchange {
                    id: call_id.clone(),
                    name: tool_name.clone(),
                    arguments,
                    result: result.clone(),
                    is_error: is_error_result(&result),
                });
                let _ = tx
                    .send(TurnEvent::ToolResult {
                        tool_call_id: call_id,
                        tool_name,
                        result,
                    })
                    .await;
            }
            Ok(RunEvent::Completed(c)) => {
                completion = Some(c);
                break;
            }
            Err(e) => {
                // Model failure or limit hit: abort, keeping what we have.
                acc.close_pending("aborted before the tool returned");
                let accumulated = (!acc.text.is_empty() || !acc.exchanges.is_empty())
                    .then(|| acc.text.clone());
                persist_partial(&state, &input, acc, accumulated, &model_name, started).await;
                let _ = tx
                    .send(TurnEvent::Error {
                        message: e.to_string(),
                    })
                    .await;
                return Ok(());
            }
        }
    }

    if cancel.is_cancelled() {
        return handle_cancellation(&state, &input, acc, &model_name, started, &tx).await;
    }

    let Some(completion) = completion else {
        acc.close_pending("run ended unexpectedly");
        let accumulated =
            (!acc.text.is_empty() || !acc.exchanges.is_empty()).then(|| acc.text.clone());
        persist_partial(&state, &input, acc, accumulated, &model_name, started).await;
        let _ = tx
            .send(TurnEvent::Error {
                message: Error::Model("run ended without completion".into()).to_string(),
            })
            .await;
        return Ok(());
    };

    // ── Phase 3: chained tool ────────────────────────────────────────
    if schema.structured_output {
        if let (Some(tool_name), Some(output)) =
            (&schema.chained_tool, completion.output.as_structured())
        {
            run_chained_tool(&state, &schema, tool_name, output, &tool_ctx, &mut acc, &tx).await;
        }
    }

    // ── Phase 4: persist ─────────────────────────────────────────────
    let latency_ms = started.elapsed().as_millis() as u64;
    state
        .store
        .persist_turn(TurnWrite {
            session_id: session.id,
            user_id: session.user_id,
            user_text: input.user_message.clone(),
            // Exactly one assistant row per turn, even for empty text.
            assistant_text: Some(completion.text.clone()),
            assistant_calls: acc.model_calls.clone(),
            tool_exchanges: std::mem::take(&mut acc.exchanges),
            serialized_history: Some(history::serialize_messages(&completion.messages)),
            moment_threshold: 0,
            input_tokens: completion.usage.input_tokens,
            output_tokens: completion.usage.output_tokens,
            latency_ms: Some(latency_ms),
            model: Some(model_name),
            agent_name: Some(schema.name.clone()),
        })
        .await?;

    let structured = completion.output.as_structured().cloned();
    let _ = tx
        .send(TurnEvent::Final {
            content: completion.text.clone(),
            structured,
        })
        .await;
    let _ = tx
        .send(TurnEvent::Usage {
            input_tokens: completion.usage.input_tokens,
            output_tokens: completion.usage.output_tokens,
            latency_ms,
        })
        .await;

    if state.config.summarizer.auto {
        summarize::schedule(state.clone(), session.id, session.user_id);
    }

    tracing::debug!(
        session_id = %session.id,
        agent_name = %schema.name,
        latency_ms,
        "turn completed"
    );
    Ok(())
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Helpers
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

fn is_error_result(result: &Value) -> bool {
    result.get("status").and_then(|s| s.as_str()) == Some("error")
}

/// Invoke the chained tool with the structured output as arguments,
/// recording the round trip exactly like a model-observed pair. A missing
/// tool is logged and skipped; a failing tool is captured, never raised.
async fn run_chained_tool(
    state: &CoreState,
    schema: &AgentSchema,
    tool_name: &str,
    output: &Value,
    ctx: &ToolContext,
    acc: &mut Accumulator,
    tx: &mpsc::Sender<TurnEvent>,
) {
    let Some(tool) = state.tools.get(tool_name) else {
        tracing::warn!(
            agent_name = %schema.name,
            chained_tool = %tool_name,
            "chained tool not found, skipping"
        );
        return;
    };

    let call_id = format!("call_{}", Uuid::new_v4().simple());
    let arguments = output.clone();
    let _ = tx
        .send(TurnEvent::ToolCall {
            tool_call_id: call_id.clone(),
            tool_name: tool_name.to_owned(),
            arguments: arguments.clone(),
        })
        .await;

    let result = tool.invoke(arguments.clone(), ctx).await;
    let is_error = is_error_result(&result);
    if is_error {
        tracing::warn!(
            agent_name = %schema.name,
            chained_tool = %tool_name,
            "chained tool returned an error"
        );
    }
    acc.exchanges.push(ToolExchange {
        id: call_id.clone(),
        name: tool_name.to_owned(),
        arguments,
        result: result.clone(),
        is_error,
    });
    let _ = tx
        .send(TurnEvent::ToolResult {
            tool_call_id: call_id,
            tool_name: tool_name.to_owned(),
            result,
        })
        .await;
}

/// Cancellation: complete half-open tool pairs, persist what was
/// delivered, and report `Stopped`. The partial assistant text is only
/// persisted when at least one delta reached the client.
async fn handle_cancellation(
    state: &CoreState,
    input: &TurnInput,
    mut acc: Accumulator,
    model_name: &str,
    started: Instant,
    tx: &mpsc::Sender<TurnEvent>,
) -> Result<()> {
    acc.close_pending("cancelled");
    let text = acc.text.clone();
    let assistant_text = acc.deltas_delivered.then(|| acc.text.clone());
    persist_partial(state, input, acc, assistant_text, model_name, started).await;
    let _ = tx.send(TurnEvent::Stopped { content: text }).await;
    tracing::info!(session_id = %input.session.id, "turn cancelled");
    Ok(())
}

/// Best-effort persistence for aborted and cancelled turns. Persist
/// failures here are logged, not propagated.
async fn persist_partial(
    state: &CoreState,
    input: &TurnInput,
    acc: Accumulator,
    assistant_text: Option<String>,
    model_name: &str,
    started: Instant,
) {
    let write = TurnWrite {
        session_id: input.session.id,
        user_id: input.session.user_id,
        user_text: input.user_message.clone(),
        assistant_text,
        assistant_calls: acc.model_calls,
        tool_exchanges: acc.exchanges,
        serialized_history: None,
        moment_threshold: 0,
        input_tokens: 0,
        output_tokens: 0,
        latency_ms: Some(started.elapsed().as_millis() as u64),
        model: Some(model_name.to_owned()),
        agent_name: Some(input.schema.name.clone()),
    };
    if let Err(e) = state.store.persist_turn(write).await {
        tracing::warn!(
            session_id = %input.session.id,
            error = %e,
            "best-effort persistence failed"
        );
    }
}
