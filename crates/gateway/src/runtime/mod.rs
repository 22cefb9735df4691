//! The agentic runtime: routing, turn execution, delegation, and the
//! merged client stream.
//!
//! Entry point: [`run_chat`] takes a session + user message, routes it to
//! an agent, and returns a stream of [`ChatEvent`]s multiplexing the
//! parent turn with any delegated child agents.

pub mod cancel;
pub mod delegate;
pub mod mux;
pub mod resolver;
pub mod session_lock;
pub mod summarize;
pub mod turn;

pub use delegate::ChildEvent;
pub use mux::{multiplex, ChatEvent};
pub use turn::{TurnEvent, TurnInput};

use serde_json::Value;
use tokio::sync::mpsc;
use uuid::Uuid;

use futures_util::StreamExt;

use lucid_domain::stream::BoxStream;
use lucid_domain::Result;
use lucid_store::{SessionRow, Store};

use crate::routing::RoutingState;
use crate::state::CoreState;
use delegate::DelegationContext;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Chat entry point
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// One incoming user message.
pub struct ChatRequest {
    pub session_id: Uuid,
    pub message: String,
    pub user_id: Option<Uuid>,
    /// Bypass routing and run a specific agent (background processors,
    /// tests). The routing table still records the activation.
    pub agent_override: Option<String>,
}

impl ChatRequest {
    pub fn new(session_id: Uuid, message: impl Into<String>) -> Self {
        Self {
            session_id,
            message: message.into(),
            user_id: None,
            agent_override: None,
        }
    }
}

/// A running chat turn: the resolved agent plus the merged event stream.
pub struct ChatStream {
    pub session_id: Uuid,
    pub agent_name: String,
    pub events: BoxStream<'static, ChatEvent>,
}

impl std::fmt::Debug for ChatStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatStream")
            .field("session_id", &self.session_id)
            .field("agent_name", &self.agent_name)
            .field("events", &"BoxStream<ChatEvent>")
            .finish()
    }
}

/// Route, resolve, lock, and launch one chat turn.
///
/// Errors surfaced here (unknown agent, busy session, store failures)
/// happen before any streaming; once a `ChatStream` is returned, failures
/// arrive as error events on the stream.
pub async fn run_chat(state: &CoreState, request: ChatRequest) -> Result<ChatStream> {
    let mut session = match state.store.fetch_session(request.session_id).await? {
        Some(session) => session,
        None => {
            let mut session = SessionRow::new(request.session_id, "");
            session.user_id = request.user_id;
            session
        }
    };
    if session.user_id.is_none() {
        session.user_id = request.user_id;
    }

    let user = match session.user_id {
        Some(id) => state.store.fetch_user(id).await?,
        None => None,
    };
    let profile = user
        .as_ref()
        .map(|u| u.metadata.clone())
        .unwrap_or_else(|| serde_json::json!({}));

    // ── Routing ──────────────────────────────────────────────────────
    let agent_name = match &request.agent_override {
        Some(agent) => {
            let mut routing = RoutingState::from_metadata(&session.metadata, &state.config.routing);
            routing.activate(agent, None);
            routing.write_to(&mut session.metadata);
            agent.clone()
        }
        None => {
            let recent = state.store.fetch_messages(session.id, 2000).await?;
            state
                .router
                .route(
                    &mut session.metadata,
                    &request.message,
                    &profile,
                    &recent,
                    &state.registry.known_agents(),
                )
                .await
        }
    };

    // ── Agent resolution ─────────────────────────────────────────────
    let schema = state.registry.resolve(&agent_name, None).await?;
    if schema.routing_enabled {
        let mut routing = RoutingState::from_metadata(&session.metadata, &state.config.routing);
        routing.max_turns = schema.routing_max_turns;
        routing.write_to(&mut session.metadata);
    }

    session.agent_name = agent_name.clone();
    state.store.upsert_session(session.clone()).await?;

    // ── Serialise turns per session ──────────────────────────────────
    let permit = state.session_locks.try_acquire(session.id)?;

    let cancel = state.cancel_map.register(session.id);
    let (child_tx, child_rx) = mpsc::channel(state.config.delegation.queue_capacity);
    let delegation = DelegationContext {
        sink: Some(child_tx),
        cancel,
    };

    let routing_table = session
        .metadata
        .get("routing")
        .cloned()
        .unwrap_or_else(|| serde_json::json!({}));

    let input = TurnInput {
        session,
        schema,
        user,
        user_message: request.message,
        routing_table,
    };
    let turn_rx = turn::run_turn(state.clone(), input, permit, delegation);

    Ok(ChatStream {
        session_id: request.session_id,
        agent_name,
        events: multiplex(turn_rx, child_rx),
    })
}

/// Cancel the in-flight turn for a session.
pub fn cancel_chat(state: &CoreState, session_id: Uuid) -> bool {
    state.cancel_map.cancel(session_id)
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Non-streaming aggregation
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// The drained result of a chat turn.
pub struct ChatOutcome {
    pub agent_name: String,
    pub final_text: String,
    pub structured: Option<Value>,
    pub stopped: bool,
    pub error: Option<String>,
    /// Every event, in arrival order.
    pub events: Vec<ChatEvent>,
}

/// Run a chat turn and drain the stream (non-streaming callers, tests).
pub async fn run_chat_collect(state: &CoreState, request: ChatRequest) -> Result<ChatOutcome> {
    let ChatStream {
        agent_name,
        mut events,
        ..
    } = run_chat(state, request).await?;

    let mut outcome = ChatOutcome {
        agent_name,
        final_text: String::new(),
        structured: None,
        stopped: false,
        error: None,
        events: Vec::new(),
    };

    while let Some(event) = events.next().await {
        match &event {
            ChatEvent::Turn(TurnEvent::Final {
                content,
                structured,
            }) => {
                outcome.final_text = content.clone();
                outcome.structured = structured.clone();
            }
            ChatEvent::Turn(TurnEvent::Stopped { content }) => {
                outcome.stopped = true;
                outcome.final_text = content.clone();
            }
            ChatEvent::Turn(TurnEvent::Error { message }) => {
                outcome.error = Some(message.clone());
            }
            _ => {}
        }
        outcome.events.push(event);
    }

    Ok(outcome)
}
