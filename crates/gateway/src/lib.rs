//! The lucid agentic runtime core.
//!
//! Turns declarative agent schemas into live, streaming, tool-using
//! conversations: an agent registry with a TTL cache, per-request context
//! injection, a message history codec, a turn executor with chained-tool
//! post-processing, a task-local delegation bus, and a stream multiplexer
//! that merges parent and child events for the client.

pub mod context;
pub mod history;
pub mod registry;
pub mod routing;
pub mod runtime;
pub mod state;

pub use runtime::{
    cancel_chat, run_chat, run_chat_collect, ChatEvent, ChatOutcome, ChatRequest, ChatStream,
    ChildEvent, TurnEvent,
};
pub use state::CoreState;
