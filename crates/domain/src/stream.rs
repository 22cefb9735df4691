use std::pin::Pin;

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::message::Message;

/// A boxed async stream, used for model runtime streaming.
pub type BoxStream<'a, T> = Pin<Box<dyn futures_core::Stream<Item = T> + Send + 'a>>;

/// Events emitted while iterating a model run.
///
/// This is the flattened rendering of the runtime's node graph: model
/// request nodes produce `PartStart`/`PartDelta`, tool-dispatch nodes
/// produce `ToolCallStarted`/`ToolCallCompleted` (the runtime executes the
/// tools itself), and the final node yields `Completed`. Errors arrive as
/// `Err` items on the stream.
#[derive(Debug, Clone)]
pub enum RunEvent {
    /// A content part opened, possibly with initial text.
    PartStart { text: String },
    /// Incremental text for the current part.
    PartDelta { text: String },
    /// The model invoked a tool; arguments are fully resolved JSON.
    ToolCallStarted {
        call_id: String,
        tool_name: String,
        arguments: serde_json::Value,
    },
    /// The tool returned.
    ToolCallCompleted {
        call_id: String,
        tool_name: String,
        result: serde_json::Value,
    },
    /// The run finished.
    Completed(RunCompletion),
}

/// Final state of a model run.
#[derive(Debug, Clone)]
pub struct RunCompletion {
    pub output: RunOutput,
    /// All streamed text, concatenated.
    pub text: String,
    pub usage: Usage,
    /// The full runtime-native message list for this run (history plus the
    /// new exchange). Serialized into session metadata for lossless replay.
    pub messages: Vec<Message>,
}

/// What a run produced: free text, or an object conforming to the agent's
/// declared output schema.
#[derive(Debug, Clone, PartialEq)]
pub enum RunOutput {
    Text(String),
    Structured(serde_json::Value),
}

impl RunOutput {
    pub fn as_structured(&self) -> Option<&serde_json::Value> {
        match self {
            RunOutput::Structured(v) => Some(v),
            RunOutput::Text(_) => None,
        }
    }
}

/// The output shape a compiled agent expects from the model.
#[derive(Debug, Clone, PartialEq)]
pub enum OutputSpec {
    /// Free-running conversational text.
    Text,
    /// A JSON object conforming to the given schema.
    Object { schema: serde_json::Value },
}

/// Token usage for a run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    pub input_tokens: u32,
    pub output_tokens: u32,
    pub total_tokens: u32,
}

impl Usage {
    pub fn add(&mut self, other: &Usage) {
        self.input_tokens += other.input_tokens;
        self.output_tokens += other.output_tokens;
        self.total_tokens += other.total_tokens;
    }
}

/// Convenience alias for a stream of run events.
pub type RunEventStream = BoxStream<'static, Result<RunEvent>>;
