//! Persisted row shapes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// A row in the `schemas` table. For agents, `content` holds the system
/// prompt, `description` the discovery blurb, and `json_schema` the flat
/// agent document verbatim.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchemaRow {
    pub id: Uuid,
    pub name: String,
    pub kind: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub content: String,
    pub json_schema: Value,
    #[serde(default)]
    pub tags: Vec<String>,
}

/// A row in the `sessions` table. `metadata.routing` holds the routing
/// table; `metadata.pai_messages` an opaque serialized message history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionRow {
    pub id: Uuid,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub agent_name: String,
    #[serde(default)]
    pub mode: String,
    #[serde(default)]
    pub user_id: Option<Uuid>,
    #[serde(default = "empty_object")]
    pub metadata: Value,
}

impl SessionRow {
    pub fn new(id: Uuid, agent_name: impl Into<String>) -> Self {
        Self {
            id,
            name: String::new(),
            agent_name: agent_name.into(),
            mode: "chat".into(),
            user_id: None,
            metadata: empty_object(),
        }
    }
}

fn empty_object() -> Value {
    Value::Object(serde_json::Map::new())
}

/// Kinds of message rows. `Think` and `ToolResult` are internal-only and
/// never replayed into model history.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageType {
    User,
    System,
    Assistant,
    ToolCall,
    ToolResponse,
    Observation,
    Memory,
    Think,
    ToolResult,
}

/// A row in the `messages` table.
///
/// `tool_calls` carries `{calls: [...]}` on assistant rows and
/// `{name, id, arguments?}` on tool pair rows; pairs share the same `id`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageRow {
    pub id: Uuid,
    pub session_id: Uuid,
    pub message_type: MessageType,
    pub content: String,
    #[serde(default)]
    pub tool_calls: Option<Value>,
    #[serde(default)]
    pub input_tokens: Option<u32>,
    #[serde(default)]
    pub output_tokens: Option<u32>,
    #[serde(default)]
    pub latency_ms: Option<u64>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub agent_name: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl MessageRow {
    pub fn new(session_id: Uuid, message_type: MessageType, content: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            session_id,
            message_type,
            content: content.into(),
            tool_calls: None,
            input_tokens: None,
            output_tokens: None,
            latency_ms: None,
            model: None,
            agent_name: None,
            created_at: Utc::now(),
        }
    }
}

/// A directed, weighted link from one entity to another.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphEdge {
    pub target: String,
    pub relation: String,
    pub weight: f64,
    #[serde(default)]
    pub reason: String,
}

/// A durable summary row in the `moments` table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MomentRow {
    pub id: Uuid,
    #[serde(default)]
    pub user_id: Option<Uuid>,
    pub name: String,
    /// `session_chunk`, `dream`, `plot_collection`, ...
    pub moment_type: String,
    pub summary: String,
    #[serde(default)]
    pub topic_tags: Vec<String>,
    #[serde(default)]
    pub emotion_tags: Vec<String>,
    #[serde(default)]
    pub graph_edges: Vec<GraphEdge>,
    #[serde(default)]
    pub source_session_id: Option<Uuid>,
    #[serde(default = "empty_object")]
    pub metadata: Value,
    pub created_at: DateTime<Utc>,
}

/// A row in the `users` table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserRow {
    pub id: Uuid,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default = "empty_object")]
    pub metadata: Value,
}

impl UserRow {
    pub fn new(id: Uuid) -> Self {
        Self {
            id,
            email: None,
            name: None,
            metadata: empty_object(),
        }
    }
}

/// One captured tool round trip, written as a `(tool_call, tool_response)`
/// row pair during turn persistence.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolExchange {
    pub id: String,
    pub name: String,
    pub arguments: Value,
    pub result: Value,
    #[serde(default)]
    pub is_error: bool,
}
