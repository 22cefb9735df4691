//! The store trait the runtime core consumes.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use uuid::Uuid;

use lucid_domain::Result;

use crate::rows::{GraphEdge, MessageRow, MomentRow, SchemaRow, SessionRow, ToolExchange, UserRow};

/// One transactional turn write: the user message, the assistant reply, any
/// captured tool pairs, metrics, and the serialized runtime message history.
///
/// Rows are assigned `created_at` inside the transaction, in write order:
/// user, then each `(tool_call, tool_response)` pair, then assistant.
#[derive(Debug, Clone, Default)]
pub struct TurnWrite {
    pub session_id: Uuid,
    pub user_id: Option<Uuid>,
    pub user_text: String,
    /// `None` suppresses the assistant row (cancelled turn with no
    /// delivered deltas). A completed turn always writes one, even empty.
    pub assistant_text: Option<String>,
    /// Tool calls the assistant message itself emitted, persisted as
    /// `{calls: [...]}` on the assistant row.
    pub assistant_calls: Vec<lucid_domain::message::ToolCall>,
    pub tool_exchanges: Vec<ToolExchange>,
    /// Runtime-native message history; stored in
    /// `session.metadata.pai_messages` for lossless replay.
    pub serialized_history: Option<String>,
    /// Reserved for store-side summarisation. The runtime passes 0 and
    /// schedules the background summariser instead.
    pub moment_threshold: u32,
    pub input_tokens: u32,
    pub output_tokens: u32,
    pub latency_ms: Option<u64>,
    pub model: Option<String>,
    pub agent_name: Option<String>,
}

/// Which entity's metadata column a merge applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetadataOwner {
    User,
    Session,
}

/// Filters for moment queries.
#[derive(Debug, Clone, Default)]
pub struct MomentQuery {
    pub user_id: Option<Uuid>,
    pub moment_type: Option<String>,
    /// All listed tags must be present.
    pub topic_tags: Vec<String>,
    pub after: Option<DateTime<Utc>>,
    pub before: Option<DateTime<Utc>>,
    pub limit: usize,
    pub offset: usize,
}

/// Outcome of merging edges onto a named entity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MergeStatus {
    Merged { edge_count: usize },
    NotFound,
}

/// Transactional document/relational store, consumed through stored
/// procedures (or their client-side equivalents).
#[async_trait]
pub trait Store: Send + Sync {
    // ── schemas ──────────────────────────────────────────────────────
    async fn fetch_schema(&self, name: &str, kind: &str) -> Result<Option<SchemaRow>>;
    async fn upsert_schema(&self, row: SchemaRow) -> Result<SchemaRow>;

    // ── sessions ─────────────────────────────────────────────────────
    async fn fetch_session(&self, id: Uuid) -> Result<Option<SessionRow>>;
    async fn upsert_session(&self, row: SessionRow) -> Result<()>;

    // ── messages ─────────────────────────────────────────────────────
    /// The most recent messages whose estimated token volume fits the
    /// budget, in chronological order.
    async fn fetch_messages(&self, session_id: Uuid, token_budget: u32) -> Result<Vec<MessageRow>>;

    /// All messages for a session created strictly after `after`
    /// (everything when `None`), in chronological order.
    async fn fetch_messages_since(
        &self,
        session_id: Uuid,
        after: Option<DateTime<Utc>>,
    ) -> Result<Vec<MessageRow>>;

    /// Append a single row outside turn persistence (observations,
    /// injected memories, test fixtures).
    async fn append_message(&self, row: MessageRow) -> Result<MessageRow>;

    /// Persist a complete turn in one transaction.
    async fn persist_turn(&self, write: TurnWrite) -> Result<()>;

    // ── metadata ─────────────────────────────────────────────────────
    /// Shallow JSON merge on an entity's metadata column: patch keys
    /// overwrite, absent keys are preserved byte for byte, `remove_keys`
    /// deletes top-level keys. Returns the merged object.
    async fn merge_metadata(
        &self,
        owner: MetadataOwner,
        id: Uuid,
        patch: Value,
        remove_keys: &[String],
    ) -> Result<Value>;

    // ── users ────────────────────────────────────────────────────────
    async fn fetch_user(&self, id: Uuid) -> Result<Option<UserRow>>;
    async fn upsert_user(&self, row: UserRow) -> Result<()>;

    // ── moments ──────────────────────────────────────────────────────
    async fn insert_moment(&self, row: MomentRow) -> Result<MomentRow>;

    /// The newest moments sourced from a session, newest first.
    async fn recent_session_moments(
        &self,
        session_id: Uuid,
        limit: usize,
    ) -> Result<Vec<MomentRow>>;

    /// The newest moment of a given type sourced from a session.
    async fn latest_session_moment(
        &self,
        session_id: Uuid,
        moment_type: &str,
    ) -> Result<Option<MomentRow>>;

    /// Filtered, paginated moment query, newest first.
    async fn fetch_moments(&self, query: MomentQuery) -> Result<Vec<MomentRow>>;

    /// Merge edges onto the moment with the given name.
    async fn merge_moment_edges(
        &self,
        target_name: &str,
        edges: Vec<GraphEdge>,
    ) -> Result<MergeStatus>;
}
