//! In-memory reference store.
//!
//! A single mutex over all tables gives every multi-row operation the same
//! atomicity a database transaction would; `created_at` is assigned from a
//! strictly monotonic clock so row order survives timestamp-granularity
//! collisions.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use parking_lot::Mutex;
use serde_json::Value;
use uuid::Uuid;

use lucid_domain::{Error, Result};

use crate::graph::merge_graph_edges;
use crate::rows::{
    MessageRow, MessageType, MomentRow, SchemaRow, SessionRow, UserRow,
};
use crate::store::{MergeStatus, MetadataOwner, MomentQuery, Store, TurnWrite};

#[derive(Default)]
struct Inner {
    schemas: Vec<SchemaRow>,
    sessions: HashMap<Uuid, SessionRow>,
    messages: Vec<MessageRow>,
    moments: Vec<MomentRow>,
    users: HashMap<Uuid, UserRow>,
    /// Last assigned timestamp, microseconds since epoch.
    clock_us: i64,
}

impl Inner {
    fn next_timestamp(&mut self) -> DateTime<Utc> {
        let now_us = Utc::now().timestamp_micros();
        self.clock_us = now_us.max(self.clock_us + 1);
        Utc.timestamp_micros(self.clock_us)
            .single()
            .expect("monotonic clock stays in range")
    }
}

/// In-memory [`Store`] implementation.
#[derive(Default)]
pub struct MemStore {
    inner: Mutex<Inner>,
}

impl MemStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// All message rows for a session in write order. Test helper.
    pub fn session_messages(&self, session_id: Uuid) -> Vec<MessageRow> {
        self.inner
            .lock()
            .messages
            .iter()
            .filter(|m| m.session_id == session_id)
            .cloned()
            .collect()
    }
}

fn ensure_object(value: &mut Value) -> &mut serde_json::Map<String, Value> {
    if !value.is_object() {
        *value = Value::Object(serde_json::Map::new());
    }
    value.as_object_mut().expect("just coerced to object")
}

/// Render a tool result into the `content` TEXT column.
fn result_content(result: &Value) -> String {
    match result {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn estimated_tokens(row: &MessageRow) -> u32 {
    (row.content.len() / 4) as u32 + 1
}

#[async_trait]
impl Store for MemStore {
    async fn fetch_schema(&self, name: &str, kind: &str) -> Result<Option<SchemaRow>> {
        let inner = self.inner.lock();
        Ok(inner
            .schemas
            .iter()
            .find(|s| s.name == name && s.kind == kind)
            .cloned())
    }

    async fn upsert_schema(&self, row: SchemaRow) -> Result<SchemaRow> {
        let mut inner = self.inner.lock();
        match inner
            .schemas
            .iter_mut()
            .find(|s| s.name == row.name && s.kind == row.kind)
        {
            Some(existing) => {
                let id = existing.id;
                *existing = SchemaRow { id, ..row };
                Ok(existing.clone())
            }
            None => {
                inner.schemas.push(row.clone());
                Ok(row)
            }
        }
    }

    async fn fetch_session(&self, id: Uuid) -> Result<Option<SessionRow>> {
        Ok(self.inner.lock().sessions.get(&id).cloned())
    }

    async fn upsert_session(&self, row: SessionRow) -> Result<()> {
        self.inner.lock().sessions.insert(row.id, row);
        Ok(())
    }

    async fn fetch_messages(&self, session_id: Uuid, token_budget: u32) -> Result<Vec<MessageRow>> {
        let inner = self.inner.lock();
        let mut budget = token_budget;
        let mut selected: Vec<MessageRow> = Vec::new();
        for row in inner
            .messages
            .iter()
            .rev()
            .filter(|m| m.session_id == session_id)
        {
            let cost = estimated_tokens(row);
            if cost > budget {
                break;
            }
            budget -= cost;
            selected.push(row.clone());
        }
        selected.reverse();
        Ok(selected)
    }

    async fn fetch_messages_since(
        &self,
        session_id: Uuid,
        after: Option<DateTime<Utc>>,
    ) -> Result<Vec<MessageRow>> {
        let inner = self.inner.lock();
        Ok(inner
            .messages
            .iter()
            .filter(|m| m.session_id == session_id)
            .filter(|m| after.map_or(true, |t| m.created_at > t))
            .cloned()
            .collect())
    }

    async fn append_message(&self, mut row: MessageRow) -> Result<MessageRow> {
        let mut inner = self.inner.lock();
        row.created_at = inner.next_timestamp();
        inner.messages.push(row.clone());
        Ok(row)
    }

    async fn persist_turn(&self, write: TurnWrite) -> Result<()> {
        let mut inner = self.inner.lock();

        let mut user_row = MessageRow::new(write.session_id, MessageType::User, write.user_text);
        user_row.agent_name = write.agent_name.clone();
        user_row.created_at = inner.next_timestamp();
        inner.messages.push(user_row);

        for exchange in &write.tool_exchanges {
            let mut call = MessageRow::new(write.session_id, MessageType::ToolCall, "");
            call.tool_calls = Some(serde_json::json!({
                "name": exchange.name,
                "id": exchange.id,
                "arguments": exchange.arguments,
            }));
            call.agent_name = write.agent_name.clone();
            call.created_at = inner.next_timestamp();
            inner.messages.push(call);

            let mut response = MessageRow::new(
                write.session_id,
                MessageType::ToolResponse,
                result_content(&exchange.result),
            );
            response.tool_calls = Some(serde_json::json!({
                "name": exchange.name,
                "id": exchange.id,
            }));
            response.agent_name = write.agent_name.clone();
            response.created_at = inner.next_timestamp();
            inner.messages.push(response);
        }

        if let Some(text) = write.assistant_text {
            let mut assistant = MessageRow::new(write.session_id, MessageType::Assistant, text);
            if !write.assistant_calls.is_empty() {
                assistant.tool_calls = Some(serde_json::json!({
                    "calls": write.assistant_calls,
                }));
            }
            assistant.input_tokens = Some(write.input_tokens);
            assistant.output_tokens = Some(write.output_tokens);
            assistant.latency_ms = write.latency_ms;
            assistant.model = write.model.clone();
            assistant.agent_name = write.agent_name.clone();
            assistant.created_at = inner.next_timestamp();
            inner.messages.push(assistant);
        }

        let session = inner
            .sessions
            .entry(write.session_id)
            .or_insert_with(|| SessionRow::new(write.session_id, ""));
        if session.agent_name.is_empty() {
            if let Some(agent) = &write.agent_name {
                session.agent_name = agent.clone();
            }
        }
        if let Some(history) = write.serialized_history {
            ensure_object(&mut session.metadata)
                .insert("pai_messages".into(), Value::String(history));
        }

        Ok(())
    }

    async fn merge_metadata(
        &self,
        owner: MetadataOwner,
        id: Uuid,
        patch: Value,
        remove_keys: &[String],
    ) -> Result<Value> {
        let patch = match patch {
            Value::Object(map) => map,
            _ => return Err(Error::Store("metadata patch must be a JSON object".into())),
        };

        let mut inner = self.inner.lock();
        let metadata = match owner {
            MetadataOwner::User => {
                let user = inner
                    .users
                    .get_mut(&id)
                    .ok_or_else(|| Error::Store(format!("user {id} not found")))?;
                ensure_object(&mut user.metadata)
            }
            MetadataOwner::Session => {
                let session = inner
                    .sessions
                    .get_mut(&id)
                    .ok_or_else(|| Error::Store(format!("session {id} not found")))?;
                ensure_object(&mut session.metadata)
            }
        };

        for (key, value) in patch {
            metadata.insert(key, value);
        }
        for key in remove_keys {
            metadata.remove(key);
        }
        Ok(Value::Object(metadata.clone()))
    }

    async fn fetch_user(&self, id: Uuid) -> Result<Option<UserRow>> {
        Ok(self.inner.lock().users.get(&id).cloned())
    }

    async fn upsert_user(&self, row: UserRow) -> Result<()> {
        self.inner.lock().users.insert(row.id, row);
        Ok(())
    }

    async fn insert_moment(&self, mut row: MomentRow) -> Result<MomentRow> {
        let mut inner = self.inner.lock();
        row.created_at = inner.next_timestamp();
        inner.moments.push(row.clone());
        Ok(row)
    }

    async fn recent_session_moments(
        &self,
        session_id: Uuid,
        limit: usize,
    ) -> Result<Vec<MomentRow>> {
        let inner = self.inner.lock();
        Ok(inner
            .moments
            .iter()
            .rev()
            .filter(|m| m.source_session_id == Some(session_id))
            .take(limit)
            .cloned()
            .collect())
    }

    async fn latest_session_moment(
        &self,
        session_id: Uuid,
        moment_type: &str,
    ) -> Result<Option<MomentRow>> {
        let inner = self.inner.lock();
        Ok(inner
            .moments
            .iter()
            .rev()
            .find(|m| m.source_session_id == Some(session_id) && m.moment_type == moment_type)
            .cloned())
    }

    async fn fetch_moments(&self, query: MomentQuery) -> Result<Vec<MomentRow>> {
        let inner = self.inner.lock();
        let limit = query.limit.max(1);
        Ok(inner
            .moments
            .iter()
            .rev()
            .filter(|m| query.user_id.map_or(true, |u| m.user_id == Some(u)))
            .filter(|m| {
                query
                    .moment_type
                    .as_deref()
                    .map_or(true, |t| m.moment_type == t)
            })
            .filter(|m| query.topic_tags.iter().all(|t| m.topic_tags.contains(t)))
            .filter(|m| query.after.map_or(true, |t| m.created_at >= t))
            .filter(|m| query.before.map_or(true, |t| m.created_at <= t))
            .skip(query.offset)
            .take(limit)
            .cloned()
            .collect())
    }

    async fn merge_moment_edges(
        &self,
        target_name: &str,
        edges: Vec<crate::rows::GraphEdge>,
    ) -> Result<MergeStatus> {
        let mut inner = self.inner.lock();
        match inner
            .moments
            .iter_mut()
            .rev()
            .find(|m| m.name == target_name)
        {
            Some(moment) => {
                let existing = std::mem::take(&mut moment.graph_edges);
                moment.graph_edges = merge_graph_edges(existing, edges);
                Ok(MergeStatus::Merged {
                    edge_count: moment.graph_edges.len(),
                })
            }
            None => Ok(MergeStatus::NotFound),
        }
    }
}
