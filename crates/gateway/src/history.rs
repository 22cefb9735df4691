//! Message history codec.
//!
//! Two paths for loading conversation history at turn start:
//!
//! * **Fast path**: deserialize the runtime-native message list from
//!   `session.metadata.pai_messages`. Lossless: provider-specific detail
//!   (tool call ids, part ordering) survives. Recent session moments are
//!   prepended as synthetic system messages.
//! * **Reconstruction path**: translate persisted message rows back into
//!   model messages under a token budget.

use std::sync::Arc;

use lucid_domain::config::HistoryConfig;
use lucid_domain::message::{Message, ToolCall};
use lucid_domain::Result;
use lucid_store::{MessageRow, MessageType, SessionRow, Store};

pub struct HistoryCodec {
    store: Arc<dyn Store>,
    config: HistoryConfig,
}

impl HistoryCodec {
    pub fn new(store: Arc<dyn Store>, config: HistoryConfig) -> Self {
        Self { store, config }
    }

    /// Load conversation history for a session.
    pub async fn load(&self, session: &SessionRow) -> Result<Vec<Message>> {
        if let Some(messages) = self.load_serialized(session).await? {
            return Ok(messages);
        }
        let rows = self
            .store
            .fetch_messages(session.id, self.config.token_budget)
            .await?;
        Ok(rows_to_messages(&rows))
    }

    /// Fast path: the serialized message blob, prefixed with up to
    /// `moment_limit` recent session moments in chronological order.
    /// Returns `None` when the blob is absent or unreadable.
    async fn load_serialized(&self, session: &SessionRow) -> Result<Option<Vec<Message>>> {
        let Some(raw) = session
            .metadata
            .get("pai_messages")
            .and_then(|v| v.as_str())
        else {
            return Ok(None);
        };
        let parsed: Vec<Message> = match serde_json::from_str(raw) {
            Ok(messages) => messages,
            Err(e) => {
                tracing::warn!(
                    session_id = %session.id,
                    error = %e,
                    "unreadable serialized history, falling back to reconstruction"
                );
                return Ok(None);
            }
        };
        if parsed.is_empty() {
            return Ok(None);
        }

        let moments = self
            .store
            .recent_session_moments(session.id, self.config.moment_limit)
            .await?;
        let mut messages: Vec<Message> = moments
            .iter()
            .rev() // newest-first from the store; replay chronologically
            .map(|m| Message::system(format!("[Session context]\n{}", m.summary)))
            .collect();
        messages.extend(parsed);
        Ok(Some(messages))
    }
}

/// Translate persisted rows into model messages.
///
/// `think` and `tool_result` rows are internal-only and dropped. A
/// `tool_call` row is skipped too: its arguments replay through the
/// assistant row's `calls` array, and the paired `tool_response` row
/// supplies the result as a tool-return message.
pub fn rows_to_messages(rows: &[MessageRow]) -> Vec<Message> {
    let mut messages = Vec::new();
    for row in rows {
        match row.message_type {
            MessageType::User => messages.push(Message::user(row.content.clone())),
            MessageType::System | MessageType::Memory => {
                messages.push(Message::system(row.content.clone()));
            }
            MessageType::Assistant => {
                let calls = assistant_calls(row);
                if calls.is_empty() {
                    messages.push(Message::assistant(row.content.clone()));
                } else {
                    messages.push(Message::assistant_with_calls(&row.content, &calls));
                }
            }
            MessageType::ToolResponse => {
                let Some(meta) = &row.tool_calls else { continue };
                let name = meta.get("name").and_then(|v| v.as_str()).unwrap_or("");
                let Some(id) = meta.get("id").and_then(|v| v.as_str()) else {
                    continue;
                };
                messages.push(Message::tool_return(id, name, row.content.clone()));
            }
            MessageType::Observation => {
                messages.push(Message::user(format!("[Observation] {}", row.content)));
            }
            MessageType::ToolCall | MessageType::Think | MessageType::ToolResult => {}
        }
    }
    messages
}

fn assistant_calls(row: &MessageRow) -> Vec<ToolCall> {
    row.tool_calls
        .as_ref()
        .and_then(|tc| tc.get("calls"))
        .and_then(|calls| serde_json::from_value(calls.clone()).ok())
        .unwrap_or_default()
}

/// Serialize a runtime message list for the session metadata blob.
pub fn serialize_messages(messages: &[Message]) -> String {
    serde_json::to_string(messages).unwrap_or_else(|e| {
        tracing::warn!(error = %e, "failed to serialize message history");
        String::new()
    })
}
