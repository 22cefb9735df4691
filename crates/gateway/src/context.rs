//! Per-request context injection.
//!
//! Every model call gets an instruction block inserted after the system
//! prompt: date, user identity, session, and routing state. Keeping this
//! out of the persisted system prompt lets it change every turn without
//! polluting message history.

use chrono::Local;
use serde_json::Value;
use uuid::Uuid;

/// Runtime facts loaded per request.
#[derive(Debug, Clone, Default)]
pub struct ContextAttributes {
    pub current_date: String,
    pub current_time: String,
    pub user_id: Option<Uuid>,
    pub user_email: Option<String>,
    pub user_name: Option<String>,
    pub session_id: Option<Uuid>,
    pub agent_name: Option<String>,
    pub session_name: Option<String>,
    pub session_metadata: Option<Value>,
    pub routing_table: Value,
}

impl ContextAttributes {
    pub fn now() -> Self {
        let now = Local::now();
        Self {
            current_date: now.format("%Y-%m-%d").to_string(),
            current_time: now.format("%H:%M:%S").to_string(),
            routing_table: Value::Object(serde_json::Map::new()),
            ..Default::default()
        }
    }

    /// Render the context block.
    ///
    /// The serialized message history (`pai_messages`) is excluded from the
    /// metadata JSON: re-embedding it into the prompt each turn would grow
    /// the prompt quadratically.
    pub fn render(&self) -> String {
        let mut lines = vec![
            "[Context]".to_string(),
            format!("Date: {}", self.current_date),
            format!("Time: {}", self.current_time),
        ];
        if let Some(user_id) = self.user_id {
            lines.push(format!("User ID: {user_id}"));
        }
        if let Some(email) = &self.user_email {
            lines.push(format!("User email: {email}"));
        }
        if let Some(name) = &self.user_name {
            lines.push(format!("User: {name}"));
        }
        if let Some(session_id) = self.session_id {
            lines.push(format!("Session: {session_id}"));
        }
        if let Some(agent) = &self.agent_name {
            lines.push(format!("Agent: {agent}"));
        }

        if self.session_name.is_some() || self.session_metadata.is_some() {
            lines.push(String::new());
            lines.push("## Session Context".to_string());
            if let Some(name) = &self.session_name {
                lines.push(format!("Session: {name}"));
            }
            if let Some(Value::Object(metadata)) = &self.session_metadata {
                let filtered: serde_json::Map<String, Value> = metadata
                    .iter()
                    .filter(|(k, _)| k.as_str() != "pai_messages")
                    .map(|(k, v)| (k.clone(), v.clone()))
                    .collect();
                if !filtered.is_empty() {
                    lines.push(format!("Context: {}", Value::Object(filtered)));
                }
            }
            lines.push("Use LOOKUP to retrieve full details for any keys listed above.".into());
        }

        if self
            .routing_table
            .as_object()
            .map_or(false, |t| !t.is_empty())
        {
            lines.push(format!("Routing: {}", self.routing_table));
        }

        lines.join("\n")
    }
}

/// Builds the instruction block for one model call.
///
/// Extensible: `extra_sections` appends ad-hoc blocks after the context
/// attributes.
pub struct ContextInjector {
    pub attributes: ContextAttributes,
    pub extra_sections: Vec<String>,
}

impl ContextInjector {
    pub fn new(attributes: ContextAttributes) -> Self {
        Self {
            attributes,
            extra_sections: Vec::new(),
        }
    }

    pub fn with_sections(mut self, sections: Vec<String>) -> Self {
        self.extra_sections = sections;
        self
    }

    /// The instructions string passed to the model runtime.
    pub fn instructions(&self) -> String {
        let mut parts = vec![self.attributes.render()];
        parts.extend(self.extra_sections.iter().cloned());
        parts.join("\n\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minimal_block_has_date_and_time() {
        let attrs = ContextAttributes::now();
        let block = attrs.render();
        assert!(block.starts_with("[Context]\nDate: "));
        assert!(block.contains("\nTime: "));
        assert!(!block.contains("Session Context"));
        assert!(!block.contains("Routing:"));
    }

    #[test]
    fn identity_and_session_lines_render_when_known() {
        let user_id = Uuid::new_v4();
        let session_id = Uuid::new_v4();
        let mut attrs = ContextAttributes::now();
        attrs.user_id = Some(user_id);
        attrs.user_email = Some("ada@example.com".into());
        attrs.user_name = Some("Ada".into());
        attrs.session_id = Some(session_id);
        attrs.agent_name = Some("general".into());

        let block = attrs.render();
        assert!(block.contains(&format!("User ID: {user_id}")));
        assert!(block.contains("User email: ada@example.com"));
        assert!(block.contains("User: Ada"));
        assert!(block.contains(&format!("Session: {session_id}")));
        assert!(block.contains("Agent: general"));
    }

    #[test]
    fn session_metadata_excludes_serialized_history() {
        let mut attrs = ContextAttributes::now();
        attrs.session_name = Some("morning-chat".into());
        attrs.session_metadata = Some(serde_json::json!({
            "summary_key": "session-abc-chunk-0",
            "pai_messages": "[[huge opaque blob]]",
        }));

        let block = attrs.render();
        assert!(block.contains("## Session Context"));
        assert!(block.contains("Session: morning-chat"));
        assert!(block.contains("summary_key"));
        assert!(!block.contains("pai_messages"));
        assert!(!block.contains("huge opaque blob"));
        assert!(block.contains("Use LOOKUP"));
    }

    #[test]
    fn routing_line_only_when_non_empty() {
        let mut attrs = ContextAttributes::now();
        attrs.routing_table = serde_json::json!({});
        assert!(!attrs.render().contains("Routing:"));

        attrs.routing_table = serde_json::json!({"active_agent": "general", "state": "executing"});
        let block = attrs.render();
        assert!(block.contains("Routing: "));
        assert!(block.contains("\"active_agent\""));
    }

    #[test]
    fn injector_appends_extra_sections() {
        let injector = ContextInjector::new(ContextAttributes::now())
            .with_sections(vec!["## Extra\nBe brief.".into()]);
        let instructions = injector.instructions();
        assert!(instructions.contains("[Context]"));
        assert!(instructions.ends_with("## Extra\nBe brief."));
    }
}
