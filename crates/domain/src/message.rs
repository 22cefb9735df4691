use serde::{Deserialize, Serialize};

/// A tool invocation recorded during a turn (runtime-agnostic).
///
/// The same shape is persisted into the `tool_calls` JSON column of
/// assistant rows (`{calls: [...]}`) and replayed as tool-call parts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    pub arguments: serde_json::Value,
}

/// Tool definition exposed to the model runtime.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    /// JSON Schema for the tool's parameters.
    pub parameters: serde_json::Value,
}

/// A message in the model conversation.
///
/// This is the shape the history codec produces and the model runtime
/// consumes. It round-trips losslessly through JSON, which is what makes
/// the serialized-history fast path possible: provider-specific details
/// (tool call ids, part ordering) survive a store round trip.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: MessageContent,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MessageContent {
    Text(String),
    Parts(Vec<ContentPart>),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ContentPart {
    #[serde(rename = "text")]
    Text { text: String },
    /// A tool call emitted by the model within an assistant message.
    #[serde(rename = "tool_use")]
    ToolUse {
        id: String,
        name: String,
        arguments: serde_json::Value,
    },
    /// A tool result fed back to the model.
    #[serde(rename = "tool_return")]
    ToolReturn {
        tool_use_id: String,
        tool_name: String,
        content: String,
    },
}

impl Message {
    pub fn system(text: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: MessageContent::Text(text.into()),
        }
    }

    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: MessageContent::Text(text.into()),
        }
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: MessageContent::Text(text.into()),
        }
    }

    /// An assistant message carrying text plus the tool calls it emitted.
    /// Empty text contributes no part.
    pub fn assistant_with_calls(text: &str, calls: &[ToolCall]) -> Self {
        let mut parts = Vec::new();
        if !text.is_empty() {
            parts.push(ContentPart::Text {
                text: text.to_string(),
            });
        }
        for call in calls {
            parts.push(ContentPart::ToolUse {
                id: call.id.clone(),
                name: call.name.clone(),
                arguments: call.arguments.clone(),
            });
        }
        Self {
            role: Role::Assistant,
            content: MessageContent::Parts(parts),
        }
    }

    pub fn tool_return(
        tool_use_id: impl Into<String>,
        tool_name: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self {
            role: Role::Tool,
            content: MessageContent::Parts(vec![ContentPart::ToolReturn {
                tool_use_id: tool_use_id.into(),
                tool_name: tool_name.into(),
                content: content.into(),
            }]),
        }
    }
}

impl MessageContent {
    /// Join all text content into an owned string. Non-text parts are skipped.
    pub fn text(&self) -> String {
        match self {
            MessageContent::Text(t) => t.clone(),
            MessageContent::Parts(parts) => parts
                .iter()
                .filter_map(|p| match p {
                    ContentPart::Text { text } => Some(text.as_str()),
                    _ => None,
                })
                .collect::<Vec<_>>()
                .join("\n"),
        }
    }

    /// Tool calls carried by this content, if any.
    pub fn tool_calls(&self) -> Vec<ToolCall> {
        match self {
            MessageContent::Text(_) => Vec::new(),
            MessageContent::Parts(parts) => parts
                .iter()
                .filter_map(|p| match p {
                    ContentPart::ToolUse {
                        id,
                        name,
                        arguments,
                    } => Some(ToolCall {
                        id: id.clone(),
                        name: name.clone(),
                        arguments: arguments.clone(),
                    }),
                    _ => None,
                })
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_from_plain_variant() {
        let content = MessageContent::Text("hello".into());
        assert_eq!(content.text(), "hello");
    }

    #[test]
    fn text_from_parts_skips_tool_parts() {
        let msg = Message::assistant_with_calls(
            "checking",
            &[ToolCall {
                id: "c1".into(),
                name: "search".into(),
                arguments: serde_json::json!({"q": "x"}),
            }],
        );
        assert_eq!(msg.content.text(), "checking");
        assert_eq!(msg.content.tool_calls().len(), 1);
    }

    #[test]
    fn assistant_with_calls_empty_text_has_no_text_part() {
        let msg = Message::assistant_with_calls(
            "",
            &[ToolCall {
                id: "c1".into(),
                name: "search".into(),
                arguments: serde_json::json!({}),
            }],
        );
        match &msg.content {
            MessageContent::Parts(parts) => {
                assert_eq!(parts.len(), 1);
                assert!(matches!(parts[0], ContentPart::ToolUse { .. }));
            }
            _ => panic!("expected Parts content"),
        }
    }

    #[test]
    fn message_json_round_trip_preserves_tool_ids() {
        let messages = vec![
            Message::user("hi"),
            Message::assistant_with_calls(
                "",
                &[ToolCall {
                    id: "call_7".into(),
                    name: "search".into(),
                    arguments: serde_json::json!({"q": "rust"}),
                }],
            ),
            Message::tool_return("call_7", "search", "found 3"),
            Message::assistant("done"),
        ];
        let json = serde_json::to_string(&messages).unwrap();
        let back: Vec<Message> = serde_json::from_str(&json).unwrap();
        assert_eq!(back, messages);
    }
}
