//! User profile tools: load the profile, and apply structured partial
//! updates to user metadata.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;

use lucid_domain::message::ToolDefinition;
use lucid_store::{MetadataOwner, Store};

use crate::{tool_error, Tool, ToolContext};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// user_profile
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Load the current user's profile metadata for personalised responses.
pub struct UserProfileTool {
    store: Arc<dyn Store>,
}

impl UserProfileTool {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Tool for UserProfileTool {
    fn describe(&self) -> ToolDefinition {
        ToolDefinition {
            name: "user_profile".into(),
            description: "Load the user's profile: name, email, and observed \
                          metadata (relations, interests, preferences, facts)."
                .into(),
            parameters: serde_json::json!({
                "type": "object",
                "properties": {}
            }),
        }
    }

    async fn invoke(&self, _arguments: Value, ctx: &ToolContext) -> Value {
        let Some(user_id) = ctx.user_id else {
            return tool_error("user_id is required");
        };
        match self.store.fetch_user(user_id).await {
            Ok(Some(user)) => serde_json::json!({
                "status": "success",
                "user_id": user.id,
                "name": user.name,
                "email": user.email,
                "metadata": user.metadata,
            }),
            Ok(None) => tool_error("User not found"),
            Err(e) => tool_error(e),
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// update_user_metadata
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Deserialize)]
struct UpdateMetadataArgs {
    metadata: serde_json::Map<String, Value>,
    #[serde(default)]
    remove_keys: Vec<String>,
}

/// Structured partial updates to user metadata.
///
/// Shallow merge: provided keys overwrite existing ones, absent keys are
/// preserved. `remove_keys` deletes top-level keys.
pub struct UpdateUserMetadataTool {
    store: Arc<dyn Store>,
}

impl UpdateUserMetadataTool {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Tool for UpdateUserMetadataTool {
    fn describe(&self) -> ToolDefinition {
        ToolDefinition {
            name: "update_user_metadata".into(),
            description: "Merge observed facts into the user's profile \
                          metadata: relations (family, pets), interests, \
                          feeds, preferences, facts. Partial updates only; \
                          send just the keys that changed."
                .into(),
            parameters: serde_json::json!({
                "type": "object",
                "properties": {
                    "metadata": {
                        "type": "object",
                        "description": "Fields to merge into user metadata"
                    },
                    "remove_keys": {
                        "type": "array",
                        "items": {"type": "string"},
                        "description": "Top-level metadata keys to delete"
                    }
                },
                "required": ["metadata"]
            }),
        }
    }

    async fn invoke(&self, arguments: Value, ctx: &ToolContext) -> Value {
        let Some(user_id) = ctx.user_id else {
            return tool_error("user_id is required");
        };
        let args: UpdateMetadataArgs = match serde_json::from_value(arguments) {
            Ok(a) => a,
            Err(e) => return tool_error(format!("Invalid metadata shape: {e}")),
        };

        match self
            .store
            .merge_metadata(
                MetadataOwner::User,
                user_id,
                Value::Object(args.metadata),
                &args.remove_keys,
            )
            .await
        {
            Ok(merged) => serde_json::json!({
                "status": "ok",
                "user_id": user_id,
                "metadata": merged,
            }),
            Err(e) => tool_error(format!("Database error: {e}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lucid_store::{MemStore, UserRow};
    use uuid::Uuid;

    fn ctx(user_id: Uuid) -> ToolContext {
        ToolContext {
            user_id: Some(user_id),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn profile_requires_user_id() {
        let store = Arc::new(MemStore::new());
        let tool = UserProfileTool::new(store);
        let out = tool
            .invoke(serde_json::json!({}), &ToolContext::default())
            .await;
        assert_eq!(out["status"], "error");
    }

    #[tokio::test]
    async fn update_then_read_back() {
        let store: Arc<dyn Store> = Arc::new(MemStore::new());
        let user_id = Uuid::new_v4();
        store.upsert_user(UserRow::new(user_id)).await.unwrap();

        let update = UpdateUserMetadataTool::new(store.clone());
        let out = update
            .invoke(
                serde_json::json!({
                    "metadata": {"interests": ["knitting"]},
                }),
                &ctx(user_id),
            )
            .await;
        assert_eq!(out["status"], "ok");

        let profile = UserProfileTool::new(store);
        let out = profile.invoke(serde_json::json!({}), &ctx(user_id)).await;
        assert_eq!(out["status"], "success");
        assert_eq!(out["metadata"]["interests"][0], "knitting");
    }

    #[tokio::test]
    async fn update_rejects_non_object_metadata() {
        let store: Arc<dyn Store> = Arc::new(MemStore::new());
        let user_id = Uuid::new_v4();
        store.upsert_user(UserRow::new(user_id)).await.unwrap();

        let tool = UpdateUserMetadataTool::new(store);
        let out = tool
            .invoke(serde_json::json!({"metadata": "not an object"}), &ctx(user_id))
            .await;
        assert_eq!(out["status"], "error");
    }
}
