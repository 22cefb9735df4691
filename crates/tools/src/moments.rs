//! Moment tools: persist dream moments with graph edges, and query moments.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::Value;
use uuid::Uuid;

use lucid_domain::message::ToolDefinition;
use lucid_store::{GraphEdge, MergeStatus, MomentQuery, MomentRow, Store};

use crate::{tool_error, Tool, ToolContext};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// save_moments
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Deserialize)]
struct AffinityFragment {
    target: String,
    #[serde(default = "d_relation")]
    relation: String,
    #[serde(default = "d_weight")]
    weight: f64,
    #[serde(default)]
    reason: String,
}

fn d_relation() -> String {
    "dream_affinity".into()
}
fn d_weight() -> f64 {
    0.5
}

#[derive(Deserialize)]
struct DreamMomentInput {
    #[serde(default = "d_unnamed")]
    name: String,
    #[serde(default)]
    summary: String,
    #[serde(default)]
    topic_tags: Vec<String>,
    #[serde(default)]
    emotion_tags: Vec<String>,
    #[serde(default)]
    affinity_fragments: Vec<AffinityFragment>,
}

fn d_unnamed() -> String {
    "unnamed".into()
}

/// Persist dream moments and merge back-edges onto the entities they
/// reference.
///
/// Invoked directly by background agents, or as the chained tool of a
/// structured-output dreaming agent (the structured output arrives verbatim
/// as the arguments object).
pub struct SaveMomentsTool {
    store: Arc<dyn Store>,
}

impl SaveMomentsTool {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    fn parse_moments(arguments: &Value) -> Result<Vec<DreamMomentInput>, String> {
        // Structured dreaming output may arrive under either key.
        let list = arguments
            .get("moments")
            .or_else(|| arguments.get("dream_moments"))
            .ok_or("missing required argument: moments")?;
        serde_json::from_value(list.clone()).map_err(|e| format!("invalid moments: {e}"))
    }
}

#[async_trait]
impl Tool for SaveMomentsTool {
    fn describe(&self) -> ToolDefinition {
        ToolDefinition {
            name: "save_moments".into(),
            description: "Save dream moments. Each moment has a kebab-case \
                          name, a summary, topic_tags, emotion_tags, and \
                          affinity_fragments (target, relation, weight, \
                          reason) that become graph edges."
                .into(),
            parameters: serde_json::json!({
                "type": "object",
                "properties": {
                    "moments": {
                        "type": "array",
                        "description": "Dream moment definitions"
                    }
                },
                "required": ["moments"]
            }),
        }
    }

    async fn invoke(&self, arguments: Value, ctx: &ToolContext) -> Value {
        let moments = match Self::parse_moments(&arguments) {
            Ok(m) => m,
            Err(e) => return tool_error(e),
        };

        let mut saved_ids: Vec<String> = Vec::new();
        let mut merge_results: Vec<Value> = Vec::new();

        for moment in moments {
            let name = if moment.name.starts_with("dream-") {
                moment.name.clone()
            } else {
                format!("dream-{}", moment.name)
            };

            let graph_edges: Vec<GraphEdge> = moment
                .affinity_fragments
                .iter()
                .filter(|a| !a.target.is_empty())
                .map(|a| GraphEdge {
                    target: a.target.clone(),
                    relation: a.relation.clone(),
                    weight: a.weight,
                    reason: a.reason.clone(),
                })
                .collect();

            let row = MomentRow {
                id: Uuid::new_v4(),
                user_id: ctx.user_id,
                name: name.clone(),
                moment_type: "dream".into(),
                summary: moment.summary.clone(),
                topic_tags: moment.topic_tags.clone(),
                emotion_tags: moment.emotion_tags.clone(),
                graph_edges,
                source_session_id: ctx.session_id,
                metadata: serde_json::json!({"source": "dreaming"}),
                created_at: Utc::now(),
            };
            let saved = match self.store.insert_moment(row).await {
                Ok(s) => s,
                Err(e) => return tool_error(e),
            };
            saved_ids.push(saved.id.to_string());

            // Bidirectional linking: merge a back-edge onto each referenced
            // entity.
            for fragment in &moment.affinity_fragments {
                if fragment.target.is_empty() {
                    continue;
                }
                let back_edge = GraphEdge {
                    target: saved.name.clone(),
                    relation: "dreamed_from".into(),
                    weight: fragment.weight,
                    reason: fragment.reason.clone(),
                };
                match self
                    .store
                    .merge_moment_edges(&fragment.target, vec![back_edge])
                    .await
                {
                    Ok(MergeStatus::Merged { edge_count }) => {
                        merge_results.push(serde_json::json!({
                            "target": fragment.target,
                            "status": "merged",
                            "edge_count": edge_count,
                        }));
                    }
                    Ok(MergeStatus::NotFound) => {
                        merge_results.push(serde_json::json!({
                            "target": fragment.target,
                            "status": "not_found",
                        }));
                    }
                    Err(e) => {
                        tracing::warn!(
                            target_key = %fragment.target,
                            error = %e,
                            "failed to merge back-edge"
                        );
                        merge_results.push(serde_json::json!({
                            "target": fragment.target,
                            "status": "error",
                            "error": e.to_string(),
                        }));
                    }
                }
            }
        }

        serde_json::json!({
            "status": "success",
            "saved_moment_ids": saved_ids,
            "moments_count": saved_ids.len(),
            "merge_results": merge_results,
        })
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// get_moments
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Deserialize)]
struct GetMomentsArgs {
    #[serde(default)]
    moment_type: Option<String>,
    #[serde(default)]
    topic_tags: Vec<String>,
    #[serde(default)]
    after_date: Option<String>,
    #[serde(default)]
    before_date: Option<String>,
    #[serde(default = "d_limit")]
    limit: usize,
    #[serde(default)]
    offset: usize,
}

fn d_limit() -> usize {
    20
}

fn parse_date(raw: &str) -> Result<DateTime<Utc>, String> {
    DateTime::parse_from_rfc3339(raw)
        .map(|d| d.with_timezone(&Utc))
        .map_err(|e| format!("invalid date '{raw}': {e}"))
}

/// Query moments with filtering, date ranges, and pagination.
pub struct GetMomentsTool {
    store: Arc<dyn Store>,
}

impl GetMomentsTool {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Tool for GetMomentsTool {
    fn describe(&self) -> ToolDefinition {
        ToolDefinition {
            name: "get_moments".into(),
            description: "Query moments with filters (moment_type, \
                          topic_tags, date range) and pagination."
                .into(),
            parameters: serde_json::json!({
                "type": "object",
                "properties": {
                    "moment_type": {"type": "string", "description": "session_chunk, dream, ..."},
                    "topic_tags": {"type": "array", "items": {"type": "string"}},
                    "after_date": {"type": "string", "description": "RFC 3339 lower bound"},
                    "before_date": {"type": "string", "description": "RFC 3339 upper bound"},
                    "limit": {"type": "integer", "description": "Max results (1-100, default 20)"},
                    "offset": {"type": "integer"}
                }
            }),
        }
    }

    async fn invoke(&self, arguments: Value, ctx: &ToolContext) -> Value {
        let args: GetMomentsArgs = match serde_json::from_value(arguments) {
            Ok(a) => a,
            Err(e) => return tool_error(format!("invalid arguments: {e}")),
        };

        let limit = args.limit.clamp(1, 100);
        let after = match args.after_date.as_deref().map(parse_date).transpose() {
            Ok(d) => d,
            Err(e) => return tool_error(e),
        };
        let before = match args.before_date.as_deref().map(parse_date).transpose() {
            Ok(d) => d,
            Err(e) => return tool_error(e),
        };

        // Fetch one extra row to detect a further page.
        let query = MomentQuery {
            user_id: ctx.user_id,
            moment_type: args.moment_type,
            topic_tags: args.topic_tags,
            after,
            before,
            limit: limit + 1,
            offset: args.offset,
        };
        let mut rows = match self.store.fetch_moments(query).await {
            Ok(r) => r,
            Err(e) => return tool_error(e),
        };
        let has_more = rows.len() > limit;
        rows.truncate(limit);

        let results: Vec<Value> = rows
            .iter()
            .map(|m| {
                serde_json::json!({
                    "id": m.id,
                    "name": m.name,
                    "moment_type": m.moment_type,
                    "summary": m.summary,
                    "topic_tags": m.topic_tags,
                    "emotion_tags": m.emotion_tags,
                    "source_session_id": m.source_session_id,
                    "created_at": m.created_at.to_rfc3339(),
                })
            })
            .collect();

        serde_json::json!({
            "status": "success",
            "count": results.len(),
            "results": results,
            "limit": limit,
            "offset": args.offset,
            "has_more": has_more,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lucid_store::MemStore;

    fn ctx(user_id: Uuid, session_id: Uuid) -> ToolContext {
        ToolContext {
            user_id: Some(user_id),
            session_id: Some(session_id),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn save_moments_normalises_names_and_edges() {
        let store = Arc::new(MemStore::new());
        let tool = SaveMomentsTool::new(store.clone());
        let user_id = Uuid::new_v4();
        let session_id = Uuid::new_v4();

        let out = tool
            .invoke(
                serde_json::json!({
                    "moments": [{
                        "name": "ml-patterns",
                        "summary": "We keep validating at boundaries.",
                        "topic_tags": ["ml", "architecture"],
                        "affinity_fragments": [
                            {"target": "r1", "relation": "builds_on", "weight": 0.8, "reason": "same principle"},
                            {"target": ""},
                        ],
                    }],
                }),
                &ctx(user_id, session_id),
            )
            .await;

        assert_eq!(out["status"], "success");
        assert_eq!(out["moments_count"], 1);

        let dreams = store
            .fetch_moments(MomentQuery {
                moment_type: Some("dream".into()),
                limit: 10,
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(dreams.len(), 1);
        assert_eq!(dreams[0].name, "dream-ml-patterns");
        assert_eq!(dreams[0].user_id, Some(user_id));
        assert_eq!(dreams[0].source_session_id, Some(session_id));
        // The empty-target fragment is dropped.
        assert_eq!(dreams[0].graph_edges.len(), 1);
        assert_eq!(dreams[0].graph_edges[0].relation, "builds_on");
    }

    #[tokio::test]
    async fn save_moments_merges_back_edges_on_targets() {
        let store: Arc<dyn Store> = Arc::new(MemStore::new());
        store
            .insert_moment(MomentRow {
                id: Uuid::new_v4(),
                user_id: None,
                name: "r1".into(),
                moment_type: "session_chunk".into(),
                summary: "earlier work".into(),
                topic_tags: vec![],
                emotion_tags: vec![],
                graph_edges: vec![],
                source_session_id: None,
                metadata: serde_json::json!({}),
                created_at: Utc::now(),
            })
            .await
            .unwrap();

        let tool = SaveMomentsTool::new(store.clone());
        let out = tool
            .invoke(
                serde_json::json!({
                    "moments": [{
                        "name": "dream-a",
                        "summary": "insight",
                        "affinity_fragments": [
                            {"target": "r1", "weight": 0.8, "relation": "x", "reason": "y"},
                        ],
                    }],
                }),
                &ToolContext::default(),
            )
            .await;

        assert_eq!(out["merge_results"][0]["status"], "merged");
        let status = store
            .merge_moment_edges("r1", vec![])
            .await
            .unwrap();
        assert_eq!(status, MergeStatus::Merged { edge_count: 1 });
    }

    #[tokio::test]
    async fn save_moments_accepts_dream_moments_key() {
        let store = Arc::new(MemStore::new());
        let tool = SaveMomentsTool::new(store);
        let out = tool
            .invoke(
                serde_json::json!({
                    "dream_moments": [{"name": "alt-key", "summary": "s"}],
                }),
                &ToolContext::default(),
            )
            .await;
        assert_eq!(out["status"], "success");
        assert_eq!(out["moments_count"], 1);
    }

    #[tokio::test]
    async fn save_moments_missing_list_is_error() {
        let store = Arc::new(MemStore::new());
        let tool = SaveMomentsTool::new(store);
        let out = tool
            .invoke(serde_json::json!({}), &ToolContext::default())
            .await;
        assert_eq!(out["status"], "error");
    }

    #[tokio::test]
    async fn get_moments_paginates_with_has_more() {
        let store: Arc<dyn Store> = Arc::new(MemStore::new());
        let user_id = Uuid::new_v4();
        for i in 0..5 {
            store
                .insert_moment(MomentRow {
                    id: Uuid::new_v4(),
                    user_id: Some(user_id),
                    name: format!("dream-{i}"),
                    moment_type: "dream".into(),
                    summary: format!("s{i}"),
                    topic_tags: vec![],
                    emotion_tags: vec![],
                    graph_edges: vec![],
                    source_session_id: None,
                    metadata: serde_json::json!({}),
                    created_at: Utc::now(),
                })
                .await
                .unwrap();
        }

        let tool = GetMomentsTool::new(store);
        let ctx = ToolContext {
            user_id: Some(user_id),
            ..Default::default()
        };
        let page = tool
            .invoke(serde_json::json!({"limit": 2}), &ctx)
            .await;
        assert_eq!(page["count"], 2);
        assert_eq!(page["has_more"], true);

        let rest = tool
            .invoke(serde_json::json!({"limit": 3, "offset": 2}), &ctx)
            .await;
        assert_eq!(rest["count"], 3);
        assert_eq!(rest["has_more"], false);
    }
}
