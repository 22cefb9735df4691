//! Parent/child delegation streaming through the multiplexer.

mod common;

use std::sync::Arc;

use futures_util::StreamExt;
use lucid_gateway::{run_chat, run_chat_collect, ChatEvent, ChatRequest, ChildEvent, TurnEvent};
use lucid_model::{ScriptedModel, ScriptedTurn};
use lucid_store::{MessageType, Store};
use uuid::Uuid;

use common::{register_agent, test_state};

async fn register_pair(state: &lucid_gateway::CoreState) {
    register_agent(
        state,
        serde_json::json!({
            "name": "coordinator",
            "system_prompt": "Delegate when asked.",
            "tools": ["ask_agent"],
        }),
    )
    .await;
    register_agent(
        state,
        serde_json::json!({
            "name": "child",
            "system_prompt": "Answer directly.",
        }),
    )
    .await;
}

#[tokio::test]
async fn child_tokens_stream_through_the_parent() {
    let model = Arc::new(ScriptedModel::new());
    // Parent turn first; the nested child run pops the second turn.
    model.push_turn(
        ScriptedTurn::new()
            .text("Asking the child. ")
            .call(
                "ask_agent",
                serde_json::json!({"agent_name": "child", "input_text": "hi"}),
            )
            .text("Done."),
    );
    model.push_turn(ScriptedTurn::new().text("a").text("b").text("c"));
    let (state, store) = test_state(model);
    register_pair(&state).await;

    let session_id = Uuid::new_v4();
    let mut request = ChatRequest::new(session_id, "ask the child to say abc");
    request.agent_override = Some("coordinator".into());

    let stream = run_chat(&state, request).await.unwrap();
    let events: Vec<ChatEvent> = stream.events.collect().await;

    // At least three child content events, in order, concatenating to the
    // child's full response.
    let child_chunks: Vec<String> = events
        .iter()
        .filter_map(|e| match e {
            ChatEvent::Child(ChildEvent::Content {
                agent_name,
                content,
            }) => {
                assert_eq!(agent_name, "child");
                Some(content.clone())
            }
            _ => None,
        })
        .collect();
    assert_eq!(child_chunks, ["a", "b", "c"]);

    // The child closed with its sentinel.
    assert!(events.iter().any(|e| matches!(
        e,
        ChatEvent::Child(ChildEvent::Done { agent_name }) if agent_name == "child"
    )));

    // Parent ordering is intact around the delegation.
    let parent_text: String = events
        .iter()
        .filter_map(|e| match e {
            ChatEvent::Turn(TurnEvent::AssistantDelta { text }) => Some(text.as_str()),
            _ => None,
        })
        .collect();
    assert_eq!(parent_text, "Asking the child. Done.");
    assert!(matches!(events.last(), Some(ChatEvent::Done(_))));

    // The delegation round trip persisted as a tool pair on the parent
    // session, with the child's summary visible to the parent model.
    let rows = store.session_messages(session_id);
    let response = rows
        .iter()
        .find(|r| r.message_type == MessageType::ToolResponse)
        .expect("ask_agent response row");
    let summary: serde_json::Value = serde_json::from_str(&response.content).unwrap();
    assert_eq!(summary["status"], "success");
    assert_eq!(summary["agent_schema"], "child");
    assert_eq!(summary["text_response"], "abc");
    assert_eq!(summary["is_structured_output"], false);
}

#[tokio::test]
async fn child_tool_activity_is_forwarded() {
    let model = Arc::new(ScriptedModel::new());
    model.push_turn(
        ScriptedTurn::new()
            .call(
                "ask_agent",
                serde_json::json!({"agent_name": "child", "input_text": "look it up"}),
            )
            .text("relayed"),
    );
    model.push_turn(
        ScriptedTurn::new()
            .call("user_profile", serde_json::json!({}))
            .text("profile checked"),
    );
    let (state, _store) = test_state(model);
    register_agent(
        &state,
        serde_json::json!({
            "name": "coordinator",
            "system_prompt": "Delegate.",
            "tools": ["ask_agent"],
        }),
    )
    .await;
    register_agent(
        &state,
        serde_json::json!({
            "name": "child",
            "system_prompt": "Check the profile.",
            "tools": ["user_profile"],
        }),
    )
    .await;

    let mut request = ChatRequest::new(Uuid::new_v4(), "go");
    request.agent_override = Some("coordinator".into());
    let stream = run_chat(&state, request).await.unwrap();
    let events: Vec<ChatEvent> = stream.events.collect().await;

    let starts: Vec<&str> = events
        .iter()
        .filter_map(|e| match e {
            ChatEvent::Child(ChildEvent::ToolStart { tool_name, .. }) => Some(tool_name.as_str()),
            _ => None,
        })
        .collect();
    let results: Vec<&str> = events
        .iter()
        .filter_map(|e| match e {
            ChatEvent::Child(ChildEvent::ToolResult { tool_name, .. }) => Some(tool_name.as_str()),
            _ => None,
        })
        .collect();
    assert_eq!(starts, ["user_profile"]);
    assert_eq!(results, ["user_profile"]);
}

#[tokio::test]
async fn unknown_child_reports_an_error_summary() {
    let model = Arc::new(ScriptedModel::new());
    model.push_turn(
        ScriptedTurn::new()
            .call(
                "ask_agent",
                serde_json::json!({"agent_name": "ghost", "input_text": "hi"}),
            )
            .text("the ghost is unavailable"),
    );
    let (state, store) = test_state(model);
    register_agent(
        &state,
        serde_json::json!({
            "name": "coordinator",
            "system_prompt": "Delegate.",
            "tools": ["ask_agent"],
        }),
    )
    .await;

    let session_id = Uuid::new_v4();
    let mut request = ChatRequest::new(session_id, "summon the ghost");
    request.agent_override = Some("coordinator".into());
    let outcome = run_chat_collect(&state, request).await.unwrap();

    // The delegation failure reaches the model as a structured error; the
    // parent turn itself succeeds.
    assert!(outcome.error.is_none());
    assert_eq!(outcome.final_text, "the ghost is unavailable");

    let rows = store.session_messages(session_id);
    let response = rows
        .iter()
        .find(|r| r.message_type == MessageType::ToolResponse)
        .unwrap();
    let summary: serde_json::Value = serde_json::from_str(&response.content).unwrap();
    assert_eq!(summary["status"], "error");
    assert!(summary["error"].as_str().unwrap().contains("ghost"));
}

#[tokio::test]
async fn structured_child_carries_chained_tool_result() {
    let model = Arc::new(ScriptedModel::new());
    model.push_turn(
        ScriptedTurn::new()
            .call(
                "ask_agent",
                serde_json::json!({"agent_name": "dream-child", "input_text": "reflect"}),
            )
            .text("dreams saved"),
    );
    model.push_turn(ScriptedTurn::new().structured(serde_json::json!({
        "moments": [{"name": "from-child", "summary": "an insight"}],
    })));
    let (state, store) = test_state(model);
    register_agent(
        &state,
        serde_json::json!({
            "name": "coordinator",
            "system_prompt": "Delegate.",
            "tools": ["ask_agent"],
        }),
    )
    .await;
    register_agent(
        &state,
        serde_json::json!({
            "name": "dream-child",
            "system_prompt": "Dream.",
            "structured_output": true,
            "chained_tool": "save_moments",
            "properties": {"moments": {"type": "array"}},
        }),
    )
    .await;

    let mut request = ChatRequest::new(Uuid::new_v4(), "reflect");
    request.agent_override = Some("coordinator".into());
    let outcome = run_chat_collect(&state, request).await.unwrap();
    assert!(outcome.error.is_none());

    // The child's chained save ran; the moment exists.
    let dreams = store
        .fetch_moments(lucid_store::MomentQuery {
            moment_type: Some("dream".into()),
            limit: 10,
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(dreams.len(), 1);
    assert_eq!(dreams[0].name, "dream-from-child");
}

#[tokio::test]
async fn delegation_without_a_bound_sink_runs_non_streaming() {
    use lucid_gateway::runtime::delegate::AskAgentTool;
    use lucid_tools::{Tool, ToolContext};

    let model = Arc::new(ScriptedModel::new());
    model.push_turn(ScriptedTurn::new().text("direct answer"));
    let (state, _store) = test_state(model);
    register_agent(
        &state,
        serde_json::json!({"name": "child", "system_prompt": "Answer."}),
    )
    .await;

    // Invoked outside any delegation scope (CLI / background callers).
    let tool = AskAgentTool::new(state.clone());
    let summary = tool
        .invoke(
            serde_json::json!({"agent_name": "child", "input_text": "hi"}),
            &ToolContext::default(),
        )
        .await;
    assert_eq!(summary["status"], "success");
    assert_eq!(summary["text_response"], "direct answer");
    assert_eq!(summary["output"], "direct answer");
}
