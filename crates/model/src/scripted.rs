//! Scripted model runtime for tests.
//!
//! Each pushed [`ScriptedTurn`] answers one run. Text steps stream as part
//! events; tool steps invoke the request's actual tools and stream the real
//! results. Usage limits from the request are enforced the way the real
//! runtime would enforce them.

use std::collections::VecDeque;

use futures_util::StreamExt;
use parking_lot::Mutex;
use serde_json::Value;
use uuid::Uuid;

use lucid_domain::message::{Message, ToolCall};
use lucid_domain::stream::{RunCompletion, RunEvent, RunEventStream, RunOutput, Usage};
use lucid_domain::{Error, Result};

use crate::client::{invoke_request_tool, ModelClient, RunRequest};

/// One authored step of a scripted turn.
#[derive(Debug, Clone)]
pub enum ScriptStep {
    /// Stream a text chunk.
    Text(String),
    /// Call a tool with resolved arguments; the real tool runs.
    CallTool { name: String, arguments: Value },
    /// Finish with a structured output object.
    Structured(Value),
}

/// The steps answering one run.
#[derive(Debug, Clone, Default)]
pub struct ScriptedTurn {
    pub steps: Vec<ScriptStep>,
}

impl ScriptedTurn {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn text(mut self, chunk: &str) -> Self {
        self.steps.push(ScriptStep::Text(chunk.into()));
        self
    }

    pub fn call(mut self, name: &str, arguments: Value) -> Self {
        self.steps.push(ScriptStep::CallTool {
            name: name.into(),
            arguments,
        });
        self
    }

    pub fn structured(mut self, value: Value) -> Self {
        self.steps.push(ScriptStep::Structured(value));
        self
    }
}

/// A [`ModelClient`] that replays authored turns in push order.
#[derive(Default)]
pub struct ScriptedModel {
    turns: Mutex<VecDeque<ScriptedTurn>>,
}

impl ScriptedModel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_turn(&self, turn: ScriptedTurn) {
        self.turns.lock().push_back(turn);
    }

    pub fn remaining_turns(&self) -> usize {
        self.turns.lock().len()
    }

    fn next_turn(&self) -> Result<ScriptedTurn> {
        self.turns
            .lock()
            .pop_front()
            .ok_or_else(|| Error::Model("scripted model has no turns left".into()))
    }
}

fn estimate_tokens(text: &str) -> u32 {
    (text.len() / 4) as u32 + 1
}

fn input_tokens(req: &RunRequest) -> u32 {
    let mut total = estimate_tokens(&req.system_prompt) + estimate_tokens(&req.prompt);
    if let Some(instructions) = &req.instructions {
        total += estimate_tokens(instructions);
    }
    for message in &req.history {
        total += estimate_tokens(&message.content.text());
    }
    total
}

#[async_trait::async_trait]
impl ModelClient for ScriptedModel {
    async fn run(&self, req: RunRequest) -> Result<RunCompletion> {
        let mut stream = self.iter(req).await?;
        while let Some(event) = stream.next().await {
            if let RunEvent::Completed(completion) = event? {
                return Ok(completion);
            }
        }
        Err(Error::Model("run ended without completion".into()))
    }

    async fn iter(&self, req: RunRequest) -> Result<RunEventStream> {
        let turn = self.next_turn()?;

        let stream = async_stream::stream! {
            let mut text_buf = String::new();
            let mut first_part = true;
            let mut calls: Vec<ToolCall> = Vec::new();
            let mut tool_returns: Vec<(String, String, String)> = Vec::new();
            let mut structured: Option<Value> = None;

            for step in turn.steps {
                match step {
                    ScriptStep::Text(chunk) => {
                        text_buf.push_str(&chunk);
                        if first_part {
                            first_part = false;
                            yield Ok(RunEvent::PartStart { text: chunk });
                        } else {
                            yield Ok(RunEvent::PartDelta { text: chunk });
                        }
                    }
                    ScriptStep::CallTool { name, arguments } => {
                        // Each tool result triggers a continuation request.
                        let requests = 1 + calls.len() as u32 + 1;
                        if let Some(limit) = req.limits.request_limit {
                            if requests > limit {
                                yield Err(Error::LimitExceeded(format!(
                                    "request limit of {limit} reached"
                                )));
                                return;
                            }
                        }
                        if let Some(limit) = req.limits.tool_calls_limit {
                            if calls.len() as u32 + 1 > limit {
                                yield Err(Error::LimitExceeded(format!(
                                    "tool call limit of {limit} reached"
                                )));
                                return;
                            }
                        }

                        let call_id = format!("call_{}", Uuid::new_v4().simple());
                        yield Ok(RunEvent::ToolCallStarted {
                            call_id: call_id.clone(),
                            tool_name: name.clone(),
                            arguments: arguments.clone(),
                        });

                        let result = invoke_request_tool(&req, &name, arguments.clone()).await;
                        let content = match &result {
                            Value::String(s) => s.clone(),
                            other => other.to_string(),
                        };
                        calls.push(ToolCall {
                            id: call_id.clone(),
                            name: name.clone(),
                            arguments,
                        });
                        tool_returns.push((call_id.clone(), name.clone(), content));

                        yield Ok(RunEvent::ToolCallCompleted {
                            call_id,
                            tool_name: name,
                            result,
                        });
                    }
                    ScriptStep::Structured(value) => {
                        structured = Some(value);
                    }
                }
            }

            let output_text = structured
                .as_ref()
                .map(|v| v.to_string())
                .unwrap_or_else(|| text_buf.clone());
            let usage = Usage {
                input_tokens: input_tokens(&req),
                output_tokens: estimate_tokens(&output_text),
                total_tokens: input_tokens(&req) + estimate_tokens(&output_text),
            };
            if let Some(limit) = req.limits.total_tokens_limit {
                if usage.total_tokens > limit {
                    yield Err(Error::LimitExceeded(format!(
                        "token budget of {limit} exceeded ({} used)",
                        usage.total_tokens
                    )));
                    return;
                }
            }

            // Runtime-native transcript: history, the user prompt, the
            // assistant exchange (with any tool calls), tool returns, and
            // the final assistant content.
            let mut messages = req.history.clone();
            messages.push(Message::user(req.prompt.clone()));
            if calls.is_empty() {
                messages.push(Message::assistant(text_buf.clone()));
            } else {
                messages.push(Message::assistant_with_calls("", &calls));
                for (call_id, tool_name, content) in &tool_returns {
                    messages.push(Message::tool_return(
                        call_id.clone(),
                        tool_name.clone(),
                        content.clone(),
                    ));
                }
                messages.push(Message::assistant(text_buf.clone()));
            }

            let output = match structured {
                Some(value) => RunOutput::Structured(value),
                None => RunOutput::Text(text_buf.clone()),
            };

            yield Ok(RunEvent::Completed(RunCompletion {
                output,
                text: text_buf,
                usage,
                messages,
            }));
        };

        Ok(Box::pin(stream))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use lucid_domain::limits::UsageLimits;
    use lucid_tools::{FnTool, Tool};

    fn echo_tool() -> Arc<dyn Tool> {
        Arc::new(FnTool::new(
            "search",
            "test search",
            serde_json::json!({"type": "object"}),
            |_args, _ctx| async move { serde_json::json!("found 3") },
        ))
    }

    #[tokio::test]
    async fn streams_text_as_part_events() {
        let model = ScriptedModel::new();
        model.push_turn(ScriptedTurn::new().text("hel").text("lo"));

        let mut stream = model.iter(RunRequest::new("echo", "hello")).await.unwrap();
        let mut texts = Vec::new();
        while let Some(event) = stream.next().await {
            match event.unwrap() {
                RunEvent::PartStart { text } | RunEvent::PartDelta { text } => texts.push(text),
                RunEvent::Completed(completion) => {
                    assert_eq!(completion.text, "hello");
                    assert_eq!(completion.output, RunOutput::Text("hello".into()));
                }
                other => panic!("unexpected event: {other:?}"),
            }
        }
        assert_eq!(texts, ["hel", "lo"]);
    }

    #[tokio::test]
    async fn tool_steps_invoke_real_tools() {
        let model = ScriptedModel::new();
        model.push_turn(
            ScriptedTurn::new()
                .call("search", serde_json::json!({"q": "x"}))
                .text("ok"),
        );

        let mut req = RunRequest::new("agent", "find x");
        req.tools.push(echo_tool());

        let mut stream = model.iter(req).await.unwrap();
        let mut saw_result = false;
        while let Some(event) = stream.next().await {
            match event.unwrap() {
                RunEvent::ToolCallCompleted { result, .. } => {
                    saw_result = true;
                    assert_eq!(result, serde_json::json!("found 3"));
                }
                RunEvent::Completed(completion) => {
                    // Transcript carries the call and the return.
                    let has_return = completion.messages.iter().any(|m| {
                        m.content.text().contains("found 3")
                            || !m.content.tool_calls().is_empty()
                    });
                    assert!(has_return);
                }
                _ => {}
            }
        }
        assert!(saw_result);
    }

    #[tokio::test]
    async fn unknown_tool_yields_structured_error() {
        let model = ScriptedModel::new();
        model.push_turn(ScriptedTurn::new().call("ghost", serde_json::json!({})).text("ok"));

        let mut stream = model.iter(RunRequest::new("agent", "go")).await.unwrap();
        let mut error_result = None;
        while let Some(event) = stream.next().await {
            if let RunEvent::ToolCallCompleted { result, .. } = event.unwrap() {
                error_result = Some(result);
            }
        }
        assert_eq!(error_result.unwrap()["status"], "error");
    }

    #[tokio::test]
    async fn tool_call_limit_enforced() {
        let model = ScriptedModel::new();
        model.push_turn(
            ScriptedTurn::new()
                .call("search", serde_json::json!({}))
                .call("search", serde_json::json!({}))
                .text("done"),
        );

        let mut req = RunRequest::new("agent", "go");
        req.tools.push(echo_tool());
        req.limits = UsageLimits {
            tool_calls_limit: Some(1),
            ..Default::default()
        };

        let mut stream = model.iter(req).await.unwrap();
        let mut limit_hit = false;
        while let Some(event) = stream.next().await {
            if let Err(Error::LimitExceeded(_)) = event {
                limit_hit = true;
                break;
            }
        }
        assert!(limit_hit);
    }

    #[tokio::test]
    async fn token_budget_enforced() {
        let model = ScriptedModel::new();
        model.push_turn(ScriptedTurn::new().text("a very long answer indeed"));

        let mut req = RunRequest::new("agent", "go");
        req.limits = UsageLimits {
            total_tokens_limit: Some(1),
            ..Default::default()
        };

        let mut stream = model.iter(req).await.unwrap();
        let mut limit_hit = false;
        while let Some(event) = stream.next().await {
            if let Err(Error::LimitExceeded(_)) = event {
                limit_hit = true;
            }
        }
        assert!(limit_hit);
    }

    #[tokio::test]
    async fn run_collects_completion() {
        let model = ScriptedModel::new();
        model.push_turn(ScriptedTurn::new().structured(serde_json::json!({"k": "v"})));

        let completion = model.run(RunRequest::new("agent", "go")).await.unwrap();
        assert_eq!(
            completion.output,
            RunOutput::Structured(serde_json::json!({"k": "v"}))
        );
    }

    #[tokio::test]
    async fn exhausted_script_is_model_error() {
        let model = ScriptedModel::new();
        let err = model.run(RunRequest::new("agent", "go")).await.unwrap_err();
        assert!(matches!(err, Error::Model(_)));
    }
}
