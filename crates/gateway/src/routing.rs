//! Lazy message routing.
//!
//! The active agent persists across turns until it completes or crosses its
//! turn budget; classification only happens on session start, completion,
//! or re-evaluation. The routing table lives in `session.metadata.routing`.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use lucid_domain::config::RoutingConfig;
use lucid_store::MessageRow;

use crate::registry::AgentCatalogueEntry;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Routing state
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// The routing table stored in session metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoutingState {
    #[serde(default)]
    pub active_agent: Option<String>,
    /// idle | executing | complete | re-evaluate | escalated
    #[serde(default = "d_idle")]
    pub state: String,
    #[serde(default = "d_target")]
    pub target: String,
    #[serde(default)]
    pub turn_count: u32,
    #[serde(default = "d_max_turns")]
    pub max_turns: u32,
    #[serde(default = "d_fallback")]
    pub fallback: String,
    #[serde(default)]
    pub escalation: Option<String>,
    #[serde(default = "default_transitions")]
    pub transitions: Value,
}

fn d_idle() -> String {
    "idle".into()
}
fn d_target() -> String {
    "complete".into()
}
fn d_max_turns() -> u32 {
    20
}
fn d_fallback() -> String {
    "general".into()
}

fn default_transitions() -> Value {
    serde_json::json!({
        "executing": {
            "on_complete": "idle",
            "on_escalate": "escalated",
            "on_max_turns": "re-evaluate",
        },
        "idle": {"on_message": "executing"},
        "escalated": {"on_resolve": "idle"},
    })
}

impl Default for RoutingState {
    fn default() -> Self {
        serde_json::from_value(serde_json::json!({})).expect("defaults deserialize")
    }
}

impl RoutingState {
    /// Parse from session metadata, falling back to configured defaults.
    pub fn from_metadata(metadata: &Value, config: &RoutingConfig) -> Self {
        let mut state: Self = metadata
            .get("routing")
            .cloned()
            .and_then(|v| serde_json::from_value(v).ok())
            .unwrap_or_default();
        if metadata.get("routing").is_none() {
            state.fallback = config.fallback_agent.clone();
            state.max_turns = config.max_turns;
        }
        state
    }

    /// Serialize into the metadata's `routing` key.
    pub fn write_to(&self, metadata: &mut Value) {
        if !metadata.is_object() {
            *metadata = Value::Object(serde_json::Map::new());
        }
        metadata
            .as_object_mut()
            .expect("metadata is an object")
            .insert(
                "routing".into(),
                serde_json::to_value(self).expect("routing state serializes"),
            );
    }

    /// Whether the next message needs classification.
    pub fn should_reclassify(&self) -> bool {
        match self.state.as_str() {
            "idle" | "re-evaluate" => true,
            "executing" => self.turn_count >= self.max_turns,
            _ => false,
        }
    }

    /// Enter `executing` with the given agent; resets the turn count.
    pub fn activate(&mut self, agent_name: &str, max_turns: Option<u32>) {
        self.active_agent = Some(agent_name.to_owned());
        self.state = "executing".into();
        self.turn_count = 0;
        if let Some(max_turns) = max_turns {
            self.max_turns = max_turns;
        }
    }

    /// Count a turn; crossing the budget forces re-evaluation next message.
    pub fn increment_turn(&mut self) {
        self.turn_count += 1;
        if self.turn_count >= self.max_turns {
            self.state = "re-evaluate".into();
        }
    }

    /// The active agent signalled completion.
    pub fn complete(&mut self) {
        self.state = "idle".into();
        self.active_agent = Some(self.fallback.clone());
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Classifier
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Picks the agent handling the next message. Stateless and side-effect
/// free; swappable (rule-based, trained, or model-backed).
#[async_trait]
pub trait Classifier: Send + Sync {
    async fn classify(
        &self,
        message: &str,
        profile: &Value,
        history: &[MessageRow],
        routing: &RoutingState,
        catalogue: &[AgentCatalogueEntry],
    ) -> String;
}

/// Placeholder classifier: always routes to the fallback agent.
pub struct DefaultClassifier;

#[async_trait]
impl Classifier for DefaultClassifier {
    async fn classify(
        &self,
        _message: &str,
        _profile: &Value,
        _history: &[MessageRow],
        routing: &RoutingState,
        _catalogue: &[AgentCatalogueEntry],
    ) -> String {
        routing.fallback.clone()
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Router
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Lazy router with a pluggable classifier.
pub struct Router {
    classifier: Box<dyn Classifier>,
    config: RoutingConfig,
}

impl Router {
    pub fn new(config: RoutingConfig) -> Self {
        Self {
            classifier: Box::new(DefaultClassifier),
            config,
        }
    }

    pub fn with_classifier(mut self, classifier: Box<dyn Classifier>) -> Self {
        self.classifier = classifier;
        self
    }

    /// Determine which agent handles the next message, updating the
    /// routing table in `metadata` in place.
    pub async fn route(
        &self,
        metadata: &mut Value,
        message: &str,
        profile: &Value,
        history: &[MessageRow],
        catalogue: &[AgentCatalogueEntry],
    ) -> String {
        let mut routing = RoutingState::from_metadata(metadata, &self.config);

        // Lazy path: keep the current agent while it is executing and
        // under its turn budget.
        if !routing.should_reclassify() {
            if let Some(active) = routing.active_agent.clone() {
                routing.increment_turn();
                routing.write_to(metadata);
                return active;
            }
        }

        let agent_name = self
            .classifier
            .classify(message, profile, history, &routing, catalogue)
            .await;
        routing.activate(&agent_name, None);
        routing.write_to(metadata);
        agent_name
    }
}
