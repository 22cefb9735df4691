//! Shared fixtures for the gateway integration tests.

use std::sync::Arc;

use lucid_domain::config::Config;
use lucid_gateway::registry::row_from_document;
use lucid_gateway::CoreState;
use lucid_model::ScriptedModel;
use lucid_schema::AgentDocument;
use lucid_store::{MemStore, Store};

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_test_writer()
        .try_init();
}

/// A fresh runtime over an in-memory store and a scripted model.
///
/// The summariser is disabled so test scripts stay deterministic, and the
/// deadline is generous enough to never fire in CI.
pub fn test_state(model: Arc<ScriptedModel>) -> (CoreState, Arc<MemStore>) {
    init_tracing();
    let mut config = Config::default();
    config.summarizer.auto = false;
    config.turn.deadline_secs = 30;
    let store = Arc::new(MemStore::new());
    let state = CoreState::new(config, store.clone(), model);
    (state, store)
}

/// Register an agent document in the store (the authoritative source).
pub async fn register_agent(state: &CoreState, doc: serde_json::Value) {
    let doc = AgentDocument::from_value(doc).expect("test agent document is valid");
    state
        .store
        .upsert_schema(row_from_document(&doc))
        .await
        .expect("upsert test agent");
}
