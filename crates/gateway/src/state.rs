//! Shared runtime state.

use std::sync::Arc;

use lucid_domain::config::Config;
use lucid_model::ModelClient;
use lucid_store::Store;
use lucid_tools::moments::{GetMomentsTool, SaveMomentsTool};
use lucid_tools::profile::{UpdateUserMetadataTool, UserProfileTool};
use lucid_tools::ToolRegistry;

use crate::registry::AgentRegistry;
use crate::routing::Router;
use crate::runtime::cancel::CancelMap;
use crate::runtime::session_lock::SessionLockMap;

/// Everything a turn needs, cheaply cloneable.
#[derive(Clone)]
pub struct CoreState {
    pub config: Arc<Config>,
    pub store: Arc<dyn Store>,
    pub model: Arc<dyn ModelClient>,
    pub tools: Arc<ToolRegistry>,
    pub registry: Arc<AgentRegistry>,
    pub router: Arc<Router>,
    pub cancel_map: Arc<CancelMap>,
    pub session_locks: Arc<SessionLockMap>,
    /// Endpoint for tools whose provider is not local.
    pub remote_tools_url: Option<String>,
}

impl CoreState {
    /// Wire up the runtime: registry, router, locks, and the built-in
    /// memory tools registered against the store.
    pub fn new(config: Config, store: Arc<dyn Store>, model: Arc<dyn ModelClient>) -> Self {
        let tools = Arc::new(ToolRegistry::new());
        tools.register(Arc::new(UserProfileTool::new(store.clone())));
        tools.register(Arc::new(UpdateUserMetadataTool::new(store.clone())));
        tools.register(Arc::new(SaveMomentsTool::new(store.clone())));
        tools.register(Arc::new(GetMomentsTool::new(store.clone())));

        let registry = Arc::new(AgentRegistry::new(config.registry.clone(), store.clone()));
        let router = Arc::new(Router::new(config.routing.clone()));

        Self {
            config: Arc::new(config),
            store,
            model,
            tools,
            registry,
            router,
            cancel_map: Arc::new(CancelMap::new()),
            session_locks: Arc::new(SessionLockMap::new()),
            remote_tools_url: None,
        }
    }

    pub fn with_remote_tools_url(mut self, url: impl Into<String>) -> Self {
        self.remote_tools_url = Some(url.into());
        self
    }

    pub fn with_router(mut self, router: Router) -> Self {
        self.router = Arc::new(router);
        self
    }
}
