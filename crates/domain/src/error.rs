/// Shared error type used across all lucid crates.
///
/// The variants mirror the runtime's failure taxonomy: schema and registry
/// errors surface to the entry point, tool errors are recorded but never
/// abort a turn, and model/limit errors abort after best-effort persistence.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("invalid agent schema: {0}")]
    InvalidSchema(String),

    #[error("agent not found: {0}")]
    AgentNotFound(String),

    #[error("tool not found: {0}")]
    ToolNotFound(String),

    #[error("usage limits exceeded: {0}")]
    LimitExceeded(String),

    #[error("model runtime: {0}")]
    Model(String),

    #[error("tool: {0}")]
    Tool(String),

    #[error("a turn is already in progress for session {0}")]
    SessionBusy(String),

    #[error("turn cancelled")]
    Cancelled,

    #[error("store: {0}")]
    Store(String),

    #[error("config: {0}")]
    Config(String),

    #[error("IO: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, Error>;
