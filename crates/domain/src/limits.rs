use serde::{Deserialize, Serialize};

/// Usage limits declared on an agent and enforced by the model runtime.
///
/// `None` means unlimited for that dimension.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageLimits {
    /// Maximum model requests per turn (one initial request plus one per
    /// tool-result continuation).
    #[serde(default)]
    pub request_limit: Option<u32>,
    /// Maximum tool invocations per turn.
    #[serde(default)]
    pub tool_calls_limit: Option<u32>,
    /// Total token budget (input + output) per turn.
    #[serde(default)]
    pub total_tokens_limit: Option<u32>,
}

impl UsageLimits {
    pub fn is_unlimited(&self) -> bool {
        self.request_limit.is_none()
            && self.tool_calls_limit.is_none()
            && self.total_tokens_limit.is_none()
    }
}
