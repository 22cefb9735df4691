//! Runtime configuration, loadable from a TOML file.
//!
//! Every section and field has a default so an empty file (or no file) is a
//! valid configuration.

use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Top-level config
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub registry: RegistryConfig,
    #[serde(default)]
    pub history: HistoryConfig,
    #[serde(default)]
    pub summarizer: SummarizerConfig,
    #[serde(default)]
    pub delegation: DelegationConfig,
    #[serde(default)]
    pub routing: RoutingConfig,
    #[serde(default)]
    pub turn: TurnConfig,
}

impl Config {
    /// Parse a TOML configuration string.
    pub fn from_toml_str(raw: &str) -> crate::Result<Self> {
        toml::from_str(raw).map_err(|e| crate::Error::Config(e.to_string()))
    }

    /// Load from a TOML file. A missing file yields the defaults.
    pub fn load(path: &std::path::Path) -> crate::Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let raw = std::fs::read_to_string(path)?;
        Self::from_toml_str(&raw)
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Sections
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Agent registry: schema directory and cache behaviour.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistryConfig {
    /// Directory scanned (once, lazily) for `*.yaml` / `*.yml` agent documents.
    #[serde(default = "d_schema_dir")]
    pub schema_dir: String,
    /// Compiled-schema cache TTL in seconds.
    #[serde(default = "d_cache_ttl_secs")]
    pub cache_ttl_secs: u64,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            schema_dir: d_schema_dir(),
            cache_ttl_secs: d_cache_ttl_secs(),
        }
    }
}

fn d_schema_dir() -> String {
    "schemas".into()
}
fn d_cache_ttl_secs() -> u64 {
    300
}

/// Message history loading.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryConfig {
    /// Token budget for history reconstruction from message rows.
    #[serde(default = "d_token_budget")]
    pub token_budget: u32,
    /// How many recent session moments to prepend on the fast path.
    #[serde(default = "d_moment_limit")]
    pub moment_limit: usize,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            token_budget: d_token_budget(),
            moment_limit: d_moment_limit(),
        }
    }
}

fn d_token_budget() -> u32 {
    8000
}
fn d_moment_limit() -> usize {
    3
}

/// Background session summarisation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SummarizerConfig {
    /// Run the summariser after each persisted turn.
    #[serde(default = "d_true")]
    pub auto: bool,
    /// Minimum token volume of unsummarised messages before a moment is built.
    #[serde(default = "d_moment_threshold")]
    pub moment_threshold_tokens: u32,
}

impl Default for SummarizerConfig {
    fn default() -> Self {
        Self {
            auto: d_true(),
            moment_threshold_tokens: d_moment_threshold(),
        }
    }
}

fn d_moment_threshold() -> u32 {
    6000
}

/// Parent/child delegation streaming.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DelegationConfig {
    /// Bounded child-event queue capacity. Producers block when full.
    #[serde(default = "d_queue_capacity")]
    pub queue_capacity: usize,
}

impl Default for DelegationConfig {
    fn default() -> Self {
        Self {
            queue_capacity: d_queue_capacity(),
        }
    }
}

fn d_queue_capacity() -> usize {
    128
}

/// Message routing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoutingConfig {
    /// Agent used when no classification picks another.
    #[serde(default = "d_fallback_agent")]
    pub fallback_agent: String,
    /// Turns an agent may hold a session before re-classification.
    #[serde(default = "d_max_turns")]
    pub max_turns: u32,
}

impl Default for RoutingConfig {
    fn default() -> Self {
        Self {
            fallback_agent: d_fallback_agent(),
            max_turns: d_max_turns(),
        }
    }
}

fn d_fallback_agent() -> String {
    "general".into()
}
fn d_max_turns() -> u32 {
    20
}

/// Turn execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TurnConfig {
    /// Wall-clock deadline per turn, in seconds. 0 disables the deadline.
    #[serde(default = "d_deadline_secs")]
    pub deadline_secs: u64,
    /// Model used when an agent schema declares none.
    #[serde(default = "d_default_model")]
    pub default_model: String,
}

impl Default for TurnConfig {
    fn default() -> Self {
        Self {
            deadline_secs: d_deadline_secs(),
            default_model: d_default_model(),
        }
    }
}

fn d_deadline_secs() -> u64 {
    120
}
fn d_default_model() -> String {
    "openai:gpt-4.1-mini".into()
}

fn d_true() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_toml_gives_defaults() {
        let config = Config::from_toml_str("").unwrap();
        assert_eq!(config.registry.cache_ttl_secs, 300);
        assert_eq!(config.history.moment_limit, 3);
        assert_eq!(config.delegation.queue_capacity, 128);
        assert_eq!(config.routing.fallback_agent, "general");
        assert!(config.summarizer.auto);
    }

    #[test]
    fn partial_section_overrides() {
        let config = Config::from_toml_str(
            r#"
            [routing]
            fallback_agent = "concierge"

            [delegation]
            queue_capacity = 64
            "#,
        )
        .unwrap();
        assert_eq!(config.routing.fallback_agent, "concierge");
        assert_eq!(config.routing.max_turns, 20);
        assert_eq!(config.delegation.queue_capacity, 64);
    }

    #[test]
    fn invalid_toml_is_a_config_error() {
        let err = Config::from_toml_str("routing = nonsense").unwrap_err();
        assert!(matches!(err, crate::Error::Config(_)));
    }
}
