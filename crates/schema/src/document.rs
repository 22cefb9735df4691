//! The flat agent document.
//!
//! One level, two groups of keys: JSON-Schema standard (`type`,
//! `description`, `properties`, `required`) and runtime config (`name`,
//! `tools`, `model`, `temperature`, `limits`, `structured_output`,
//! `chained_tool`, `routing_*`, `observation_mode`). Unknown keys are
//! tolerated and ignored.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use lucid_domain::limits::UsageLimits;
use lucid_domain::{Error, Result};

/// A reference to a tool the agent may use.
///
/// `provider` is the toolset alias; omit (or `"local"`) for the in-process
/// provider. `description` is an optional suffix appended to the tool's base
/// description, giving this agent context-specific guidance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolRef {
    pub name: String,
    #[serde(default, alias = "server", skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl ToolRef {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            provider: None,
            description: None,
        }
    }
}

/// A tool entry as authored: either a bare name or a full reference.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ToolEntry {
    Name(String),
    Full(ToolRef),
}

impl ToolEntry {
    pub fn into_ref(self) -> ToolRef {
        match self {
            ToolEntry::Name(name) => ToolRef::named(name),
            ToolEntry::Full(r) => r,
        }
    }
}

/// A typed view over one property declaration. Used when rendering the
/// thinking-structure prompt section; the raw declaration is kept verbatim
/// for output schemas.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PropertySpec {
    #[serde(rename = "type", default)]
    pub field_type: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

impl PropertySpec {
    pub fn from_value(value: &Value) -> Self {
        serde_json::from_value(value.clone()).unwrap_or_default()
    }
}

/// The flat declarative agent document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentDocument {
    pub name: String,
    #[serde(default = "d_kind")]
    pub kind: String,
    /// Short blurb used for discovery (and as the prompt when no
    /// `system_prompt` is given).
    #[serde(default)]
    pub description: String,
    /// Primary instruction text.
    #[serde(default, alias = "content")]
    pub system_prompt: String,
    /// Field declarations. Conversational agents treat them as thinking
    /// aides; structured agents as the required output shape.
    #[serde(default)]
    pub properties: serde_json::Map<String, Value>,
    #[serde(default)]
    pub required: Vec<String>,
    #[serde(default)]
    pub tools: Vec<ToolEntry>,
    #[serde(default)]
    pub structured_output: bool,
    /// Tool invoked automatically with the structured output as arguments.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chained_tool: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    #[serde(default)]
    pub limits: UsageLimits,
    #[serde(default = "d_true")]
    pub routing_enabled: bool,
    #[serde(default = "d_routing_max_turns")]
    pub routing_max_turns: u32,
    #[serde(default = "d_observation_mode")]
    pub observation_mode: String,
}

fn d_kind() -> String {
    "agent".into()
}
fn d_true() -> bool {
    true
}
fn d_routing_max_turns() -> u32 {
    20
}
fn d_observation_mode() -> String {
    "sync".into()
}

impl AgentDocument {
    /// Minimal document with a name and prompt; everything else defaulted.
    pub fn new(name: impl Into<String>, system_prompt: impl Into<String>) -> Self {
        let name: String = name.into();
        let system_prompt: String = system_prompt.into();
        serde_json::from_value(serde_json::json!({
            "name": name,
            "system_prompt": system_prompt,
        }))
        .expect("minimal document is valid")
    }

    /// Parse from a JSON value (e.g. a store row's `json_schema` column).
    pub fn from_value(value: Value) -> Result<Self> {
        serde_json::from_value(value).map_err(|e| Error::InvalidSchema(e.to_string()))
    }

    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).expect("document serializes")
    }

    /// Parse from YAML text.
    pub fn from_yaml_str(raw: &str) -> Result<Self> {
        serde_yaml::from_str(raw).map_err(|e| Error::InvalidSchema(e.to_string()))
    }

    pub fn to_yaml(&self) -> Result<String> {
        serde_yaml::to_string(self).map_err(|e| Error::InvalidSchema(e.to_string()))
    }

    /// Load from an on-disk document, dispatching on extension
    /// (`.yaml` / `.yml` / `.json`).
    pub fn from_path(path: &std::path::Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        match path.extension().and_then(|e| e.to_str()) {
            Some("json") => {
                let value: Value = serde_json::from_str(&raw)?;
                Self::from_value(value)
            }
            _ => Self::from_yaml_str(&raw),
        }
    }
}
