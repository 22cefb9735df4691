//! Compilation of an [`AgentDocument`] into the immutable runtime form.

use serde_json::Value;

use lucid_domain::limits::UsageLimits;
use lucid_domain::stream::OutputSpec;
use lucid_domain::{Error, Result};

use crate::document::{AgentDocument, PropertySpec, ToolRef};

/// A compiled agent. Immutable after [`AgentSchema::build`]; the registry
/// shares instances as `Arc<AgentSchema>`.
#[derive(Debug, Clone)]
pub struct AgentSchema {
    pub name: String,
    pub description: String,
    pub system_prompt: String,
    pub properties: serde_json::Map<String, Value>,
    pub required: Vec<String>,
    pub tools: Vec<ToolRef>,
    pub structured_output: bool,
    pub chained_tool: Option<String>,
    pub model: Option<String>,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
    pub limits: UsageLimits,
    pub routing_enabled: bool,
    pub routing_max_turns: u32,
    pub observation_mode: String,
}

impl AgentSchema {
    /// Validate a document and produce the compiled schema.
    ///
    /// Checks: tool names unique, required properties declared. Tool entries
    /// are normalised into the `{name, provider, description}` shape.
    pub fn build(doc: AgentDocument) -> Result<Self> {
        let tools: Vec<ToolRef> = doc.tools.into_iter().map(|t| t.into_ref()).collect();

        let mut seen = std::collections::HashSet::new();
        for tool in &tools {
            if !seen.insert(tool.name.as_str()) {
                return Err(Error::InvalidSchema(format!(
                    "agent '{}' declares tool '{}' more than once",
                    doc.name, tool.name
                )));
            }
        }

        for field in &doc.required {
            if !doc.properties.contains_key(field) {
                return Err(Error::InvalidSchema(format!(
                    "agent '{}' requires undeclared property '{}'",
                    doc.name, field
                )));
            }
        }

        Ok(Self {
            name: doc.name,
            description: doc.description,
            system_prompt: doc.system_prompt,
            properties: doc.properties,
            required: doc.required,
            tools,
            structured_output: doc.structured_output,
            chained_tool: doc.chained_tool,
            model: doc.model,
            temperature: doc.temperature,
            max_tokens: doc.max_tokens,
            limits: doc.limits,
            routing_enabled: doc.routing_enabled,
            routing_max_turns: doc.routing_max_turns,
            observation_mode: doc.observation_mode,
        })
    }

    /// Reconstruct the flat document (for store upserts and round-trips).
    pub fn document(&self) -> AgentDocument {
        AgentDocument {
            name: self.name.clone(),
            kind: "agent".into(),
            description: self.description.clone(),
            system_prompt: self.system_prompt.clone(),
            properties: self.properties.clone(),
            required: self.required.clone(),
            tools: self
                .tools
                .iter()
                .cloned()
                .map(crate::document::ToolEntry::Full)
                .collect(),
            structured_output: self.structured_output,
            chained_tool: self.chained_tool.clone(),
            model: self.model.clone(),
            temperature: self.temperature,
            max_tokens: self.max_tokens,
            limits: self.limits.clone(),
            routing_enabled: self.routing_enabled,
            routing_max_turns: self.routing_max_turns,
            observation_mode: self.observation_mode.clone(),
        }
    }

    /// The full system prompt sent to the model.
    ///
    /// Concatenates the instruction text, a "Tool Notes" section listing
    /// per-agent description suffixes (only for tools that supply one), and
    /// a "Thinking Structure" section listing the declared properties when
    /// the agent is conversational.
    pub fn compile_system_prompt(&self) -> String {
        let mut prompt = if self.system_prompt.is_empty() {
            self.description.clone()
        } else {
            self.system_prompt.clone()
        };

        let notes: Vec<String> = self
            .tools
            .iter()
            .filter_map(|t| {
                t.description
                    .as_ref()
                    .map(|d| format!("- {}: {}", t.name, d))
            })
            .collect();
        if !notes.is_empty() {
            prompt.push_str("\n\n## Tool Notes\n");
            prompt.push_str(&notes.join("\n"));
        }

        if !self.structured_output && !self.properties.is_empty() {
            prompt.push_str(
                "\n\n## Thinking Structure\n\
                 Track these internally while forming your response; \
                 they are not part of your reply:\n",
            );
            let lines: Vec<String> = self
                .properties
                .iter()
                .map(|(field, value)| {
                    let spec = PropertySpec::from_value(value);
                    let field_type = spec.field_type.unwrap_or_else(|| "string".into());
                    match spec.description {
                        Some(desc) if !desc.is_empty() => {
                            format!("- {field} ({field_type}): {desc}")
                        }
                        _ => format!("- {field} ({field_type})"),
                    }
                })
                .collect();
            prompt.push_str(&lines.join("\n"));
        }

        prompt
    }

    /// The output shape the model must produce.
    ///
    /// Free text unless the agent declares structured output over a
    /// non-empty property set.
    pub fn compile_output_type(&self) -> OutputSpec {
        if !self.structured_output || self.properties.is_empty() {
            return OutputSpec::Text;
        }
        let mut schema = serde_json::Map::new();
        schema.insert("type".into(), Value::String("object".into()));
        schema.insert("properties".into(), Value::Object(self.properties.clone()));
        if !self.required.is_empty() {
            schema.insert(
                "required".into(),
                Value::Array(
                    self.required
                        .iter()
                        .map(|r| Value::String(r.clone()))
                        .collect(),
                ),
            );
        }
        OutputSpec::Object {
            schema: Value::Object(schema),
        }
    }

    /// Usage limits handed to the model runtime.
    pub fn compile_usage_limits(&self) -> UsageLimits {
        self.limits.clone()
    }

    /// Whether a tool with this name is declared on the agent.
    pub fn declares_tool(&self, name: &str) -> bool {
        self.tools.iter().any(|t| t.name == name)
    }
}
