//! Declarative agent schemas.
//!
//! An agent is a flat document: JSON-Schema fields (`type`, `description`,
//! `properties`, `required`) plus runtime config (`name`, `tools`, `model`,
//! `temperature`, `limits`, `structured_output`, `chained_tool`, ...).
//! Documents live in YAML files, store rows, or code-defined built-ins, and
//! compile into an immutable [`AgentSchema`] shared by reference out of the
//! registry cache.

pub mod builtin;
pub mod compile;
pub mod document;

pub use compile::AgentSchema;
pub use document::{AgentDocument, PropertySpec, ToolRef};
