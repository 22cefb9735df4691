//! Model runtime boundary.
//!
//! The real platform talks to a streaming language-model runtime; the core
//! only sees the [`ModelClient`] trait. The runtime executes tools itself
//! (from the request's toolsets and delegate tools) and is responsible for
//! honouring usage limits. [`ScriptedModel`] is the test double: it replays
//! authored turns and genuinely invokes the request's tools, so tests
//! exercise real tool round trips.

pub mod client;
pub mod scripted;

pub use client::{invoke_request_tool, ModelClient, RunRequest};
pub use scripted::{ScriptStep, ScriptedModel, ScriptedTurn};
