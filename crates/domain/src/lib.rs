//! Shared types for the lucid runtime: conversation messages, streaming
//! events, usage limits, configuration, and the common error taxonomy.

pub mod config;
pub mod error;
pub mod limits;
pub mod message;
pub mod stream;

pub use error::{Error, Result};
