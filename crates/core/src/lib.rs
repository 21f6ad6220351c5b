//! # ApexClaw Core
//!
//! Domain types, traits, and error definitions for the ApexClaw personal
//! assistant. Every other crate depends inward on this one.
//!
//! ## Design Philosophy
//!
//! Each collaborator of the agent loop is defined here as a trait or a plain
//! value type; implementations live in their respective crates. This enables:
//! - Swapping the model client or chat transport at startup
//! - Easy testing with scripted fakes
//! - Clean dependency graph (all crates depend inward on core)

pub mod context;
pub mod error;
pub mod message;
pub mod messaging;
pub mod provider;
pub mod run_context;
pub mod tool;

// Re-export key types at crate root for ergonomics
pub use context::{ContextMap, ContextStore};
pub use error::{Error, Result};
pub use message::{Message, Role};
pub use messaging::{MessagingOps, NullMessaging};
pub use provider::{FileAttachment, LlmClient};
pub use run_context::RunContext;
pub use tool::{Executor, ToolArg, ToolArgs, ToolDef, ToolRegistry};
