//! The ApexClaw agent loop.
//!
//! An `AgentSession` holds one conversation's history and runs the bounded
//! model ⇄ tool loop: the model asks for a tool with a `<tool_call>` span,
//! the session executes it (subject to owner-only restrictions) and feeds
//! the result back, until the model answers in plain text or the iteration
//! budget runs out.
//!
//! Sessions are created on demand by the `SessionRegistry`, one per key.
//! Long-running tools report status through the `ProgressSink`.

pub mod markers;
pub mod parser;
pub mod progress;
pub mod prompt;
pub mod registry;
pub mod session;

#[cfg(test)]
mod test_helpers;

pub use markers::{ProgressUpdate, StreamMarker, is_control_chunk};
pub use parser::{ParsedToolCall, clean_reply, format_tool_call, parse_tool_call};
pub use progress::{ProgressSink, ProgressState};
pub use registry::{SessionFactory, SessionRegistry};
pub use session::{
    AgentSession, ChunkCallback, MAX_ITERATIONS_PREFIX, MAX_ITERATIONS_REPLY, SessionSettings,
};
