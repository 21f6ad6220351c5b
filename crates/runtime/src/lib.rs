//! # ApexClaw Runtime
//!
//! Wires the agent, the heartbeat scheduler and the built-in tools into a
//! single [`Runtime`] value built at startup and passed explicitly.
//!
//! - [`Runtime::dispatch`] is the glue between a chat transport and the
//!   sender's session: it records the sender's context, runs the session,
//!   drops control chunks, delivers the reply and clears live progress.
//! - The runtime is also the scheduler's [`TaskRunner`]: a fired task runs
//!   its prompt in a fresh session keyed by the firing, never the sender's
//!   interactive one.
//!
//! [`TaskRunner`]: apexclaw_workflow::TaskRunner

pub mod inbound;
pub mod runtime;
pub mod tools;

pub use inbound::{DispatchOutcome, InboundMessage};
pub use runtime::Runtime;
