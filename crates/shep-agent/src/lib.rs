//! # shep-agent
//!
//! Subprocess client for the external code-modification agent.
//!
//! The agent is any executable command. Per task the shepherd spawns it,
//! writes exactly one JSON object on one stdin line, and expects exactly
//! one JSON object on one stdout line within the task timeout. The
//! subprocess is always terminated before the client returns — politely
//! first, then by force — and its stderr is drained for logging.
//!
//! ## Key components
//!
//! - [`AgentClient`] — single-shot task execution over the wire protocol
//! - [`AgentResponse`] — the parsed response payload plus captured stderr
//! - [`AgentError`] — process, protocol, and timeout failures

pub mod client;
pub mod error;

pub use client::{AgentClient, AgentResponse};
pub use error::AgentError;
