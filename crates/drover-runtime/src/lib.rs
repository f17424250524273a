//! # drover-runtime
//!
//! The session orchestration layer: drives one network-streamed backend
//! interaction to a terminal outcome (including client-executed tool calls
//! requested mid-turn) and coordinates many such interactions concurrently
//! under platform-specific concurrency constraints.
//!
//! Layered bottom-up:
//!
//! - [`classify`]: pure mapping from transport errors to the closed
//!   [`drover_core::FailureReason`] taxonomy
//! - [`orchestrator::RunOrchestrator`]: the single-run state machine —
//!   folds stream events into a [`drover_core::Conversation`], detects
//!   tool yields, and resumes runs with tool results
//! - [`session::AgentSession`]: wraps one orchestrator and fully automates
//!   the tool-call loop, producing one cached [`state::AgentResult`]
//! - [`runtime::AgentRuntime`]: the facade — spawns sessions, enforces the
//!   platform re-entrancy guard and concurrency ceiling, joins/races
//!   session sets, and cleans up ephemeral backend threads
//!
//! The runtime only ever *emits* state — through `watch` snapshots and
//! `broadcast` tails — and never calls back into caller-owned logic.

#![deny(unsafe_code)]

pub mod classify;
pub mod emitter;
pub mod errors;
pub mod orchestrator;
pub mod platform;
pub mod runtime;
pub mod session;
pub mod state;

#[cfg(test)]
mod test_support;

pub use classify::classify;
pub use errors::{OrchestratorError, RuntimeError};
pub use orchestrator::{RunOrchestrator, MAX_TOOL_DEPTH};
pub use platform::PlatformCapabilities;
pub use runtime::{AgentRuntime, SessionNotice, SpawnOptions};
pub use session::AgentSession;
pub use state::{AgentResult, RunState, SessionState};
