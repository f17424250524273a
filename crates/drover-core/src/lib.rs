//! # drover-core
//!
//! Foundation types for the Drover agent-session runtime.
//!
//! This crate provides the shared vocabulary that the client, tools, and
//! runtime crates depend on:
//!
//! - **Branded IDs**: `ServerId`, `RoomId`, `ThreadId`, `RunId` newtypes,
//!   plus the composite [`ids::ThreadKey`] identifying one logical
//!   conversation across backend instances
//! - **Conversation model**: [`conversation::Conversation`] with fold
//!   operations for streamed text and tool-call accumulation
//! - **Wire events**: [`events::RunStreamEvent`] emitted by the backend
//!   run stream
//! - **Failure taxonomy**: the closed [`failure::FailureReason`] enum
//!   shared by run states and session results

#![deny(unsafe_code)]

pub mod conversation;
pub mod events;
pub mod failure;
pub mod ids;
pub mod logging;

pub use conversation::{ChatMessage, Conversation, ToolCallInfo, ToolCallStatus};
pub use events::RunStreamEvent;
pub use failure::FailureReason;
pub use ids::{RoomId, RunId, ServerId, ThreadId, ThreadKey};
