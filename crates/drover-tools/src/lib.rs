//! # drover-tools
//!
//! Tool execution for the Drover session runtime: the [`AgentTool`] trait,
//! the [`ToolRegistry`] that maps tool names to implementations, and the
//! room-scoped [`RegistryResolver`] injected into the coordinator so
//! different rooms can expose different tool sets.

#![deny(unsafe_code)]

pub mod errors;
pub mod registry;

pub use errors::ToolError;
pub use registry::{AgentTool, RegistryResolver, ToolRegistry};
