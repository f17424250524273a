//! Tool registry — central index of client-side tools.
//!
//! The [`ToolRegistry`] maps tool names to [`AgentTool`] implementations.
//! The run state machine queries `contains` to classify a streamed tool
//! call as client-side, and the session loop dispatches execution through
//! `execute`. Registries are immutable once resolved for a room, so they
//! are shared freely across concurrent sessions.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;

use drover_core::ids::RoomId;

use crate::errors::ToolError;

/// A client-side tool the backend can request during a run.
///
/// Implementors must be `Send + Sync`; executors are invoked from multiple
/// sessions concurrently and are expected to observe cancellation at the
/// host level (the runtime never forcibly unwinds one).
#[async_trait]
pub trait AgentTool: Send + Sync {
    /// Tool name as the backend refers to it.
    fn name(&self) -> &str;

    /// Execute the tool with the backend-supplied arguments.
    ///
    /// Returns the result text submitted back to the backend.
    async fn execute(&self, arguments: &Value) -> Result<String, ToolError>;
}

/// Factory resolving the tool registry for a room.
///
/// Injected into the coordinator so each room can expose its own tool set.
pub type RegistryResolver = Arc<dyn Fn(&RoomId) -> Arc<ToolRegistry> + Send + Sync>;

/// Central registry mapping tool names to their implementations.
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn AgentTool>>,
}

impl ToolRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            tools: HashMap::new(),
        }
    }

    /// Register a tool. Overwrites any existing tool with the same name.
    pub fn register(&mut self, tool: Arc<dyn AgentTool>) {
        debug!(tool_name = tool.name(), "tool registered");
        let _ = self.tools.insert(tool.name().to_owned(), tool);
    }

    /// Look up a tool by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<Arc<dyn AgentTool>> {
        self.tools.get(name).cloned()
    }

    /// Whether a tool with the given name is registered.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    /// All tool names, sorted alphabetically.
    #[must_use]
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tools.keys().cloned().collect();
        names.sort();
        names
    }

    /// Number of registered tools.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tools.len()
    }

    /// Whether the registry is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Dispatch one tool call by name.
    pub async fn execute(&self, name: &str, arguments: &Value) -> Result<String, ToolError> {
        let tool = self.get(name).ok_or_else(|| ToolError::UnknownTool {
            name: name.to_owned(),
        })?;
        tool.execute(arguments).await
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
