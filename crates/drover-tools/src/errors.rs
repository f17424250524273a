//! Tool execution error types.

/// Errors raised while dispatching or executing a tool.
#[derive(Debug, thiserror::Error)]
pub enum ToolError {
    /// No tool with the requested name is registered.
    #[error("Unknown tool: {name}")]
    UnknownTool {
        /// Requested tool name.
        name: String,
    },

    /// The tool rejected its arguments.
    #[error("Invalid arguments for {name}: {message}")]
    InvalidArguments {
        /// Tool name.
        name: String,
        /// Rejection description.
        message: String,
    },

    /// The tool ran and failed.
    #[error("Tool {name} failed: {message}")]
    Execution {
        /// Tool name.
        name: String,
        /// Failure description.
        message: String,
    },
}
