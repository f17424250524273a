//! Runtime error types.
//!
//! Two families: [`OrchestratorError`] for misuse of the single-run state
//! machine, and [`RuntimeError`] for coordinator-level failures. Both exist
//! only on the synchronous/pre-stream path — failures during streaming are
//! data, captured into run states and session results, never thrown across
//! the session boundary.

use drover_client::ClientError;
use drover_core::ids::ThreadKey;

/// Errors raised by [`crate::orchestrator::RunOrchestrator`] method calls.
#[derive(Debug, thiserror::Error)]
pub enum OrchestratorError {
    /// `start_run` called while a run is `Running` or `ToolYielding`.
    #[error("a run is already active; cancel or reset it before starting another")]
    RunActive,

    /// `start_run` called on a terminal orchestrator without a reset.
    #[error("previous run reached a terminal state; reset before starting another")]
    RunFinished,

    /// `submit_tool_outputs` called while not in `ToolYielding`.
    #[error("no run is awaiting tool results")]
    NotToolYielding,

    /// Method called after `dispose`.
    #[error("orchestrator has been disposed")]
    Disposed,

    /// Transport failure before streaming began (run creation).
    #[error(transparent)]
    Client(#[from] ClientError),
}

/// Errors raised by [`crate::runtime::AgentRuntime`] method calls.
#[derive(Debug, thiserror::Error)]
pub enum RuntimeError {
    /// Method called after `dispose`.
    #[error("runtime has been disposed")]
    Disposed,

    /// Platform re-entrancy guard refused a concurrent spawn.
    #[error(
        "platform execution context is non-reentrant: session {active} is still active and must \
         finish before another can be spawned"
    )]
    NonReentrant {
        /// The session currently holding the execution context.
        active: ThreadKey,
    },

    /// Global concurrency ceiling reached.
    #[error("concurrent session limit reached ({limit})")]
    SessionLimit {
        /// The configured ceiling.
        limit: usize,
    },

    /// Transport failure on the spawn path (thread creation).
    #[error(transparent)]
    Client(#[from] ClientError),

    /// State-machine failure on the spawn path.
    #[error(transparent)]
    Orchestrator(#[from] OrchestratorError),
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
