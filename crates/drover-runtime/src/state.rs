//! Run and session state types.
//!
//! [`RunState`] is the single-run state machine's closed variant type:
//! exactly one instance is current per orchestrator, transitions are
//! strictly forward (no way back to `Idle` except an explicit reset, and
//! terminal states never transition further), and every fold republishes
//! the whole state so late subscribers only need the latest snapshot.
//!
//! [`SessionState`] is the coarser externally observable session lifecycle;
//! [`AgentResult`] is the closed three-way outcome a session caches.

use std::fmt;
use std::time::Duration;

use drover_core::conversation::{Conversation, ToolCallInfo};
use drover_core::failure::FailureReason;
use drover_core::ids::{RunId, ThreadKey};

// ─────────────────────────────────────────────────────────────────────────────
// RunState
// ─────────────────────────────────────────────────────────────────────────────

/// State of one backend run as driven by an orchestrator.
#[derive(Clone, Debug, PartialEq)]
pub enum RunState {
    /// No active run.
    Idle,

    /// Stream connected; the conversation grows as events fold in.
    Running {
        /// Conversation identity.
        key: ThreadKey,
        /// Backend run being streamed.
        run_id: RunId,
        /// Accumulated conversation snapshot.
        conversation: Conversation,
    },

    /// Backend finished its turn with at least one client-side tool call
    /// awaiting execution.
    ToolYielding {
        /// Conversation identity.
        key: ThreadKey,
        /// The finished backend run.
        run_id: RunId,
        /// Accumulated conversation snapshot.
        conversation: Conversation,
        /// Client-side calls awaiting execution.
        pending_calls: Vec<ToolCallInfo>,
        /// Completed yield/resume cycles so far.
        tool_depth: u32,
    },

    /// Terminal: backend finished with no pending client calls.
    Completed {
        /// Conversation identity.
        key: ThreadKey,
        /// The final backend run.
        run_id: RunId,
        /// Full conversation.
        conversation: Conversation,
    },

    /// Terminal: the run failed.
    Failed {
        /// Conversation identity.
        key: ThreadKey,
        /// Closed failure bucket.
        reason: FailureReason,
        /// Human-readable error.
        error: String,
        /// Partial conversation, when any accumulated.
        conversation: Option<Conversation>,
    },

    /// Terminal: caller-initiated cancellation.
    Cancelled {
        /// Conversation identity.
        key: ThreadKey,
        /// Partial conversation, preserved for diagnostics.
        conversation: Option<Conversation>,
    },
}

impl RunState {
    /// Whether a run is in flight (`Running` or `ToolYielding`).
    #[must_use]
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Running { .. } | Self::ToolYielding { .. })
    }

    /// Whether this state never transitions further.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Completed { .. } | Self::Failed { .. } | Self::Cancelled { .. }
        )
    }

    /// Thread key, absent only for `Idle`.
    #[must_use]
    pub fn key(&self) -> Option<&ThreadKey> {
        match self {
            Self::Idle => None,
            Self::Running { key, .. }
            | Self::ToolYielding { key, .. }
            | Self::Completed { key, .. }
            | Self::Failed { key, .. }
            | Self::Cancelled { key, .. } => Some(key),
        }
    }

    /// Conversation snapshot, when one has accumulated.
    #[must_use]
    pub fn conversation(&self) -> Option<&Conversation> {
        match self {
            Self::Idle => None,
            Self::Running { conversation, .. }
            | Self::ToolYielding { conversation, .. }
            | Self::Completed { conversation, .. } => Some(conversation),
            Self::Failed { conversation, .. } | Self::Cancelled { conversation, .. } => {
                conversation.as_ref()
            }
        }
    }

    /// Short label for logging.
    #[must_use]
    pub fn label(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Running { .. } => "running",
            Self::ToolYielding { .. } => "tool_yielding",
            Self::Completed { .. } => "completed",
            Self::Failed { .. } => "failed",
            Self::Cancelled { .. } => "cancelled",
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// SessionState
// ─────────────────────────────────────────────────────────────────────────────

/// Externally observable session lifecycle, coarser than [`RunState`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionState {
    /// Created, not yet running.
    Spawning,
    /// Run loop in progress (tool yields included — they never surface).
    Running,
    /// Finished successfully.
    Completed,
    /// Finished with a failure.
    Failed,
    /// Cancelled by the caller.
    Cancelled,
}

impl SessionState {
    /// Whether the session has finished.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Spawning => "spawning",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// AgentResult
// ─────────────────────────────────────────────────────────────────────────────

/// Closed three-way outcome of a session, produced once and cached.
#[derive(Clone, Debug, PartialEq)]
pub enum AgentResult {
    /// The run completed; `output` is the final assistant text.
    Success {
        /// Final assistant text.
        output: String,
        /// Conversation identity.
        key: ThreadKey,
        /// The final backend run.
        run_id: RunId,
    },

    /// The run failed or was cancelled.
    Failure {
        /// Closed failure bucket.
        reason: FailureReason,
        /// Human-readable error.
        error: String,
        /// Assistant text accumulated before the failure, if any.
        partial_output: Option<String>,
        /// Conversation identity.
        key: ThreadKey,
    },

    /// The caller's wait expired. The underlying run keeps progressing;
    /// this only describes what the caller observed.
    TimedOut {
        /// Session age when the wait expired.
        elapsed: Duration,
        /// Conversation identity.
        key: ThreadKey,
    },
}

impl AgentResult {
    /// Conversation identity this result belongs to.
    #[must_use]
    pub fn key(&self) -> &ThreadKey {
        match self {
            Self::Success { key, .. } | Self::Failure { key, .. } | Self::TimedOut { key, .. } => {
                key
            }
        }
    }

    /// Whether this is a success.
    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }

    /// Final output text for successes.
    #[must_use]
    pub fn output(&self) -> Option<&str> {
        match self {
            Self::Success { output, .. } => Some(output),
            _ => None,
        }
    }

    /// Failure reason, when this is a failure.
    #[must_use]
    pub fn reason(&self) -> Option<FailureReason> {
        match self {
            Self::Failure { reason, .. } => Some(*reason),
            _ => None,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
