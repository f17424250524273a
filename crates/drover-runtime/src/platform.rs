//! Platform capability object.
//!
//! Scheduling policy is injected, not hard-coded: one deployment target
//! gives each session a truly parallel execution context, another offers a
//! single cooperative context that cannot be re-entered while suspended.
//! The coordinator reads these fields; it never branches on a platform enum.

/// Capabilities of the deployment target's execution substrate.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PlatformCapabilities {
    /// Whether a second session may run while one is suspended.
    ///
    /// When false, the coordinator refuses concurrent spawns outright —
    /// failing fast instead of deadlocking a single-instance substrate.
    pub supports_reentrancy: bool,

    /// Maximum concurrent sessions on re-entrant platforms.
    ///
    /// Resource limiting against connection-pool exhaustion, not a
    /// correctness rule.
    pub max_concurrent_sessions: usize,
}

impl PlatformCapabilities {
    /// A target with truly parallel execution contexts.
    #[must_use]
    pub fn threaded() -> Self {
        Self {
            supports_reentrancy: true,
            max_concurrent_sessions: 8,
        }
    }

    /// A target with one cooperative, non-reentrant execution context.
    #[must_use]
    pub fn single_context() -> Self {
        Self {
            supports_reentrancy: false,
            max_concurrent_sessions: 1,
        }
    }

    /// Override the concurrent-session ceiling.
    #[must_use]
    pub fn with_session_limit(mut self, limit: usize) -> Self {
        self.max_concurrent_sessions = limit;
        self
    }
}

impl Default for PlatformCapabilities {
    fn default() -> Self {
        Self::threaded()
    }
}
