//! Closed failure-reason taxonomy shared by run states and session results.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Why a run or session failed.
///
/// Closed taxonomy — every failure the runtime surfaces maps to exactly one
/// of these. The mapping from raised transport errors lives in the runtime's
/// error classifier.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureReason {
    /// Backend emitted an explicit run-error event.
    ServerError,
    /// Authentication rejected (401/403-class).
    AuthExpired,
    /// Stream ended without a terminal signal, or transport-level network failure.
    NetworkLost,
    /// Backend rate limiting (429-class).
    RateLimited,
    /// Tool recursion depth exceeded.
    ToolExecutionFailed,
    /// Caller-initiated cancellation.
    Cancelled,
    /// Anything else, including the defensive catch-all.
    InternalError,
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::ServerError => "server_error",
            Self::AuthExpired => "auth_expired",
            Self::NetworkLost => "network_lost",
            Self::RateLimited => "rate_limited",
            Self::ToolExecutionFailed => "tool_execution_failed",
            Self::Cancelled => "cancelled",
            Self::InternalError => "internal_error",
        };
        f.write_str(s)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    const ALL: [FailureReason; 7] = [
        FailureReason::ServerError,
        FailureReason::AuthExpired,
        FailureReason::NetworkLost,
        FailureReason::RateLimited,
        FailureReason::ToolExecutionFailed,
        FailureReason::Cancelled,
        FailureReason::InternalError,
    ];

    #[test]
    fn serde_roundtrip() {
        for reason in ALL {
            let json = serde_json::to_string(&reason).unwrap();
            let back: FailureReason = serde_json::from_str(&json).unwrap();
            assert_eq!(reason, back);
        }
    }

    #[test]
    fn serde_values_are_snake_case() {
        assert_eq!(
            serde_json::to_string(&FailureReason::AuthExpired).unwrap(),
            "\"auth_expired\""
        );
        assert_eq!(
            serde_json::to_string(&FailureReason::ToolExecutionFailed).unwrap(),
            "\"tool_execution_failed\""
        );
    }

    #[test]
    fn display_matches_serde() {
        for reason in ALL {
            let json = serde_json::to_string(&reason).unwrap();
            assert_eq!(json.trim_matches('"'), reason.to_string());
        }
    }
}
