//! Error classifier — pure mapping from transport errors to the closed
//! failure-reason taxonomy. No state, no I/O.

use drover_client::ClientError;
use drover_core::FailureReason;

/// Map a raised transport failure to its [`FailureReason`].
///
/// Total over every [`ClientError`] variant; anything without a more
/// specific bucket lands in [`FailureReason::InternalError`].
#[must_use]
pub fn classify(error: &ClientError) -> FailureReason {
    match error {
        ClientError::Auth { .. } => FailureReason::AuthExpired,
        ClientError::RateLimited { .. } => FailureReason::RateLimited,
        ClientError::Http(_) | ClientError::SseParse { .. } => FailureReason::NetworkLost,
        ClientError::Api { .. } => FailureReason::ServerError,
        ClientError::Cancelled => FailureReason::Cancelled,
        ClientError::Json(_) | ClientError::Other { .. } => FailureReason::InternalError,
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
