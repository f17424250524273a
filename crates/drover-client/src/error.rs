//! Transport error types.

/// Result type alias for client operations.
pub type ClientResult<T> = Result<T, ClientError>;

/// Errors raised by the backend transport.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// HTTP request failed at the transport level.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON serialization/deserialization failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// SSE stream framing could not be parsed.
    #[error("SSE parse error: {message}")]
    SseParse {
        /// Error description.
        message: String,
    },

    /// Authentication rejected (401/403-class).
    #[error("Auth error ({status}): {message}")]
    Auth {
        /// HTTP status code.
        status: u16,
        /// Error description.
        message: String,
    },

    /// Rate limited by the backend (429-class).
    #[error("Rate limited: {message}")]
    RateLimited {
        /// Suggested retry delay in milliseconds, if the backend sent one.
        retry_after_ms: Option<u64>,
        /// Error description.
        message: String,
    },

    /// Backend returned a non-success API response.
    #[error("API error ({status}): {message}")]
    Api {
        /// HTTP status code.
        status: u16,
        /// Error description.
        message: String,
    },

    /// Operation cancelled via the caller's token.
    #[error("Operation cancelled")]
    Cancelled,

    /// Anything else.
    #[error("{message}")]
    Other {
        /// Error description.
        message: String,
    },
}

impl ClientError {
    /// Map an HTTP status plus response body to the matching variant.
    #[must_use]
    pub fn from_status(status: u16, message: String, retry_after_ms: Option<u64>) -> Self {
        match status {
            401 | 403 => Self::Auth { status, message },
            429 => Self::RateLimited {
                retry_after_ms,
                message,
            },
            _ => Self::Api { status, message },
        }
    }

    /// Error category string for logging.
    #[must_use]
    pub fn category(&self) -> &str {
        match self {
            Self::Http(_) => "network",
            Self::Json(_) | Self::SseParse { .. } => "parse",
            Self::Auth { .. } => "auth",
            Self::RateLimited { .. } => "rate_limit",
            Self::Api { .. } => "api",
            Self::Cancelled => "cancelled",
            Self::Other { .. } => "unknown",
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
