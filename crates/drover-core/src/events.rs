//! Wire events emitted by a backend run stream.
//!
//! These are transient (never persisted by this crate) and drive the run
//! state machine's event folding. The stream contract: a well-behaved run
//! opens with [`RunStreamEvent::RunStarted`] and closes with either
//! [`RunStreamEvent::RunFinished`] or [`RunStreamEvent::RunError`]; a stream
//! that ends without one of those is a silent disconnect.

use serde::{Deserialize, Serialize};

use crate::ids::RunId;

/// Events emitted by the backend while a run streams.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum RunStreamEvent {
    /// Backend acknowledged the run and began streaming.
    #[serde(rename = "run_started", rename_all = "camelCase")]
    RunStarted {
        /// Backend run ID.
        run_id: RunId,
    },

    /// Incremental assistant text.
    #[serde(rename = "text_delta")]
    TextDelta {
        /// Text fragment.
        delta: String,
    },

    /// Tool call started.
    #[serde(rename = "toolcall_start", rename_all = "camelCase")]
    ToolCallStart {
        /// Tool call ID.
        tool_call_id: String,
        /// Tool name.
        name: String,
    },

    /// Incremental tool call argument JSON.
    #[serde(rename = "toolcall_delta", rename_all = "camelCase")]
    ToolCallDelta {
        /// Tool call ID.
        tool_call_id: String,
        /// Partial JSON arguments.
        arguments_delta: String,
    },

    /// Tool call fully emitted.
    #[serde(rename = "toolcall_end", rename_all = "camelCase")]
    ToolCallEnd {
        /// Tool call ID.
        tool_call_id: String,
    },

    /// Run finished this turn. Whether the session must resume with tool
    /// results depends on which accumulated calls are client-side.
    #[serde(rename = "run_finished")]
    RunFinished,

    /// Backend reported an explicit run failure.
    #[serde(rename = "run_error")]
    RunError {
        /// Error description from the backend.
        message: String,
    },
}

impl RunStreamEvent {
    /// Short event name for logging.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::RunStarted { .. } => "run_started",
            Self::TextDelta { .. } => "text_delta",
            Self::ToolCallStart { .. } => "toolcall_start",
            Self::ToolCallDelta { .. } => "toolcall_delta",
            Self::ToolCallEnd { .. } => "toolcall_end",
            Self::RunFinished => "run_finished",
            Self::RunError { .. } => "run_error",
        }
    }

    /// Whether this event terminates the stream.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::RunFinished | Self::RunError { .. })
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serde_tagging() {
        let event = RunStreamEvent::ToolCallDelta {
            tool_call_id: "tc-1".into(),
            arguments_delta: "{\"a\":".into(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "toolcall_delta");
        assert_eq!(json["toolCallId"], "tc-1");
        assert_eq!(json["argumentsDelta"], "{\"a\":");
    }

    #[test]
    fn serde_roundtrip_all_variants() {
        let events = vec![
            RunStreamEvent::RunStarted {
                run_id: RunId::from("r-1"),
            },
            RunStreamEvent::TextDelta {
                delta: "Hello".into(),
            },
            RunStreamEvent::ToolCallStart {
                tool_call_id: "tc-1".into(),
                name: "weather".into(),
            },
            RunStreamEvent::ToolCallDelta {
                tool_call_id: "tc-1".into(),
                arguments_delta: "{}".into(),
            },
            RunStreamEvent::ToolCallEnd {
                tool_call_id: "tc-1".into(),
            },
            RunStreamEvent::RunFinished,
            RunStreamEvent::RunError {
                message: "backend exploded".into(),
            },
        ];
        for event in &events {
            let json = serde_json::to_string(event).unwrap();
            let back: RunStreamEvent = serde_json::from_str(&json).unwrap();
            assert_eq!(*event, back);
        }
    }

    #[test]
    fn terminal_detection() {
        assert!(RunStreamEvent::RunFinished.is_terminal());
        assert!(
            RunStreamEvent::RunError {
                message: "x".into()
            }
            .is_terminal()
        );
        assert!(
            !RunStreamEvent::TextDelta {
                delta: "x".into()
            }
            .is_terminal()
        );
    }

    #[test]
    fn kind_strings() {
        assert_eq!(RunStreamEvent::RunFinished.kind(), "run_finished");
        assert_eq!(
            RunStreamEvent::RunStarted {
                run_id: RunId::from("r")
            }
            .kind(),
            "run_started"
        );
    }
}
