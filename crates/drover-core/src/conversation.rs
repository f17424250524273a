//! Conversation model: messages plus streamed tool-call records.
//!
//! A [`Conversation`] grows as the run state machine folds stream events
//! into it: text deltas accumulate into a draft assistant turn, tool calls
//! accumulate argument JSON fragment by fragment, and tool results are
//! appended as dedicated messages when the client resumes a yielded run.
//!
//! Only the state machine mutates a conversation; callers observe clones
//! published inside run-state snapshots.

use serde::{Deserialize, Serialize};

// ─────────────────────────────────────────────────────────────────────────────
// Tool call records
// ─────────────────────────────────────────────────────────────────────────────

/// Lifecycle of one tool call within a run.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolCallStatus {
    /// Arguments still arriving on the stream.
    Streaming,
    /// Fully received, awaiting client execution.
    Pending,
    /// Executed successfully; `result` holds the output.
    Completed,
    /// Execution raised; `result` holds the error text.
    Failed,
}

/// One tool call emitted by the backend during a run.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolCallInfo {
    /// Backend-assigned tool call ID.
    pub id: String,
    /// Tool name.
    pub name: String,
    /// Argument JSON, accumulated from stream deltas.
    pub arguments: String,
    /// Current lifecycle status.
    pub status: ToolCallStatus,
    /// Execution output (or error text when `status` is `Failed`).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<String>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Messages
// ─────────────────────────────────────────────────────────────────────────────

/// One message in a conversation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "role", rename_all = "camelCase")]
pub enum ChatMessage {
    /// Caller-supplied prompt.
    #[serde(rename = "user")]
    User {
        /// Message text.
        content: String,
    },
    /// Committed assistant turn.
    #[serde(rename = "assistant")]
    Assistant {
        /// Full assistant text for the turn.
        content: String,
    },
    /// Synthesized client-side tool result.
    #[serde(rename = "tool_result", rename_all = "camelCase")]
    ToolResult {
        /// ID of the tool call this result answers.
        tool_call_id: String,
        /// Result text (error text when `is_error`).
        content: String,
        /// Whether the tool execution failed.
        #[serde(skip_serializing_if = "Option::is_none")]
        is_error: Option<bool>,
    },
}

// ─────────────────────────────────────────────────────────────────────────────
// Conversation
// ─────────────────────────────────────────────────────────────────────────────

/// Ordered message history plus the tool-call records accumulated so far.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Conversation {
    messages: Vec<ChatMessage>,
    tool_calls: Vec<ToolCallInfo>,
    /// Assistant text for the in-flight turn, not yet committed.
    #[serde(skip_serializing_if = "String::is_empty", default)]
    draft: String,
}

impl Conversation {
    /// Empty conversation.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a conversation from cached history.
    #[must_use]
    pub fn from_history(messages: Vec<ChatMessage>) -> Self {
        Self {
            messages,
            ..Self::default()
        }
    }

    /// Committed messages, in order.
    #[must_use]
    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    /// All tool-call records accumulated across the session's runs.
    #[must_use]
    pub fn tool_calls(&self) -> &[ToolCallInfo] {
        &self.tool_calls
    }

    /// Append a user message.
    pub fn push_user(&mut self, content: impl Into<String>) {
        self.messages.push(ChatMessage::User {
            content: content.into(),
        });
    }

    /// Fold an assistant text delta into the draft turn.
    pub fn push_text_delta(&mut self, delta: &str) {
        self.draft.push_str(delta);
    }

    /// Start accumulating a new tool call.
    pub fn begin_tool_call(&mut self, id: impl Into<String>, name: impl Into<String>) {
        self.tool_calls.push(ToolCallInfo {
            id: id.into(),
            name: name.into(),
            arguments: String::new(),
            status: ToolCallStatus::Streaming,
            result: None,
        });
    }

    /// Fold an argument JSON fragment into a streaming tool call.
    ///
    /// Deltas for unknown IDs are dropped; the stream is the only writer
    /// and a mismatched ID means the call was never started.
    pub fn push_tool_call_args(&mut self, id: &str, arguments_delta: &str) {
        if let Some(call) = self.tool_calls.iter_mut().find(|c| c.id == id) {
            call.arguments.push_str(arguments_delta);
        }
    }

    /// Mark a streaming tool call as fully received.
    pub fn finish_tool_call(&mut self, id: &str) {
        if let Some(call) = self.tool_calls.iter_mut().find(|c| c.id == id) {
            if call.status == ToolCallStatus::Streaming {
                call.status = ToolCallStatus::Pending;
            }
        }
    }

    /// Commit the draft assistant turn as a message.
    ///
    /// Trailing whitespace is trimmed; an all-whitespace draft commits
    /// nothing (a turn may consist solely of tool calls).
    pub fn commit_assistant_turn(&mut self) {
        let text = std::mem::take(&mut self.draft);
        let trimmed = text.trim_end();
        if !trimmed.is_empty() {
            self.messages.push(ChatMessage::Assistant {
                content: trimmed.to_owned(),
            });
        }
    }

    /// Pending tool calls whose name the given predicate accepts.
    ///
    /// Used by the state machine to pick out client-side calls at terminal
    /// evaluation; everything else is assumed backend-handled.
    #[must_use]
    pub fn pending_calls_where(&self, is_client_side: impl Fn(&str) -> bool) -> Vec<ToolCallInfo> {
        self.tool_calls
            .iter()
            .filter(|c| c.status == ToolCallStatus::Pending && is_client_side(&c.name))
            .cloned()
            .collect()
    }

    /// Record executed tool calls: update statuses and append one
    /// synthesized tool-result message per call.
    pub fn record_tool_results(&mut self, executed: &[ToolCallInfo]) {
        for done in executed {
            if let Some(call) = self.tool_calls.iter_mut().find(|c| c.id == done.id) {
                call.status = done.status;
                call.result.clone_from(&done.result);
            }
            self.messages.push(ChatMessage::ToolResult {
                tool_call_id: done.id.clone(),
                content: done.result.clone().unwrap_or_default(),
                is_error: (done.status == ToolCallStatus::Failed).then_some(true),
            });
        }
    }

    /// Assistant text streamed for the in-flight turn, not yet committed.
    ///
    /// Empty outside an active run. Observers use this to render partial
    /// output while a run streams (or after a cancellation preserved it).
    #[must_use]
    pub fn pending_assistant_text(&self) -> &str {
        &self.draft
    }

    /// Text of the most recent committed assistant turn, if any.
    #[must_use]
    pub fn last_assistant_text(&self) -> Option<&str> {
        self.messages.iter().rev().find_map(|m| match m {
            ChatMessage::Assistant { content } => Some(content.as_str()),
            _ => None,
        })
    }

    /// Whether nothing has been accumulated yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty() && self.tool_calls.is_empty() && self.draft.is_empty()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_deltas_accumulate_and_commit() {
        let mut convo = Conversation::new();
        convo.push_user("Hi");
        convo.push_text_delta("Hel");
        convo.push_text_delta("lo");
        convo.commit_assistant_turn();

        assert_eq!(convo.messages().len(), 2);
        assert_eq!(convo.last_assistant_text(), Some("Hello"));
    }

    #[test]
    fn commit_trims_trailing_whitespace() {
        let mut convo = Conversation::new();
        convo.push_text_delta("Hello world\n\n");
        convo.commit_assistant_turn();
        assert_eq!(convo.last_assistant_text(), Some("Hello world"));
    }

    #[test]
    fn empty_draft_commits_nothing() {
        let mut convo = Conversation::new();
        convo.push_text_delta("  \n");
        convo.commit_assistant_turn();
        assert!(convo.messages().is_empty());
        assert_eq!(convo.last_assistant_text(), None);
    }

    #[test]
    fn tool_call_accumulation() {
        let mut convo = Conversation::new();
        convo.begin_tool_call("tc-1", "weather");
        convo.push_tool_call_args("tc-1", r#"{"city":"#);
        convo.push_tool_call_args("tc-1", r#""Oslo"}"#);
        assert_eq!(convo.tool_calls()[0].status, ToolCallStatus::Streaming);

        convo.finish_tool_call("tc-1");
        let call = &convo.tool_calls()[0];
        assert_eq!(call.status, ToolCallStatus::Pending);
        assert_eq!(call.arguments, r#"{"city":"Oslo"}"#);
    }

    #[test]
    fn args_for_unknown_id_are_dropped() {
        let mut convo = Conversation::new();
        convo.begin_tool_call("tc-1", "weather");
        convo.push_tool_call_args("tc-9", "junk");
        assert!(convo.tool_calls()[0].arguments.is_empty());
    }

    #[test]
    fn finish_is_idempotent_after_execution() {
        let mut convo = Conversation::new();
        convo.begin_tool_call("tc-1", "weather");
        convo.finish_tool_call("tc-1");
        convo.record_tool_results(&[ToolCallInfo {
            id: "tc-1".into(),
            name: "weather".into(),
            arguments: String::new(),
            status: ToolCallStatus::Completed,
            result: Some("Sunny".into()),
        }]);
        convo.finish_tool_call("tc-1");
        assert_eq!(convo.tool_calls()[0].status, ToolCallStatus::Completed);
    }

    #[test]
    fn pending_calls_filtered_by_predicate() {
        let mut convo = Conversation::new();
        convo.begin_tool_call("tc-1", "weather");
        convo.finish_tool_call("tc-1");
        convo.begin_tool_call("tc-2", "backend_search");
        convo.finish_tool_call("tc-2");

        let pending = convo.pending_calls_where(|name| name == "weather");
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].id, "tc-1");
    }

    #[test]
    fn record_tool_results_appends_messages_and_updates_status() {
        let mut convo = Conversation::new();
        convo.begin_tool_call("tc-1", "weather");
        convo.finish_tool_call("tc-1");
        convo.begin_tool_call("tc-2", "lookup");
        convo.finish_tool_call("tc-2");

        convo.record_tool_results(&[
            ToolCallInfo {
                id: "tc-1".into(),
                name: "weather".into(),
                arguments: String::new(),
                status: ToolCallStatus::Completed,
                result: Some("Sunny".into()),
            },
            ToolCallInfo {
                id: "tc-2".into(),
                name: "lookup".into(),
                arguments: String::new(),
                status: ToolCallStatus::Failed,
                result: Some("boom".into()),
            },
        ]);

        assert_eq!(convo.tool_calls()[0].status, ToolCallStatus::Completed);
        assert_eq!(convo.tool_calls()[1].status, ToolCallStatus::Failed);

        let results: Vec<_> = convo
            .messages()
            .iter()
            .filter_map(|m| match m {
                ChatMessage::ToolResult {
                    tool_call_id,
                    content,
                    is_error,
                } => Some((tool_call_id.as_str(), content.as_str(), *is_error)),
                _ => None,
            })
            .collect();
        assert_eq!(
            results,
            vec![
                ("tc-1", "Sunny", None),
                ("tc-2", "boom", Some(true)),
            ]
        );
    }

    #[test]
    fn from_history_seeds_messages() {
        let convo = Conversation::from_history(vec![
            ChatMessage::User {
                content: "earlier".into(),
            },
            ChatMessage::Assistant {
                content: "reply".into(),
            },
        ]);
        assert_eq!(convo.messages().len(), 2);
        assert_eq!(convo.last_assistant_text(), Some("reply"));
    }

    #[test]
    fn last_assistant_text_skips_tool_results() {
        let mut convo = Conversation::new();
        convo.push_text_delta("Answer");
        convo.commit_assistant_turn();
        convo.record_tool_results(&[ToolCallInfo {
            id: "tc-1".into(),
            name: "t".into(),
            arguments: String::new(),
            status: ToolCallStatus::Completed,
            result: Some("out".into()),
        }]);
        assert_eq!(convo.last_assistant_text(), Some("Answer"));
    }

    #[test]
    fn serde_roundtrip() {
        let mut convo = Conversation::new();
        convo.push_user("Hi");
        convo.begin_tool_call("tc-1", "weather");
        convo.finish_tool_call("tc-1");
        convo.push_text_delta("partial");

        let json = serde_json::to_string(&convo).unwrap();
        let back: Conversation = serde_json::from_str(&json).unwrap();
        assert_eq!(back, convo);
    }

    #[test]
    fn message_serde_tags() {
        let msg = ChatMessage::ToolResult {
            tool_call_id: "tc-1".into(),
            content: "out".into(),
            is_error: None,
        };
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["role"], "tool_result");
        assert_eq!(json["toolCallId"], "tc-1");
    }

    mod props {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            // Folding arbitrary delta splits always commits the concatenation.
            #[test]
            fn deltas_commit_to_concatenation(
                parts in proptest::collection::vec("[a-z ]{0,8}", 0..10)
            ) {
                let mut convo = Conversation::new();
                for p in &parts {
                    convo.push_text_delta(p);
                }
                convo.commit_assistant_turn();

                let joined = parts.concat();
                let expected = joined.trim_end();
                if expected.is_empty() {
                    prop_assert!(convo.last_assistant_text().is_none());
                } else {
                    prop_assert_eq!(convo.last_assistant_text(), Some(expected));
                }
            }

            // Argument deltas always land on the call they address.
            #[test]
            fn args_accumulate_per_call(
                frags in proptest::collection::vec("[a-z0-9:{}\"]{0,6}", 0..8)
            ) {
                let mut convo = Conversation::new();
                convo.begin_tool_call("tc-1", "t");
                convo.begin_tool_call("tc-2", "t");
                for (i, f) in frags.iter().enumerate() {
                    let id = if i % 2 == 0 { "tc-1" } else { "tc-2" };
                    convo.push_tool_call_args(id, f);
                }
                let total: usize = convo.tool_calls().iter().map(|c| c.arguments.len()).sum();
                let expected: usize = frags.iter().map(String::len).sum();
                prop_assert_eq!(total, expected);
            }
        }
    }
}
