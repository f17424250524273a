//! # Backend client trait
//!
//! Abstraction over the conversational backend consumed by the run state
//! machine: thread/run lifecycle calls plus a cancellable stream of
//! [`RunStreamEvent`]s for one run.

use std::pin::Pin;

use async_trait::async_trait;
use futures::Stream;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use drover_core::conversation::ChatMessage;
use drover_core::events::RunStreamEvent;
use drover_core::ids::{RoomId, RunId, ThreadId};

use crate::error::ClientResult;

/// Boxed stream of [`RunStreamEvent`]s returned by
/// [`BackendClient::open_run_stream`].
pub type RunEventStream =
    Pin<Box<dyn Stream<Item = Result<RunStreamEvent, crate::error::ClientError>> + Send>>;

/// A freshly created backend thread.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewThread {
    /// Thread ID assigned by the backend.
    pub thread_id: ThreadId,
    /// Run ID pre-created by the backend, when it opens threads with one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub initial_run_id: Option<RunId>,
}

/// Input for opening a run's event stream.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunRequest {
    /// Room the thread lives in.
    pub room_id: RoomId,
    /// Thread being driven.
    pub thread_id: ThreadId,
    /// Run to stream.
    pub run_id: RunId,
    /// Full conversation history for the run, including any synthesized
    /// tool-result messages.
    pub messages: Vec<ChatMessage>,
}

/// Conversational backend transport.
///
/// Implementors must be `Send + Sync`; the runtime calls them from multiple
/// sessions concurrently and treats them as stateless services.
#[async_trait]
pub trait BackendClient: Send + Sync {
    /// Create a new thread in a room.
    async fn create_thread(&self, room_id: &RoomId) -> ClientResult<NewThread>;

    /// Create a new run on an existing thread.
    ///
    /// The backend does not permit re-posting to a finished run id, so every
    /// resume cycle creates a fresh run through this call.
    async fn create_run(&self, room_id: &RoomId, thread_id: &ThreadId) -> ClientResult<RunId>;

    /// Delete a thread (used for ephemeral-session cleanup).
    async fn delete_thread(&self, room_id: &RoomId, thread_id: &ThreadId) -> ClientResult<()>;

    /// Open the event stream for a run.
    ///
    /// The stream ends after a terminal event ([`RunStreamEvent::RunFinished`]
    /// or [`RunStreamEvent::RunError`]), when `cancel` fires, or on a silent
    /// disconnect — the consumer distinguishes the three.
    async fn open_run_stream(
        &self,
        request: &RunRequest,
        cancel: &CancellationToken,
    ) -> ClientResult<RunEventStream>;
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
