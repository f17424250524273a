//! Run state machine — drives exactly one backend run at a time.
//!
//! Opens (or attaches to) a backend run, folds its event stream into a
//! growing [`Conversation`], and republishes the *whole* [`RunState`] on
//! every fold so a late subscriber only needs the latest snapshot, never a
//! replay. When the backend finishes a turn with client-side tool calls
//! outstanding, the machine parks in `ToolYielding` until
//! [`RunOrchestrator::submit_tool_outputs`] resumes it on a brand-new
//! backend run (finished run ids cannot be re-posted to).
//!
//! Every cross-task transition goes through a generation-guarded
//! compare-and-swap: a fold task whose run handle has been replaced or
//! cancelled can never commit a stale state.

use std::sync::Arc;

use futures::StreamExt;
use parking_lot::Mutex;
use tokio::sync::{broadcast, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use drover_client::{BackendClient, RunRequest};
use drover_core::conversation::{ChatMessage, Conversation, ToolCallInfo};
use drover_core::events::RunStreamEvent;
use drover_core::failure::FailureReason;
use drover_core::ids::{RunId, ThreadKey};
use drover_tools::ToolRegistry;

use crate::classify::classify;
use crate::emitter::EventEmitter;
use crate::errors::OrchestratorError;
use crate::state::RunState;

/// Hard ceiling on yield/resume cycles per session.
///
/// Non-configurable recursion guard against runaway tool-calling loops.
pub const MAX_TOOL_DEPTH: u32 = 10;

struct Inner {
    /// Bumped on every run-handle replacement, cancel, reset, and dispose.
    /// Fold tasks carry the generation current at spawn; transitions with a
    /// stale generation are discarded.
    generation: u64,
    /// Set while `start_run` is between its guard and its first transition.
    starting: bool,
    /// Cancels the in-flight stream, when one exists.
    cancel: Option<CancellationToken>,
    disposed: bool,
}

/// Single-run state machine.
pub struct RunOrchestrator {
    client: Arc<dyn BackendClient>,
    registry: Arc<ToolRegistry>,
    state_tx: watch::Sender<RunState>,
    events: EventEmitter<RunStreamEvent>,
    inner: Mutex<Inner>,
}

impl RunOrchestrator {
    /// Create an idle orchestrator.
    #[must_use]
    pub fn new(client: Arc<dyn BackendClient>, registry: Arc<ToolRegistry>) -> Self {
        let (state_tx, _) = watch::channel(RunState::Idle);
        Self {
            client,
            registry,
            state_tx,
            events: EventEmitter::new(),
            inner: Mutex::new(Inner {
                generation: 0,
                starting: false,
                cancel: None,
                disposed: false,
            }),
        }
    }

    /// Current state snapshot.
    #[must_use]
    pub fn state(&self) -> RunState {
        self.state_tx.borrow().clone()
    }

    /// Subscribe to state changes. Each emission is the whole current
    /// state; the latest value is always sufficient.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<RunState> {
        self.state_tx.subscribe()
    }

    /// Subscribe to the live raw-event tail (unbuffered).
    #[must_use]
    pub fn subscribe_events(&self) -> broadcast::Receiver<RunStreamEvent> {
        self.events.subscribe()
    }

    /// Start a run for `key`.
    ///
    /// When `existing_run_id` is given, attaches to that backend run instead
    /// of creating one. `cached_history` seeds the conversation before the
    /// user message is appended. Fails with
    /// [`OrchestratorError::RunActive`] while a run is in flight — no
    /// queueing, no silent drop.
    #[instrument(skip_all, fields(key = %key))]
    pub async fn start_run(
        self: &Arc<Self>,
        key: ThreadKey,
        user_message: &str,
        existing_run_id: Option<RunId>,
        cached_history: Option<Vec<ChatMessage>>,
    ) -> Result<(), OrchestratorError> {
        {
            let mut inner = self.inner.lock();
            if inner.disposed {
                return Err(OrchestratorError::Disposed);
            }
            let state = self.state_tx.borrow();
            if inner.starting || state.is_active() {
                return Err(OrchestratorError::RunActive);
            }
            if state.is_terminal() {
                return Err(OrchestratorError::RunFinished);
            }
            inner.starting = true;
        }

        let created = match existing_run_id {
            Some(run_id) => Ok(run_id),
            None => self.client.create_run(&key.room_id, &key.thread_id).await,
        };
        let run_id = match created {
            Ok(run_id) => run_id,
            Err(e) => {
                self.inner.lock().starting = false;
                return Err(e.into());
            }
        };

        let mut conversation = Conversation::from_history(cached_history.unwrap_or_default());
        conversation.push_user(user_message);

        let cancel = CancellationToken::new();
        let generation = {
            let mut inner = self.inner.lock();
            inner.starting = false;
            if inner.disposed {
                return Err(OrchestratorError::Disposed);
            }
            inner.generation += 1;
            inner.cancel = Some(cancel.clone());
            inner.generation
        };
        let _ = self.state_tx.send_replace(RunState::Running {
            key: key.clone(),
            run_id: run_id.clone(),
            conversation: conversation.clone(),
        });
        info!(run = %run_id, "run started");
        self.spawn_fold(generation, key, run_id, conversation, cancel, 0);
        Ok(())
    }

    /// Resume a yielded run with executed tool results.
    ///
    /// Always starts a brand-new backend run carrying the full conversation
    /// history plus the synthesized tool-result messages. At
    /// [`MAX_TOOL_DEPTH`] the machine transitions to
    /// `Failed(ToolExecutionFailed)` instead of resuming.
    #[instrument(skip_all)]
    pub async fn submit_tool_outputs(
        self: &Arc<Self>,
        executed: Vec<ToolCallInfo>,
    ) -> Result<(), OrchestratorError> {
        let (key, mut conversation, tool_depth, observed_generation) = {
            let inner = self.inner.lock();
            if inner.disposed {
                return Err(OrchestratorError::Disposed);
            }
            match &*self.state_tx.borrow() {
                RunState::ToolYielding {
                    key,
                    conversation,
                    tool_depth,
                    ..
                } => (
                    key.clone(),
                    conversation.clone(),
                    *tool_depth,
                    inner.generation,
                ),
                _ => return Err(OrchestratorError::NotToolYielding),
            }
        };

        if tool_depth >= MAX_TOOL_DEPTH {
            warn!(key = %key, tool_depth, "tool recursion limit reached");
            let stale = {
                let mut inner = self.inner.lock();
                if inner.disposed || inner.generation != observed_generation {
                    true
                } else {
                    inner.generation += 1;
                    false
                }
            };
            if !stale {
                let _ = self.state_tx.send_replace(RunState::Failed {
                    key,
                    reason: FailureReason::ToolExecutionFailed,
                    error: format!("tool recursion depth limit ({MAX_TOOL_DEPTH}) exceeded"),
                    conversation: Some(conversation),
                });
            }
            return Ok(());
        }

        conversation.record_tool_results(&executed);
        let run_id = self.client.create_run(&key.room_id, &key.thread_id).await?;

        let cancel = CancellationToken::new();
        let generation = {
            let mut inner = self.inner.lock();
            if inner.disposed {
                return Err(OrchestratorError::Disposed);
            }
            if inner.generation != observed_generation {
                // The run was cancelled or reset while the replacement run
                // was being created. Discard the new handle; nothing commits.
                debug!(key = %key, "discarding stale run continuation");
                return Ok(());
            }
            inner.generation += 1;
            inner.cancel = Some(cancel.clone());
            inner.generation
        };
        let _ = self.state_tx.send_replace(RunState::Running {
            key: key.clone(),
            run_id: run_id.clone(),
            conversation: conversation.clone(),
        });
        info!(key = %key, run = %run_id, tool_depth = tool_depth + 1, "run resumed with tool results");
        self.spawn_fold(generation, key, run_id, conversation, cancel, tool_depth + 1);
        Ok(())
    }

    /// Cancel the in-flight run, preserving the partial conversation.
    ///
    /// No-op from `Idle` and terminal states; idempotent.
    pub fn cancel_run(&self) -> Result<(), OrchestratorError> {
        let snapshot = {
            let mut inner = self.inner.lock();
            if inner.disposed {
                return Err(OrchestratorError::Disposed);
            }
            let current = self.state_tx.borrow().clone();
            match current {
                RunState::Running {
                    key, conversation, ..
                }
                | RunState::ToolYielding {
                    key, conversation, ..
                } => {
                    inner.generation += 1;
                    if let Some(token) = inner.cancel.take() {
                        token.cancel();
                    }
                    Some((key, conversation))
                }
                _ => None,
            }
        };
        if let Some((key, conversation)) = snapshot {
            info!(key = %key, "run cancelled");
            let _ = self.state_tx.send_replace(RunState::Cancelled {
                key,
                conversation: Some(conversation),
            });
        }
        Ok(())
    }

    /// Cancel any active run and return to `Idle`. Idempotent.
    pub fn reset(&self) -> Result<(), OrchestratorError> {
        {
            let mut inner = self.inner.lock();
            if inner.disposed {
                return Err(OrchestratorError::Disposed);
            }
            inner.generation += 1;
            if let Some(token) = inner.cancel.take() {
                token.cancel();
            }
        }
        let _ = self.state_tx.send_replace(RunState::Idle);
        Ok(())
    }

    /// Release the orchestrator. Idempotent; every other method fails with
    /// [`OrchestratorError::Disposed`] afterwards.
    pub fn dispose(&self) {
        let mut inner = self.inner.lock();
        if inner.disposed {
            return;
        }
        inner.disposed = true;
        inner.generation += 1;
        if let Some(token) = inner.cancel.take() {
            token.cancel();
        }
    }

    /// Commit `next` only if `expected_generation` is still current.
    fn transition(&self, expected_generation: u64, next: RunState) -> bool {
        let inner = self.inner.lock();
        if inner.disposed || inner.generation != expected_generation {
            return false;
        }
        let _ = self.state_tx.send_replace(next);
        true
    }

    fn spawn_fold(
        self: &Arc<Self>,
        generation: u64,
        key: ThreadKey,
        run_id: RunId,
        conversation: Conversation,
        cancel: CancellationToken,
        tool_depth: u32,
    ) {
        let this = Arc::clone(self);
        let _ = tokio::spawn(async move {
            this.fold(generation, key, run_id, conversation, cancel, tool_depth)
                .await;
        });
    }

    /// Drive one stream to a terminal transition, folding events as they
    /// arrive.
    #[allow(clippy::too_many_lines)]
    async fn fold(
        &self,
        generation: u64,
        key: ThreadKey,
        run_id: RunId,
        mut conversation: Conversation,
        cancel: CancellationToken,
        tool_depth: u32,
    ) {
        let request = RunRequest {
            room_id: key.room_id.clone(),
            thread_id: key.thread_id.clone(),
            run_id: run_id.clone(),
            messages: conversation.messages().to_vec(),
        };
        let mut stream = match self.client.open_run_stream(&request, &cancel).await {
            Ok(stream) => stream,
            Err(e) => {
                let _ = self.transition(
                    generation,
                    RunState::Failed {
                        key,
                        reason: classify(&e),
                        error: e.to_string(),
                        conversation: Some(conversation),
                    },
                );
                return;
            }
        };

        loop {
            // biased: prefer cancellation when both it and an event are ready
            let event = tokio::select! {
                biased;
                () = cancel.cancelled() => {
                    // cancel_run committed `Cancelled` under a newer
                    // generation; anything we publish now would be stale.
                    return;
                }
                event = stream.next() => event,
            };

            match event {
                None => {
                    // Silent disconnect: no terminal signal arrived.
                    let _ = self.transition(
                        generation,
                        RunState::Failed {
                            key,
                            reason: FailureReason::NetworkLost,
                            error: "stream ended without a terminal event".into(),
                            conversation: Some(conversation),
                        },
                    );
                    return;
                }
                Some(Err(e)) => {
                    let _ = self.transition(
                        generation,
                        RunState::Failed {
                            key,
                            reason: classify(&e),
                            error: e.to_string(),
                            conversation: Some(conversation),
                        },
                    );
                    return;
                }
                Some(Ok(event)) => {
                    let _ = self.events.emit(event.clone());
                    match event {
                        RunStreamEvent::RunStarted { .. } => {}
                        RunStreamEvent::TextDelta { delta } => {
                            conversation.push_text_delta(&delta);
                            if !self.republish(generation, &key, &run_id, &conversation) {
                                return;
                            }
                        }
                        RunStreamEvent::ToolCallStart { tool_call_id, name } => {
                            conversation.begin_tool_call(tool_call_id, name);
                            if !self.republish(generation, &key, &run_id, &conversation) {
                                return;
                            }
                        }
                        RunStreamEvent::ToolCallDelta {
                            tool_call_id,
                            arguments_delta,
                        } => {
                            conversation.push_tool_call_args(&tool_call_id, &arguments_delta);
                            if !self.republish(generation, &key, &run_id, &conversation) {
                                return;
                            }
                        }
                        RunStreamEvent::ToolCallEnd { tool_call_id } => {
                            conversation.finish_tool_call(&tool_call_id);
                            if !self.republish(generation, &key, &run_id, &conversation) {
                                return;
                            }
                        }
                        RunStreamEvent::RunError { message } => {
                            let _ = self.transition(
                                generation,
                                RunState::Failed {
                                    key,
                                    reason: FailureReason::ServerError,
                                    error: message,
                                    conversation: Some(conversation),
                                },
                            );
                            return;
                        }
                        RunStreamEvent::RunFinished => {
                            conversation.commit_assistant_turn();
                            // A call is client-side iff its name is registered
                            // at the moment the terminal event is evaluated.
                            let pending = conversation
                                .pending_calls_where(|name| self.registry.contains(name));
                            let next = if pending.is_empty() {
                                debug!(key = %key, run = %run_id, "run completed");
                                RunState::Completed {
                                    key,
                                    run_id,
                                    conversation,
                                }
                            } else {
                                debug!(
                                    key = %key,
                                    run = %run_id,
                                    pending = pending.len(),
                                    tool_depth,
                                    "run yielded for tools"
                                );
                                RunState::ToolYielding {
                                    key,
                                    run_id,
                                    conversation,
                                    pending_calls: pending,
                                    tool_depth,
                                }
                            };
                            let _ = self.transition(generation, next);
                            return;
                        }
                    }
                }
            }
        }
    }

    fn republish(
        &self,
        generation: u64,
        key: &ThreadKey,
        run_id: &RunId,
        conversation: &Conversation,
    ) -> bool {
        self.transition(
            generation,
            RunState::Running {
                key: key.clone(),
                run_id: run_id.clone(),
                conversation: conversation.clone(),
            },
        )
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
