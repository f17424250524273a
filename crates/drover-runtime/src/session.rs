//! Agent session — wraps one orchestrator and automates the tool loop.
//!
//! A session hides `ToolYielding` entirely: its drive loop observes the
//! orchestrator's state channel, executes every pending client-side call
//! through the room's registry (isolating per-call failures), resubmits,
//! and repeats until a terminal state maps into the one cached
//! [`AgentResult`]. No code path can leave a session non-terminal while
//! also being unobservable — every exit of the loop resolves the result.

use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tokio::sync::{broadcast, watch, Notify};
use tracing::{debug, info, instrument, warn};

use drover_client::BackendClient;
use drover_core::conversation::{Conversation, ToolCallInfo, ToolCallStatus};
use drover_core::events::RunStreamEvent;
use drover_core::failure::FailureReason;
use drover_core::ids::{RunId, ThreadKey};
use drover_tools::ToolRegistry;

use crate::errors::OrchestratorError;
use crate::orchestrator::RunOrchestrator;
use crate::state::{AgentResult, RunState, SessionState};

/// One autonomous agent interaction, from prompt to cached result.
pub struct AgentSession {
    key: ThreadKey,
    orchestrator: Arc<RunOrchestrator>,
    registry: Arc<ToolRegistry>,
    state_tx: watch::Sender<SessionState>,
    result: Mutex<Option<AgentResult>>,
    done: Notify,
    started_at: Instant,
    default_timeout: Option<Duration>,
}

impl std::fmt::Debug for AgentSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgentSession")
            .field("key", &self.key)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

impl AgentSession {
    /// Create a session owning a fresh orchestrator.
    #[must_use]
    pub fn new(
        key: ThreadKey,
        client: Arc<dyn BackendClient>,
        registry: Arc<ToolRegistry>,
        default_timeout: Option<Duration>,
    ) -> Self {
        let orchestrator = Arc::new(RunOrchestrator::new(client, registry.clone()));
        let (state_tx, _) = watch::channel(SessionState::Spawning);
        Self {
            key,
            orchestrator,
            registry,
            state_tx,
            result: Mutex::new(None),
            done: Notify::new(),
            started_at: Instant::now(),
            default_timeout,
        }
    }

    /// Conversation identity.
    #[must_use]
    pub fn key(&self) -> &ThreadKey {
        &self.key
    }

    /// Coarse externally observable state.
    #[must_use]
    pub fn state(&self) -> SessionState {
        *self.state_tx.borrow()
    }

    /// Subscribe to session-state changes.
    #[must_use]
    pub fn subscribe_state(&self) -> watch::Receiver<SessionState> {
        self.state_tx.subscribe()
    }

    /// Live raw-event tail of the underlying runs (unbuffered).
    ///
    /// A late subscriber must fetch persisted history from the transport
    /// first and only then attach here.
    #[must_use]
    pub fn subscribe_events(&self) -> broadcast::Receiver<RunStreamEvent> {
        self.orchestrator.subscribe_events()
    }

    /// Timeout configured at spawn, used by the coordinator's combinators
    /// when no explicit timeout is passed.
    #[must_use]
    pub fn default_timeout(&self) -> Option<Duration> {
        self.default_timeout
    }

    /// Start the session's run and its drive loop.
    ///
    /// `existing_run_id` attaches to a backend run pre-created with the
    /// thread instead of creating one.
    #[instrument(skip_all, fields(key = %self.key))]
    pub async fn start(
        self: &Arc<Self>,
        user_message: &str,
        existing_run_id: Option<RunId>,
    ) -> Result<(), OrchestratorError> {
        self.orchestrator
            .start_run(self.key.clone(), user_message, existing_run_id, None)
            .await?;
        let _ = self.state_tx.send_replace(SessionState::Running);

        let this = Arc::clone(self);
        let _ = tokio::spawn(async move {
            this.drive_loop().await;
        });
        Ok(())
    }

    /// The cached result, once the session is terminal.
    #[must_use]
    pub fn result(&self) -> Option<AgentResult> {
        self.result.lock().clone()
    }

    /// Wait for the session's result.
    ///
    /// With a timeout, races completion against a timer and yields
    /// [`AgentResult::TimedOut`] on expiry. The underlying run keeps
    /// progressing — only the caller's view changes. Every observer of a
    /// resolved session receives the same cached value.
    pub async fn await_result(&self, timeout: Option<Duration>) -> AgentResult {
        let deadline = timeout.map(|t| tokio::time::Instant::now() + t);
        loop {
            let notified = self.done.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if let Some(result) = self.result.lock().clone() {
                return result;
            }

            match deadline {
                Some(deadline) => {
                    tokio::select! {
                        () = &mut notified => {}
                        () = tokio::time::sleep_until(deadline) => {
                            if let Some(result) = self.result.lock().clone() {
                                return result;
                            }
                            return AgentResult::TimedOut {
                                elapsed: self.started_at.elapsed(),
                                key: self.key.clone(),
                            };
                        }
                    }
                }
                None => notified.await,
            }
        }
    }

    /// Cancel the session. Idempotent; no-op once terminal.
    pub fn cancel(&self) {
        // Disposed orchestrators have already resolved; nothing to forward.
        let _ = self.orchestrator.cancel_run();
    }

    /// Release the session's orchestrator.
    pub fn dispose(&self) {
        self.orchestrator.dispose();
    }

    /// Observe run states until terminal, executing tool yields as they
    /// appear.
    async fn drive_loop(&self) {
        let mut rx = self.orchestrator.subscribe();
        loop {
            let state = rx.borrow_and_update().clone();
            match state {
                RunState::Idle | RunState::Running { .. } => {}
                RunState::ToolYielding { pending_calls, .. } => {
                    let executed = self.execute_calls(pending_calls).await;
                    match self.orchestrator.submit_tool_outputs(executed).await {
                        Ok(()) => {}
                        // The run moved on underneath us (cancelled or reset
                        // mid-execution); keep observing for the terminal.
                        Err(OrchestratorError::NotToolYielding) => {}
                        Err(OrchestratorError::Client(e)) => {
                            self.resolve(
                                AgentResult::Failure {
                                    reason: crate::classify(&e),
                                    error: e.to_string(),
                                    partial_output: None,
                                    key: self.key.clone(),
                                },
                                SessionState::Failed,
                            );
                            return;
                        }
                        Err(e) => {
                            self.resolve(
                                AgentResult::Failure {
                                    reason: FailureReason::InternalError,
                                    error: e.to_string(),
                                    partial_output: None,
                                    key: self.key.clone(),
                                },
                                SessionState::Failed,
                            );
                            return;
                        }
                    }
                }
                RunState::Completed {
                    key,
                    run_id,
                    conversation,
                } => {
                    let output = conversation
                        .last_assistant_text()
                        .unwrap_or_default()
                        .to_owned();
                    self.resolve(
                        AgentResult::Success {
                            output,
                            key,
                            run_id,
                        },
                        SessionState::Completed,
                    );
                    return;
                }
                RunState::Failed {
                    key,
                    reason,
                    error,
                    conversation,
                } => {
                    self.resolve(
                        AgentResult::Failure {
                            reason,
                            error,
                            partial_output: partial_output_of(conversation.as_ref()),
                            key,
                        },
                        SessionState::Failed,
                    );
                    return;
                }
                RunState::Cancelled { key, conversation } => {
                    self.resolve(
                        AgentResult::Failure {
                            reason: FailureReason::Cancelled,
                            error: "session cancelled".into(),
                            partial_output: partial_output_of(conversation.as_ref()),
                            key,
                        },
                        SessionState::Cancelled,
                    );
                    return;
                }
            }

            if rx.changed().await.is_err() {
                // Defensive: the orchestrator never drops its channel while a
                // session observes it, but a stuck session would be worse.
                self.resolve(
                    AgentResult::Failure {
                        reason: FailureReason::InternalError,
                        error: "run state channel closed".into(),
                        partial_output: None,
                        key: self.key.clone(),
                    },
                    SessionState::Failed,
                );
                return;
            }
        }
    }

    /// Execute pending calls sequentially; each failure is isolated to its
    /// own call.
    async fn execute_calls(&self, pending: Vec<ToolCallInfo>) -> Vec<ToolCallInfo> {
        let mut executed = Vec::with_capacity(pending.len());
        for mut call in pending {
            let arguments: serde_json::Value = serde_json::from_str(&call.arguments)
                .unwrap_or(serde_json::Value::Object(serde_json::Map::new()));
            debug!(key = %self.key, tool = %call.name, call_id = %call.id, "executing tool");
            match self.registry.execute(&call.name, &arguments).await {
                Ok(output) => {
                    call.status = ToolCallStatus::Completed;
                    call.result = Some(output);
                }
                Err(e) => {
                    warn!(key = %self.key, tool = %call.name, error = %e, "tool failed");
                    call.status = ToolCallStatus::Failed;
                    call.result = Some(e.to_string());
                }
            }
            executed.push(call);
        }
        executed
    }

    /// Cache the result exactly once and wake every waiter.
    fn resolve(&self, result: AgentResult, state: SessionState) {
        {
            let mut slot = self.result.lock();
            if slot.is_some() {
                return;
            }
            *slot = Some(result);
        }
        info!(key = %self.key, state = %state, "session resolved");
        let _ = self.state_tx.send_replace(state);
        self.done.notify_waiters();
    }
}

fn partial_output_of(conversation: Option<&Conversation>) -> Option<String> {
    let conversation = conversation?;
    conversation
        .last_assistant_text()
        .or_else(|| {
            let pending = conversation.pending_assistant_text();
            (!pending.is_empty()).then_some(pending)
        })
        .map(ToOwned::to_owned)
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
