//! Multi-session coordinator — the runtime facade.
//!
//! Owns the mapping from [`ThreadKey`] to live [`AgentSession`], enforces
//! the platform re-entrancy guard and the global concurrency ceiling,
//! exposes join-all / race-any combinators, and deletes ephemeral backend
//! threads exactly once when their session finishes.
//!
//! Sessions are independent: no cross-session ordering is guaranteed, one
//! session's failure never cancels a sibling, and `wait_any` losers keep
//! running until the caller decides otherwise.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use parking_lot::Mutex;
use tokio::sync::broadcast;
use tracing::{debug, info, instrument, warn};

use drover_client::BackendClient;
use drover_core::ids::{RoomId, RunId, ServerId, ThreadId, ThreadKey};
use drover_tools::RegistryResolver;

use crate::errors::RuntimeError;
use crate::platform::PlatformCapabilities;
use crate::session::AgentSession;
use crate::state::AgentResult;

/// Capacity of the session-change notification channel.
const NOTICE_CAPACITY: usize = 256;

/// Session-map change notifications.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SessionNotice {
    /// A session was spawned and tracked.
    Added(ThreadKey),
    /// A session reached a terminal state (or was disposed) and was
    /// removed from tracking.
    Removed(ThreadKey),
}

/// Options for [`AgentRuntime::spawn`].
#[derive(Clone, Debug)]
pub struct SpawnOptions {
    /// Reuse an existing backend thread instead of creating one.
    pub thread_id: Option<ThreadId>,
    /// Default timeout applied by the wait combinators.
    pub timeout: Option<Duration>,
    /// Delete the backend thread once the session finishes.
    pub ephemeral: bool,
}

impl Default for SpawnOptions {
    fn default() -> Self {
        Self {
            thread_id: None,
            timeout: None,
            ephemeral: true,
        }
    }
}

#[derive(Clone)]
struct SessionEntry {
    session: Arc<AgentSession>,
    ephemeral: bool,
}

/// The coordinator facade.
pub struct AgentRuntime {
    client: Arc<dyn BackendClient>,
    resolver: RegistryResolver,
    platform: PlatformCapabilities,
    server_id: ServerId,
    sessions: Arc<DashMap<ThreadKey, SessionEntry>>,
    notices: Arc<Mutex<Option<broadcast::Sender<SessionNotice>>>>,
    /// Thread ids whose deletion has been claimed; the claim is what makes
    /// cleanup exactly-once under completion/dispose races.
    claimed_deletions: Arc<DashMap<ThreadId, ()>>,
    disposed: Arc<AtomicBool>,
}

impl AgentRuntime {
    /// Create a coordinator bound to one backend instance.
    #[must_use]
    pub fn new(
        client: Arc<dyn BackendClient>,
        resolver: RegistryResolver,
        platform: PlatformCapabilities,
        server_id: ServerId,
    ) -> Self {
        let (notices, _) = broadcast::channel(NOTICE_CAPACITY);
        Self {
            client,
            resolver,
            platform,
            server_id,
            sessions: Arc::new(DashMap::new()),
            notices: Arc::new(Mutex::new(Some(notices))),
            claimed_deletions: Arc::new(DashMap::new()),
            disposed: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Spawn a session in `room_id` and start it on `prompt`.
    ///
    /// Guarded in order: disposed, platform re-entrancy, concurrency
    /// ceiling. Every failure on this path propagates synchronously —
    /// spawn either returns a session in motion or raises.
    #[instrument(skip(self, prompt, options), fields(room = %room_id))]
    pub async fn spawn(
        &self,
        room_id: RoomId,
        prompt: &str,
        options: SpawnOptions,
    ) -> Result<Arc<AgentSession>, RuntimeError> {
        if self.disposed.load(Ordering::SeqCst) {
            return Err(RuntimeError::Disposed);
        }
        if !self.platform.supports_reentrancy {
            if let Some(entry) = self.sessions.iter().next() {
                return Err(RuntimeError::NonReentrant {
                    active: entry.key().clone(),
                });
            }
        }
        if self.sessions.len() >= self.platform.max_concurrent_sessions {
            return Err(RuntimeError::SessionLimit {
                limit: self.platform.max_concurrent_sessions,
            });
        }

        let (thread_id, initial_run_id): (ThreadId, Option<RunId>) = match options.thread_id {
            Some(thread_id) => (thread_id, None),
            None => {
                let created = self.client.create_thread(&room_id).await?;
                (created.thread_id, created.initial_run_id)
            }
        };

        let registry = (self.resolver)(&room_id);
        let key = ThreadKey::new(self.server_id.clone(), room_id, thread_id);
        let session = Arc::new(AgentSession::new(
            key.clone(),
            self.client.clone(),
            registry,
            options.timeout,
        ));
        session.start(prompt, initial_run_id).await?;

        let _ = self.sessions.insert(
            key.clone(),
            SessionEntry {
                session: session.clone(),
                ephemeral: options.ephemeral,
            },
        );
        notify(&self.notices, SessionNotice::Added(key.clone()));
        info!(key = %key, ephemeral = options.ephemeral, "session spawned");

        self.spawn_terminal_watcher(key, session.clone(), options.ephemeral);
        Ok(session)
    }

    /// Join all sessions; one result per input, in input order.
    ///
    /// A failing session never cancels its siblings. The explicit timeout
    /// overrides each session's spawn-time default.
    pub async fn wait_all(
        &self,
        sessions: &[Arc<AgentSession>],
        timeout: Option<Duration>,
    ) -> Result<Vec<AgentResult>, RuntimeError> {
        if self.disposed.load(Ordering::SeqCst) {
            return Err(RuntimeError::Disposed);
        }
        let results = futures::future::join_all(
            sessions
                .iter()
                .map(|s| s.await_result(timeout.or(s.default_timeout()))),
        )
        .await;
        Ok(results)
    }

    /// Race the sessions; first terminal result wins.
    ///
    /// Losers keep running — cancelling them is the caller's decision.
    /// Returns `None` for an empty input set.
    pub async fn wait_any(
        &self,
        sessions: &[Arc<AgentSession>],
        timeout: Option<Duration>,
    ) -> Result<Option<AgentResult>, RuntimeError> {
        if self.disposed.load(Ordering::SeqCst) {
            return Err(RuntimeError::Disposed);
        }
        if sessions.is_empty() {
            return Ok(None);
        }
        let waits: Vec<_> = sessions
            .iter()
            .map(|s| Box::pin(s.await_result(timeout.or(s.default_timeout()))))
            .collect();
        let (result, _, _) = futures::future::select_all(waits).await;
        Ok(Some(result))
    }

    /// Cancel every tracked session.
    pub fn cancel_all(&self) -> Result<(), RuntimeError> {
        if self.disposed.load(Ordering::SeqCst) {
            return Err(RuntimeError::Disposed);
        }
        for entry in self.sessions.iter() {
            entry.value().session.cancel();
        }
        Ok(())
    }

    /// Live sessions, in no particular order.
    #[must_use]
    pub fn sessions(&self) -> Vec<Arc<AgentSession>> {
        self.sessions
            .iter()
            .map(|e| e.value().session.clone())
            .collect()
    }

    /// Number of tracked sessions.
    #[must_use]
    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    /// Look up a tracked session.
    #[must_use]
    pub fn session_for(&self, key: &ThreadKey) -> Option<Arc<AgentSession>> {
        self.sessions.get(key).map(|e| e.value().session.clone())
    }

    /// Subscribe to session added/removed notices.
    pub fn subscribe(&self) -> Result<broadcast::Receiver<SessionNotice>, RuntimeError> {
        self.notices
            .lock()
            .as_ref()
            .map(broadcast::Sender::subscribe)
            .ok_or(RuntimeError::Disposed)
    }

    /// Shut the coordinator down.
    ///
    /// Idempotent and safe under concurrent invocation: cancels every
    /// session, best-effort deletes still-live ephemeral threads (errors
    /// swallowed, one deletion per thread id even when racing the terminal
    /// watchers), disposes sessions, clears tracking, and closes the
    /// notification channel. Every other method fails with
    /// [`RuntimeError::Disposed`] afterwards.
    pub async fn dispose(&self) {
        if self.disposed.swap(true, Ordering::SeqCst) {
            return;
        }
        info!(sessions = self.sessions.len(), "runtime disposing");

        let entries: Vec<(ThreadKey, SessionEntry)> = self
            .sessions
            .iter()
            .map(|e| (e.key().clone(), e.value().clone()))
            .collect();

        for (_, entry) in &entries {
            entry.session.cancel();
        }
        for (key, entry) in &entries {
            if entry.ephemeral {
                delete_thread_once(
                    &self.client,
                    &self.claimed_deletions,
                    &key.room_id,
                    &key.thread_id,
                )
                .await;
            }
            entry.session.dispose();
            if self.sessions.remove(key).is_some() {
                notify(&self.notices, SessionNotice::Removed(key.clone()));
            }
        }
        self.sessions.clear();
        let _ = self.notices.lock().take();
    }

    /// Watch one session to its terminal state, then clean up.
    fn spawn_terminal_watcher(&self, key: ThreadKey, session: Arc<AgentSession>, ephemeral: bool) {
        let sessions = self.sessions.clone();
        let notices = self.notices.clone();
        let claimed = self.claimed_deletions.clone();
        let client = self.client.clone();
        let _ = tokio::spawn(async move {
            let _ = session.await_result(None).await;
            if sessions.remove(&key).is_some() {
                notify(&notices, SessionNotice::Removed(key.clone()));
            }
            if ephemeral {
                delete_thread_once(&client, &claimed, &key.room_id, &key.thread_id).await;
            }
            debug!(key = %key, "session cleaned up");
        });
    }
}

fn notify(
    notices: &Mutex<Option<broadcast::Sender<SessionNotice>>>,
    notice: SessionNotice,
) {
    if let Some(tx) = notices.lock().as_ref() {
        let _ = tx.send(notice);
    }
}

/// Delete a thread at most once across all racing cleanup paths.
async fn delete_thread_once(
    client: &Arc<dyn BackendClient>,
    claimed: &DashMap<ThreadId, ()>,
    room_id: &RoomId,
    thread_id: &ThreadId,
) {
    if claimed.insert(thread_id.clone(), ()).is_some() {
        return;
    }
    debug!(thread = %thread_id, "deleting ephemeral thread");
    if let Err(e) = client.delete_thread(room_id, thread_id).await {
        warn!(thread = %thread_id, error = %e, "ephemeral thread deletion failed");
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
