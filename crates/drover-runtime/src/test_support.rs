//! Shared test doubles: a scripted backend and stub tools.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;

use drover_client::{BackendClient, ClientError, ClientResult, NewThread, RunEventStream, RunRequest};
use drover_core::events::RunStreamEvent;
use drover_core::ids::{RoomId, RunId, ServerId, ThreadId, ThreadKey};
use drover_tools::{AgentTool, ToolError, ToolRegistry};

/// One scripted response to `open_run_stream`, consumed in order.
pub enum Script {
    /// Yield these events, then end the stream.
    Events(Vec<Result<RunStreamEvent, ClientError>>),
    /// Yield these events, then hang until cancelled.
    EventsThenHang(Vec<Result<RunStreamEvent, ClientError>>),
    /// Hang immediately.
    Hang,
    /// Fail the stream-open call itself.
    ConnectError(ClientError),
}

/// In-memory [`BackendClient`] driven by a queue of [`Script`]s.
///
/// Records every call for assertions. When the script queue runs dry,
/// `open_run_stream` returns an immediately-ended stream (a silent
/// disconnect).
pub struct ScriptedBackend {
    scripts: Mutex<VecDeque<Script>>,
    counter: AtomicUsize,
    /// Rooms passed to `create_thread`, in call order.
    pub created_threads: Mutex<Vec<RoomId>>,
    /// `initial_run_id` handed out by the next `create_thread`.
    pub initial_run_id: Mutex<Option<RunId>>,
    /// `(room, thread)` pairs passed to `create_run`, in call order.
    pub created_runs: Mutex<Vec<(RoomId, ThreadId)>>,
    /// `(room, thread)` pairs passed to `delete_thread`, in call order.
    pub deleted_threads: Mutex<Vec<(RoomId, ThreadId)>>,
    /// Every `open_run_stream` request, in call order.
    pub captured_requests: Mutex<Vec<RunRequest>>,
    /// Error returned by the next `create_run`, taken once.
    pub fail_next_create_run: Mutex<Option<ClientError>>,
    /// Error returned by the next `create_thread`, taken once.
    pub fail_next_create_thread: Mutex<Option<ClientError>>,
    /// Artificial delay applied inside `delete_thread`.
    pub delete_delay: Mutex<Option<Duration>>,
}

impl ScriptedBackend {
    pub fn new(scripts: Vec<Script>) -> Self {
        Self {
            scripts: Mutex::new(scripts.into()),
            counter: AtomicUsize::new(0),
            created_threads: Mutex::new(vec![]),
            initial_run_id: Mutex::new(None),
            created_runs: Mutex::new(vec![]),
            deleted_threads: Mutex::new(vec![]),
            captured_requests: Mutex::new(vec![]),
            fail_next_create_run: Mutex::new(None),
            fail_next_create_thread: Mutex::new(None),
            delete_delay: Mutex::new(None),
        }
    }

    fn next_id(&self) -> usize {
        self.counter.fetch_add(1, Ordering::Relaxed)
    }
}

#[async_trait]
impl BackendClient for ScriptedBackend {
    async fn create_thread(&self, room_id: &RoomId) -> ClientResult<NewThread> {
        if let Some(err) = self.fail_next_create_thread.lock().take() {
            return Err(err);
        }
        self.created_threads.lock().push(room_id.clone());
        Ok(NewThread {
            thread_id: ThreadId::from(format!("t-{}", self.next_id())),
            initial_run_id: self.initial_run_id.lock().take(),
        })
    }

    async fn create_run(&self, room_id: &RoomId, thread_id: &ThreadId) -> ClientResult<RunId> {
        if let Some(err) = self.fail_next_create_run.lock().take() {
            return Err(err);
        }
        self.created_runs
            .lock()
            .push((room_id.clone(), thread_id.clone()));
        Ok(RunId::from(format!("r-{}", self.next_id())))
    }

    async fn delete_thread(&self, room_id: &RoomId, thread_id: &ThreadId) -> ClientResult<()> {
        let delay = *self.delete_delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.deleted_threads
            .lock()
            .push((room_id.clone(), thread_id.clone()));
        Ok(())
    }

    async fn open_run_stream(
        &self,
        request: &RunRequest,
        _cancel: &CancellationToken,
    ) -> ClientResult<RunEventStream> {
        self.captured_requests.lock().push(request.clone());
        let script = self.scripts.lock().pop_front();
        match script {
            Some(Script::Events(events)) => Ok(Box::pin(futures::stream::iter(events))),
            Some(Script::EventsThenHang(events)) => Ok(Box::pin(
                futures::stream::iter(events).chain(futures::stream::pending()),
            )),
            Some(Script::Hang) => Ok(Box::pin(futures::stream::pending())),
            Some(Script::ConnectError(err)) => Err(err),
            None => Ok(Box::pin(futures::stream::empty())),
        }
    }
}

/// `[RunStarted, TextDelta(text), RunFinished]`.
pub fn text_run_script(text: &str) -> Script {
    Script::Events(vec![
        Ok(RunStreamEvent::RunStarted {
            run_id: RunId::from("r-s"),
        }),
        Ok(RunStreamEvent::TextDelta { delta: text.into() }),
        Ok(RunStreamEvent::RunFinished),
    ])
}

/// A run that emits one complete tool call and finishes.
pub fn tool_call_script(id: &str, name: &str, arguments: &str) -> Script {
    Script::Events(vec![
        Ok(RunStreamEvent::RunStarted {
            run_id: RunId::from("r-s"),
        }),
        Ok(RunStreamEvent::ToolCallStart {
            tool_call_id: id.into(),
            name: name.into(),
        }),
        Ok(RunStreamEvent::ToolCallDelta {
            tool_call_id: id.into(),
            arguments_delta: arguments.into(),
        }),
        Ok(RunStreamEvent::ToolCallEnd {
            tool_call_id: id.into(),
        }),
        Ok(RunStreamEvent::RunFinished),
    ])
}

/// Fixed thread key for single-session tests.
pub fn test_key() -> ThreadKey {
    ThreadKey::new(
        ServerId::from("s1"),
        RoomId::from("general"),
        ThreadId::from("t-1"),
    )
}

struct StaticTool {
    tool_name: String,
    output: String,
}

#[async_trait]
impl AgentTool for StaticTool {
    fn name(&self) -> &str {
        &self.tool_name
    }

    async fn execute(&self, _arguments: &serde_json::Value) -> Result<String, ToolError> {
        Ok(self.output.clone())
    }
}

struct FailingTool {
    tool_name: String,
    message: String,
}

#[async_trait]
impl AgentTool for FailingTool {
    fn name(&self) -> &str {
        &self.tool_name
    }

    async fn execute(&self, _arguments: &serde_json::Value) -> Result<String, ToolError> {
        Err(ToolError::Execution {
            name: self.tool_name.clone(),
            message: self.message.clone(),
        })
    }
}

/// A tool that always returns `output`.
pub fn static_tool(name: &str, output: &str) -> Arc<dyn AgentTool> {
    Arc::new(StaticTool {
        tool_name: name.into(),
        output: output.into(),
    })
}

/// A tool that always fails with `message`.
pub fn failing_tool(name: &str, message: &str) -> Arc<dyn AgentTool> {
    Arc::new(FailingTool {
        tool_name: name.into(),
        message: message.into(),
    })
}

/// Registry where each name resolves to a tool returning `"<name>-output"`.
pub fn registry_with(names: &[&str]) -> ToolRegistry {
    let mut registry = ToolRegistry::new();
    for name in names {
        registry.register(static_tool(name, &format!("{name}-output")));
    }
    registry
}
