//! # HTTP backend client
//!
//! [`BackendClient`] implementation over the backend's REST + SSE API:
//!
//! - `POST   /v1/rooms/{room}/threads` — create a thread
//! - `POST   /v1/rooms/{room}/threads/{thread}/runs` — create a run
//! - `DELETE /v1/rooms/{room}/threads/{thread}` — delete a thread
//! - `POST   /v1/rooms/{room}/threads/{thread}/runs/{run}/stream` — open the
//!   run's SSE event stream, posting the full conversation history

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION, CONTENT_TYPE, RETRY_AFTER};
use serde::Deserialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, warn};

use drover_core::events::RunStreamEvent;
use drover_core::ids::{RoomId, RunId, ThreadId};

use crate::backend::{BackendClient, NewThread, RunEventStream, RunRequest};
use crate::error::{ClientError, ClientResult};
use crate::sse;

/// Configuration for [`HttpBackendClient`].
#[derive(Clone, Debug)]
pub struct HttpClientConfig {
    /// Backend base URL, without a trailing slash.
    pub base_url: String,
    /// Bearer token attached to every request, if set.
    pub bearer_token: Option<String>,
}

/// Production [`BackendClient`] over HTTP + SSE.
pub struct HttpBackendClient {
    config: HttpClientConfig,
    http: reqwest::Client,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateThreadResponse {
    thread_id: ThreadId,
    #[serde(default)]
    initial_run_id: Option<RunId>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateRunResponse {
    run_id: RunId,
}

impl HttpBackendClient {
    /// Create a new client with its own connection pool.
    #[must_use]
    pub fn new(config: HttpClientConfig) -> Self {
        Self {
            config,
            http: reqwest::Client::new(),
        }
    }

    /// Create a new client sharing an existing `reqwest` client.
    #[must_use]
    pub fn with_client(config: HttpClientConfig, http: reqwest::Client) -> Self {
        Self { config, http }
    }

    fn headers(&self) -> ClientResult<HeaderMap> {
        let mut headers = HeaderMap::new();
        let _ = headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        if let Some(token) = &self.config.bearer_token {
            let value = format!("Bearer {token}");
            let _ = headers.insert(
                AUTHORIZATION,
                HeaderValue::from_str(&value).map_err(|e| ClientError::Auth {
                    status: 0,
                    message: format!("Invalid bearer token header: {e}"),
                })?,
            );
        }
        Ok(headers)
    }

    fn url(&self, suffix: &str) -> String {
        format!("{}{suffix}", self.config.base_url)
    }
}

/// Reject a non-success response, mapping status and body to [`ClientError`].
async fn check_status(response: reqwest::Response) -> ClientResult<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let retry_after_ms = response
        .headers()
        .get(RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.trim().parse::<u64>().ok())
        .map(|secs| secs * 1000);
    let body = response.text().await.unwrap_or_default();
    let message = extract_error_message(&body, status.as_u16());
    Err(ClientError::from_status(
        status.as_u16(),
        message,
        retry_after_ms,
    ))
}

/// Pull a human-readable message out of an error response body.
fn extract_error_message(body: &str, status: u16) -> String {
    if let Ok(value) = serde_json::from_str::<serde_json::Value>(body) {
        if let Some(msg) = value
            .pointer("/error/message")
            .or_else(|| value.pointer("/message"))
            .and_then(serde_json::Value::as_str)
        {
            return msg.to_owned();
        }
    }
    let trimmed = body.trim();
    if trimmed.is_empty() {
        format!("HTTP {status}")
    } else {
        trimmed.to_owned()
    }
}

#[async_trait]
impl BackendClient for HttpBackendClient {
    #[instrument(skip(self), fields(room = %room_id))]
    async fn create_thread(&self, room_id: &RoomId) -> ClientResult<NewThread> {
        let url = self.url(&format!("/v1/rooms/{room_id}/threads"));
        let response = self
            .http
            .post(&url)
            .headers(self.headers()?)
            .send()
            .await?;
        let parsed: CreateThreadResponse = check_status(response).await?.json().await?;
        debug!(thread = %parsed.thread_id, "thread created");
        Ok(NewThread {
            thread_id: parsed.thread_id,
            initial_run_id: parsed.initial_run_id,
        })
    }

    #[instrument(skip(self), fields(room = %room_id, thread = %thread_id))]
    async fn create_run(&self, room_id: &RoomId, thread_id: &ThreadId) -> ClientResult<RunId> {
        let url = self.url(&format!("/v1/rooms/{room_id}/threads/{thread_id}/runs"));
        let response = self
            .http
            .post(&url)
            .headers(self.headers()?)
            .send()
            .await?;
        let parsed: CreateRunResponse = check_status(response).await?.json().await?;
        debug!(run = %parsed.run_id, "run created");
        Ok(parsed.run_id)
    }

    #[instrument(skip(self), fields(room = %room_id, thread = %thread_id))]
    async fn delete_thread(&self, room_id: &RoomId, thread_id: &ThreadId) -> ClientResult<()> {
        let url = self.url(&format!("/v1/rooms/{room_id}/threads/{thread_id}"));
        let response = self
            .http
            .delete(&url)
            .headers(self.headers()?)
            .send()
            .await?;
        let _ = check_status(response).await?;
        debug!("thread deleted");
        Ok(())
    }

    #[instrument(skip_all, fields(thread = %request.thread_id, run = %request.run_id))]
    async fn open_run_stream(
        &self,
        request: &RunRequest,
        cancel: &CancellationToken,
    ) -> ClientResult<RunEventStream> {
        let url = self.url(&format!(
            "/v1/rooms/{}/threads/{}/runs/{}/stream",
            request.room_id, request.thread_id, request.run_id
        ));
        let mut headers = self.headers()?;
        let _ = headers.insert(ACCEPT, HeaderValue::from_static("text/event-stream"));

        let response = self
            .http
            .post(&url)
            .headers(headers)
            .json(request)
            .send()
            .await?;
        let response = check_status(response).await?;

        let lines = sse::data_lines(response.bytes_stream().boxed());
        let cancel = cancel.clone();
        let events = async_stream::stream! {
            let mut lines = std::pin::pin!(lines);
            loop {
                let line = tokio::select! {
                    biased;
                    () = cancel.cancelled() => return,
                    line = lines.next() => line,
                };
                match line {
                    Some(data) => match serde_json::from_str::<RunStreamEvent>(&data) {
                        Ok(event) => yield Ok(event),
                        // Unknown event types are skipped, not fatal
                        Err(e) => warn!(error = %e, "unparseable run stream event"),
                    },
                    None => return,
                }
            }
        };
        Ok(Box::pin(events))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use drover_core::conversation::ChatMessage;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client_for(server: &MockServer) -> HttpBackendClient {
        HttpBackendClient::new(HttpClientConfig {
            base_url: server.uri(),
            bearer_token: Some("sekrit".into()),
        })
    }

    fn run_request() -> RunRequest {
        RunRequest {
            room_id: RoomId::from("general"),
            thread_id: ThreadId::from("t-1"),
            run_id: RunId::from("r-1"),
            messages: vec![ChatMessage::User {
                content: "Hi".into(),
            }],
        }
    }

    #[tokio::test]
    async fn create_thread_parses_response() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/rooms/general/threads"))
            .and(header("authorization", "Bearer sekrit"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "threadId": "t-1",
                "initialRunId": "r-0",
            })))
            .mount(&server)
            .await;

        let thread = client_for(&server)
            .create_thread(&RoomId::from("general"))
            .await
            .unwrap();
        assert_eq!(thread.thread_id, ThreadId::from("t-1"));
        assert_eq!(thread.initial_run_id, Some(RunId::from("r-0")));
    }

    #[tokio::test]
    async fn create_thread_without_initial_run() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/rooms/general/threads"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({"threadId": "t-2"})),
            )
            .mount(&server)
            .await;

        let thread = client_for(&server)
            .create_thread(&RoomId::from("general"))
            .await
            .unwrap();
        assert_eq!(thread.initial_run_id, None);
    }

    #[tokio::test]
    async fn auth_status_maps_to_auth_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/rooms/general/threads"))
            .respond_with(ResponseTemplate::new(401).set_body_json(serde_json::json!({
                "error": {"message": "token expired"},
            })))
            .mount(&server)
            .await;

        let err = client_for(&server)
            .create_thread(&RoomId::from("general"))
            .await
            .unwrap_err();
        match err {
            ClientError::Auth { status, message } => {
                assert_eq!(status, 401);
                assert_eq!(message, "token expired");
            }
            other => panic!("expected Auth, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn rate_limit_carries_retry_after() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/rooms/general/threads/t-1/runs"))
            .respond_with(
                ResponseTemplate::new(429)
                    .insert_header("retry-after", "2")
                    .set_body_string("slow down"),
            )
            .mount(&server)
            .await;

        let err = client_for(&server)
            .create_run(&RoomId::from("general"), &ThreadId::from("t-1"))
            .await
            .unwrap_err();
        match err {
            ClientError::RateLimited {
                retry_after_ms,
                message,
            } => {
                assert_eq!(retry_after_ms, Some(2000));
                assert_eq!(message, "slow down");
            }
            other => panic!("expected RateLimited, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn server_error_maps_to_api_error() {
        let server = MockServer::start().await;
        Mock::given(method("DELETE"))
            .and(path("/v1/rooms/general/threads/t-1"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let err = client_for(&server)
            .delete_thread(&RoomId::from("general"), &ThreadId::from("t-1"))
            .await
            .unwrap_err();
        match err {
            ClientError::Api { status, message } => {
                assert_eq!(status, 500);
                assert_eq!(message, "HTTP 500");
            }
            other => panic!("expected Api, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn delete_thread_succeeds_on_204() {
        let server = MockServer::start().await;
        Mock::given(method("DELETE"))
            .and(path("/v1/rooms/general/threads/t-1"))
            .respond_with(ResponseTemplate::new(204))
            .mount(&server)
            .await;

        client_for(&server)
            .delete_thread(&RoomId::from("general"), &ThreadId::from("t-1"))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn run_stream_yields_events() {
        let body = concat!(
            "data: {\"type\":\"run_started\",\"runId\":\"r-1\"}\n\n",
            "data: {\"type\":\"text_delta\",\"delta\":\"Hello\"}\n\n",
            "data: {\"type\":\"run_finished\"}\n\n",
        );
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/rooms/general/threads/t-1/runs/r-1/stream"))
            .and(body_partial_json(serde_json::json!({
                "runId": "r-1",
            })))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "text/event-stream")
                    .set_body_string(body),
            )
            .mount(&server)
            .await;

        let stream = client_for(&server)
            .open_run_stream(&run_request(), &CancellationToken::new())
            .await
            .unwrap();
        let events: Vec<_> = stream.map(Result::unwrap).collect().await;
        assert_eq!(
            events,
            vec![
                RunStreamEvent::RunStarted {
                    run_id: RunId::from("r-1")
                },
                RunStreamEvent::TextDelta {
                    delta: "Hello".into()
                },
                RunStreamEvent::RunFinished,
            ]
        );
    }

    #[tokio::test]
    async fn run_stream_skips_unknown_events() {
        let body = concat!(
            "data: {\"type\":\"metrics_snapshot\",\"count\":4}\n\n",
            "data: {\"type\":\"run_finished\"}\n\n",
        );
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/rooms/general/threads/t-1/runs/r-1/stream"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "text/event-stream")
                    .set_body_string(body),
            )
            .mount(&server)
            .await;

        let stream = client_for(&server)
            .open_run_stream(&run_request(), &CancellationToken::new())
            .await
            .unwrap();
        let events: Vec<_> = stream.map(Result::unwrap).collect().await;
        assert_eq!(events, vec![RunStreamEvent::RunFinished]);
    }

    #[tokio::test]
    async fn run_stream_honours_cancellation() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/rooms/general/threads/t-1/runs/r-1/stream"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "text/event-stream")
                    .set_body_string("data: {\"type\":\"text_delta\",\"delta\":\"x\"}\n\n"),
            )
            .mount(&server)
            .await;

        let cancel = CancellationToken::new();
        cancel.cancel();
        let stream = client_for(&server)
            .open_run_stream(&run_request(), &cancel)
            .await
            .unwrap();
        let events: Vec<_> = stream.collect().await;
        assert!(events.is_empty());
    }

    #[test]
    fn error_message_extraction() {
        assert_eq!(
            extract_error_message("{\"error\":{\"message\":\"nope\"}}", 500),
            "nope"
        );
        assert_eq!(extract_error_message("{\"message\":\"flat\"}", 500), "flat");
        assert_eq!(extract_error_message("plain text", 500), "plain text");
        assert_eq!(extract_error_message("", 502), "HTTP 502");
    }
}
