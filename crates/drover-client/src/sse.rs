//! # SSE framing
//!
//! Server-Sent Events parser for the backend run stream. Handles line
//! buffering across chunk boundaries, `data:` payload extraction, comment
//! and `[DONE]` filtering, and a trailing unterminated line at stream end.

use bytes::{Bytes, BytesMut};
use futures::Stream;
use tokio_stream::StreamExt;
use tracing::warn;

/// Byte buffer that yields complete SSE lines as chunks arrive.
#[derive(Debug, Default)]
pub struct LineBuffer {
    buf: BytesMut,
}

impl LineBuffer {
    /// Empty buffer.
    #[must_use]
    pub fn new() -> Self {
        Self {
            buf: BytesMut::with_capacity(8192),
        }
    }

    /// Append a raw chunk.
    pub fn push(&mut self, chunk: &[u8]) {
        self.buf.extend_from_slice(chunk);
    }

    /// Pop the next complete line, if one is buffered.
    ///
    /// Strips the trailing `\n` (and `\r` for CRLF framing). Lines that are
    /// not valid UTF-8 are dropped.
    pub fn next_line(&mut self) -> Option<String> {
        loop {
            let newline = self.buf.iter().position(|&b| b == b'\n')?;
            let mut line = self.buf.split_to(newline + 1);
            line.truncate(line.len() - 1);
            if line.last() == Some(&b'\r') {
                line.truncate(line.len() - 1);
            }
            match std::str::from_utf8(&line) {
                Ok(s) => return Some(s.to_owned()),
                Err(_) => continue,
            }
        }
    }

    /// Drain whatever is left after the stream ends (an unterminated line).
    pub fn take_remainder(&mut self) -> Option<String> {
        if self.buf.is_empty() {
            return None;
        }
        let rest = self.buf.split();
        std::str::from_utf8(&rest).ok().map(str::to_owned)
    }
}

/// Extract the payload of an SSE `data:` line.
///
/// Returns `None` for empty lines, comments, event/id fields, and the
/// `[DONE]` sentinel.
#[must_use]
pub fn data_payload(line: &str) -> Option<String> {
    let trimmed = line.trim();
    if trimmed.is_empty() || trimmed.starts_with(':') {
        return None;
    }
    let data = trimmed
        .strip_prefix("data: ")
        .or_else(|| trimmed.strip_prefix("data:"))?
        .trim();
    if data.is_empty() || data == "[DONE]" {
        return None;
    }
    Some(data.to_owned())
}

/// Adapt a byte stream into a stream of SSE data payloads.
///
/// Transport read errors end the stream (logged, not surfaced) — to the
/// consumer that is indistinguishable from a silent disconnect, which is
/// exactly how the run state machine classifies it.
pub fn data_lines<S>(byte_stream: S) -> impl Stream<Item = String> + Send
where
    S: Stream<Item = Result<Bytes, reqwest::Error>> + Send + Unpin + 'static,
{
    futures::stream::unfold(
        (byte_stream, LineBuffer::new(), false),
        |(mut stream, mut buffer, ended)| async move {
            if ended {
                return None;
            }
            loop {
                while let Some(line) = buffer.next_line() {
                    if let Some(data) = data_payload(&line) {
                        return Some((data, (stream, buffer, false)));
                    }
                }
                match stream.next().await {
                    Some(Ok(chunk)) => buffer.push(&chunk),
                    Some(Err(e)) => {
                        warn!(error = %e, "SSE stream read error");
                        return None;
                    }
                    None => {
                        let data = buffer.take_remainder().and_then(|l| data_payload(&l));
                        return data.map(|d| (d, (stream, buffer, true)));
                    }
                }
            }
        },
    )
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
