//! HTTP consumer for agent push streams
//!
//! Posts one message, feeds the response body through an
//! [`EventStreamParser`] and a [`StreamAssembler`], and remembers the session
//! identifier so the next call resumes the same conversation. Dropping a
//! pending call stops consumption; the server-side exchange keeps running.

use crate::codec::{AgentStreamEvent, SESSION_ID_HEADER};
use crate::error::{Error, Result};
use crate::stream::assembly::{FinalMessage, InFlightMessage, StreamAssembler};
use crate::stream::parser::EventStreamParser;
use futures::{Stream, StreamExt};

/// Streaming path relative to the base URL
pub const STREAM_PATH: &str = "/api/agent/stream";

/// Client for the agent streaming endpoint
#[derive(Debug, Clone)]
pub struct AgentClient {
    http: reqwest::Client,
    base_url: String,
    session_id: Option<String>,
}

impl AgentClient {
    /// Create a client for a bridge at `base_url` (e.g. `http://127.0.0.1:7681`)
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            session_id: None,
        }
    }

    /// Resume a conversation started earlier
    pub fn with_session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    /// Session identifier learned from the server
    pub fn session_id(&self) -> Option<&str> {
        self.session_id.as_deref()
    }

    /// Send a message and assemble the streamed reply.
    ///
    /// `on_update` runs after every event with the event and the current
    /// in-progress state.
    pub async fn send<F>(&mut self, message: &str, mut on_update: F) -> Result<FinalMessage>
    where
        F: FnMut(&AgentStreamEvent, &InFlightMessage),
    {
        let response = self.post(message).await?;

        if let Some(id) = response
            .headers()
            .get(SESSION_ID_HEADER)
            .and_then(|v| v.to_str().ok())
        {
            self.session_id = Some(id.to_string());
        }

        let mut assembler = match &self.session_id {
            Some(id) => StreamAssembler::with_session(id.clone()),
            None => StreamAssembler::new(),
        };
        let mut parser = EventStreamParser::new();
        let mut body = response.bytes_stream();

        let mut finished = None;
        'read: while let Some(chunk) = body.next().await {
            let chunk = chunk.map_err(|e| Error::Transport(format!("stream read failed: {}", e)))?;
            for event in parser.feed(&chunk) {
                finished = assembler.apply(&event);
                on_update(&event, assembler.snapshot());
                if finished.is_some() {
                    break 'read;
                }
            }
        }

        if finished.is_none() {
            if !parser.is_idle() {
                tracing::debug!("Push stream ended inside an unterminated block");
            }
            for event in parser.close() {
                finished = assembler.apply(&event);
                on_update(&event, assembler.snapshot());
                if finished.is_some() {
                    break;
                }
            }
        }

        if parser.dropped() > 0 {
            tracing::debug!(dropped = parser.dropped(), "Dropped malformed push-stream events");
        }
        if let Some(id) = assembler.session_id() {
            self.session_id = Some(id.to_string());
        }

        if finished.is_none() && !assembler.is_idle() {
            tracing::debug!("Push stream ended without done; keeping partial message");
        }
        finished
            .or_else(|| assembler.finish())
            .ok_or_else(|| Error::Transport("stream ended before any event".to_string()))
    }

    /// Send a message and return the raw event stream.
    ///
    /// Unlike [`send`](Self::send) this does not track the session
    /// identifier; callers read it from the `session` event.
    pub async fn events(
        &self,
        message: &str,
    ) -> Result<impl Stream<Item = Result<AgentStreamEvent>>> {
        let response = self.post(message).await?;
        let mut body = response.bytes_stream();

        Ok(async_stream::try_stream! {
            let mut parser = EventStreamParser::new();
            while let Some(chunk) = body.next().await {
                let chunk: bytes::Bytes = chunk
                    .map_err(|e| Error::Transport(format!("stream read failed: {}", e)))?;
                for event in parser.feed(&chunk) {
                    yield event;
                }
            }
            for event in parser.close() {
                yield event;
            }
        })
    }

    async fn post(&self, message: &str) -> Result<reqwest::Response> {
        let mut body = serde_json::json!({ "message": message });
        if let Some(id) = &self.session_id {
            body["sessionId"] = serde_json::Value::String(id.clone());
        }

        let response = self
            .http
            .post(format!("{}{}", self.base_url, STREAM_PATH))
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(Error::Agent(format!("stream request rejected ({}): {}", status, text)));
        }
        Ok(response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_url_trailing_slash_trimmed() {
        let client = AgentClient::new("http://localhost:7681/");
        assert_eq!(client.base_url, "http://localhost:7681");
        assert!(client.session_id().is_none());
    }

    #[test]
    fn test_with_session() {
        let client = AgentClient::new("http://localhost:7681").with_session("abc");
        assert_eq!(client.session_id(), Some("abc"));
    }

    #[tokio::test]
    async fn test_connection_refused_is_http_error() {
        // Port 9 (discard) is not expected to run an HTTP server
        let mut client = AgentClient::new("http://127.0.0.1:9");
        let err = client.send("hi", |_, _| {}).await.unwrap_err();
        assert!(matches!(err, Error::Http(_)));
    }
}
