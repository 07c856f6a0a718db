//! Agent event producers
//!
//! The agent runtime is opaque to the bridge: a producer receives the
//! conversation so far plus the new message and pushes
//! [`AgentStreamEvent`]s into a channel until it is done.

use crate::agent::types::{ChatMessage, Role};
use crate::codec::AgentStreamEvent;
use crate::config::ProducerConfig;
use crate::error::{Error, Result};
use async_trait::async_trait;
use serde::Serialize;
use serde_json::{json, Value};
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::process::Command;
use tokio::sync::mpsc;

/// Everything a producer needs for one exchange
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExchangeRequest {
    pub session_id: String,
    /// Conversation before this exchange, oldest first
    pub history: Vec<ChatMessage>,
    pub message: String,
}

/// Source of agent stream events
#[async_trait]
pub trait AgentProducer: Send + Sync {
    /// Short name for logs
    fn name(&self) -> &str;

    /// Run one exchange, pushing events into `events`.
    ///
    /// Returning `Err` reports a producer failure; the engine turns it into
    /// an `error` event.
    async fn produce(
        &self,
        request: ExchangeRequest,
        events: mpsc::Sender<AgentStreamEvent>,
    ) -> Result<()>;
}

/// Build the producer described by configuration
pub fn from_config(config: &ProducerConfig) -> Arc<dyn AgentProducer> {
    match config {
        ProducerConfig::Echo => Arc::new(EchoProducer::new()),
        ProducerConfig::Command { program, args } => {
            Arc::new(CommandProducer::new(program.clone(), args.clone()))
        }
    }
}

// =============================================================================
// Echo producer
// =============================================================================

/// Built-in producer that answers by reflecting the conversation back
#[derive(Debug, Clone, Default)]
pub struct EchoProducer {
    word_delay: Duration,
}

impl EchoProducer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pause between streamed words
    pub fn with_word_delay(mut self, delay: Duration) -> Self {
        self.word_delay = delay;
        self
    }

    fn reply(request: &ExchangeRequest) -> String {
        let previous = request
            .history
            .iter()
            .rev()
            .find(|m| m.role == Role::User)
            .map(|m| m.content.as_str());
        match previous {
            Some(previous) => format!(
                "Earlier you said \"{}\". Now you say \"{}\".",
                previous, request.message
            ),
            None => format!("You said \"{}\".", request.message),
        }
    }
}

#[async_trait]
impl AgentProducer for EchoProducer {
    fn name(&self) -> &str {
        "echo"
    }

    async fn produce(
        &self,
        request: ExchangeRequest,
        events: mpsc::Sender<AgentStreamEvent>,
    ) -> Result<()> {
        let send = |event: AgentStreamEvent| {
            let events = events.clone();
            async move {
                events
                    .send(event)
                    .await
                    .map_err(|_| Error::Agent("event channel closed".to_string()))
            }
        };

        let earlier = request.history.len();
        send(AgentStreamEvent::ThinkingStart).await?;
        send(AgentStreamEvent::ThinkingDelta {
            text: format!("Recalling {} earlier messages", earlier),
        })
        .await?;

        if earlier > 0 {
            send(AgentStreamEvent::ToolStart {
                tool_name: "recall".to_string(),
                args: json!({ "sessionId": request.session_id }),
            })
            .await?;
            send(AgentStreamEvent::ToolEnd {
                tool_name: "recall".to_string(),
                result: json!({ "messages": earlier }),
            })
            .await?;
        }

        for word in Self::reply(&request).split_inclusive(' ') {
            if !self.word_delay.is_zero() {
                tokio::time::sleep(self.word_delay).await;
            }
            send(AgentStreamEvent::Content {
                text: word.to_string(),
            })
            .await?;
        }

        send(AgentStreamEvent::Done).await
    }
}

// =============================================================================
// Command producer
// =============================================================================

/// Runs an external program per exchange.
///
/// The request is written to stdin as one JSON line; each stdout line of the
/// form `{"event": "<kind>", "data": {...}}` becomes one event.
#[derive(Debug, Clone)]
pub struct CommandProducer {
    program: String,
    args: Vec<String>,
}

impl CommandProducer {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }
}

/// Keep the tail of stderr for error reports
const STDERR_TAIL: usize = 512;

#[async_trait]
impl AgentProducer for CommandProducer {
    fn name(&self) -> &str {
        &self.program
    }

    async fn produce(
        &self,
        request: ExchangeRequest,
        events: mpsc::Sender<AgentStreamEvent>,
    ) -> Result<()> {
        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| Error::Agent(format!("Failed to spawn {}: {}", self.program, e)))?;

        tracing::debug!(
            session_id = %request.session_id,
            program = %self.program,
            pid = ?child.id(),
            "Spawned producer process"
        );

        if let Some(mut stdin) = child.stdin.take() {
            let mut line = serde_json::to_vec(&request)?;
            line.push(b'\n');
            // A program that ignores its input may have closed stdin already
            if let Err(e) = stdin.write_all(&line).await {
                tracing::debug!(program = %self.program, "Producer stdin closed: {}", e);
            }
        }

        let stderr_task = child.stderr.take().map(|mut stderr| {
            tokio::spawn(async move {
                let mut buf = Vec::new();
                let _ = stderr.read_to_end(&mut buf).await;
                let text = String::from_utf8_lossy(&buf).trim().to_string();
                let start = text
                    .char_indices()
                    .rev()
                    .nth(STDERR_TAIL)
                    .map_or(0, |(i, _)| i);
                text[start..].to_string()
            })
        });

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| Error::Internal("producer stdout not captured".to_string()))?;
        let mut reader = BufReader::new(stdout);
        let mut buf = Vec::new();
        loop {
            buf.clear();
            if reader.read_until(b'\n', &mut buf).await? == 0 {
                break;
            }
            let Ok(line) = std::str::from_utf8(&buf) else {
                tracing::debug!(program = %self.program, "Dropping non-UTF-8 producer line");
                continue;
            };
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let Some(event) = parse_event_line(line) else {
                tracing::debug!(program = %self.program, "Dropping malformed producer line");
                continue;
            };
            if events.send(event).await.is_err() {
                break;
            }
        }

        let status = child.wait().await?;
        let stderr = match stderr_task {
            Some(task) => task.await.unwrap_or_default(),
            None => String::new(),
        };

        if status.success() {
            Ok(())
        } else if stderr.is_empty() {
            Err(Error::Agent(format!("{} exited with {}", self.program, status)))
        } else {
            Err(Error::Agent(format!(
                "{} exited with {}: {}",
                self.program, status, stderr
            )))
        }
    }
}

fn parse_event_line(line: &str) -> Option<AgentStreamEvent> {
    let value: Value = serde_json::from_str(line).ok()?;
    let kind = value.get("event")?.as_str()?;
    let data = value.get("data").cloned().unwrap_or_else(|| json!({}));
    AgentStreamEvent::from_parts(kind, &data)
}
