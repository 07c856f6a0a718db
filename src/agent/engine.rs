//! Agent exchange engine
//!
//! Runs one streaming exchange per request:
//!
//! ```text
//! handler ──start_exchange──▶ registry.resolve ──▶ producer task
//!    ▲                                                  │ events
//!    └──── client channel ◀── relay (+ StreamAssembler) ◀┘
//!                                   │ done
//!                                   └──▶ registry.record_exchange, then `done` to client
//! ```
//!
//! The relay owns the exchange: it keeps draining the producer and records
//! the finished message even after the client has stopped listening.

use crate::agent::producer::{AgentProducer, ExchangeRequest};
use crate::agent::types::ChatMessage;
use crate::codec::AgentStreamEvent;
use crate::error::{Error, Result};
use crate::session::AgentSessionRegistry;
use crate::stream::{FinalMessage, StreamAssembler};
use std::sync::Arc;
use tokio::sync::mpsc;

/// Depth of per-exchange event channels
const EVENT_BUFFER: usize = 64;

/// A running exchange as seen by the caller
pub struct Exchange {
    /// Resolved session identifier (new or resumed)
    pub session_id: String,
    /// True when the identifier was minted for this exchange
    pub is_new: bool,
    /// Ordered events for the client; ends after `done`
    pub events: mpsc::Receiver<AgentStreamEvent>,
    /// Completes with the finalized assistant message once recorded
    pub handle: tokio::task::JoinHandle<FinalMessage>,
}

/// Core engine tying the registry to a producer
pub struct AgentEngine {
    registry: Arc<AgentSessionRegistry>,
    producer: Arc<dyn AgentProducer>,
}

impl AgentEngine {
    pub fn new(registry: Arc<AgentSessionRegistry>, producer: Arc<dyn AgentProducer>) -> Self {
        Self { registry, producer }
    }

    pub fn registry(&self) -> &Arc<AgentSessionRegistry> {
        &self.registry
    }

    /// Resolve the session and start streaming a reply to `message`.
    ///
    /// Event order on the returned channel: `session` (new identifiers
    /// only), producer events, then exactly one `done`. A producer failure
    /// shows up as one `error` event before `done`.
    pub async fn start_exchange(
        &self,
        requested_session: Option<&str>,
        message: String,
    ) -> Result<Exchange> {
        if message.trim().is_empty() {
            return Err(Error::Agent("message must not be empty".to_string()));
        }

        let resolved = self.registry.resolve(requested_session).await;
        let session_id = resolved.session.id.clone();
        let is_new = resolved.is_new;
        let history = resolved.session.history().await;

        tracing::info!(
            session_id = %session_id,
            is_new,
            history = history.len(),
            producer = %self.producer.name(),
            "Starting agent exchange"
        );

        let (client_tx, client_rx) = mpsc::channel(EVENT_BUFFER);
        let relay = Relay {
            session_id: session_id.clone(),
            client: Some(client_tx),
            assembler: StreamAssembler::with_session(session_id.clone()),
            finished: None,
        };
        let request = ExchangeRequest {
            session_id: session_id.clone(),
            history,
            message,
        };

        let handle = tokio::spawn(run_exchange(
            relay,
            is_new,
            request,
            self.producer.clone(),
            self.registry.clone(),
        ));

        Ok(Exchange {
            session_id,
            is_new,
            events: client_rx,
            handle,
        })
    }
}

async fn run_exchange(
    mut relay: Relay,
    is_new: bool,
    request: ExchangeRequest,
    producer: Arc<dyn AgentProducer>,
    registry: Arc<AgentSessionRegistry>,
) -> FinalMessage {
    let session_id = request.session_id.clone();
    let user_message = ChatMessage::user(request.message.clone());

    if is_new {
        relay
            .emit(AgentStreamEvent::Session {
                session_id: session_id.clone(),
            })
            .await;
    }

    let (producer_tx, mut producer_rx) = mpsc::channel(EVENT_BUFFER);
    let producer_task = tokio::spawn(async move { producer.produce(request, producer_tx).await });

    while let Some(event) = producer_rx.recv().await {
        if matches!(event, AgentStreamEvent::Session { .. }) {
            tracing::debug!(session_id = %session_id, "Ignoring session event from producer");
            continue;
        }
        if relay.finished.is_some() {
            tracing::debug!(
                session_id = %session_id,
                kind = event.kind(),
                "Dropping producer event after done"
            );
            continue;
        }
        if event.is_terminal() {
            relay.complete(&registry, &user_message).await;
        } else {
            relay.emit(event).await;
        }
    }

    let failure = match producer_task.await {
        Ok(Ok(())) => None,
        Ok(Err(e)) => Some(e.to_string()),
        Err(e) => Some(format!("producer task failed: {}", e)),
    };
    if let Some(message) = failure {
        if relay.finished.is_none() {
            tracing::warn!(session_id = %session_id, "Producer failed: {}", message);
            relay.emit(AgentStreamEvent::Error { message }).await;
        } else {
            tracing::warn!(session_id = %session_id, "Producer failed after done: {}", message);
        }
    }
    if relay.finished.is_none() {
        relay.complete(&registry, &user_message).await;
    }

    relay.finished.take().unwrap_or_default()
}

/// Delivery side of one exchange
struct Relay {
    session_id: String,
    /// `None` once the client has gone away
    client: Option<mpsc::Sender<AgentStreamEvent>>,
    assembler: StreamAssembler,
    finished: Option<FinalMessage>,
}

impl Relay {
    /// Apply an event and forward it to the client, if still listening
    async fn emit(&mut self, event: AgentStreamEvent) {
        self.assembler.apply(&event);
        self.deliver(event).await;
    }

    /// Freeze the message, record the exchange, then send `done`.
    ///
    /// History is recorded before the client sees `done`.
    async fn complete(&mut self, registry: &AgentSessionRegistry, user_message: &ChatMessage) {
        let final_message = self
            .assembler
            .apply(&AgentStreamEvent::Done)
            .unwrap_or_default();
        registry
            .record_exchange(
                &self.session_id,
                vec![
                    user_message.clone(),
                    ChatMessage::assistant(final_message.clone()),
                ],
            )
            .await;
        self.finished = Some(final_message);

        tracing::info!(
            session_id = %self.session_id,
            observed = self.client.is_some(),
            "Agent exchange complete"
        );

        self.deliver(AgentStreamEvent::Done).await;
        // Nothing follows done
        self.client = None;
    }

    async fn deliver(&mut self, event: AgentStreamEvent) {
        if let Some(client) = &self.client {
            if client.send(event).await.is_err() {
                tracing::debug!(
                    session_id = %self.session_id,
                    "Client stopped listening; continuing unobserved"
                );
                self.client = None;
            }
        }
    }
}
