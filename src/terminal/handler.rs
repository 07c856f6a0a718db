//! WebSocket handler for the terminal bridge
//!
//! Upgrades `/ws/terminal` and wires the socket to a [`TerminalSession`]
//! through its inbound and outbound channels.

use crate::codec::TerminalSize;
use crate::config::TerminalConfig;
use crate::terminal::pty::{ProcessSpawner, SpawnOptions};
use crate::terminal::session::{Inbound, Outbound, TerminalSession};
use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    response::IntoResponse,
    routing::get,
    Router,
};
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use std::sync::Arc;
use tokio::sync::mpsc;

/// Depth of the client-to-session channel
const INBOUND_BUFFER: usize = 64;

/// Shared state for terminal handlers
#[derive(Clone)]
pub struct TerminalBridgeState {
    pub spawner: Arc<dyn ProcessSpawner>,
    pub config: TerminalConfig,
}

/// Create the terminal router
pub fn terminal_router(state: TerminalBridgeState) -> Router {
    Router::new()
        .route("/ws/terminal", get(ws_terminal_upgrade))
        .with_state(state)
}

/// Optional initial geometry, e.g. `/ws/terminal?cols=120&rows=40`
#[derive(Debug, Default, Deserialize)]
struct TerminalQuery {
    cols: Option<String>,
    rows: Option<String>,
}

impl TerminalQuery {
    /// Geometry requested by the client, if both dimensions are valid
    fn size(&self) -> Option<TerminalSize> {
        let cols = self.cols.as_deref()?.trim().parse().ok()?;
        let rows = self.rows.as_deref()?.trim().parse().ok()?;
        TerminalSize::new(cols, rows)
    }
}

// =============================================================================
// WebSocket handler
// =============================================================================

async fn ws_terminal_upgrade(
    ws: WebSocketUpgrade,
    Query(query): Query<TerminalQuery>,
    State(state): State<TerminalBridgeState>,
) -> impl IntoResponse {
    let mut options = SpawnOptions::from_config(&state.config);
    if let Some(size) = query.size() {
        options.size = size;
    }
    ws.on_upgrade(move |socket| handle_terminal_ws(socket, options, state))
}

/// Bridge one socket to one shell until either side goes away
async fn handle_terminal_ws(socket: WebSocket, options: SpawnOptions, state: TerminalBridgeState) {
    let (mut ws_sender, mut ws_receiver) = socket.split();

    let (inbound_tx, inbound_rx) = mpsc::channel::<Inbound>(INBOUND_BUFFER);
    let (outbound_tx, mut outbound_rx) =
        mpsc::channel::<Outbound>(state.config.output_buffer.max(1));

    let mut session = TerminalSession::new(options, state.config.drain_grace());
    let terminal_id = session.id().to_string();
    tracing::info!(terminal_id = %terminal_id, "Terminal WebSocket connected");

    // Forward session → client frames
    let send_id = terminal_id.clone();
    let send_task = tokio::spawn(async move {
        while let Some(outbound) = outbound_rx.recv().await {
            match outbound {
                Outbound::Frame(frame) => {
                    if ws_sender.send(Message::Text(frame.encode())).await.is_err() {
                        tracing::debug!(terminal_id = %send_id, "Terminal WebSocket send failed");
                        break;
                    }
                }
                Outbound::Close => {
                    let _ = ws_sender.send(Message::Close(None)).await;
                    break;
                }
            }
        }
    });

    // Receive client → session messages
    let recv_task = tokio::spawn(async move {
        while let Some(msg) = ws_receiver.next().await {
            let inbound = match msg {
                Ok(Message::Text(text)) => Inbound::Text(text),
                Ok(Message::Binary(bytes)) => Inbound::Binary(bytes),
                Ok(Message::Close(_)) => break,
                Ok(_) => continue,
                Err(e) => {
                    let _ = inbound_tx.send(Inbound::Error(e.to_string())).await;
                    return;
                }
            };
            if inbound_tx.send(inbound).await.is_err() {
                return;
            }
        }
        let _ = inbound_tx.send(Inbound::Closed).await;
    });

    let end = session.run(state.spawner.clone(), inbound_rx, outbound_tx).await;

    recv_task.abort();
    let _ = send_task.await;

    tracing::info!(terminal_id = %terminal_id, end = ?end, "Terminal WebSocket disconnected");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::terminal::pty::NativePtySpawner;

    fn query(cols: Option<&str>, rows: Option<&str>) -> TerminalQuery {
        TerminalQuery {
            cols: cols.map(String::from),
            rows: rows.map(String::from),
        }
    }

    #[test]
    fn test_query_geometry() {
        assert_eq!(
            query(Some("120"), Some("40")).size(),
            Some(TerminalSize { cols: 120, rows: 40 })
        );
        assert_eq!(query(Some("120"), None).size(), None);
        assert_eq!(query(Some("0"), Some("40")).size(), None);
        assert_eq!(query(Some("wide"), Some("40")).size(), None);
        assert_eq!(query(Some("70000"), Some("40")).size(), None);
        assert_eq!(TerminalQuery::default().size(), None);
    }

    #[test]
    fn test_terminal_router_builds() {
        let state = TerminalBridgeState {
            spawner: Arc::new(NativePtySpawner::new()),
            config: TerminalConfig::default(),
        };
        let _cloned = state.clone();
        let _router = terminal_router(state);
    }
}
