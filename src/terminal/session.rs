//! Terminal session lifecycle
//!
//! One session binds one connection to one spawned shell:
//!
//! ```text
//! Starting ──spawn ok──▶ Running ──exit / close / error──▶ Closing ──▶ Closed
//!     └──────────spawn failed (one info frame)──────────────────────────▲
//! ```
//!
//! The connection is seen through two channels: [`Inbound`] messages from
//! the client and [`Outbound`] frames to it. Process output is pumped by its
//! own task so a slow client never stalls input going into the process.

use crate::codec::{decode_client_binary, decode_client_text, ClientFrame, ServerFrame};
use crate::error::Result;
use crate::terminal::pty::{ProcessSpawner, PtyControl, SpawnOptions, SpawnedProcess};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

/// Lifecycle phase of a terminal session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminalPhase {
    /// Process spawn in progress
    Starting,
    /// Bridging input and output
    Running,
    /// Tearing down the process and the connection
    Closing,
    /// Fully torn down
    Closed,
}

/// Message received from the connection
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inbound {
    Text(String),
    Binary(Vec<u8>),
    /// Client closed the connection
    Closed,
    /// Transport failed
    Error(String),
}

/// Instruction for the connection writer
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outbound {
    Frame(ServerFrame),
    /// Close the connection; nothing follows
    Close,
}

/// What ended a session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEnd {
    SpawnFailed,
    ProcessExited(Option<u32>),
    ConnectionClosed,
    TransportError,
}

/// One shell bridged to one connection
pub struct TerminalSession {
    id: String,
    options: SpawnOptions,
    drain_grace: Duration,
    phase: TerminalPhase,
}

impl TerminalSession {
    /// Create a session that will spawn a shell with `options`
    pub fn new(options: SpawnOptions, drain_grace: Duration) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            options,
            drain_grace,
            phase: TerminalPhase::Starting,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn phase(&self) -> TerminalPhase {
        self.phase
    }

    /// Drive the session until either side ends it.
    ///
    /// Every process that reaches `Running` is killed exactly once before
    /// this returns, whichever trigger fired.
    pub async fn run(
        &mut self,
        spawner: Arc<dyn ProcessSpawner>,
        mut inbound: mpsc::Receiver<Inbound>,
        outbound: mpsc::Sender<Outbound>,
    ) -> SessionEnd {
        self.phase = TerminalPhase::Starting;

        let options = self.options.clone();
        let spawned = tokio::task::spawn_blocking(move || spawner.spawn(&options))
            .await
            .unwrap_or_else(|e| {
                Err(crate::Error::Internal(format!("spawn task failed: {}", e)))
            });

        let SpawnedProcess {
            mut control,
            input,
            mut output,
            mut exit,
        } = match spawned {
            Ok(process) => process,
            Err(e) => {
                tracing::warn!(
                    terminal_id = %self.id,
                    shell = %self.options.shell,
                    "Failed to start shell: {}",
                    e
                );
                let message = format!("Failed to start {}: {}", self.options.shell, e);
                let _ = outbound
                    .send(Outbound::Frame(ServerFrame::Info(message)))
                    .await;
                let _ = outbound.send(Outbound::Close).await;
                self.phase = TerminalPhase::Closed;
                return SessionEnd::SpawnFailed;
            }
        };

        self.phase = TerminalPhase::Running;
        let pid = control.pid();
        tracing::info!(
            terminal_id = %self.id,
            shell = %self.options.shell,
            pid = ?pid,
            "Terminal session running"
        );

        let banner = match pid {
            Some(pid) => format!("Connected to {} (pid {})", self.options.shell, pid),
            None => format!("Connected to {}", self.options.shell),
        };
        let _ = outbound
            .send(Outbound::Frame(ServerFrame::Info(banner)))
            .await;

        let pump_tx = outbound.clone();
        let mut pump = tokio::spawn(async move {
            while let Some(chunk) = output.recv().await {
                if pump_tx
                    .send(Outbound::Frame(ServerFrame::Output(chunk)))
                    .await
                    .is_err()
                {
                    break;
                }
            }
        });

        let end = loop {
            tokio::select! {
                code = &mut exit => break SessionEnd::ProcessExited(code.ok().flatten()),
                message = inbound.recv() => match message {
                    Some(Inbound::Text(text)) => {
                        self.handle_frame(decode_client_text(&text), &input, control.as_mut())
                            .await;
                    }
                    Some(Inbound::Binary(bytes)) => {
                        self.handle_frame(Ok(decode_client_binary(&bytes)), &input, control.as_mut())
                            .await;
                    }
                    Some(Inbound::Closed) | None => break SessionEnd::ConnectionClosed,
                    Some(Inbound::Error(e)) => {
                        tracing::warn!(terminal_id = %self.id, "Transport error: {}", e);
                        break SessionEnd::TransportError;
                    }
                },
            }
        };

        self.phase = TerminalPhase::Closing;
        drop(input);
        if let Err(e) = control.kill() {
            tracing::warn!(terminal_id = %self.id, "Failed to kill process: {}", e);
        }

        match end {
            SessionEnd::ProcessExited(code) => {
                // Flush what the process wrote before exiting, then close once
                if tokio::time::timeout(self.drain_grace, &mut pump).await.is_err() {
                    pump.abort();
                    let _ = (&mut pump).await;
                }
                if let Some(code) = code {
                    let _ = outbound
                        .send(Outbound::Frame(ServerFrame::Info(format!(
                            "Process exited with code {}",
                            code
                        ))))
                        .await;
                }
                let _ = outbound.send(Outbound::Close).await;
            }
            _ => {
                pump.abort();
                let _ = pump.await;
            }
        }

        drop(control);
        self.phase = TerminalPhase::Closed;
        tracing::info!(terminal_id = %self.id, end = ?end, "Terminal session closed");
        end
    }

    async fn handle_frame(
        &self,
        frame: Result<ClientFrame>,
        input: &mpsc::Sender<Vec<u8>>,
        control: &mut dyn PtyControl,
    ) {
        match frame {
            Ok(ClientFrame::Input(bytes)) => {
                if input.send(bytes).await.is_err() {
                    tracing::debug!(terminal_id = %self.id, "Process input closed");
                }
            }
            Ok(ClientFrame::Resize(Some(size))) => {
                let previous = control.size();
                if previous == size {
                    return;
                }
                match control.resize(size) {
                    Ok(()) => tracing::debug!(
                        terminal_id = %self.id,
                        from = ?previous,
                        cols = size.cols,
                        rows = size.rows,
                        "Resized"
                    ),
                    Err(e) => tracing::warn!(terminal_id = %self.id, "Resize failed: {}", e),
                }
            }
            Ok(ClientFrame::Resize(None)) => {
                tracing::debug!(terminal_id = %self.id, "Ignoring resize with invalid geometry");
            }
            Err(e) => {
                tracing::debug!(terminal_id = %self.id, "Dropping malformed frame: {}", e);
            }
        }
    }
}
