//! session-bridge - terminal and agent session bridge
//!
//! Two protocol stacks with the same shape: a connection-scoped session on
//! the server, a framed or evented wire format, and a client-side consumer.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                         Gateway (axum)                            │
//! │                                                                   │
//! │  /ws/terminal ──▶ TerminalSession ──▶ ProcessSpawner (PTY)         │
//! │      ▲  JSON frames (input/output/resize/info)                    │
//! │      │                                                            │
//! │  /api/agent/stream ──▶ AgentEngine ──▶ AgentProducer              │
//! │      │  text/event-stream      │                                  │
//! │      │                         └──▶ AgentSessionRegistry ──▶ HistoryStore
//! └──────┼───────────────────────────────────────────────────────────┘
//!        ▼
//!   EventStreamParser ──▶ StreamAssembler ──▶ FinalMessage   (AgentClient)
//! ```
//!
//! ## Modules
//!
//! - [`codec`]: terminal frames and agent stream events
//! - [`terminal`]: PTY spawning, session lifecycle, WebSocket route
//! - [`stream`]: push-stream parser, assembly state machine, HTTP client
//! - [`session`]: agent session registry and history stores
//! - [`agent`]: producers, exchange engine, HTTP routes
//! - [`gateway`]: server lifecycle
//! - [`config`]: configuration management

pub mod agent;
pub mod api;
pub mod codec;
pub mod config;
pub mod error;
pub mod gateway;
pub mod session;
pub mod stream;
pub mod terminal;

pub use config::BridgeConfig;
pub use error::{Error, Result};
