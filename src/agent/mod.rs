//! Agent streaming module
//!
//! Runs agent exchanges and streams their events to HTTP clients.
//!
//! ## Architecture
//!
//! ```text
//! client ──POST /api/agent/stream──▶ handler ──▶ engine ──▶ producer
//!    ▲                                              │
//!    └───────────── text/event-stream ◀─────────────┘
//!                                                   └──▶ session registry ──▶ history store
//! ```

pub mod engine;
pub mod handler;
pub mod producer;
pub mod types;

pub use engine::{AgentEngine, Exchange};
pub use handler::{agent_router, AgentState};
pub use producer::{AgentProducer, CommandProducer, EchoProducer, ExchangeRequest};
pub use types::{ChatMessage, Role, SessionSummary, StreamRequest};
