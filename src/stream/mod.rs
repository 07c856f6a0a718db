//! Agent push-stream consumption
//!
//! Bytes become events in [`parser`]; events become renderable state in
//! [`assembly`]. The two halves know nothing about each other's transport,
//! so the same pair serves the HTTP [`client`] and the server-side exchange
//! recorder.

pub mod assembly;
pub mod client;
pub mod parser;

pub use assembly::{FinalMessage, InFlightMessage, StreamAssembler, ToolCall};
pub use client::AgentClient;
pub use parser::EventStreamParser;
