//! Terminal bridge
//!
//! Relays a pseudo-terminal session over a WebSocket: process output becomes
//! `output` frames, client frames become keystrokes and resizes.

pub mod handler;
pub mod pty;
pub mod session;

pub use handler::{terminal_router, TerminalBridgeState};
pub use pty::{NativePtySpawner, ProcessSpawner, PtyControl, SpawnOptions, SpawnedProcess};
pub use session::{Inbound, Outbound, SessionEnd, TerminalPhase, TerminalSession};
