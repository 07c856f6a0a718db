//! Gateway server for the session bridge
//!
//! Binds the HTTP listener, serves the terminal and agent routes, and owns
//! the idle-session sweeper.

mod server;

pub use server::{Gateway, GatewayBuilder, GatewayState, GatewayStatus};
