//! Wire codecs for both protocol stacks
//!
//! - [`terminal`]: JSON envelopes for the terminal socket
//! - [`event`]: typed agent push-stream events and their block encoding

pub mod event;
pub mod terminal;

pub use event::{AgentStreamEvent, SESSION_ID_HEADER};
pub use terminal::{decode_client_binary, decode_client_text, ClientFrame, ServerFrame, TerminalSize};
