//! Agent session registry and conversation persistence

pub mod registry;
pub mod store;

pub use registry::{AgentSession, AgentSessionRegistry, ResolvedSession};
pub use store::{HistoryStore, JsonFileHistoryStore, MemoryHistoryStore};
