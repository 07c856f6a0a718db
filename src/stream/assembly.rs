//! Stream assembly state machine
//!
//! Turns an ordered [`AgentStreamEvent`] sequence into the in-progress view
//! of one assistant message and freezes it when the exchange ends. Pure with
//! respect to its input: no I/O, no clock, no rendering.

use crate::codec::AgentStreamEvent;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One tool invocation tracked during an exchange
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolCall {
    pub name: String,
    pub args: Value,
    /// Absent until a matching `tool_end` arrives
    pub result: Option<Value>,
}

impl ToolCall {
    pub fn is_resolved(&self) -> bool {
        self.result.is_some()
    }
}

/// Accumulated state of the message being streamed
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InFlightMessage {
    pub thinking_text: String,
    pub content_text: String,
    pub tool_calls: Vec<ToolCall>,
}

impl InFlightMessage {
    fn is_empty(&self) -> bool {
        self.thinking_text.is_empty() && self.content_text.is_empty() && self.tool_calls.is_empty()
    }
}

/// Message frozen at the end of an exchange
pub type FinalMessage = InFlightMessage;

/// Client-side accumulator for one push stream at a time
#[derive(Debug, Default)]
pub struct StreamAssembler {
    session_id: Option<String>,
    current: InFlightMessage,
    touched: bool,
}

impl StreamAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start with a session identifier persisted from an earlier exchange
    pub fn with_session(session_id: impl Into<String>) -> Self {
        Self {
            session_id: Some(session_id.into()),
            ..Self::default()
        }
    }

    /// Session identifier announced by the producer, if any
    pub fn session_id(&self) -> Option<&str> {
        self.session_id.as_deref()
    }

    /// Current renderable state
    pub fn snapshot(&self) -> &InFlightMessage {
        &self.current
    }

    /// Apply one event. Returns the frozen message when the event is `done`.
    pub fn apply(&mut self, event: &AgentStreamEvent) -> Option<FinalMessage> {
        match event {
            AgentStreamEvent::Session { session_id } => {
                self.session_id = Some(session_id.clone());
                return None;
            }
            AgentStreamEvent::ThinkingStart => {
                self.current.thinking_text.clear();
            }
            AgentStreamEvent::ThinkingDelta { text } => {
                self.current.thinking_text.push_str(text);
            }
            AgentStreamEvent::Content { text } => {
                self.current.content_text.push_str(text);
            }
            AgentStreamEvent::ToolStart { tool_name, args } => {
                self.current.tool_calls.push(ToolCall {
                    name: tool_name.clone(),
                    args: args.clone(),
                    result: None,
                });
            }
            AgentStreamEvent::ToolEnd { tool_name, result } => {
                // Latest outstanding call with this name wins
                match self
                    .current
                    .tool_calls
                    .iter_mut()
                    .rev()
                    .find(|call| call.name == *tool_name && !call.is_resolved())
                {
                    Some(call) => call.result = Some(result.clone()),
                    None => {
                        tracing::debug!(tool = %tool_name, "tool_end without a pending call");
                    }
                }
            }
            AgentStreamEvent::Message { content } => {
                self.current.content_text = content.clone();
            }
            AgentStreamEvent::Error { message } => {
                if !self.current.content_text.is_empty() {
                    self.current.content_text.push_str("\n\n");
                }
                self.current.content_text.push_str(&format!("[error] {}", message));
            }
            AgentStreamEvent::Done => {
                self.touched = true;
                return self.finish();
            }
        }
        self.touched = true;
        None
    }

    /// Signal end of stream. Freezes whatever accumulated since the last
    /// `done`; returns `None` when nothing did.
    pub fn finish(&mut self) -> Option<FinalMessage> {
        if !self.touched {
            return None;
        }
        self.touched = false;
        Some(std::mem::take(&mut self.current))
    }

    /// True when buffers hold nothing for the next exchange
    pub fn is_idle(&self) -> bool {
        !self.touched && self.current.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn content(text: &str) -> AgentStreamEvent {
        AgentStreamEvent::Content {
            text: text.to_string(),
        }
    }

    fn tool_start(name: &str, args: Value) -> AgentStreamEvent {
        AgentStreamEvent::ToolStart {
            tool_name: name.to_string(),
            args,
        }
    }

    fn tool_end(name: &str, result: Value) -> AgentStreamEvent {
        AgentStreamEvent::ToolEnd {
            tool_name: name.to_string(),
            result,
        }
    }

    #[test]
    fn test_content_accumulates() {
        let mut asm = StreamAssembler::new();
        asm.apply(&content("Hello, "));
        asm.apply(&content("world"));
        assert_eq!(asm.snapshot().content_text, "Hello, world");
    }

    #[test]
    fn test_thinking_start_resets_reasoning() {
        let mut asm = StreamAssembler::new();
        asm.apply(&AgentStreamEvent::ThinkingStart);
        asm.apply(&AgentStreamEvent::ThinkingDelta {
            text: "first".to_string(),
        });
        asm.apply(&AgentStreamEvent::ThinkingStart);
        asm.apply(&AgentStreamEvent::ThinkingDelta {
            text: "second".to_string(),
        });
        assert_eq!(asm.snapshot().thinking_text, "second");
    }

    #[test]
    fn test_tool_end_resolves_latest_pending_call() {
        let mut asm = StreamAssembler::new();
        asm.apply(&tool_start("A", json!({ "n": 1 })));
        asm.apply(&tool_start("A", json!({ "n": 2 })));
        asm.apply(&tool_end("A", json!("R")));

        let calls = &asm.snapshot().tool_calls;
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].result, None);
        assert_eq!(calls[1].result, Some(json!("R")));
    }

    #[test]
    fn test_tool_end_skips_resolved_calls() {
        let mut asm = StreamAssembler::new();
        asm.apply(&tool_start("A", json!(1)));
        asm.apply(&tool_start("B", json!(2)));
        asm.apply(&tool_start("A", json!(3)));
        asm.apply(&tool_end("A", json!("first")));
        asm.apply(&tool_end("A", json!("second")));

        let calls = &asm.snapshot().tool_calls;
        assert_eq!(calls[2].result, Some(json!("first")));
        assert_eq!(calls[0].result, Some(json!("second")));
        assert_eq!(calls[1].result, None);
    }

    #[test]
    fn test_unmatched_tool_end_ignored() {
        let mut asm = StreamAssembler::new();
        asm.apply(&tool_start("A", json!(null)));
        asm.apply(&tool_end("Z", json!("orphan")));
        let calls = &asm.snapshot().tool_calls;
        assert_eq!(calls.len(), 1);
        assert!(!calls[0].is_resolved());
    }

    #[test]
    fn test_message_replaces_content() {
        let mut asm = StreamAssembler::new();
        asm.apply(&content("partial "));
        asm.apply(&content("text"));
        asm.apply(&AgentStreamEvent::Message {
            content: "final".to_string(),
        });
        assert_eq!(asm.snapshot().content_text, "final");
    }

    #[test]
    fn test_error_appends_notice() {
        let mut asm = StreamAssembler::new();
        asm.apply(&content("Working on it"));
        asm.apply(&AgentStreamEvent::Error {
            message: "rate limited".to_string(),
        });
        assert_eq!(
            asm.snapshot().content_text,
            "Working on it\n\n[error] rate limited"
        );
    }

    #[test]
    fn test_error_on_empty_content() {
        let mut asm = StreamAssembler::new();
        asm.apply(&AgentStreamEvent::Error {
            message: "boom".to_string(),
        });
        assert_eq!(asm.snapshot().content_text, "[error] boom");
    }

    #[test]
    fn test_done_freezes_and_clears() {
        let mut asm = StreamAssembler::new();
        asm.apply(&AgentStreamEvent::Session {
            session_id: "s-1".to_string(),
        });
        asm.apply(&AgentStreamEvent::ThinkingDelta {
            text: "plan".to_string(),
        });
        asm.apply(&content("answer"));

        let done = asm.apply(&AgentStreamEvent::Done).unwrap();
        assert_eq!(done.thinking_text, "plan");
        assert_eq!(done.content_text, "answer");
        assert!(asm.is_idle());
        // Session identity survives the exchange
        assert_eq!(asm.session_id(), Some("s-1"));
        // Stream end right after done produces nothing new
        assert!(asm.finish().is_none());
    }

    #[test]
    fn test_finish_without_done() {
        let mut asm = StreamAssembler::new();
        asm.apply(&content("cut off"));
        let message = asm.finish().unwrap();
        assert_eq!(message.content_text, "cut off");
    }

    #[test]
    fn test_finish_on_untouched_assembler() {
        let mut asm = StreamAssembler::with_session("kept");
        assert!(asm.finish().is_none());
        assert_eq!(asm.session_id(), Some("kept"));
    }

    #[test]
    fn test_session_event_has_no_render_effect() {
        let mut asm = StreamAssembler::new();
        asm.apply(&AgentStreamEvent::Session {
            session_id: "s".to_string(),
        });
        assert!(asm.is_idle());
    }

    #[test]
    fn test_snapshot_serializes_camel_case() {
        let mut asm = StreamAssembler::new();
        asm.apply(&tool_start("t", json!({})));
        let value = serde_json::to_value(asm.snapshot()).unwrap();
        assert!(value.get("toolCalls").is_some());
        assert!(value.get("contentText").is_some());
    }
}
