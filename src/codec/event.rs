//! Agent push-stream events
//!
//! Each event travels as one block:
//!
//! ```text
//! event: <kind>
//! data: <json>
//!
//! ```

use serde_json::{json, Value};

/// HTTP header carrying a resumable session identifier
pub const SESSION_ID_HEADER: &str = "x-session-id";

/// One typed unit of an agent push stream
#[derive(Debug, Clone, PartialEq)]
pub enum AgentStreamEvent {
    /// Identifier minted for a new conversation
    Session { session_id: String },
    /// Reasoning phase begins; clears the reasoning buffer
    ThinkingStart,
    /// Reasoning fragment
    ThinkingDelta { text: String },
    /// Content fragment
    Content { text: String },
    /// Tool invocation begins
    ToolStart { tool_name: String, args: Value },
    /// Tool invocation finished
    ToolEnd { tool_name: String, result: Value },
    /// Complete message replacing any streamed content
    Message { content: String },
    /// Producer-reported error
    Error { message: String },
    /// Exchange finished
    Done,
}

impl AgentStreamEvent {
    /// Every kind name, in protocol order
    pub const KINDS: [&'static str; 9] = [
        "session",
        "thinking_start",
        "thinking_delta",
        "content",
        "tool_start",
        "tool_end",
        "message",
        "error",
        "done",
    ];

    /// Wire name written after `event:`
    pub fn kind(&self) -> &'static str {
        match self {
            AgentStreamEvent::Session { .. } => "session",
            AgentStreamEvent::ThinkingStart => "thinking_start",
            AgentStreamEvent::ThinkingDelta { .. } => "thinking_delta",
            AgentStreamEvent::Content { .. } => "content",
            AgentStreamEvent::ToolStart { .. } => "tool_start",
            AgentStreamEvent::ToolEnd { .. } => "tool_end",
            AgentStreamEvent::Message { .. } => "message",
            AgentStreamEvent::Error { .. } => "error",
            AgentStreamEvent::Done => "done",
        }
    }

    /// JSON payload written after `data:`
    pub fn data(&self) -> Value {
        match self {
            AgentStreamEvent::Session { session_id } => json!({ "sessionId": session_id }),
            AgentStreamEvent::ThinkingStart | AgentStreamEvent::Done => json!({}),
            AgentStreamEvent::ThinkingDelta { text } | AgentStreamEvent::Content { text } => {
                json!({ "text": text })
            }
            AgentStreamEvent::ToolStart { tool_name, args } => {
                json!({ "toolName": tool_name, "args": args })
            }
            AgentStreamEvent::ToolEnd { tool_name, result } => {
                json!({ "toolName": tool_name, "result": result })
            }
            AgentStreamEvent::Message { content } => json!({ "content": content }),
            AgentStreamEvent::Error { message } => json!({ "message": message }),
        }
    }

    /// Rebuild an event from its kind name and payload.
    ///
    /// Returns `None` for unknown kinds or payloads missing a required
    /// field. Optional values (`args`, `result`) default to `null`.
    pub fn from_parts(kind: &str, data: &Value) -> Option<Self> {
        let text_field = |name: &str| data.get(name).and_then(Value::as_str).map(str::to_string);
        let value_field = |name: &str| data.get(name).cloned().unwrap_or(Value::Null);

        let event = match kind {
            "session" => AgentStreamEvent::Session {
                session_id: text_field("sessionId")?,
            },
            "thinking_start" => AgentStreamEvent::ThinkingStart,
            "thinking_delta" => AgentStreamEvent::ThinkingDelta {
                text: text_field("text")?,
            },
            "content" => AgentStreamEvent::Content {
                text: text_field("text")?,
            },
            "tool_start" => AgentStreamEvent::ToolStart {
                tool_name: text_field("toolName")?,
                args: value_field("args"),
            },
            "tool_end" => AgentStreamEvent::ToolEnd {
                tool_name: text_field("toolName")?,
                result: value_field("result"),
            },
            "message" => AgentStreamEvent::Message {
                content: text_field("content")?,
            },
            "error" => AgentStreamEvent::Error {
                message: text_field("message")?,
            },
            "done" => AgentStreamEvent::Done,
            _ => return None,
        };
        Some(event)
    }

    /// Encode as one `event:/data:` block terminated by a blank line
    pub fn to_block(&self) -> String {
        format!("event: {}\ndata: {}\n\n", self.kind(), self.data())
    }

    /// Whether this event ends the exchange
    pub fn is_terminal(&self) -> bool {
        matches!(self, AgentStreamEvent::Done)
    }
}
