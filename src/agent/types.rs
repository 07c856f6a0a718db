//! Conversation and request types for the agent streaming protocol

use crate::stream::{FinalMessage, ToolCall};
use serde::{Deserialize, Serialize};

/// Who authored a message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Assistant,
}

/// One entry of a conversation history
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub thinking: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCall>,
    /// Unix milliseconds
    pub timestamp: i64,
}

impl ChatMessage {
    /// A message typed by the user
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
            thinking: String::new(),
            tool_calls: Vec::new(),
            timestamp: chrono::Utc::now().timestamp_millis(),
        }
    }

    /// The assistant's finalized reply
    pub fn assistant(message: FinalMessage) -> Self {
        Self {
            role: Role::Assistant,
            content: message.content_text,
            thinking: message.thinking_text,
            tool_calls: message.tool_calls,
            timestamp: chrono::Utc::now().timestamp_millis(),
        }
    }
}

// =============================================================================
// HTTP bodies
// =============================================================================

/// Body of `POST /api/agent/stream`
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamRequest {
    pub message: String,
    #[serde(default, alias = "session_id")]
    pub session_id: Option<String>,
}

/// Session listing entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSummary {
    pub id: String,
    pub message_count: usize,
    pub created_at: i64,
    pub last_active: i64,
}
