//! Per-turn transcript model used while an agent talks to its model.
//!
//! A transcript lives only for the duration of one agent invocation; it is
//! never persisted.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{ChatMessage, ChatRole, ContentBlock};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum TranscriptEntry {
    #[serde(rename = "user")]
    User {
        content: Vec<ContentBlock>,
        timestamp: DateTime<Utc>,
    },
    #[serde(rename = "assistant")]
    Assistant {
        content: Vec<ContentBlock>,
        #[serde(skip_serializing_if = "Option::is_none")]
        usage: Option<Usage>,
        timestamp: DateTime<Utc>,
    },
    #[serde(rename = "tool_result")]
    ToolResult {
        tool_use_id: String,
        tool: String,
        content: String,
        is_error: bool,
        timestamp: DateTime<Utc>,
    },
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    pub input_tokens: u64,
    pub output_tokens: u64,
}

impl TranscriptEntry {
    pub fn user_text(text: impl Into<String>) -> Self {
        Self::User {
            content: vec![ContentBlock::text(text)],
            timestamp: Utc::now(),
        }
    }

    pub fn assistant_text(text: impl Into<String>) -> Self {
        Self::Assistant {
            content: vec![ContentBlock::text(text)],
            usage: None,
            timestamp: Utc::now(),
        }
    }
}

impl From<&ChatMessage> for TranscriptEntry {
    fn from(msg: &ChatMessage) -> Self {
        match msg.role {
            ChatRole::Human => TranscriptEntry::User {
                content: vec![ContentBlock::text(msg.content.clone())],
                timestamp: msg.timestamp,
            },
            ChatRole::Ai => TranscriptEntry::Assistant {
                content: vec![ContentBlock::text(msg.content.clone())],
                usage: None,
                timestamp: msg.timestamp,
            },
        }
    }
}
