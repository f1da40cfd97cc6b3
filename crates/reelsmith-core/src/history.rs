//! Chat-history store: prior human/AI turns handed to a workflow as
//! read-only context.

use std::path::PathBuf;

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tracing::debug;

use crate::error::{ReelsmithError, Result};
use crate::types::{ChatMessage, ChatRole};

#[async_trait]
pub trait ChatHistoryStore: Send + Sync {
    /// All messages recorded for a session, oldest first. Unknown sessions are empty.
    async fn load(&self, session_id: &str) -> Result<Vec<ChatMessage>>;

    /// Append messages to a session, creating it if needed.
    async fn append(&self, session_id: &str, messages: &[ChatMessage]) -> Result<()>;
}

/// File-based history store, one append-only JSONL file per session.
///
/// Layout: `<base>/<session_id>.jsonl`
pub struct JsonlChatHistoryStore {
    base: PathBuf,
}

impl JsonlChatHistoryStore {
    pub fn new(base: PathBuf) -> Self {
        Self { base }
    }

    fn session_path(&self, session_id: &str) -> PathBuf {
        self.base.join(format!("{}.jsonl", sanitize_session_id(session_id)))
    }
}

/// Keep alphanumerics, `-` and `_`; everything else becomes `_`.
fn sanitize_session_id(session_id: &str) -> String {
    let cleaned: String = session_id
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect();
    if cleaned.is_empty() {
        "default".to_string()
    } else {
        cleaned
    }
}

#[async_trait]
impl ChatHistoryStore for JsonlChatHistoryStore {
    async fn load(&self, session_id: &str) -> Result<Vec<ChatMessage>> {
        let path = self.session_path(session_id);
        if !path.exists() {
            return Ok(Vec::new());
        }
        let data = tokio::fs::read_to_string(&path).await?;
        let mut messages = Vec::new();
        for line in data.lines() {
            if line.trim().is_empty() {
                continue;
            }
            let msg: ChatMessage = serde_json::from_str(line)
                .map_err(|e| ReelsmithError::Store(format!("corrupt history line: {e}")))?;
            messages.push(msg);
        }
        debug!(session = session_id, messages = messages.len(), "Loaded chat history");
        Ok(messages)
    }

    async fn append(&self, session_id: &str, messages: &[ChatMessage]) -> Result<()> {
        if messages.is_empty() {
            return Ok(());
        }
        tokio::fs::create_dir_all(&self.base).await?;

        let mut data = String::new();
        for msg in messages {
            data.push_str(&serde_json::to_string(msg)?);
            data.push('\n');
        }

        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.session_path(session_id))
            .await?;
        file.write_all(data.as_bytes()).await?;
        file.flush().await?;
        Ok(())
    }
}

/// Render history as the plain-text transcript placed in a start event's
/// `chat_history` field.
pub fn render_history(messages: &[ChatMessage]) -> String {
    messages
        .iter()
        .map(|m| {
            let speaker = match m.role {
                ChatRole::Human => "Human",
                ChatRole::Ai => "AI",
            };
            format!("{speaker}: {}", m.content)
        })
        .collect::<Vec<_>>()
        .join("\n")
}
