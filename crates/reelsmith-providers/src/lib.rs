//! LLM provider abstraction.
//!
//! Each provider implements the [`LlmProvider`] trait to stream chat
//! completions from a language-model endpoint. [`LlmProvider::complete`]
//! drains a stream into one [`Completion`] for callers that do not need
//! incremental output.

use std::pin::Pin;
use std::time::Duration;

use async_trait::async_trait;
use futures::Stream;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio_stream::StreamExt;

use reelsmith_core::transcript::{TranscriptEntry, Usage};

pub mod failover;
pub mod openai;
pub mod retry;
#[cfg(any(test, feature = "scripted"))]
pub mod scripted;
pub mod sse;

/// Errors surfaced by a language-model endpoint.
#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    #[error("rate limited by provider (retry after {retry_after:?})")]
    RateLimited { retry_after: Option<Duration> },

    #[error("provider API error {status}: {body}")]
    Api { status: u16, body: String },

    #[error("transport error: {0}")]
    Transport(String),

    #[error("authentication failed: {0}")]
    Auth(String),

    #[error("stream error: {0}")]
    Stream(String),
}

impl ProviderError {
    /// Whether retrying the same request may succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            ProviderError::RateLimited { .. } | ProviderError::Transport(_) => true,
            ProviderError::Api { status, .. } => *status >= 500,
            ProviderError::Auth(_) | ProviderError::Stream(_) => false,
        }
    }

    /// Server-provided delay, if the error carried one.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            ProviderError::RateLimited { retry_after } => *retry_after,
            _ => None,
        }
    }
}

/// A request to the LLM.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionRequest {
    pub model: String,
    pub messages: Vec<serde_json::Value>,
    pub max_tokens: u32,
    pub temperature: Option<f64>,
    pub tools: Option<Vec<serde_json::Value>>,
    pub system: Option<String>,
}

/// A streamed chunk from the LLM.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CompletionChunk {
    pub delta: Option<String>,
    pub tool_use: Option<ToolUseChunk>,
    pub usage: Option<ChunkUsage>,
    pub stop_reason: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolUseChunk {
    pub id: String,
    pub name: String,
    pub input_json: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChunkUsage {
    pub input_tokens: Option<u64>,
    pub output_tokens: Option<u64>,
}

/// Tool description handed to the model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub parameters_schema: serde_json::Value,
}

/// A tool invocation requested by the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    pub input: serde_json::Value,
}

/// A fully drained completion.
#[derive(Debug, Clone, Default)]
pub struct Completion {
    pub text: String,
    pub tool_calls: Vec<ToolCall>,
    pub usage: Usage,
    pub stop_reason: Option<String>,
}

impl Completion {
    /// Fold one streamed chunk into the completion.
    pub fn absorb(&mut self, chunk: CompletionChunk) {
        if let Some(delta) = chunk.delta {
            self.text.push_str(&delta);
        }
        if let Some(tc) = chunk.tool_use {
            let input = if tc.input_json.trim().is_empty() {
                serde_json::Value::Object(Default::default())
            } else {
                // Malformed arguments are passed through as a string; the
                // tool reports the parameter error back to the model.
                serde_json::from_str(&tc.input_json)
                    .unwrap_or(serde_json::Value::String(tc.input_json))
            };
            self.tool_calls.push(ToolCall {
                id: tc.id,
                name: tc.name,
                input,
            });
        }
        if let Some(usage) = chunk.usage {
            self.usage.input_tokens += usage.input_tokens.unwrap_or(0);
            self.usage.output_tokens += usage.output_tokens.unwrap_or(0);
        }
        if chunk.stop_reason.is_some() {
            self.stop_reason = chunk.stop_reason;
        }
    }
}

pub type ChunkStream = Pin<Box<dyn Stream<Item = Result<CompletionChunk, ProviderError>> + Send>>;

/// The core LLM provider trait.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Provider identifier (e.g., "openai", "ollama").
    fn id(&self) -> &str;

    /// Convert tool definitions into the provider's wire format.
    fn format_tools(&self, tools: &[ToolDefinition]) -> Vec<serde_json::Value>;

    /// Convert a transcript into the provider's message format.
    fn format_messages(&self, transcript: &[TranscriptEntry]) -> Vec<serde_json::Value>;

    /// Whether a stop reason means the model is waiting on tool results.
    fn is_tool_use_stop(&self, stop_reason: &str) -> bool;

    /// Stream a chat completion.
    async fn stream(&self, request: &CompletionRequest) -> Result<ChunkStream, ProviderError>;

    /// Run a chat completion to the end.
    async fn complete(&self, request: &CompletionRequest) -> Result<Completion, ProviderError> {
        let mut stream = self.stream(request).await?;
        let mut completion = Completion::default();
        while let Some(chunk) = stream.next().await {
            completion.absorb(chunk?);
        }
        Ok(completion)
    }
}
