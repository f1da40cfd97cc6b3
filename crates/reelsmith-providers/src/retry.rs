//! Retrying provider: re-issues requests that failed with a transient error.
//!
//! A `Retry-After` delay sent by the endpoint takes precedence over the
//! policy's exponential backoff. Once the budget is spent the last error is
//! returned unchanged.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::warn;

use reelsmith_core::retry::RetryPolicy;
use reelsmith_core::transcript::TranscriptEntry;

use crate::{
    ChunkStream, Completion, CompletionRequest, LlmProvider, ProviderError, ToolDefinition,
};

pub struct RetryingProvider {
    inner: Arc<dyn LlmProvider>,
    policy: RetryPolicy,
}

impl RetryingProvider {
    pub fn new(inner: Arc<dyn LlmProvider>, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }

    async fn backoff(&self, attempt: u32, err: &ProviderError) -> bool {
        if !err.is_transient() || attempt >= self.policy.max_retries {
            return false;
        }
        let delay = self.policy.delay_for(attempt, err.retry_after());
        warn!(
            provider = self.inner.id(),
            attempt = attempt + 1,
            delay_ms = delay.as_millis() as u64,
            %err,
            "Transient provider error, retrying"
        );
        tokio::time::sleep(delay).await;
        true
    }
}

#[async_trait]
impl LlmProvider for RetryingProvider {
    fn id(&self) -> &str {
        self.inner.id()
    }

    fn format_tools(&self, tools: &[ToolDefinition]) -> Vec<serde_json::Value> {
        self.inner.format_tools(tools)
    }

    fn format_messages(&self, transcript: &[TranscriptEntry]) -> Vec<serde_json::Value> {
        self.inner.format_messages(transcript)
    }

    fn is_tool_use_stop(&self, stop_reason: &str) -> bool {
        self.inner.is_tool_use_stop(stop_reason)
    }

    async fn stream(&self, request: &CompletionRequest) -> Result<ChunkStream, ProviderError> {
        let mut attempt = 0;
        loop {
            match self.inner.stream(request).await {
                Ok(stream) => return Ok(stream),
                Err(e) => {
                    if !self.backoff(attempt, &e).await {
                        return Err(e);
                    }
                    attempt += 1;
                }
            }
        }
    }

    /// Retries the whole completion, so a stream that breaks midway is
    /// re-requested from the start.
    async fn complete(&self, request: &CompletionRequest) -> Result<Completion, ProviderError> {
        let mut attempt = 0;
        loop {
            match self.inner.complete(request).await {
                Ok(completion) => return Ok(completion),
                Err(e) => {
                    if !self.backoff(attempt, &e).await {
                        return Err(e);
                    }
                    attempt += 1;
                }
            }
        }
    }
}
