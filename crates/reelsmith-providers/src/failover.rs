//! Failover provider: wraps multiple providers in priority order.
//!
//! On error (rate limit, auth failure, timeout), falls back to the next
//! provider in the list.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{info, warn};

use reelsmith_core::transcript::TranscriptEntry;

use crate::{ChunkStream, CompletionRequest, LlmProvider, ProviderError, ToolDefinition};

/// A failover provider that tries multiple underlying providers in order.
pub struct FailoverProvider {
    providers: Vec<Arc<dyn LlmProvider>>,
    label: String,
}

impl FailoverProvider {
    /// The first provider is primary; others are fallbacks.
    pub fn new(label: String, providers: Vec<Arc<dyn LlmProvider>>) -> Self {
        Self { providers, label }
    }

    fn primary(&self) -> Option<&Arc<dyn LlmProvider>> {
        self.providers.first()
    }
}

#[async_trait]
impl LlmProvider for FailoverProvider {
    fn id(&self) -> &str {
        &self.label
    }

    fn format_tools(&self, tools: &[ToolDefinition]) -> Vec<serde_json::Value> {
        self.primary()
            .map(|p| p.format_tools(tools))
            .unwrap_or_default()
    }

    fn format_messages(&self, transcript: &[TranscriptEntry]) -> Vec<serde_json::Value> {
        self.primary()
            .map(|p| p.format_messages(transcript))
            .unwrap_or_default()
    }

    fn is_tool_use_stop(&self, stop_reason: &str) -> bool {
        self.primary().is_some_and(|p| p.is_tool_use_stop(stop_reason))
    }

    async fn stream(&self, request: &CompletionRequest) -> Result<ChunkStream, ProviderError> {
        let mut last_error = None;

        for (i, provider) in self.providers.iter().enumerate() {
            match provider.stream(request).await {
                Ok(stream) => {
                    if i > 0 {
                        info!(
                            provider = provider.id(),
                            attempt = i + 1,
                            "Failover succeeded"
                        );
                    }
                    return Ok(stream);
                }
                Err(e) => {
                    warn!(
                        provider = provider.id(),
                        attempt = i + 1,
                        %e,
                        "Provider failed, trying next"
                    );
                    last_error = Some(e);
                }
            }
        }

        Err(last_error.unwrap_or_else(|| {
            ProviderError::Transport("no providers configured in failover".into())
        }))
    }
}
