//! In-process provider that answers from canned replies.
//!
//! Replies are keyed by a substring of the request's system prompt, so each
//! agent role in a workflow can be scripted independently. Within a rule the
//! replies are consumed in order and the last one repeats.

use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;

use reelsmith_core::transcript::TranscriptEntry;

use crate::{
    ChunkStream, ChunkUsage, CompletionChunk, CompletionRequest, LlmProvider, ProviderError,
    ToolDefinition, ToolUseChunk,
};

#[derive(Debug, Clone)]
pub enum ScriptedReply {
    Text(String),
    /// Ask for one tool call; the next reply in the rule answers the follow-up.
    ToolCall {
        name: String,
        input: serde_json::Value,
    },
    /// Answer with text after a delay.
    Delayed { delay: Duration, text: String },
    /// Never answer.
    Hang,
    Fail(ProviderError),
}

impl ScriptedReply {
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text(text.into())
    }

    pub fn tool_call(name: impl Into<String>, input: serde_json::Value) -> Self {
        Self::ToolCall {
            name: name.into(),
            input,
        }
    }
}

struct Rule {
    key: String,
    replies: Vec<ScriptedReply>,
    cursor: usize,
    calls: usize,
}

#[derive(Default)]
pub struct ScriptedProvider {
    rules: Mutex<Vec<Rule>>,
    fallback: Option<ScriptedReply>,
    requests: Mutex<Vec<CompletionRequest>>,
    next_call_id: AtomicUsize,
}

impl ScriptedProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Script replies for requests whose system prompt contains `key`.
    /// Rules are checked in registration order.
    pub fn on(self, key: impl Into<String>, replies: Vec<ScriptedReply>) -> Self {
        if let Ok(mut rules) = self.rules.lock() {
            rules.push(Rule {
                key: key.into(),
                replies,
                cursor: 0,
                calls: 0,
            });
        }
        self
    }

    /// Reply used when no rule matches.
    pub fn otherwise(mut self, reply: ScriptedReply) -> Self {
        self.fallback = Some(reply);
        self
    }

    /// Every request received so far, in arrival order.
    pub fn requests(&self) -> Vec<CompletionRequest> {
        self.requests
            .lock()
            .map(|r| r.clone())
            .unwrap_or_default()
    }

    /// Number of requests answered by the rule registered under `key`.
    pub fn calls(&self, key: &str) -> usize {
        self.rules
            .lock()
            .ok()
            .and_then(|rules| rules.iter().find(|r| r.key == key).map(|r| r.calls))
            .unwrap_or(0)
    }

    fn next_reply(&self, system: &str) -> Option<ScriptedReply> {
        let mut rules = self.rules.lock().ok()?;
        let Some(rule) = rules.iter_mut().find(|r| system.contains(&r.key)) else {
            return self.fallback.clone();
        };
        rule.calls += 1;
        let idx = rule.cursor.min(rule.replies.len().saturating_sub(1));
        if rule.cursor < rule.replies.len() {
            rule.cursor += 1;
        }
        rule.replies.get(idx).cloned()
    }

    fn text_chunks(text: String) -> Vec<Result<CompletionChunk, ProviderError>> {
        vec![
            Ok(CompletionChunk {
                delta: Some(text),
                ..Default::default()
            }),
            Ok(CompletionChunk {
                usage: Some(ChunkUsage {
                    input_tokens: Some(10),
                    output_tokens: Some(5),
                }),
                stop_reason: Some("stop".into()),
                ..Default::default()
            }),
        ]
    }
}

#[async_trait]
impl LlmProvider for ScriptedProvider {
    fn id(&self) -> &str {
        "scripted"
    }

    fn format_tools(&self, tools: &[ToolDefinition]) -> Vec<serde_json::Value> {
        tools
            .iter()
            .filter_map(|t| serde_json::to_value(t).ok())
            .collect()
    }

    fn format_messages(&self, transcript: &[TranscriptEntry]) -> Vec<serde_json::Value> {
        transcript
            .iter()
            .filter_map(|e| serde_json::to_value(e).ok())
            .collect()
    }

    fn is_tool_use_stop(&self, stop_reason: &str) -> bool {
        stop_reason == "tool_calls"
    }

    async fn stream(&self, request: &CompletionRequest) -> Result<ChunkStream, ProviderError> {
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(request.clone());
        }

        let system = request.system.as_deref().unwrap_or_default();
        let reply = self.next_reply(system).ok_or_else(|| ProviderError::Api {
            status: 404,
            body: format!("no scripted reply for system prompt: {system}"),
        })?;

        let chunks = match reply {
            ScriptedReply::Text(text) => Self::text_chunks(text),
            ScriptedReply::Delayed { delay, text } => {
                tokio::time::sleep(delay).await;
                Self::text_chunks(text)
            }
            ScriptedReply::ToolCall { name, input } => {
                let n = self.next_call_id.fetch_add(1, Ordering::Relaxed);
                vec![
                    Ok(CompletionChunk {
                        tool_use: Some(ToolUseChunk {
                            id: format!("call_{n}"),
                            name,
                            input_json: input.to_string(),
                        }),
                        ..Default::default()
                    }),
                    Ok(CompletionChunk {
                        stop_reason: Some("tool_calls".into()),
                        ..Default::default()
                    }),
                ]
            }
            ScriptedReply::Hang => return std::future::pending().await,
            ScriptedReply::Fail(e) => return Err(e),
        };

        Ok(Box::pin(futures::stream::iter(chunks)))
    }
}
