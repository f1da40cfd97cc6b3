//! OpenAI Chat Completions API provider.
//!
//! Implements streaming chat completions via OpenAI's `/v1/chat/completions` API.
//! Also serves as the base for OpenRouter, Ollama, and other OpenAI-compatible providers.

use std::collections::VecDeque;
use std::pin::Pin;

use async_trait::async_trait;
use futures::Stream;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio_stream::StreamExt;
use tracing::{debug, trace};

use reelsmith_core::retry::parse_retry_after;
use reelsmith_core::transcript::TranscriptEntry;
use reelsmith_core::types::ContentBlock;

use crate::sse::{SseEvent, parse_sse_stream};
use crate::{
    ChunkStream, ChunkUsage, CompletionChunk, CompletionRequest, LlmProvider, ProviderError,
    ToolDefinition, ToolUseChunk,
};

const OPENAI_BASE_URL: &str = "https://api.openai.com";
const OPENROUTER_BASE_URL: &str = "https://openrouter.ai/api";
const OLLAMA_BASE_URL: &str = "http://localhost:11434";

/// API style; determines minor behavior differences.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApiStyle {
    OpenAi,
    OpenRouter,
    Ollama,
}

pub struct OpenAiProvider {
    pub base_url: String,
    pub api_style: ApiStyle,
    provider_id: String,
    api_key: Option<String>,
    client: reqwest::Client,
}

impl OpenAiProvider {
    fn with_style(
        style: ApiStyle,
        id: &str,
        default_base: &str,
        base_url: Option<&str>,
        api_key: Option<String>,
    ) -> Self {
        Self {
            base_url: base_url
                .unwrap_or(default_base)
                .trim_end_matches('/')
                .to_string(),
            api_style: style,
            provider_id: id.into(),
            api_key,
            client: reqwest::Client::new(),
        }
    }

    pub fn openai(base_url: Option<&str>, api_key: Option<String>) -> Self {
        Self::with_style(ApiStyle::OpenAi, "openai", OPENAI_BASE_URL, base_url, api_key)
    }

    pub fn openrouter(base_url: Option<&str>, api_key: Option<String>) -> Self {
        Self::with_style(
            ApiStyle::OpenRouter,
            "openrouter",
            OPENROUTER_BASE_URL,
            base_url,
            api_key,
        )
    }

    pub fn ollama(base_url: Option<&str>) -> Self {
        Self::with_style(ApiStyle::Ollama, "ollama", OLLAMA_BASE_URL, base_url, None)
    }

    /// Build a provider from a configured id. Unknown ids are treated as
    /// OpenAI-compatible endpoints that need a `base_url`.
    pub fn from_id(id: &str, base_url: Option<&str>, api_key: Option<String>) -> Self {
        match id {
            "openrouter" => Self::openrouter(base_url, api_key),
            "ollama" => Self::ollama(base_url),
            "openai" => Self::openai(base_url, api_key),
            other => Self::with_style(ApiStyle::OpenAi, other, OPENAI_BASE_URL, base_url, api_key),
        }
    }
}

// --- OpenAI request/response types ---

#[derive(Debug, Serialize)]
struct OpenAiRequest {
    model: String,
    messages: Vec<serde_json::Value>,
    max_tokens: u32,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<serde_json::Value>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    stream_options: Option<StreamOptions>,
}

#[derive(Debug, Serialize)]
struct StreamOptions {
    include_usage: bool,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionChunk {
    #[serde(default)]
    choices: Vec<ChunkChoice>,
    #[serde(default)]
    usage: Option<OpenAiUsage>,
}

#[derive(Debug, Deserialize)]
struct ChunkChoice {
    #[serde(default)]
    delta: ChunkDelta,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct ChunkDelta {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Option<Vec<ToolCallDelta>>,
}

#[derive(Debug, Deserialize)]
struct ToolCallDelta {
    index: usize,
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    function: Option<FunctionDelta>,
}

#[derive(Debug, Default, Deserialize)]
struct FunctionDelta {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    arguments: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OpenAiUsage {
    #[serde(default)]
    prompt_tokens: u64,
    #[serde(default)]
    completion_tokens: u64,
}

/// Accumulates tool call data across streaming deltas.
#[derive(Debug, Clone, Default)]
struct ToolCallAccumulator {
    id: String,
    name: String,
    arguments: String,
}

/// Map a non-success HTTP status to a provider error.
fn error_for_status(
    status: reqwest::StatusCode,
    retry_after: Option<&str>,
    body: String,
) -> ProviderError {
    match status.as_u16() {
        429 => ProviderError::RateLimited {
            retry_after: retry_after.and_then(parse_retry_after),
        },
        401 | 403 => ProviderError::Auth(body),
        code => ProviderError::Api { status: code, body },
    }
}

#[async_trait]
impl LlmProvider for OpenAiProvider {
    fn id(&self) -> &str {
        &self.provider_id
    }

    fn format_tools(&self, tools: &[ToolDefinition]) -> Vec<serde_json::Value> {
        tools
            .iter()
            .map(|t| {
                json!({
                    "type": "function",
                    "function": {
                        "name": t.name,
                        "description": t.description,
                        "parameters": t.parameters_schema,
                    }
                })
            })
            .collect()
    }

    fn format_messages(&self, transcript: &[TranscriptEntry]) -> Vec<serde_json::Value> {
        let mut messages: Vec<serde_json::Value> = Vec::new();

        for entry in transcript {
            match entry {
                TranscriptEntry::User { content, .. } => {
                    let text = content
                        .iter()
                        .filter_map(|b| match b {
                            ContentBlock::Text { text } => Some(text.as_str()),
                            _ => None,
                        })
                        .collect::<Vec<_>>()
                        .join("\n");
                    if !text.is_empty() {
                        messages.push(json!({ "role": "user", "content": text }));
                    }
                }
                TranscriptEntry::Assistant { content, .. } => {
                    let mut text_parts = Vec::new();
                    let mut tool_calls = Vec::new();

                    for block in content {
                        match block {
                            ContentBlock::Text { text } => text_parts.push(text.clone()),
                            ContentBlock::ToolUse { id, name, input } => {
                                tool_calls.push(json!({
                                    "id": id,
                                    "type": "function",
                                    "function": {
                                        "name": name,
                                        "arguments": input.to_string(),
                                    }
                                }));
                            }
                            ContentBlock::ToolResult { .. } => {}
                        }
                    }

                    let mut msg = json!({ "role": "assistant" });
                    if !text_parts.is_empty() {
                        msg["content"] = json!(text_parts.join("\n"));
                    }
                    if !tool_calls.is_empty() {
                        msg["tool_calls"] = json!(tool_calls);
                    }
                    if msg.get("content").is_some() || msg.get("tool_calls").is_some() {
                        messages.push(msg);
                    }
                }
                TranscriptEntry::ToolResult {
                    tool_use_id,
                    content,
                    ..
                } => {
                    messages.push(json!({
                        "role": "tool",
                        "tool_call_id": tool_use_id,
                        "content": content,
                    }));
                }
            }
        }

        messages
    }

    fn is_tool_use_stop(&self, stop_reason: &str) -> bool {
        stop_reason == "tool_calls"
    }

    async fn stream(&self, request: &CompletionRequest) -> Result<ChunkStream, ProviderError> {
        let mut messages = Vec::new();
        if let Some(ref system) = request.system {
            messages.push(json!({ "role": "system", "content": system }));
        }
        messages.extend(request.messages.iter().cloned());

        let body = OpenAiRequest {
            model: request.model.clone(),
            messages,
            max_tokens: request.max_tokens,
            stream: true,
            temperature: request.temperature,
            tools: request.tools.clone().filter(|t| !t.is_empty()),
            stream_options: Some(StreamOptions {
                include_usage: true,
            }),
        };

        debug!(model = %body.model, base_url = %self.base_url, "Streaming OpenAI-compatible API");

        let mut req_builder = self
            .client
            .post(format!("{}/v1/chat/completions", self.base_url))
            .header("content-type", "application/json");

        // Auth differs by style
        if self.api_style != ApiStyle::Ollama {
            let api_key = self.api_key.as_deref().ok_or_else(|| {
                ProviderError::Auth(format!("no API key configured for '{}'", self.provider_id))
            })?;
            req_builder = req_builder.header("authorization", format!("Bearer {api_key}"));
        }
        if self.api_style == ApiStyle::OpenRouter {
            req_builder = req_builder.header("X-Title", "reelsmith");
        }

        let response = req_builder
            .json(&body)
            .send()
            .await
            .map_err(|e| ProviderError::Transport(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let retry_after = response
                .headers()
                .get(reqwest::header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string);
            let body = response.text().await.unwrap_or_default();
            return Err(error_for_status(status, retry_after.as_deref(), body));
        }

        let sse_stream = parse_sse_stream(response);

        let chunk_stream = futures::stream::unfold(
            OpenAiChunkState {
                sse: Box::pin(sse_stream),
                tool_calls: Vec::new(),
                pending: VecDeque::new(),
                done: false,
            },
            |mut state| async move {
                loop {
                    if let Some(chunk) = state.pending.pop_front() {
                        return Some((Ok(chunk), state));
                    }
                    if state.done {
                        return None;
                    }

                    match state.sse.next().await {
                        Some(Ok(sse_event)) => state.handle_event(&sse_event),
                        Some(Err(e)) => {
                            state.done = true;
                            return Some((Err(e), state));
                        }
                        None => {
                            state.flush_tool_calls();
                            state.done = true;
                        }
                    }
                }
            },
        );

        Ok(Box::pin(chunk_stream))
    }
}

struct OpenAiChunkState {
    sse: Pin<Box<dyn Stream<Item = Result<SseEvent, ProviderError>> + Send>>,
    tool_calls: Vec<ToolCallAccumulator>,
    pending: VecDeque<CompletionChunk>,
    done: bool,
}

impl OpenAiChunkState {
    fn handle_event(&mut self, sse_event: &SseEvent) {
        let data = sse_event.data.trim();

        // OpenAI terminates with "data: [DONE]"
        if data == "[DONE]" {
            self.flush_tool_calls();
            self.done = true;
            return;
        }

        let chunk: ChatCompletionChunk = match serde_json::from_str(data) {
            Ok(c) => c,
            Err(e) => {
                trace!(%e, data, "Failed to parse OpenAI chunk");
                return;
            }
        };

        // Usage (sent with stream_options.include_usage)
        if let Some(usage) = chunk.usage {
            self.pending.push_back(CompletionChunk {
                usage: Some(ChunkUsage {
                    input_tokens: Some(usage.prompt_tokens),
                    output_tokens: Some(usage.completion_tokens),
                }),
                ..Default::default()
            });
        }

        let Some(choice) = chunk.choices.into_iter().next() else {
            return;
        };

        if let Some(tc_deltas) = choice.delta.tool_calls {
            for tc in tc_deltas {
                if self.tool_calls.len() <= tc.index {
                    self.tool_calls
                        .resize_with(tc.index + 1, ToolCallAccumulator::default);
                }
                let acc = &mut self.tool_calls[tc.index];
                if let Some(id) = tc.id {
                    acc.id = id;
                }
                if let Some(f) = tc.function {
                    if let Some(name) = f.name {
                        acc.name = name;
                    }
                    if let Some(args) = f.arguments {
                        acc.arguments.push_str(&args);
                    }
                }
            }
        }

        if let Some(content) = choice.delta.content {
            if !content.is_empty() {
                self.pending.push_back(CompletionChunk {
                    delta: Some(content),
                    ..Default::default()
                });
            }
        }

        if let Some(reason) = choice.finish_reason {
            // Tool calls are complete once the model stops.
            self.flush_tool_calls();
            self.pending.push_back(CompletionChunk {
                stop_reason: Some(reason),
                ..Default::default()
            });
        }
    }

    fn flush_tool_calls(&mut self) {
        for tc in self.tool_calls.drain(..) {
            if tc.name.is_empty() {
                continue;
            }
            self.pending.push_back(CompletionChunk {
                tool_use: Some(ToolUseChunk {
                    id: tc.id,
                    name: tc.name,
                    input_json: tc.arguments,
                }),
                ..Default::default()
            });
        }
    }
}
