//! Agent turn loop: complete, run tools, repeat.

use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use tracing::{debug, info, instrument, warn};

use reelsmith_core::config::Config;
use reelsmith_core::transcript::TranscriptEntry;
use reelsmith_core::types::{ChatMessage, ContentBlock};
use reelsmith_providers::{CompletionRequest, LlmProvider};
use reelsmith_tools::{ToolContext, ToolSet};

use crate::{AgentError, AgentReply};

/// A language model bound to sampling settings and a tool context.
///
/// The system prompt and tool set are supplied per call, so one invoker
/// serves every agent role in a workflow.
#[derive(Clone)]
pub struct AgentInvoker {
    provider: Arc<dyn LlmProvider>,
    model: String,
    max_tokens: u32,
    temperature: Option<f64>,
    max_tool_rounds: u32,
    tool_context: ToolContext,
}

impl AgentInvoker {
    pub fn new(provider: Arc<dyn LlmProvider>, model: impl Into<String>, tool_context: ToolContext) -> Self {
        Self {
            provider,
            model: model.into(),
            max_tokens: reelsmith_core::config::DEFAULT_MAX_TOKENS,
            temperature: None,
            max_tool_rounds: reelsmith_core::config::DEFAULT_MAX_TOOL_ROUNDS,
            tool_context,
        }
    }

    /// Model and limits from `config.agent`.
    pub fn from_config(
        config: &Config,
        provider: Arc<dyn LlmProvider>,
        tool_context: ToolContext,
    ) -> Self {
        Self {
            provider,
            model: config.model(),
            max_tokens: config.max_tokens(),
            temperature: config.temperature(),
            max_tool_rounds: config.max_tool_rounds(),
            tool_context,
        }
    }

    pub fn with_max_tool_rounds(mut self, rounds: u32) -> Self {
        self.max_tool_rounds = rounds;
        self
    }

    pub fn tool_context(&self) -> &ToolContext {
        &self.tool_context
    }

    /// Run one turn.
    ///
    /// `history` is prepended to the conversation as read-only context.
    /// Tool failures are fed back to the model as error results; only a
    /// model failure or an exhausted tool-round budget fails the turn.
    #[instrument(skip_all, fields(provider = self.provider.id(), tools = tools.len()))]
    pub async fn invoke(
        &self,
        system_prompt: &str,
        tools: &ToolSet,
        input: &str,
        history: &[ChatMessage],
    ) -> Result<AgentReply, AgentError> {
        if input.trim().is_empty() {
            return Err(AgentError::EmptyInput);
        }
        let start = Instant::now();

        let mut transcript: Vec<TranscriptEntry> = history.iter().map(TranscriptEntry::from).collect();
        transcript.push(TranscriptEntry::user_text(input));

        let tool_defs = if tools.is_empty() {
            None
        } else {
            Some(self.provider.format_tools(&tools.definitions()))
        };

        let mut reply = AgentReply::default();

        for round in 0..=self.max_tool_rounds {
            debug!(round, "Agent loop iteration");
            let request = CompletionRequest {
                model: self.model.clone(),
                messages: self.provider.format_messages(&transcript),
                max_tokens: self.max_tokens,
                temperature: self.temperature,
                tools: tool_defs.clone(),
                system: Some(system_prompt.to_string()),
            };

            let completion = match self.provider.complete(&request).await {
                Ok(c) => c,
                Err(e) => {
                    warn!(error = %e, "Model call failed");
                    return Err(AgentError::ModelUnavailable(e));
                }
            };
            reply.usage.input_tokens += completion.usage.input_tokens;
            reply.usage.output_tokens += completion.usage.output_tokens;

            let is_tool_use = completion
                .stop_reason
                .as_deref()
                .is_some_and(|r| self.provider.is_tool_use_stop(r));

            if !is_tool_use || completion.tool_calls.is_empty() {
                reply.text = completion.text;
                info!(
                    rounds = round,
                    tool_calls = reply.tool_calls,
                    input_tokens = reply.usage.input_tokens,
                    output_tokens = reply.usage.output_tokens,
                    duration_ms = start.elapsed().as_millis() as u64,
                    "Agent turn complete"
                );
                return Ok(reply);
            }

            if round == self.max_tool_rounds {
                break;
            }

            let mut content: Vec<ContentBlock> = Vec::new();
            if !completion.text.is_empty() {
                content.push(ContentBlock::text(completion.text.clone()));
            }
            for call in &completion.tool_calls {
                content.push(ContentBlock::ToolUse {
                    id: call.id.clone(),
                    name: call.name.clone(),
                    input: call.input.clone(),
                });
            }
            transcript.push(TranscriptEntry::Assistant {
                content,
                usage: Some(completion.usage),
                timestamp: Utc::now(),
            });

            for call in completion.tool_calls {
                reply.tool_calls += 1;
                info!(tool = %call.name, "Executing tool");
                let output = tools
                    .execute(&call.name, call.input, &self.tool_context)
                    .await;
                transcript.push(TranscriptEntry::ToolResult {
                    tool_use_id: call.id,
                    tool: call.name,
                    content: output.content,
                    is_error: output.is_error,
                    timestamp: Utc::now(),
                });
            }
        }

        warn!(rounds = self.max_tool_rounds, "Tool-call loop did not converge");
        metrics::counter!("reelsmith_agent_tool_loop_exceeded_total").increment(1);
        Err(AgentError::ToolLoopExceeded {
            rounds: self.max_tool_rounds,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use async_trait::async_trait;
    use reelsmith_providers::ProviderError;
    use reelsmith_providers::scripted::{ScriptedProvider, ScriptedReply};
    use reelsmith_tools::rate_limit::TokenBucket;
    use reelsmith_tools::{Tool, ToolOutput};
    use serde_json::json;

    struct Shout;

    #[async_trait]
    impl Tool for Shout {
        fn name(&self) -> &str {
            "shout"
        }
        fn description(&self) -> &str {
            "Upper-case the text"
        }
        fn parameters_schema(&self) -> serde_json::Value {
            json!({"type": "object", "properties": {"text": {"type": "string"}}, "required": ["text"]})
        }
        async fn execute(
            &self,
            params: serde_json::Value,
            _context: &ToolContext,
        ) -> anyhow::Result<ToolOutput> {
            let text = params["text"].as_str().unwrap_or_default();
            Ok(ToolOutput::text(text.to_uppercase()))
        }
    }

    fn invoker(provider: Arc<ScriptedProvider>) -> AgentInvoker {
        let ctx = ToolContext::new(Arc::new(Config::default()))
            .unwrap()
            .with_page_limiter(Arc::new(TokenBucket::new(10, 10.0)));
        AgentInvoker::new(provider, "test-model", ctx)
    }

    #[tokio::test]
    async fn test_plain_completion_without_tools() {
        let provider = Arc::new(
            ScriptedProvider::new().on("analyst", vec![ScriptedReply::text("Trends: up")]),
        );
        let reply = invoker(provider.clone())
            .invoke("You are an analyst.", &ToolSet::new(), "sugar", &[])
            .await
            .unwrap();
        assert_eq!(reply.text, "Trends: up");
        assert_eq!(reply.tool_calls, 0);
        assert_eq!(reply.usage.input_tokens, 10);
        assert!(provider.requests()[0].tools.is_none());
    }

    #[tokio::test]
    async fn test_tool_round_trip_feeds_result_back() {
        let provider = Arc::new(ScriptedProvider::new().on(
            "writer",
            vec![
                ScriptedReply::tool_call("shout", json!({"text": "hook"})),
                ScriptedReply::text("Final: HOOK"),
            ],
        ));
        let tools = ToolSet::new().with(Shout);
        let reply = invoker(provider.clone())
            .invoke("You are a writer.", &tools, "write", &[])
            .await
            .unwrap();

        assert_eq!(reply.text, "Final: HOOK");
        assert_eq!(reply.tool_calls, 1);
        assert_eq!(reply.usage.input_tokens, 10);

        let requests = provider.requests();
        assert_eq!(requests.len(), 2);
        let last = requests[1].messages.last().unwrap();
        assert_eq!(last["type"], "tool_result");
        assert_eq!(last["content"], "HOOK");
        assert_eq!(last["is_error"], false);
    }

    #[tokio::test]
    async fn test_unknown_tool_is_reported_to_model() {
        let provider = Arc::new(ScriptedProvider::new().on(
            "writer",
            vec![
                ScriptedReply::tool_call("missing_tool", json!({})),
                ScriptedReply::text("done anyway"),
            ],
        ));
        let reply = invoker(provider.clone())
            .invoke("You are a writer.", &ToolSet::new().with(Shout), "write", &[])
            .await
            .unwrap();
        assert_eq!(reply.text, "done anyway");
        let last = provider.requests()[1].messages.last().cloned().unwrap();
        assert_eq!(last["is_error"], true);
    }

    #[tokio::test]
    async fn test_tool_loop_is_bounded() {
        let provider = Arc::new(ScriptedProvider::new().on(
            "looper",
            vec![ScriptedReply::tool_call("shout", json!({"text": "again"}))],
        ));
        let err = invoker(provider.clone())
            .with_max_tool_rounds(3)
            .invoke("looper", &ToolSet::new().with(Shout), "go", &[])
            .await
            .unwrap_err();
        assert!(matches!(err, AgentError::ToolLoopExceeded { rounds: 3 }));
        assert_eq!(provider.calls("looper"), 4);
    }

    #[tokio::test]
    async fn test_model_failure_is_unavailable() {
        let provider = Arc::new(ScriptedProvider::new().on(
            "x",
            vec![ScriptedReply::Fail(ProviderError::Transport("connection refused".into()))],
        ));
        let err = invoker(provider)
            .invoke("x", &ToolSet::new(), "hello", &[])
            .await
            .unwrap_err();
        assert!(matches!(err, AgentError::ModelUnavailable(_)));
    }

    #[tokio::test]
    async fn test_empty_input_rejected() {
        let provider = Arc::new(ScriptedProvider::new().otherwise(ScriptedReply::text("x")));
        let err = invoker(provider.clone())
            .invoke("x", &ToolSet::new(), "   ", &[])
            .await
            .unwrap_err();
        assert!(matches!(err, AgentError::EmptyInput));
        assert!(provider.requests().is_empty());
    }

    #[tokio::test]
    async fn test_history_precedes_input() {
        let provider = Arc::new(ScriptedProvider::new().otherwise(ScriptedReply::text("ok")));
        let history = vec![
            ChatMessage::human("earlier idea"),
            ChatMessage::ai("earlier answer"),
        ];
        invoker(provider.clone())
            .invoke("x", &ToolSet::new(), "now", &history)
            .await
            .unwrap();
        let messages = &provider.requests()[0].messages;
        assert_eq!(messages.len(), 3);
        assert_eq!(messages[0]["type"], "user");
        assert_eq!(messages[1]["type"], "assistant");
        assert_eq!(messages[2]["content"][0]["text"], "now");
    }
}
