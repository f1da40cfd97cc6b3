//! Tool implementations for the agent runtime.
//!
//! Tools are capabilities exposed to the LLM during an agent turn.
//! Each tool implements the [`Tool`] trait; a [`ToolSet`] is the set bound
//! to one agent role.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use reelsmith_core::config::Config;
use reelsmith_core::retry::RetryPolicy;
use reelsmith_providers::ToolDefinition;

pub mod documents;
pub mod http;
pub mod knowledge;
pub mod literature;
pub mod notion;
pub mod rate_limit;
pub mod search;
pub mod youtube;

use documents::DocumentStore;
use rate_limit::TokenBucket;

/// Failure of one external call made by a tool.
#[derive(Debug, Error)]
pub enum ToolError {
    /// The back-end kept answering 429 after the retry budget was spent.
    #[error("rate limited (retry after {retry_after:?})")]
    RateLimited { retry_after: Option<Duration> },

    #[error("{0}")]
    Failed(String),
}

/// Context provided to tools during execution.
#[derive(Clone)]
pub struct ToolContext {
    pub config: Arc<Config>,
    pub http: reqwest::Client,
    pub retry: RetryPolicy,
    /// Process-wide limiter for bulk page fetches.
    pub page_limiter: Arc<TokenBucket>,
    pub documents: Option<Arc<dyn DocumentStore>>,
}

impl ToolContext {
    pub fn new(config: Arc<Config>) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.http_timeout())
            .build()?;
        let (capacity, refill_per_sec) = config.page_fetch_rate();
        Ok(Self {
            retry: config.tool_retry(),
            page_limiter: rate_limit::page_fetch_limiter(capacity, refill_per_sec),
            config,
            http,
            documents: None,
        })
    }

    pub fn with_documents(mut self, store: Arc<dyn DocumentStore>) -> Self {
        self.documents = Some(store);
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_page_limiter(mut self, limiter: Arc<TokenBucket>) -> Self {
        self.page_limiter = limiter;
        self
    }

    /// The configured document store, or an error naming what is missing.
    pub fn documents(&self) -> Result<&Arc<dyn DocumentStore>, ToolError> {
        self.documents
            .as_ref()
            .ok_or_else(|| ToolError::Failed("no document store configured (notion.token)".into()))
    }
}

/// Output from a tool execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolOutput {
    pub content: String,
    pub is_error: bool,
}

impl ToolOutput {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            is_error: false,
        }
    }

    pub fn error(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            is_error: true,
        }
    }

    /// Pretty-printed JSON output.
    pub fn json(value: &serde_json::Value) -> Self {
        Self::text(serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string()))
    }
}

/// The core tool trait.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Tool name as exposed to the LLM (e.g., "youtube_search").
    fn name(&self) -> &str;

    /// Human-readable description for the LLM.
    fn description(&self) -> &str;

    /// JSON Schema describing the tool's parameters.
    fn parameters_schema(&self) -> serde_json::Value;

    /// Execute the tool with the given parameters.
    async fn execute(
        &self,
        params: serde_json::Value,
        context: &ToolContext,
    ) -> anyhow::Result<ToolOutput>;
}

/// The tools bound to one agent role. Names are unique within a set.
#[derive(Clone, Default)]
pub struct ToolSet {
    tools: Vec<Arc<dyn Tool>>,
}

impl ToolSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a tool, replacing any existing tool with the same name.
    pub fn with(mut self, tool: impl Tool + 'static) -> Self {
        self.insert(Arc::new(tool));
        self
    }

    pub fn insert(&mut self, tool: Arc<dyn Tool>) {
        self.tools.retain(|t| t.name() != tool.name());
        self.tools.push(tool);
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn Tool>> {
        self.tools.iter().find(|t| t.name() == name)
    }

    pub fn names(&self) -> Vec<&str> {
        self.tools.iter().map(|t| t.name()).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    /// Tool definitions for the LLM API request.
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.tools
            .iter()
            .map(|t| ToolDefinition {
                name: t.name().to_string(),
                description: t.description().to_string(),
                parameters_schema: t.parameters_schema(),
            })
            .collect()
    }

    /// Run a tool by name. Every failure (unknown tool, bad parameters,
    /// back-end error) comes back as an `is_error` output for the model.
    pub async fn execute(
        &self,
        name: &str,
        params: serde_json::Value,
        context: &ToolContext,
    ) -> ToolOutput {
        let Some(tool) = self.get(name) else {
            warn!(tool = name, "Model requested unknown tool");
            metrics::counter!("reelsmith_tool_calls_total", "tool" => name.to_string(), "outcome" => "unknown").increment(1);
            return ToolOutput::error(format!(
                "Unknown tool '{name}'. Available tools: {}",
                self.names().join(", ")
            ));
        };

        debug!(tool = name, "Executing tool");
        let output = match tool.execute(params, context).await {
            Ok(output) => output,
            Err(e) => {
                warn!(tool = name, error = %e, "Tool failed");
                ToolOutput::error(format!("Tool '{name}' failed: {e:#}"))
            }
        };
        let outcome = if output.is_error { "error" } else { "ok" };
        metrics::counter!("reelsmith_tool_calls_total", "tool" => name.to_string(), "outcome" => outcome).increment(1);
        output
    }
}

/// Parse tool parameters, mapping serde errors to a message the model can act on.
pub fn parse_params<T: serde::de::DeserializeOwned>(
    params: serde_json::Value,
    tool: &str,
) -> anyhow::Result<T> {
    serde_json::from_value(params)
        .map_err(|e| anyhow::anyhow!("invalid parameters for {tool}: {e}"))
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;

    pub fn context() -> ToolContext {
        ToolContext::new(Arc::new(Config::default()))
            .expect("client should build")
            .with_page_limiter(Arc::new(TokenBucket::new(100, 100.0)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct Echo;

    #[async_trait]
    impl Tool for Echo {
        fn name(&self) -> &str {
            "echo"
        }
        fn description(&self) -> &str {
            "Echo the text back"
        }
        fn parameters_schema(&self) -> serde_json::Value {
            json!({"type": "object", "properties": {"text": {"type": "string"}}, "required": ["text"]})
        }
        async fn execute(
            &self,
            params: serde_json::Value,
            _context: &ToolContext,
        ) -> anyhow::Result<ToolOutput> {
            #[derive(Deserialize)]
            struct P {
                text: String,
            }
            let p: P = parse_params(params, "echo")?;
            Ok(ToolOutput::text(p.text))
        }
    }

    #[test]
    fn test_toolset_replaces_same_name() {
        let set = ToolSet::new().with(Echo).with(Echo);
        assert_eq!(set.len(), 1);
        let defs = set.definitions();
        assert_eq!(defs[0].name, "echo");
        assert_eq!(defs[0].parameters_schema["required"][0], "text");
    }

    #[tokio::test]
    async fn test_execute_ok() {
        let set = ToolSet::new().with(Echo);
        let out = set
            .execute("echo", json!({"text": "hi"}), &test_support::context())
            .await;
        assert_eq!(out, ToolOutput::text("hi"));
    }

    #[tokio::test]
    async fn test_bad_params_become_error_output() {
        let set = ToolSet::new().with(Echo);
        let out = set
            .execute("echo", json!({"wrong": 1}), &test_support::context())
            .await;
        assert!(out.is_error);
        assert!(out.content.contains("invalid parameters for echo"));
    }

    #[tokio::test]
    async fn test_unknown_tool_lists_available() {
        let set = ToolSet::new().with(Echo);
        let out = set
            .execute("nope", json!({}), &test_support::context())
            .await;
        assert!(out.is_error);
        assert!(out.content.contains("echo"));
    }

    #[test]
    fn test_missing_document_store_is_error() {
        let ctx = test_support::context();
        assert!(ctx.documents().is_err());
    }
}
