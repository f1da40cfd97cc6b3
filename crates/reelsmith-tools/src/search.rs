//! perplexity_ai_search tool: online LLM search.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

use crate::http::get_json;
use crate::{Tool, ToolContext, ToolOutput, parse_params};

const PERPLEXITY_BASE_URL: &str = "https://api.perplexity.ai";
const DEFAULT_MODEL: &str = "sonar";

pub struct PerplexitySearchTool {
    base_url: String,
}

impl Default for PerplexitySearchTool {
    fn default() -> Self {
        Self {
            base_url: PERPLEXITY_BASE_URL.into(),
        }
    }
}

impl PerplexitySearchTool {
    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
        }
    }
}

#[derive(Deserialize)]
struct Params {
    query: String,
}

/// Answer text followed by numbered citations, if any.
fn render_answer(body: &serde_json::Value) -> Option<String> {
    let answer = body["choices"][0]["message"]["content"].as_str()?;
    let mut out = answer.to_string();
    if let Some(citations) = body["citations"].as_array().filter(|c| !c.is_empty()) {
        out.push_str("\n\nSources:\n");
        for (i, c) in citations.iter().filter_map(|c| c.as_str()).enumerate() {
            out.push_str(&format!("[{}] {c}\n", i + 1));
        }
    }
    Some(out)
}

#[async_trait]
impl Tool for PerplexitySearchTool {
    fn name(&self) -> &str {
        "perplexity_ai_search"
    }

    fn description(&self) -> &str {
        "Search the live web with an online LLM. Use for recent news, trends and facts that need current sources."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        json!({
            "type": "object",
            "properties": {
                "query": { "type": "string", "description": "The question or search query" }
            },
            "required": ["query"]
        })
    }

    async fn execute(
        &self,
        params: serde_json::Value,
        context: &ToolContext,
    ) -> anyhow::Result<ToolOutput> {
        let p: Params = parse_params(params, self.name())?;
        let tools = context.config.tools();
        let Some(api_key) = tools.perplexity_api_key() else {
            return Ok(ToolOutput::error(
                "Perplexity is not configured. Set tools.perplexity_api_key or tools.perplexity_api_key_env.",
            ));
        };
        let model = tools.perplexity_model.as_deref().unwrap_or(DEFAULT_MODEL);
        debug!(query = %p.query, model, "perplexity_ai_search");

        let body = json!({
            "model": model,
            "messages": [
                { "role": "system", "content": "Be precise and concise." },
                { "role": "user", "content": p.query },
            ]
        });
        let url = format!("{}/chat/completions", self.base_url);
        let resp = get_json(
            || context.http.post(&url).bearer_auth(&api_key).json(&body),
            &context.retry,
            self.name(),
        )
        .await?;

        Ok(match render_answer(&resp) {
            Some(text) => ToolOutput::text(text),
            None => ToolOutput::error("Perplexity returned no answer."),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_answer_with_citations() {
        let body = json!({
            "choices": [{ "message": { "content": "Sugar intake rose." } }],
            "citations": ["https://a.example", "https://b.example"]
        });
        let text = render_answer(&body).unwrap();
        assert!(text.starts_with("Sugar intake rose."));
        assert!(text.contains("[2] https://b.example"));
    }

    #[test]
    fn test_render_answer_missing() {
        assert!(render_answer(&json!({"choices": []})).is_none());
    }

    #[tokio::test]
    async fn test_missing_key_is_error_output() {
        let out = PerplexitySearchTool::default()
            .execute(json!({"query": "q"}), &crate::test_support::context())
            .await
            .unwrap();
        assert!(out.is_error);
    }
}
