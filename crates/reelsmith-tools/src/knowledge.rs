//! Vector-knowledge retrieval tools.
//!
//! Each tool asks one question of a prediction endpoint that answers from a
//! single Qdrant collection. The collection is chosen per tool.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Value, json};

use crate::http::get_json;
use crate::{Tool, ToolContext, ToolOutput, parse_params};

pub struct KnowledgeTool {
    name: String,
    collection: String,
    description: String,
}

impl KnowledgeTool {
    pub fn new(
        name: impl Into<String>,
        collection: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            collection: collection.into(),
            description: description.into(),
        }
    }

    /// Audience personas and viewer profiles.
    pub fn avatar() -> Self {
        Self::new(
            "Avatar",
            "Avatar",
            "Look up the target audience avatar: demographics, pains, desires and objections.",
        )
    }

    /// Scripting techniques: hooks, pacing, retention patterns.
    pub fn scripting_brain() -> Self {
        Self::new(
            "scripting_brain",
            "ScriptingBrain",
            "Look up proven scripting techniques: hooks, story structure, pacing and retention patterns.",
        )
    }

    /// Curated domain research notes.
    pub fn ultimate_brain() -> Self {
        Self::new(
            "Ultimate_Brain",
            "Sugar",
            "Look up curated research notes and previously verified facts on the channel's subject.",
        )
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    fn request_body(&self, question: &str, server_url: Option<&str>, api_key: Option<&str>) -> Value {
        json!({
            "question": question,
            "overrideConfig": {
                "qdrantApiKey": api_key,
                "qdrantServerUrl": server_url,
                "qdrantCollection": self.collection,
                "contentPayloadKey": "content",
                "metadataPayloadKey": "metadata",
                "description": self.description,
                "name": self.name,
            }
        })
    }
}

#[derive(Deserialize)]
struct Params {
    question: String,
}

#[async_trait]
impl Tool for KnowledgeTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "question": { "type": "string", "description": "What to look up" }
            },
            "required": ["question"]
        })
    }

    async fn execute(&self, params: Value, context: &ToolContext) -> anyhow::Result<ToolOutput> {
        let p: Params = parse_params(params, &self.name)?;
        let tools = context.config.tools();
        let Some(url) = tools.knowledge_url.clone() else {
            return Ok(ToolOutput::error(
                "Knowledge retrieval is not configured. Set tools.knowledge_url.",
            ));
        };
        let api_key = tools.qdrant_api_key();
        let body = self.request_body(&p.question, tools.qdrant_url.as_deref(), api_key.as_deref());

        let resp = get_json(
            || context.http.post(&url).json(&body),
            &context.retry,
            &self.name,
        )
        .await?;

        Ok(match resp.get("text").and_then(|t| t.as_str()) {
            Some(text) => ToolOutput::text(text),
            None => ToolOutput::json(&resp),
        })
    }
}
