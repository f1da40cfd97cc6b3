//! Document store: where stage outputs and curated research are persisted.
//!
//! [`NotionStore`] talks to the Notion REST API. Markdown is converted to
//! Notion blocks on the way in and back to markdown on the way out.

use std::sync::LazyLock;

use async_trait::async_trait;
use regex::Regex;
use serde_json::{Value, json};
use tracing::{debug, info};

use reelsmith_core::config::NotionConfig;
use reelsmith_core::retry::RetryPolicy;

use crate::ToolError;
use crate::http::{get_json, send_with_retry};

const NOTION_BASE_URL: &str = "https://api.notion.com";
const NOTION_VERSION: &str = "2022-06-28";

/// Notion accepts at most this many children per create/append call.
pub const BLOCK_BATCH_SIZE: usize = 100;

/// Notion rejects rich-text objects longer than this.
const MAX_RICH_TEXT: usize = 2000;

/// Target database for a persisted page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Database {
    /// Every workflow stage output.
    Outputs,
    /// Curated research, tagged with source DOIs.
    Research,
}

/// A page returned by a search.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct PageSummary {
    pub id: String,
    pub title: String,
    pub url: Option<String>,
}

#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Create a page from markdown. Returns the new page id.
    async fn persist(
        &self,
        database: Database,
        title: &str,
        markdown: &str,
        tags: &[String],
    ) -> Result<String, ToolError>;

    /// Pages whose title or content matches `query`.
    async fn search(&self, query: &str) -> Result<Vec<PageSummary>, ToolError>;

    /// A page's content rendered as markdown.
    async fn page_markdown(&self, page_id: &str) -> Result<String, ToolError>;

    /// Ask the vector index to ingest a persisted page.
    async fn index(&self, page_id: &str) -> Result<String, ToolError>;
}

pub struct NotionStore {
    http: reqwest::Client,
    token: String,
    base_url: String,
    outputs_database_id: Option<String>,
    research_database_id: Option<String>,
    index_url: Option<String>,
    retry: RetryPolicy,
}

impl NotionStore {
    /// Build a store from config; `None` when no token is configured.
    pub fn from_config(
        config: &NotionConfig,
        http: reqwest::Client,
        retry: RetryPolicy,
    ) -> Option<Self> {
        let token = config.resolve_token()?;
        Some(Self {
            http,
            token,
            base_url: config
                .base_url
                .as_deref()
                .unwrap_or(NOTION_BASE_URL)
                .trim_end_matches('/')
                .to_string(),
            outputs_database_id: config.outputs_database_id.clone(),
            research_database_id: config.research_database_id.clone(),
            index_url: config.index_url.clone(),
            retry,
        })
    }

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        self.http
            .request(method, format!("{}{path}", self.base_url))
            .bearer_auth(&self.token)
            .header("Notion-Version", NOTION_VERSION)
    }

    fn database_id(&self, database: Database) -> Result<&str, ToolError> {
        let (id, key) = match database {
            Database::Outputs => (&self.outputs_database_id, "notion.outputs_database_id"),
            Database::Research => (&self.research_database_id, "notion.research_database_id"),
        };
        id.as_deref()
            .ok_or_else(|| ToolError::Failed(format!("{key} is not configured")))
    }
}

#[async_trait]
impl DocumentStore for NotionStore {
    async fn persist(
        &self,
        database: Database,
        title: &str,
        markdown: &str,
        tags: &[String],
    ) -> Result<String, ToolError> {
        let database_id = self.database_id(database)?;
        let blocks = markdown_to_blocks(markdown);
        let mut batches = blocks.chunks(BLOCK_BATCH_SIZE);
        let first: &[Value] = batches.next().unwrap_or(&[]);

        let properties = match database {
            Database::Outputs => json!({ "title": rich_text(title) }),
            Database::Research => json!({
                "Name": { "type": "title", "title": rich_text(title) },
                "Tags": {
                    "multi_select": tags.iter().map(|t| json!({ "name": t })).collect::<Vec<_>>()
                },
            }),
        };
        let body = json!({
            "parent": { "database_id": database_id },
            "properties": properties,
            "children": first,
        });

        let created = get_json(
            || self.request(reqwest::Method::POST, "/v1/pages").json(&body),
            &self.retry,
            "notion.pages.create",
        )
        .await?;
        let page_id = created["id"]
            .as_str()
            .ok_or_else(|| ToolError::Failed("notion page create returned no id".into()))?
            .to_string();

        for batch in batches {
            let path = format!("/v1/blocks/{page_id}/children");
            let body = json!({ "children": batch });
            send_with_retry(
                || self.request(reqwest::Method::PATCH, &path).json(&body),
                &self.retry,
                "notion.blocks.append",
            )
            .await?;
        }

        info!(%page_id, title, blocks = blocks.len(), "Persisted document");
        Ok(page_id)
    }

    async fn search(&self, query: &str) -> Result<Vec<PageSummary>, ToolError> {
        let body = json!({ "query": query });
        let resp = get_json(
            || self.request(reqwest::Method::POST, "/v1/search").json(&body),
            &self.retry,
            "notion.search",
        )
        .await?;

        let pages = resp["results"]
            .as_array()
            .map(|results| {
                results
                    .iter()
                    .filter(|r| r["object"] == "page")
                    .filter_map(|r| {
                        Some(PageSummary {
                            id: r["id"].as_str()?.to_string(),
                            title: page_title(r),
                            url: r["url"].as_str().map(str::to_string),
                        })
                    })
                    .collect()
            })
            .unwrap_or_default();
        Ok(pages)
    }

    async fn page_markdown(&self, page_id: &str) -> Result<String, ToolError> {
        let mut blocks = Vec::new();
        let mut cursor: Option<String> = None;
        loop {
            let path = format!("/v1/blocks/{page_id}/children");
            let resp = get_json(
                || {
                    let req = self.request(reqwest::Method::GET, &path);
                    match &cursor {
                        Some(c) => req.query(&[("start_cursor", c.as_str())]),
                        None => req,
                    }
                },
                &self.retry,
                "notion.blocks.children",
            )
            .await?;

            if let Some(results) = resp["results"].as_array() {
                blocks.extend(results.iter().cloned());
            }
            match (resp["has_more"].as_bool(), resp["next_cursor"].as_str()) {
                (Some(true), Some(next)) => cursor = Some(next.to_string()),
                _ => break,
            }
        }
        debug!(page_id, blocks = blocks.len(), "Fetched page blocks");
        Ok(blocks_to_markdown(&blocks))
    }

    async fn index(&self, page_id: &str) -> Result<String, ToolError> {
        let url = self
            .index_url
            .as_deref()
            .ok_or_else(|| ToolError::Failed("notion.index_url is not configured".into()))?;
        let body = json!({
            "page_id": page_id,
            "source_type": "page",
            "mode": "incremental",
        });
        let text = crate::http::get_text(
            || self.http.post(url).json(&body),
            &self.retry,
            "document.index",
        )
        .await?;
        info!(page_id, "Indexed document");
        Ok(text)
    }
}

/// Split text into Notion rich-text objects of at most `MAX_RICH_TEXT` chars.
fn rich_text(content: &str) -> Value {
    let chars: Vec<char> = content.chars().collect();
    let parts: Vec<Value> = chars
        .chunks(MAX_RICH_TEXT)
        .map(|chunk| {
            let text: String = chunk.iter().collect();
            json!({ "type": "text", "text": { "content": text } })
        })
        .collect();
    Value::Array(parts)
}

fn block(kind: &str, content: &str) -> Value {
    json!({
        "object": "block",
        "type": kind,
        kind: { "rich_text": rich_text(content) },
    })
}

static BOLD: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\*\*(.*?)\*\*").expect("valid regex")
});

/// Convert markdown to Notion blocks.
///
/// Supports `#`..`###` headings, `- ` bullets, `---` dividers and
/// paragraphs. Bold markers are stripped; blank lines are dropped.
pub fn markdown_to_blocks(markdown: &str) -> Vec<Value> {
    markdown
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(|line| {
            if let Some(rest) = line.strip_prefix("### ") {
                block("heading_3", rest.trim())
            } else if let Some(rest) = line.strip_prefix("## ") {
                block("heading_2", rest.trim())
            } else if let Some(rest) = line.strip_prefix("# ") {
                block("heading_1", rest.trim())
            } else if let Some(rest) = line.strip_prefix("- ") {
                block("bulleted_list_item", rest.trim())
            } else if line == "---" {
                json!({ "object": "block", "type": "divider", "divider": {} })
            } else {
                block("paragraph", &BOLD.replace_all(line, "$1"))
            }
        })
        .collect()
}

fn rich_text_plain(value: &Value) -> String {
    value
        .as_array()
        .map(|parts| {
            parts
                .iter()
                .filter_map(|t| {
                    t["plain_text"]
                        .as_str()
                        .or_else(|| t["text"]["content"].as_str())
                })
                .collect::<String>()
        })
        .unwrap_or_default()
}

/// Render Notion blocks back to markdown. Unsupported block types are skipped.
pub fn blocks_to_markdown(blocks: &[Value]) -> String {
    blocks
        .iter()
        .filter_map(|b| {
            let kind = b["type"].as_str()?;
            let text = || rich_text_plain(&b[kind]["rich_text"]);
            match kind {
                "paragraph" => Some(text()),
                "heading_1" => Some(format!("# {}", text())),
                "heading_2" => Some(format!("## {}", text())),
                "heading_3" => Some(format!("### {}", text())),
                "bulleted_list_item" => Some(format!("- {}", text())),
                "divider" => Some("---".to_string()),
                _ => None,
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Title of a page object: the concatenated text of its `title` property.
fn page_title(page: &Value) -> String {
    page["properties"]
        .as_object()
        .and_then(|props| props.values().find(|p| p["type"] == "title"))
        .map(|p| rich_text_plain(&p["title"]))
        .unwrap_or_default()
}

static PAGE_ID: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"([a-f0-9]{32})$").expect("valid regex")
});

/// Extract the 32-hex page id that ends a Notion page URL.
pub fn page_id_from_url(page_url: &str) -> Option<String> {
    let parsed = url::Url::parse(page_url).ok()?;
    let path = parsed.path().trim_end_matches('/');
    PAGE_ID.captures(path).map(|c| c[1].to_string())
}
