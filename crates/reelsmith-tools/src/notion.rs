//! Tools over the document store: save, search, read back and index pages.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::info;

use crate::documents::{Database, page_id_from_url};
use crate::{Tool, ToolContext, ToolOutput, parse_params};

/// Split a comma-separated DOI list into trimmed, non-empty tags.
pub fn doi_tags(doi: &str) -> Vec<String> {
    doi.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

// --- save_in_notion ---

pub struct SaveInNotionTool;

#[derive(Deserialize)]
struct SaveParams {
    content: String,
    title: String,
    #[serde(default)]
    doi: String,
}

#[async_trait]
impl Tool for SaveInNotionTool {
    fn name(&self) -> &str {
        "save_in_notion"
    }

    fn description(&self) -> &str {
        "Save curated research to the research database as a new page. DOIs of the sources become page tags."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "content": { "type": "string", "description": "Markdown content of the page" },
                "title": { "type": "string", "description": "Page title" },
                "doi": { "type": "string", "description": "Comma-separated DOIs of the sources" }
            },
            "required": ["content", "title"]
        })
    }

    async fn execute(&self, params: Value, context: &ToolContext) -> anyhow::Result<ToolOutput> {
        let p: SaveParams = parse_params(params, self.name())?;
        let store = context.documents()?;
        let tags = doi_tags(&p.doi);
        let page_id = store
            .persist(Database::Research, &p.title, &p.content, &tags)
            .await?;
        info!(page_id, title = %p.title, "Saved research page");
        Ok(ToolOutput::json(&json!({ "page_id": page_id, "title": p.title })))
    }
}

// --- search_notion_pages ---

pub struct SearchNotionPagesTool;

#[derive(Deserialize)]
struct SearchParams {
    query: String,
}

#[async_trait]
impl Tool for SearchNotionPagesTool {
    fn name(&self) -> &str {
        "search_notion_pages"
    }

    fn description(&self) -> &str {
        "Search saved pages by title. Returns page ids, titles and URLs."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "query": { "type": "string", "description": "Title text to search for" }
            },
            "required": ["query"]
        })
    }

    async fn execute(&self, params: Value, context: &ToolContext) -> anyhow::Result<ToolOutput> {
        let p: SearchParams = parse_params(params, self.name())?;
        let pages = context.documents()?.search(&p.query).await?;
        if pages.is_empty() {
            return Ok(ToolOutput::text(format!("No pages found for '{}'.", p.query)));
        }
        Ok(ToolOutput::json(&serde_json::to_value(pages)?))
    }
}

// --- extract_notion_page_content ---

pub struct ExtractNotionPageTool;

#[derive(Deserialize)]
struct ExtractParams {
    page_url: String,
}

#[async_trait]
impl Tool for ExtractNotionPageTool {
    fn name(&self) -> &str {
        "extract_notion_page_content"
    }

    fn description(&self) -> &str {
        "Read a saved page's full content as markdown, given its URL."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "page_url": { "type": "string", "description": "Page URL ending in the 32-character page id" }
            },
            "required": ["page_url"]
        })
    }

    async fn execute(&self, params: Value, context: &ToolContext) -> anyhow::Result<ToolOutput> {
        let p: ExtractParams = parse_params(params, self.name())?;
        let Some(page_id) = page_id_from_url(&p.page_url) else {
            return Ok(ToolOutput::error("Invalid Notion page URL."));
        };
        let markdown = context.documents()?.page_markdown(&page_id).await?;
        Ok(ToolOutput::text(markdown))
    }
}

// --- upsert_to_qdrant ---

pub struct IndexPageTool;

#[derive(Deserialize)]
struct IndexParams {
    page_id: String,
}

#[async_trait]
impl Tool for IndexPageTool {
    fn name(&self) -> &str {
        "upsert_to_qdrant"
    }

    fn description(&self) -> &str {
        "Index a saved page into the knowledge base so later lookups can find it."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "page_id": { "type": "string", "description": "Id returned by save_in_notion" }
            },
            "required": ["page_id"]
        })
    }

    async fn execute(&self, params: Value, context: &ToolContext) -> anyhow::Result<ToolOutput> {
        let p: IndexParams = parse_params(params, self.name())?;
        let response = context.documents()?.index(&p.page_id).await?;
        Ok(ToolOutput::text(format!(
            "Page {} indexed. {response}",
            p.page_id
        )))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use super::*;
    use crate::ToolError;
    use crate::documents::{DocumentStore, PageSummary};

    #[derive(Default)]
    struct MemoryStore {
        saved: Mutex<Vec<(Database, String, Vec<String>)>>,
    }

    #[async_trait]
    impl DocumentStore for MemoryStore {
        async fn persist(
            &self,
            database: Database,
            title: &str,
            _markdown: &str,
            tags: &[String],
        ) -> Result<String, ToolError> {
            self.saved
                .lock()
                .unwrap()
                .push((database, title.to_string(), tags.to_vec()));
            Ok("page-1".into())
        }

        async fn search(&self, query: &str) -> Result<Vec<PageSummary>, ToolError> {
            Ok(vec![PageSummary {
                id: "p".into(),
                title: format!("{query} script"),
                url: None,
            }])
        }

        async fn page_markdown(&self, page_id: &str) -> Result<String, ToolError> {
            Ok(format!("# {page_id}"))
        }

        async fn index(&self, _page_id: &str) -> Result<String, ToolError> {
            Ok("ok".into())
        }
    }

    #[test]
    fn test_doi_tags() {
        assert_eq!(
            doi_tags("10.1/a, 10.2/b,,"),
            vec!["10.1/a".to_string(), "10.2/b".to_string()]
        );
        assert!(doi_tags("").is_empty());
    }

    #[tokio::test]
    async fn test_save_tags_research_page() {
        let store = Arc::new(MemoryStore::default());
        let ctx = crate::test_support::context().with_documents(store.clone());
        let out = SaveInNotionTool
            .execute(
                json!({"content": "body", "title": "Sugar", "doi": "10.1/a,10.2/b"}),
                &ctx,
            )
            .await
            .unwrap();
        assert!(!out.is_error);
        let saved = store.saved.lock().unwrap();
        assert_eq!(saved[0].0, Database::Research);
        assert_eq!(saved[0].2.len(), 2);
    }

    #[tokio::test]
    async fn test_extract_invalid_url() {
        let ctx = crate::test_support::context().with_documents(Arc::new(MemoryStore::default()));
        let out = ExtractNotionPageTool
            .execute(json!({"page_url": "https://notion.so/not-a-page"}), &ctx)
            .await
            .unwrap();
        assert_eq!(out, ToolOutput::error("Invalid Notion page URL."));
    }

    #[tokio::test]
    async fn test_extract_reads_markdown() {
        let ctx = crate::test_support::context().with_documents(Arc::new(MemoryStore::default()));
        let out = ExtractNotionPageTool
            .execute(
                json!({"page_url": "https://www.notion.so/Script-0123456789abcdef0123456789abcdef"}),
                &ctx,
            )
            .await
            .unwrap();
        assert_eq!(out.content, "# 0123456789abcdef0123456789abcdef");
    }

    #[tokio::test]
    async fn test_without_store_fails() {
        let err = SearchNotionPagesTool
            .execute(json!({"query": "sugar"}), &crate::test_support::context())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("no document store"));
    }
}
