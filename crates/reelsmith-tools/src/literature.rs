//! Scholarly literature tools.
//!
//! Europe PMC and PubMed results are fetched page by page; every page
//! request takes a token from the shared page-fetch bucket first.

use std::collections::HashSet;
use std::sync::LazyLock;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::debug;

use crate::http::get_json;
use crate::{Tool, ToolContext, ToolOutput, parse_params};

/// Results requested per page from the paginated back-ends.
pub const PAGE_SIZE: usize = 25;
/// Upper bound on pages fetched per query.
pub const MAX_PAGES: usize = 5;

static STOP_WORDS: LazyLock<HashSet<&'static str>> = LazyLock::new(|| {
    [
        "the", "is", "at", "which", "on", "and", "a", "an", "in", "with", "to", "for", "of", "by",
        "from",
    ]
    .into_iter()
    .collect()
});

/// Drop common stop words; PubMed term matching is stricter than full-text search.
pub fn strip_stop_words(query: &str) -> String {
    query
        .split_whitespace()
        .filter(|w| !STOP_WORDS.contains(w.to_lowercase().as_str()))
        .collect::<Vec<_>>()
        .join(" ")
}

#[derive(Deserialize)]
struct QueryParams {
    query: String,
}

fn query_schema(description: &str) -> Value {
    json!({
        "type": "object",
        "properties": {
            "query": { "type": "string", "description": description }
        },
        "required": ["query"]
    })
}

// --- Med_Articles_PMC ---

pub struct EuropePmcTool {
    base_url: String,
}

impl Default for EuropePmcTool {
    fn default() -> Self {
        Self {
            base_url: "https://www.ebi.ac.uk/europepmc/webservices/rest".into(),
        }
    }
}

impl EuropePmcTool {
    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
        }
    }
}

#[async_trait]
impl Tool for EuropePmcTool {
    fn name(&self) -> &str {
        "Med_Articles_PMC"
    }

    fn description(&self) -> &str {
        "Search Europe PMC for biomedical articles. Returns titles, authors, journals, years, DOIs and ids."
    }

    fn parameters_schema(&self) -> Value {
        query_schema("Search terms")
    }

    async fn execute(&self, params: Value, context: &ToolContext) -> anyhow::Result<ToolOutput> {
        let p: QueryParams = parse_params(params, self.name())?;
        let url = format!("{}/search", self.base_url);
        let page_size = PAGE_SIZE.to_string();
        let mut results: Vec<Value> = Vec::new();

        for page in 1..=MAX_PAGES {
            context.page_limiter.acquire().await;
            let page_str = page.to_string();
            let body = get_json(
                || {
                    context.http.get(&url).query(&[
                        ("query", p.query.as_str()),
                        ("format", "json"),
                        ("pageSize", page_size.as_str()),
                        ("page", page_str.as_str()),
                    ])
                },
                &context.retry,
                self.name(),
            )
            .await?;

            let hit_count = body["hitCount"].as_u64().unwrap_or(0) as usize;
            let batch = body["resultList"]["result"].as_array().cloned().unwrap_or_default();
            debug!(page, batch = batch.len(), hit_count, "Europe PMC page");
            if batch.is_empty() {
                break;
            }
            results.extend(batch);
            if results.len() >= hit_count {
                break;
            }
        }

        Ok(ToolOutput::json(&json!({ "europePmc": results })))
    }
}

// --- PubMed_Tool ---

pub struct PubMedTool {
    base_url: String,
}

impl Default for PubMedTool {
    fn default() -> Self {
        Self {
            base_url: "https://eutils.ncbi.nlm.nih.gov/entrez/eutils".into(),
        }
    }
}

impl PubMedTool {
    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
        }
    }
}

/// Summaries in the order given by `result.uids`.
fn ordered_summaries(summary: &Value) -> Vec<Value> {
    let result = &summary["result"];
    result["uids"]
        .as_array()
        .map(|uids| {
            uids.iter()
                .filter_map(|uid| uid.as_str())
                .filter_map(|uid| result.get(uid).cloned())
                .collect()
        })
        .unwrap_or_default()
}

#[async_trait]
impl Tool for PubMedTool {
    fn name(&self) -> &str {
        "PubMed_Tool"
    }

    fn description(&self) -> &str {
        "Search PubMed for peer-reviewed medical literature. Returns article summaries."
    }

    fn parameters_schema(&self) -> Value {
        query_schema("Search terms")
    }

    async fn execute(&self, params: Value, context: &ToolContext) -> anyhow::Result<ToolOutput> {
        let p: QueryParams = parse_params(params, self.name())?;
        let term = strip_stop_words(&p.query);
        if term.is_empty() {
            return Ok(ToolOutput::error("Query is empty after removing stop words."));
        }
        let search_url = format!("{}/esearch.fcgi", self.base_url);
        let summary_url = format!("{}/esummary.fcgi", self.base_url);
        let retmax = PAGE_SIZE.to_string();
        let mut summaries: Vec<Value> = Vec::new();

        for page in 0..MAX_PAGES {
            context.page_limiter.acquire().await;
            let retstart = (page * PAGE_SIZE).to_string();
            let search = get_json(
                || {
                    context.http.get(&search_url).query(&[
                        ("db", "pubmed"),
                        ("term", term.as_str()),
                        ("retmode", "json"),
                        ("retmax", retmax.as_str()),
                        ("retstart", retstart.as_str()),
                    ])
                },
                &context.retry,
                "PubMed_Tool.esearch",
            )
            .await?;

            let ids: Vec<&str> = search["esearchresult"]["idlist"]
                .as_array()
                .map(|ids| ids.iter().filter_map(|id| id.as_str()).collect())
                .unwrap_or_default();
            debug!(page, ids = ids.len(), "PubMed page");
            if ids.is_empty() {
                break;
            }
            let joined = ids.join(",");
            let summary = get_json(
                || {
                    context.http.get(&summary_url).query(&[
                        ("db", "pubmed"),
                        ("id", joined.as_str()),
                        ("retmode", "json"),
                    ])
                },
                &context.retry,
                "PubMed_Tool.esummary",
            )
            .await?;
            summaries.extend(ordered_summaries(&summary));
            if ids.len() < PAGE_SIZE {
                break;
            }
        }

        Ok(ToolOutput::json(&json!({ "pubMed": summaries })))
    }
}

// --- Semantic_Scholar_Tool ---

pub struct SemanticScholarTool {
    base_url: String,
}

impl Default for SemanticScholarTool {
    fn default() -> Self {
        Self {
            base_url: "https://api.semanticscholar.org/graph/v1".into(),
        }
    }
}

impl SemanticScholarTool {
    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
        }
    }
}

#[async_trait]
impl Tool for SemanticScholarTool {
    fn name(&self) -> &str {
        "Semantic_Scholar_Tool"
    }

    fn description(&self) -> &str {
        "Search Semantic Scholar. Returns titles, TL;DR summaries, abstracts, years and open-access PDF links."
    }

    fn parameters_schema(&self) -> Value {
        query_schema("Search terms")
    }

    async fn execute(&self, params: Value, context: &ToolContext) -> anyhow::Result<ToolOutput> {
        let p: QueryParams = parse_params(params, self.name())?;
        let search_url = format!("{}/paper/search", self.base_url);
        let search = get_json(
            || context.http.get(&search_url).query(&[("query", p.query.as_str())]),
            &context.retry,
            "Semantic_Scholar_Tool.search",
        )
        .await?;

        let ids: Vec<Value> = search["data"]
            .as_array()
            .map(|papers| {
                papers
                    .iter()
                    .filter_map(|paper| paper.get("paperId").cloned())
                    .collect()
            })
            .unwrap_or_default();
        if ids.is_empty() {
            return Ok(ToolOutput::text("No papers found"));
        }

        let batch_url = format!("{}/paper/batch", self.base_url);
        let body = json!({ "ids": ids });
        let papers = get_json(
            || {
                context
                    .http
                    .post(&batch_url)
                    .query(&[("fields", "title,tldr,openAccessPdf,abstract,year")])
                    .json(&body)
            },
            &context.retry,
            "Semantic_Scholar_Tool.batch",
        )
        .await?;
        Ok(ToolOutput::json(&papers))
    }
}

// --- Google_Scholar_Tool ---

pub struct GoogleScholarTool {
    base_url: String,
}

impl Default for GoogleScholarTool {
    fn default() -> Self {
        Self {
            base_url: "https://serpapi.com".into(),
        }
    }
}

impl GoogleScholarTool {
    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
        }
    }
}

#[derive(Deserialize)]
struct ScholarParams {
    query: String,
    #[serde(default = "default_num_results")]
    num_results: u32,
}

fn default_num_results() -> u32 {
    10
}

fn scholar_hits(body: &Value) -> Vec<Value> {
    body["organic_results"]
        .as_array()
        .map(|results| {
            results
                .iter()
                .map(|r| {
                    json!({
                        "title": r["title"],
                        "link": r["link"],
                        "snippet": r["snippet"],
                        "publication_info": r["publication_info"]["summary"],
                    })
                })
                .collect()
        })
        .unwrap_or_default()
}

#[async_trait]
impl Tool for GoogleScholarTool {
    fn name(&self) -> &str {
        "Google_Scholar_Tool"
    }

    fn description(&self) -> &str {
        "Search Google Scholar. Returns titles, links, snippets and publication info."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "query": { "type": "string", "description": "Search terms" },
                "num_results": { "type": "integer", "description": "Number of results (default 10)" }
            },
            "required": ["query"]
        })
    }

    async fn execute(&self, params: Value, context: &ToolContext) -> anyhow::Result<ToolOutput> {
        let p: ScholarParams = parse_params(params, self.name())?;
        let Some(key) = context.config.tools().serpapi_key() else {
            return Ok(ToolOutput::error(
                "SerpAPI is not configured. Set tools.serpapi_key or tools.serpapi_key_env.",
            ));
        };
        let url = format!("{}/search.json", self.base_url);
        let num = p.num_results.to_string();
        let body = get_json(
            || {
                context.http.get(&url).query(&[
                    ("engine", "google_scholar"),
                    ("q", p.query.as_str()),
                    ("num", num.as_str()),
                    ("api_key", key.as_str()),
                ])
            },
            &context.retry,
            self.name(),
        )
        .await?;

        let hits = scholar_hits(&body);
        if hits.is_empty() {
            return Ok(ToolOutput::text("No results found"));
        }
        Ok(ToolOutput::json(&Value::Array(hits)))
    }
}
