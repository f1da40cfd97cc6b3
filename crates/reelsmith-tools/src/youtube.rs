//! Video-platform tools: search, channel and video metadata, transcripts and
//! keyword volume.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::debug;

use crate::http::{get_json, get_text};
use crate::{Tool, ToolContext, ToolOutput, parse_params};

const YOUTUBE_BASE_URL: &str = "https://www.googleapis.com/youtube/v3";
const TRANSCRIPT_HOST: &str = "youtube-transcriptor.p.rapidapi.com";
const KEYWORD_HOST: &str = "google-keyword-insight1.p.rapidapi.com";

const SEARCH_MAX_RESULTS: u32 = 15;
const MIN_SEARCH_VOLUME: u32 = 5000;

fn missing_key(what: &str, key: &str) -> ToolOutput {
    ToolOutput::error(format!(
        "{what} is not configured. Set tools.{key} or tools.{key}_env."
    ))
}

/// Shared endpoint settings for the YouTube Data API tools.
#[derive(Debug, Clone)]
pub struct YouTubeApi {
    base_url: String,
}

impl Default for YouTubeApi {
    fn default() -> Self {
        Self {
            base_url: YOUTUBE_BASE_URL.into(),
        }
    }
}

impl YouTubeApi {
    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
        }
    }

    async fn get(
        &self,
        context: &ToolContext,
        resource: &str,
        query: &[(&str, &str)],
        label: &str,
    ) -> anyhow::Result<Result<Value, ToolOutput>> {
        let Some(key) = context.config.tools().youtube_api_key() else {
            return Ok(Err(missing_key("YouTube Data API", "youtube_api_key")));
        };
        let url = format!("{}/{resource}", self.base_url);
        let body = get_json(
            || context.http.get(&url).query(query).query(&[("key", &key)]),
            &context.retry,
            label,
        )
        .await?;
        Ok(Ok(body))
    }
}

// --- youtube_search ---

#[derive(Default)]
pub struct YoutubeSearchTool {
    api: YouTubeApi,
}

impl YoutubeSearchTool {
    pub fn new(api: YouTubeApi) -> Self {
        Self { api }
    }
}

#[derive(Deserialize)]
struct SearchParams {
    region_code: String,
    lang: String,
    keywords: String,
}

#[derive(Debug, Serialize, PartialEq)]
struct VideoHit {
    video_id: String,
    title: String,
    channel_id: String,
    channel_title: String,
    published_at: String,
    description: String,
}

fn parse_search_results(body: &Value) -> Vec<VideoHit> {
    let empty = vec![];
    body["items"]
        .as_array()
        .unwrap_or(&empty)
        .iter()
        .filter_map(|item| {
            let snippet = &item["snippet"];
            Some(VideoHit {
                video_id: item["id"]["videoId"].as_str()?.to_string(),
                title: snippet["title"].as_str().unwrap_or_default().to_string(),
                channel_id: snippet["channelId"].as_str().unwrap_or_default().to_string(),
                channel_title: snippet["channelTitle"].as_str().unwrap_or_default().to_string(),
                published_at: snippet["publishedAt"].as_str().unwrap_or_default().to_string(),
                description: snippet["description"].as_str().unwrap_or_default().to_string(),
            })
        })
        .collect()
}

#[async_trait]
impl Tool for YoutubeSearchTool {
    fn name(&self) -> &str {
        "youtube_search"
    }

    fn description(&self) -> &str {
        "Search YouTube videos by keywords for a region and language. Returns video ids, titles, channels and publish dates."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "region_code": { "type": "string", "description": "ISO 3166-1 alpha-2 region, e.g. US" },
                "lang": { "type": "string", "description": "ISO 639-1 relevance language, e.g. en" },
                "keywords": { "type": "string", "description": "Search keywords" }
            },
            "required": ["region_code", "lang", "keywords"]
        })
    }

    async fn execute(&self, params: Value, context: &ToolContext) -> anyhow::Result<ToolOutput> {
        let p: SearchParams = parse_params(params, self.name())?;
        debug!(keywords = %p.keywords, region = %p.region_code, "youtube_search");
        let max = SEARCH_MAX_RESULTS.to_string();
        let body = match self
            .api
            .get(
                context,
                "search",
                &[
                    ("part", "snippet"),
                    ("type", "video"),
                    ("regionCode", &p.region_code),
                    ("relevanceLanguage", &p.lang),
                    ("q", &p.keywords),
                    ("maxResults", &max),
                ],
                self.name(),
            )
            .await?
        {
            Ok(body) => body,
            Err(output) => return Ok(output),
        };

        let hits = parse_search_results(&body);
        if hits.is_empty() {
            return Ok(ToolOutput::text("No videos found."));
        }
        Ok(ToolOutput::json(&serde_json::to_value(hits)?))
    }
}

// --- channel_details_tool ---

#[derive(Default)]
pub struct ChannelDetailsTool {
    api: YouTubeApi,
}

impl ChannelDetailsTool {
    pub fn new(api: YouTubeApi) -> Self {
        Self { api }
    }
}

#[derive(Deserialize)]
struct ChannelParams {
    channel_id: String,
}

#[async_trait]
impl Tool for ChannelDetailsTool {
    fn name(&self) -> &str {
        "channel_details_tool"
    }

    fn description(&self) -> &str {
        "Get subscriber, view and video counts for a YouTube channel id."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "channel_id": { "type": "string", "description": "YouTube channel id" }
            },
            "required": ["channel_id"]
        })
    }

    async fn execute(&self, params: Value, context: &ToolContext) -> anyhow::Result<ToolOutput> {
        let p: ChannelParams = parse_params(params, self.name())?;
        let body = match self
            .api
            .get(
                context,
                "channels",
                &[("part", "statistics"), ("id", &p.channel_id)],
                self.name(),
            )
            .await?
        {
            Ok(body) => body,
            Err(output) => return Ok(output),
        };
        match body["items"].get(0) {
            Some(item) => Ok(ToolOutput::json(&json!({
                "channel_id": p.channel_id,
                "statistics": item["statistics"],
            }))),
            None => Ok(ToolOutput::error(format!("Channel '{}' not found.", p.channel_id))),
        }
    }
}

// --- youtube_video_details ---

#[derive(Default)]
pub struct VideoDetailsTool {
    api: YouTubeApi,
}

impl VideoDetailsTool {
    pub fn new(api: YouTubeApi) -> Self {
        Self { api }
    }
}

#[derive(Deserialize)]
struct VideoParams {
    video_id: String,
}

fn video_params_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "video_id": { "type": "string", "description": "YouTube video id" }
        },
        "required": ["video_id"]
    })
}

#[async_trait]
impl Tool for VideoDetailsTool {
    fn name(&self) -> &str {
        "youtube_video_details"
    }

    fn description(&self) -> &str {
        "Get the title, description, tags and view/like/comment statistics of a YouTube video."
    }

    fn parameters_schema(&self) -> Value {
        video_params_schema()
    }

    async fn execute(&self, params: Value, context: &ToolContext) -> anyhow::Result<ToolOutput> {
        let p: VideoParams = parse_params(params, self.name())?;
        let body = match self
            .api
            .get(
                context,
                "videos",
                &[("part", "snippet,statistics"), ("id", &p.video_id)],
                self.name(),
            )
            .await?
        {
            Ok(body) => body,
            Err(output) => return Ok(output),
        };
        match body["items"].get(0) {
            Some(item) => Ok(ToolOutput::json(&json!({
                "video_id": p.video_id,
                "title": item["snippet"]["title"],
                "channel_title": item["snippet"]["channelTitle"],
                "published_at": item["snippet"]["publishedAt"],
                "tags": item["snippet"]["tags"],
                "description": item["snippet"]["description"],
                "statistics": item["statistics"],
            }))),
            None => Ok(ToolOutput::error(format!("Video '{}' not found.", p.video_id))),
        }
    }
}

// --- transcribe_video ---

pub struct TranscribeVideoTool {
    base_url: String,
}

impl Default for TranscribeVideoTool {
    fn default() -> Self {
        Self {
            base_url: format!("https://{TRANSCRIPT_HOST}"),
        }
    }
}

#[async_trait]
impl Tool for TranscribeVideoTool {
    fn name(&self) -> &str {
        "transcribe_video"
    }

    fn description(&self) -> &str {
        "Fetch the transcript of a YouTube video."
    }

    fn parameters_schema(&self) -> Value {
        video_params_schema()
    }

    async fn execute(&self, params: Value, context: &ToolContext) -> anyhow::Result<ToolOutput> {
        let p: VideoParams = parse_params(params, self.name())?;
        let Some(key) = context.config.tools().rapidapi_key() else {
            return Ok(missing_key("RapidAPI", "rapidapi_key"));
        };
        let url = format!("{}/transcript", self.base_url);
        let text = get_text(
            || {
                context
                    .http
                    .get(&url)
                    .query(&[("video_id", &p.video_id)])
                    .header("x-rapidapi-key", &key)
                    .header("x-rapidapi-host", TRANSCRIPT_HOST)
            },
            &context.retry,
            self.name(),
        )
        .await?;
        Ok(ToolOutput::text(text))
    }
}

// --- google_promise ---

pub struct KeywordVolumeTool {
    base_url: String,
}

impl Default for KeywordVolumeTool {
    fn default() -> Self {
        Self {
            base_url: format!("https://{KEYWORD_HOST}"),
        }
    }
}

impl KeywordVolumeTool {
    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
        }
    }
}

#[derive(Deserialize)]
struct KeywordParams {
    keyword: String,
    location: String,
    lang: String,
}

#[async_trait]
impl Tool for KeywordVolumeTool {
    fn name(&self) -> &str {
        "google_promise"
    }

    fn description(&self) -> &str {
        "Get Google search volume and related keyword suggestions for a keyword, both for a location and globally."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "keyword": { "type": "string" },
                "location": { "type": "string", "description": "Country code, e.g. US" },
                "lang": { "type": "string", "description": "Language code, e.g. en" }
            },
            "required": ["keyword", "location", "lang"]
        })
    }

    async fn execute(&self, params: Value, context: &ToolContext) -> anyhow::Result<ToolOutput> {
        let p: KeywordParams = parse_params(params, self.name())?;
        let Some(key) = context.config.tools().rapidapi_key() else {
            return Ok(missing_key("RapidAPI", "rapidapi_key"));
        };
        let min_vol = MIN_SEARCH_VOLUME.to_string();
        let suggest_url = format!("{}/keysuggest/", self.base_url);
        let global_url = format!("{}/globalkey/", self.base_url);
        let request = |url: &str, query: Vec<(&'static str, String)>| {
            context
                .http
                .get(url)
                .query(&query)
                .header("x-rapidapi-key", &key)
                .header("x-rapidapi-host", KEYWORD_HOST)
        };

        // Both lookups run concurrently; one failing does not hide the other.
        let (suggest, global) = tokio::join!(
            get_text(
                || request(
                    &suggest_url,
                    vec![
                        ("keyword", p.keyword.clone()),
                        ("location", p.location.clone()),
                        ("lang", p.lang.clone()),
                        ("min_search_vol", min_vol.clone()),
                    ],
                ),
                &context.retry,
                "google_promise.keysuggest",
            ),
            get_text(
                || request(
                    &global_url,
                    vec![
                        ("keyword", p.keyword.clone()),
                        ("lang", p.lang.clone()),
                        ("min_search_vol", min_vol.clone()),
                    ],
                ),
                &context.retry,
                "google_promise.globalkey",
            ),
        );

        if let (Err(a), Err(b)) = (&suggest, &global) {
            return Ok(ToolOutput::error(format!("Keyword lookups failed: {a}; {b}")));
        }
        let as_value = |r: Result<String, crate::ToolError>| match r {
            Ok(text) => serde_json::from_str(&text).unwrap_or(Value::String(text)),
            Err(e) => json!({ "error": e.to_string() }),
        };
        Ok(ToolOutput::json(&json!({
            "keysuggest_data": as_value(suggest),
            "globalkey_data": as_value(global),
        })))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_search_results() {
        let body = json!({
            "items": [
                {
                    "id": { "kind": "youtube#video", "videoId": "abc123" },
                    "snippet": {
                        "title": "Sugar and your brain",
                        "channelId": "UC1",
                        "channelTitle": "Health Lab",
                        "publishedAt": "2024-05-01T00:00:00Z",
                        "description": "What sugar does"
                    }
                },
                { "id": { "kind": "youtube#channel", "channelId": "UC2" }, "snippet": {} }
            ]
        });
        let hits = parse_search_results(&body);
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].video_id, "abc123");
        assert_eq!(hits[0].channel_title, "Health Lab");
    }

    #[test]
    fn test_parse_search_results_empty() {
        assert!(parse_search_results(&json!({})).is_empty());
    }

    #[tokio::test]
    async fn test_missing_youtube_key() {
        let out = YoutubeSearchTool::default()
            .execute(
                json!({"region_code": "US", "lang": "en", "keywords": "sugar"}),
                &crate::test_support::context(),
            )
            .await
            .unwrap();
        assert!(out.is_error);
        assert!(out.content.contains("youtube_api_key"));
    }

    #[tokio::test]
    async fn test_missing_required_param_is_error() {
        let err = VideoDetailsTool::default()
            .execute(json!({}), &crate::test_support::context())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("video_id"));
    }
}
