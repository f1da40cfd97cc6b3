//! Configuration loading and validation.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::retry::RetryPolicy;

/// Top-level Reelsmith configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub models: Option<ModelsConfig>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub agent: Option<AgentConfig>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub workflow: Option<WorkflowConfig>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub tools: Option<ToolsConfig>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub notion: Option<NotionConfig>,

    /// System prompt overrides keyed by step name.
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub prompts: HashMap<String, String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub history: Option<HistoryConfig>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub logging: Option<LoggingConfig>,
}

// --- Models ---

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ModelsConfig {
    #[serde(default)]
    pub providers: Vec<ProviderConfig>,

    /// Retry policy for rate-limited or failing model calls.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry: Option<RetryConfig>,
}

/// Configuration for a single LLM provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key_env: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_model: Option<String>,
}

impl ProviderConfig {
    /// Resolve the API key: check `api_key` field first, then `api_key_env` environment variable.
    pub fn resolve_api_key(&self) -> Option<String> {
        resolve_secret_field(&self.api_key, &self.api_key_env)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,
    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,
}

fn default_max_retries() -> u32 {
    3
}

fn default_initial_backoff_ms() -> u64 {
    3_000
}

fn default_max_backoff_ms() -> u64 {
    60_000
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(cfg: &RetryConfig) -> Self {
        RetryPolicy {
            max_retries: cfg.max_retries,
            initial_backoff: Duration::from_millis(cfg.initial_backoff_ms),
            max_backoff: Duration::from_millis(cfg.max_backoff_ms),
            jitter: true,
        }
    }
}

// --- Agent ---

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AgentConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,

    /// Upper bound on tool-call round trips inside one agent turn.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tool_rounds: Option<u32>,
}

// --- Workflow ---

/// What the score gate does with an evaluator report it cannot parse.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnparsedScorePolicy {
    /// Treat the report as approving (no revision requested).
    #[default]
    Pass,
    /// Treat the report as failing (request a revision).
    Fail,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WorkflowConfig {
    /// Wall-clock budget for one whole workflow run.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,

    /// Maximum number of evaluate → rewrite loop-backs per run.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_revisions: Option<u32>,

    /// Scores at or below this value (on a 10-point scale) request a revision.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub score_threshold: Option<f64>,

    #[serde(default)]
    pub unparsed_score_policy: UnparsedScorePolicy,
}

// --- Tools ---

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ToolsConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub youtube_api_key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub youtube_api_key_env: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub rapidapi_key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rapidapi_key_env: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub serpapi_key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub serpapi_key_env: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub perplexity_api_key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub perplexity_api_key_env: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub perplexity_model: Option<String>,

    /// Vector-knowledge retrieval endpoint (prediction API in front of Qdrant).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub knowledge_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub qdrant_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub qdrant_api_key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub qdrant_api_key_env: Option<String>,

    /// Per-request HTTP timeout for tool back-ends (default: 30s).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub http_timeout_secs: Option<u64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry: Option<RetryConfig>,

    /// Token bucket shared by all bulk page-fetch tool calls in the process.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page_fetch_rate: Option<PageFetchRateConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageFetchRateConfig {
    #[serde(default = "default_bucket_capacity")]
    pub capacity: u32,
    #[serde(default = "default_refill_per_sec")]
    pub refill_per_sec: f64,
}

fn default_bucket_capacity() -> u32 {
    3
}

fn default_refill_per_sec() -> f64 {
    3.0
}

impl ToolsConfig {
    pub fn youtube_api_key(&self) -> Option<String> {
        resolve_secret_field(&self.youtube_api_key, &self.youtube_api_key_env)
    }

    pub fn rapidapi_key(&self) -> Option<String> {
        resolve_secret_field(&self.rapidapi_key, &self.rapidapi_key_env)
    }

    pub fn serpapi_key(&self) -> Option<String> {
        resolve_secret_field(&self.serpapi_key, &self.serpapi_key_env)
    }

    pub fn perplexity_api_key(&self) -> Option<String> {
        resolve_secret_field(&self.perplexity_api_key, &self.perplexity_api_key_env)
    }

    pub fn qdrant_api_key(&self) -> Option<String> {
        resolve_secret_field(&self.qdrant_api_key, &self.qdrant_api_key_env)
    }
}

// --- Notion ---

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NotionConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token_env: Option<String>,

    /// Database receiving every stage output.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub outputs_database_id: Option<String>,

    /// Database receiving curated research pages.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub research_database_id: Option<String>,

    /// Ingestion endpoint that indexes a persisted page into the vector store.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub index_url: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
}

impl NotionConfig {
    pub fn resolve_token(&self) -> Option<String> {
        resolve_secret_field(&self.token, &self.token_env)
    }
}

// --- History / logging ---

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HistoryConfig {
    /// Directory holding one JSONL chat-history file per session.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dir: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log format: "plain" (default) or "json".
    #[serde(default = "default_log_format")]
    pub format: String,

    /// Log level override (trace/debug/info/warn/error).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub level: Option<String>,

    /// Per-crate log level overrides (e.g. "reelsmith_workflow=debug").
    #[serde(default)]
    pub filters: Vec<String>,

    /// Output target: "stderr" (default) or "stdout".
    #[serde(default = "default_log_output")]
    pub output: String,
}

fn default_log_format() -> String {
    "plain".into()
}

fn default_log_output() -> String {
    "stderr".into()
}

/// Resolve a secret: check the direct value first, then the env-var reference.
pub fn resolve_secret_field(direct: &Option<String>, env_var: &Option<String>) -> Option<String> {
    if let Some(val) = direct {
        if !val.is_empty() {
            return Some(val.clone());
        }
    }
    if let Some(env) = env_var {
        if let Ok(val) = std::env::var(env) {
            if !val.is_empty() {
                return Some(val);
            }
        }
    }
    None
}

/// Substitute `${ENV_VAR}` patterns in a string with their environment variable values.
fn substitute_env_vars(input: &str) -> crate::error::Result<String> {
    let re = regex::Regex::new(r"\$\{([^}]+)\}")
        .map_err(|e| crate::error::ReelsmithError::Config(e.to_string()))?;
    Ok(re
        .replace_all(input, |caps: &regex::Captures| {
            std::env::var(&caps[1]).unwrap_or_default()
        })
        .into_owned())
}

pub const DEFAULT_TIMEOUT_SECS: u64 = 300;
pub const DEFAULT_MAX_REVISIONS: u32 = 3;
pub const DEFAULT_SCORE_THRESHOLD: f64 = 5.0;
pub const DEFAULT_MAX_TOOL_ROUNDS: u32 = 10;
pub const DEFAULT_MAX_TOKENS: u32 = 4096;

impl Config {
    /// Load config from a JSON5 file, substituting `${ENV_VAR}` references.
    pub fn load(path: &Path) -> crate::error::Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let raw = std::fs::read_to_string(path)?;
        Self::from_json5(&raw)
    }

    /// Parse config text, substituting `${ENV_VAR}` references first.
    pub fn from_json5(raw: &str) -> crate::error::Result<Self> {
        let substituted = substitute_env_vars(raw)?;
        json5::from_str(&substituted)
            .map_err(|e| crate::error::ReelsmithError::Config(e.to_string()))
    }

    /// Default config file location.
    pub fn default_path() -> PathBuf {
        data_dir().join("config.json")
    }

    /// Get the model name for agent calls.
    pub fn model(&self) -> String {
        self.agent
            .as_ref()
            .and_then(|a| a.model.clone())
            .or_else(|| self.first_provider().and_then(|p| p.default_model.clone()))
            .unwrap_or_else(|| "gpt-4o".to_string())
    }

    pub fn max_tokens(&self) -> u32 {
        self.agent
            .as_ref()
            .and_then(|a| a.max_tokens)
            .unwrap_or(DEFAULT_MAX_TOKENS)
    }

    pub fn temperature(&self) -> Option<f64> {
        self.agent.as_ref().and_then(|a| a.temperature)
    }

    pub fn max_tool_rounds(&self) -> u32 {
        self.agent
            .as_ref()
            .and_then(|a| a.max_tool_rounds)
            .unwrap_or(DEFAULT_MAX_TOOL_ROUNDS)
    }

    /// Overall wall-clock budget of a workflow run.
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(
            self.workflow
                .as_ref()
                .and_then(|w| w.timeout_secs)
                .unwrap_or(DEFAULT_TIMEOUT_SECS),
        )
    }

    pub fn max_revisions(&self) -> u32 {
        self.workflow
            .as_ref()
            .and_then(|w| w.max_revisions)
            .unwrap_or(DEFAULT_MAX_REVISIONS)
    }

    pub fn score_threshold(&self) -> f64 {
        self.workflow
            .as_ref()
            .and_then(|w| w.score_threshold)
            .unwrap_or(DEFAULT_SCORE_THRESHOLD)
    }

    pub fn unparsed_score_policy(&self) -> UnparsedScorePolicy {
        self.workflow
            .as_ref()
            .map(|w| w.unparsed_score_policy)
            .unwrap_or_default()
    }

    pub fn model_retry(&self) -> RetryPolicy {
        self.models
            .as_ref()
            .and_then(|m| m.retry.as_ref())
            .map(RetryPolicy::from)
            .unwrap_or_default()
    }

    pub fn tool_retry(&self) -> RetryPolicy {
        self.tools
            .as_ref()
            .and_then(|t| t.retry.as_ref())
            .map(RetryPolicy::from)
            .unwrap_or_default()
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(
            self.tools
                .as_ref()
                .and_then(|t| t.http_timeout_secs)
                .unwrap_or(30),
        )
    }

    /// `(capacity, refill_per_sec)` of the page-fetch token bucket.
    pub fn page_fetch_rate(&self) -> (u32, f64) {
        self.tools
            .as_ref()
            .and_then(|t| t.page_fetch_rate.as_ref())
            .map(|r| (r.capacity, r.refill_per_sec))
            .unwrap_or((default_bucket_capacity(), default_refill_per_sec()))
    }

    /// Tool settings, falling back to an empty section.
    pub fn tools(&self) -> ToolsConfig {
        self.tools.clone().unwrap_or_default()
    }

    /// System prompt override for a step, if configured.
    pub fn prompt_override(&self, step: &str) -> Option<&str> {
        self.prompts.get(step).map(String::as_str)
    }

    /// Directory for chat-history files.
    pub fn history_dir(&self) -> PathBuf {
        self.history
            .as_ref()
            .and_then(|h| h.dir.as_ref())
            .map(|d| PathBuf::from(shellexpand::tilde(d).as_ref()))
            .unwrap_or_else(|| data_dir().join("history"))
    }

    /// Find a provider config by id.
    pub fn provider(&self, id: &str) -> Option<&ProviderConfig> {
        self.models
            .as_ref()
            .and_then(|m| m.providers.iter().find(|pc| pc.id == id))
    }

    /// Get the first provider config.
    pub fn first_provider(&self) -> Option<&ProviderConfig> {
        self.models.as_ref().and_then(|m| m.providers.first())
    }

    /// Get a config value by dotted path (e.g. "workflow.timeout_secs").
    pub fn get_path(&self, path: &str) -> Option<serde_json::Value> {
        let json = serde_json::to_value(self).ok()?;
        let mut current = &json;
        for segment in path.split('.') {
            current = current.get(segment)?;
        }
        Some(current.clone())
    }

    /// Validate config, returning (warnings, errors).
    pub fn validate(&self) -> (Vec<String>, Vec<String>) {
        let mut warnings = Vec::new();
        let mut errors = Vec::new();

        match self.models.as_ref().map(|m| m.providers.as_slice()) {
            None | Some([]) => warnings.push("No model providers configured".to_string()),
            Some(providers) => {
                for p in providers {
                    if p.id != "ollama" && p.resolve_api_key().is_none() {
                        warnings.push(format!("Provider '{}' has no API key configured", p.id));
                    }
                }
            }
        }

        if self
            .notion
            .as_ref()
            .and_then(|n| n.resolve_token())
            .is_none()
        {
            warnings.push(
                "Notion token not configured; stage outputs will not be persisted".to_string(),
            );
        }

        if let Some(wf) = &self.workflow {
            if wf.timeout_secs == Some(0) {
                errors.push("workflow.timeout_secs cannot be 0".to_string());
            }
            if let Some(threshold) = wf.score_threshold {
                if !(0.0..=10.0).contains(&threshold) {
                    errors.push(format!(
                        "workflow.score_threshold must be within 0..=10, got {threshold}"
                    ));
                }
            }
        }

        if self.agent.as_ref().and_then(|a| a.max_tool_rounds) == Some(0) {
            errors.push("agent.max_tool_rounds cannot be 0".to_string());
        }

        if let Some(rate) = self.tools.as_ref().and_then(|t| t.page_fetch_rate.as_ref()) {
            if rate.capacity == 0 || rate.refill_per_sec <= 0.0 {
                errors.push(
                    "tools.page_fetch_rate needs a non-zero capacity and refill rate".to_string(),
                );
            }
        }

        (warnings, errors)
    }
}

/// Base directory for Reelsmith data: `~/.reelsmith/`
pub fn data_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".reelsmith")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_env_var_substitution() {
        // SAFETY: test-only, single-threaded test runner
        unsafe { std::env::set_var("TEST_RS_KEY", "sk-test-123") };
        let input = r#"{"key": "${TEST_RS_KEY}", "other": "plain"}"#;
        let result = substitute_env_vars(input).unwrap();
        assert!(result.contains("sk-test-123"));
        assert!(result.contains("plain"));
        unsafe { std::env::remove_var("TEST_RS_KEY") };
    }

    #[test]
    fn test_env_var_missing() {
        let input = r#"{"key": "${NONEXISTENT_VAR_RS_TEST}"}"#;
        let result = substitute_env_vars(input).unwrap();
        assert!(result.contains(r#""""#));
    }

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.timeout(), Duration::from_secs(300));
        assert_eq!(config.max_revisions(), 3);
        assert_eq!(config.score_threshold(), 5.0);
        assert_eq!(config.max_tool_rounds(), 10);
        assert_eq!(config.unparsed_score_policy(), UnparsedScorePolicy::Pass);
        assert_eq!(config.page_fetch_rate(), (3, 3.0));
    }

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load(&dir.path().join("absent.json")).unwrap();
        assert!(config.models.is_none());
    }

    #[test]
    fn test_load_json5_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(
            &path,
            r#"{
                // comments are allowed
                workflow: { timeout_secs: 42, max_revisions: 1, unparsed_score_policy: "fail" },
                agent: { model: "gpt-4o-mini", max_tool_rounds: 4 },
                prompts: { scriptwriter: "Write tight scripts." },
            }"#,
        )
        .unwrap();
        let config = Config::load(&path).unwrap();
        assert_eq!(config.timeout(), Duration::from_secs(42));
        assert_eq!(config.max_revisions(), 1);
        assert_eq!(config.unparsed_score_policy(), UnparsedScorePolicy::Fail);
        assert_eq!(config.model(), "gpt-4o-mini");
        assert_eq!(config.max_tool_rounds(), 4);
        assert_eq!(
            config.prompt_override("scriptwriter"),
            Some("Write tight scripts.")
        );
        assert_eq!(config.prompt_override("seo_optimization"), None);
    }

    #[test]
    fn test_invalid_json5_is_config_error() {
        let err = Config::from_json5("{ workflow: ").unwrap_err();
        assert!(matches!(err, crate::error::ReelsmithError::Config(_)));
    }

    #[test]
    fn test_provider_resolve_api_key() {
        // SAFETY: test-only, single-threaded test runner
        unsafe { std::env::set_var("TEST_RS_API_KEY", "from-env") };
        let provider = ProviderConfig {
            id: "test".into(),
            api_key_env: Some("TEST_RS_API_KEY".into()),
            api_key: None,
            base_url: None,
            default_model: None,
        };
        assert_eq!(provider.resolve_api_key(), Some("from-env".into()));

        let provider2 = ProviderConfig {
            api_key: Some("direct-key".into()),
            ..provider
        };
        assert_eq!(provider2.resolve_api_key(), Some("direct-key".into()));
        unsafe { std::env::remove_var("TEST_RS_API_KEY") };
    }

    #[test]
    fn test_model_falls_back_to_provider_default() {
        let config = Config {
            models: Some(ModelsConfig {
                providers: vec![ProviderConfig {
                    id: "openai".into(),
                    api_key: None,
                    api_key_env: None,
                    base_url: None,
                    default_model: Some("gpt-4.1".into()),
                }],
                retry: None,
            }),
            ..Config::default()
        };
        assert_eq!(config.model(), "gpt-4.1");
    }

    #[test]
    fn test_retry_config_conversion() {
        let config = Config::from_json5(
            r#"{ tools: { retry: { max_retries: 5, initial_backoff_ms: 10 } } }"#,
        )
        .unwrap();
        let policy = config.tool_retry();
        assert_eq!(policy.max_retries, 5);
        assert_eq!(policy.initial_backoff, Duration::from_millis(10));
        assert_eq!(policy.max_backoff, Duration::from_secs(60));
        assert_eq!(config.model_retry(), RetryPolicy::default());
    }

    #[test]
    fn test_get_path() {
        let config = Config::from_json5(r#"{ workflow: { timeout_secs: 9 } }"#).unwrap();
        assert_eq!(
            config.get_path("workflow.timeout_secs"),
            Some(serde_json::json!(9))
        );
        assert_eq!(config.get_path("workflow.nope"), None);
    }

    #[test]
    fn test_logging_config_defaults() {
        let config = Config::from_json5(r#"{ logging: {} }"#).unwrap();
        let logging = config.logging.expect("logging should be present");
        assert_eq!(logging.format, "plain");
        assert!(logging.level.is_none());
        assert_eq!(logging.output, "stderr");
        assert!(logging.filters.is_empty());
    }

    #[test]
    fn test_validate_missing_api_key_warns() {
        let config = Config::from_json5(r#"{ models: { providers: [{ id: "openai" }] } }"#)
            .unwrap();
        let (warnings, errors) = config.validate();
        assert!(
            warnings
                .iter()
                .any(|w| w.contains("openai") && w.to_lowercase().contains("key")),
            "Expected a warning about missing API key, got: {warnings:?}"
        );
        assert!(errors.is_empty());
    }

    #[test]
    fn test_validate_rejects_bad_workflow_settings() {
        let config = Config::from_json5(
            r#"{ workflow: { timeout_secs: 0, score_threshold: 12 }, agent: { max_tool_rounds: 0 } }"#,
        )
        .unwrap();
        let (_warnings, errors) = config.validate();
        assert_eq!(errors.len(), 3, "got: {errors:?}");
    }
}
