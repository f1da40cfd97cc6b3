//! Process setup: logging, model providers and workflow services.

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, bail};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use reelsmith_agent::AgentInvoker;
use reelsmith_core::config::{Config, LoggingConfig};
use reelsmith_providers::LlmProvider;
use reelsmith_providers::failover::FailoverProvider;
use reelsmith_providers::openai::OpenAiProvider;
use reelsmith_providers::retry::RetryingProvider;
use reelsmith_tools::ToolContext;
use reelsmith_tools::documents::NotionStore;
use reelsmith_workflow::Services;

/// Filter directives: the base level followed by per-crate overrides.
pub fn log_directives(logging: Option<&LoggingConfig>, verbose: bool) -> String {
    let level = if verbose {
        "debug".to_string()
    } else {
        logging
            .and_then(|l| l.level.clone())
            .unwrap_or_else(|| "info".to_string())
    };
    let mut directives = vec![level];
    if let Some(logging) = logging {
        directives.extend(logging.filters.iter().cloned());
    }
    directives.join(",")
}

/// Install the global subscriber. `RUST_LOG` wins over the config.
pub fn init_logging(config: &Config, verbose: bool) {
    let logging = config.logging.as_ref();
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(log_directives(logging, verbose)));
    let json = logging.is_some_and(|l| l.format == "json");
    let to_stdout = logging.is_some_and(|l| l.output == "stdout");

    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    match (json, to_stdout) {
        (true, true) => builder.json().with_writer(std::io::stdout).init(),
        (true, false) => builder.json().with_writer(std::io::stderr).init(),
        (false, true) => builder.with_writer(std::io::stdout).init(),
        (false, false) => builder.with_writer(std::io::stderr).init(),
    }
}

/// Every configured provider, each behind the model retry policy. More than
/// one provider is tried in order.
pub fn build_provider(config: &Config) -> anyhow::Result<Arc<dyn LlmProvider>> {
    let retry = config.model_retry();
    let providers: Vec<Arc<dyn LlmProvider>> = config
        .models
        .as_ref()
        .map(|m| m.providers.as_slice())
        .unwrap_or_default()
        .iter()
        .map(|pc| {
            let api_key = pc.resolve_api_key();
            if api_key.is_none() && pc.id != "ollama" {
                warn!(provider = %pc.id, "No API key configured for provider");
            }
            let inner: Arc<dyn LlmProvider> =
                Arc::new(OpenAiProvider::from_id(&pc.id, pc.base_url.as_deref(), api_key));
            Arc::new(RetryingProvider::new(inner, retry)) as Arc<dyn LlmProvider>
        })
        .collect();

    match providers.len() {
        0 => bail!("no model providers configured (add one under models.providers)"),
        1 => Ok(providers.into_iter().next().context("provider list changed")?),
        n => {
            info!(providers = n, "Using provider failover chain");
            Ok(Arc::new(FailoverProvider::new("failover".into(), providers)))
        }
    }
}

/// Tool context, agent invoker and workflow services for one process.
pub fn build_services(config: Arc<Config>) -> anyhow::Result<Services> {
    let mut tool_context = ToolContext::new(config.clone())?;
    match config.notion.as_ref() {
        Some(notion) => {
            match NotionStore::from_config(notion, tool_context.http.clone(), config.tool_retry()) {
                Some(store) => tool_context = tool_context.with_documents(Arc::new(store)),
                None => warn!("Notion is configured without a token; stage outputs will not be archived"),
            }
        }
        None => info!("No Notion config; stage outputs will not be archived"),
    }

    let provider = build_provider(&config)?;
    let agent = AgentInvoker::from_config(&config, provider, tool_context);
    Ok(Services::from_config(&config, agent))
}

/// A literal argument, or the contents of a file when written as `@path`.
pub fn resolve_arg(value: &str) -> anyhow::Result<String> {
    match value.strip_prefix('@') {
        Some(path) => std::fs::read_to_string(Path::new(path))
            .with_context(|| format!("failed to read {path}")),
        None => Ok(value.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_resolve_arg_literal_and_file() {
        assert_eq!(resolve_arg("sugar").unwrap(), "sugar");

        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "Idea set 2").unwrap();
        let arg = format!("@{}", file.path().display());
        assert_eq!(resolve_arg(&arg).unwrap(), "Idea set 2");

        assert!(resolve_arg("@/definitely/not/here.txt").is_err());
    }

    #[test]
    fn test_log_directives() {
        assert_eq!(log_directives(None, false), "info");
        assert_eq!(log_directives(None, true), "debug");

        let logging = LoggingConfig {
            format: "json".into(),
            level: Some("warn".into()),
            filters: vec!["reelsmith_workflow=debug".into()],
            output: "stderr".into(),
        };
        assert_eq!(
            log_directives(Some(&logging), false),
            "warn,reelsmith_workflow=debug"
        );
    }

    #[test]
    fn test_build_provider_requires_one() {
        let err = build_provider(&Config::default()).err().unwrap();
        assert!(err.to_string().contains("no model providers"));

        let config = Config::from_json5(
            r#"{ models: { providers: [
                { id: "openai", api_key: "sk-a" },
                { id: "openrouter", api_key: "sk-b" },
            ] } }"#,
        )
        .unwrap();
        assert!(build_provider(&config).is_ok());
    }
}
