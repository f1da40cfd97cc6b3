use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};

use reelsmith_core::config::Config;
use reelsmith_core::history::{ChatHistoryStore, JsonlChatHistoryStore, render_history};
use reelsmith_core::types::ChatMessage;
use reelsmith_workflow::flows::{ideation_workflow, modify_script, research_workflow, scripting_workflow};
use reelsmith_workflow::{RunOutcome, StartEvent, WorkflowOutput};

mod setup;

use setup::resolve_arg;

#[derive(Parser)]
#[command(
    name = "reelsmith",
    about = "Multi-agent YouTube content workflows: ideation, research and scripting",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file path
    #[arg(short, long, global = true)]
    config: Option<String>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Write the result to this file instead of stdout
    #[arg(short, long, global = true)]
    output: Option<PathBuf>,

    /// Print Prometheus metrics to stderr after the command
    #[cfg(feature = "metrics")]
    #[arg(long, global = true)]
    print_metrics: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate three idea sets for a topic
    Ideation {
        /// Topic (or @file)
        #[arg(short, long)]
        input: String,

        /// Chat session whose history is passed along and extended
        #[arg(long)]
        session: Option<String>,
    },

    /// Research the chosen ideas and save curated sources
    Research {
        /// Topic (or @file)
        #[arg(short, long)]
        input: String,

        /// Ideation result (or @file)
        #[arg(long)]
        ideation: String,
    },

    /// Write and evaluate a script
    Scripting {
        /// Ideation result (or @file)
        #[arg(long)]
        ideation: String,

        /// Research result (or @file)
        #[arg(long)]
        research: String,
    },

    /// Apply a modification request to a script
    Modify {
        /// Script (or @file)
        #[arg(long)]
        script: String,

        /// What to change (or @file)
        #[arg(long)]
        request: String,
    },

    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Show current configuration
    Show,
    /// Get a specific config value (dotted path)
    Get { key: String },
    /// Check the configuration for problems
    Validate,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config_path = cli
        .config
        .as_deref()
        .map(PathBuf::from)
        .unwrap_or_else(Config::default_path);
    let config = Config::load(&config_path)
        .with_context(|| format!("failed to load {}", config_path.display()))?;

    setup::init_logging(&config, cli.verbose);

    #[cfg(feature = "metrics")]
    let prometheus = metrics_exporter_prometheus::PrometheusBuilder::new()
        .install_recorder()
        .context("failed to install Prometheus recorder")?;

    let config = Arc::new(config);
    match cli.command {
        Commands::Ideation { input, session } => {
            let input = resolve_arg(&input)?;
            let services = Arc::new(setup::build_services(config.clone())?);
            let history = JsonlChatHistoryStore::new(config.history_dir());

            let mut start = StartEvent::new().with("input", input.clone());
            if let Some(session) = session.as_deref() {
                let messages = history.load(session).await?;
                if !messages.is_empty() {
                    start = start.with("chat_history", render_history(&messages));
                }
            }

            let outcome = ideation_workflow(services)?.run(start).await?;
            log_outcome(&outcome);
            if let (Some(session), Some(text)) = (session.as_deref(), outcome.result.as_text()) {
                history
                    .append(session, &[ChatMessage::human(input), ChatMessage::ai(text)])
                    .await?;
            }
            emit(&outcome.result, cli.output.as_deref()).await?;
        }
        Commands::Research { input, ideation } => {
            let start = StartEvent::new()
                .with("input", resolve_arg(&input)?)
                .with("ideation", resolve_arg(&ideation)?);
            let services = Arc::new(setup::build_services(config.clone())?);
            let outcome = research_workflow(services)?.run(start).await?;
            log_outcome(&outcome);
            emit(&outcome.result, cli.output.as_deref()).await?;
        }
        Commands::Scripting { ideation, research } => {
            let start = StartEvent::new()
                .with("ideation", resolve_arg(&ideation)?)
                .with("research", resolve_arg(&research)?);
            let services = Arc::new(setup::build_services(config.clone())?);
            let outcome = scripting_workflow(services)?.run(start).await?;
            log_outcome(&outcome);
            emit(&outcome.result, cli.output.as_deref()).await?;
        }
        Commands::Modify { script, request } => {
            let services = setup::build_services(config.clone())?;
            let revised = modify_script(&services, &resolve_arg(&script)?, &resolve_arg(&request)?).await?;
            emit(&WorkflowOutput::Text(revised), cli.output.as_deref()).await?;
        }
        Commands::Config { action } => match action {
            ConfigAction::Show => {
                let json = serde_json::to_string_pretty(config.as_ref())?;
                println!("{json}");
            }
            ConfigAction::Get { key } => match config.get_path(&key) {
                Some(value) => println!("{}", serde_json::to_string_pretty(&value)?),
                None => anyhow::bail!("no config value at '{key}'"),
            },
            ConfigAction::Validate => {
                let (warnings, errors) = config.validate();
                for w in &warnings {
                    println!("warning: {w}");
                }
                for e in &errors {
                    println!("error: {e}");
                }
                if !errors.is_empty() {
                    anyhow::bail!("{} configuration error(s)", errors.len());
                }
                println!("Config OK: {}", config_path.display());
            }
        },
    }

    #[cfg(feature = "metrics")]
    if cli.print_metrics {
        eprintln!("{}", prometheus.render());
    }

    Ok(())
}

fn log_outcome(outcome: &RunOutcome) {
    tracing::info!(
        run_id = %outcome.run_id,
        rounds = outcome.rounds,
        stages = outcome.report.len(),
        duration_ms = outcome.duration.as_millis() as u64,
        "Run finished"
    );
}

/// Print the result (reports as pretty JSON), or write it to `output`.
async fn emit(result: &WorkflowOutput, output: Option<&std::path::Path>) -> anyhow::Result<()> {
    let rendered = match result {
        WorkflowOutput::Text(text) => text.clone(),
        WorkflowOutput::Report(_) => serde_json::to_string_pretty(result)?,
    };
    match output {
        Some(path) => {
            tokio::fs::write(path, rendered)
                .await
                .with_context(|| format!("failed to write {}", path.display()))?;
            tracing::info!(path = %path.display(), "Result written");
        }
        None => println!("{rendered}"),
    }
    Ok(())
}
