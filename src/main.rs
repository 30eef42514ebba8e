use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tracing::Span;
use tracing_subscriber::{fmt, EnvFilter};

mod agent;
mod conversation;
mod error;
mod graph_service;
mod models;
mod repl;
mod server;
mod session;
mod settings;
mod summary;
#[cfg(test)]
mod testing;

use agent::tools::ToolRegistry;
use agent::ResearchAssistant;
use conversation::ConversationService;
use graph_service::HttpGraphService;
use models::OpenAICompatible;
use session::SessionStore;
use settings::AppConfig;
use summary::SummaryService;

#[derive(Debug, Parser)]
#[command(name = "research_assistant")]
#[command(about = "Tool-calling research assistant over an experiment graph", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

/// Flags shared by every command that talks to the model.
#[derive(Debug, Args)]
struct Common {
    #[arg(long)]
    graph_api_base: Option<String>,
    #[arg(long)]
    model: Option<String>,
    #[arg(long)]
    max_iterations: Option<u32>,
}

impl Common {
    fn apply(self, config: &mut AppConfig) {
        if let Some(base) = self.graph_api_base {
            config.graph_api_base = base;
        }
        if let Some(model) = self.model {
            config.model = model;
        }
        if let Some(n) = self.max_iterations {
            config.max_iterations = n;
        }
    }
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Serve the conversation API over HTTP.
    Serve {
        #[arg(long)]
        listen: Option<String>,
        #[arg(long)]
        session_max_age_hours: Option<i64>,
        #[arg(long)]
        sweep_interval_secs: Option<u64>,
        #[command(flatten)]
        common: Common,
    },
    /// Chat in the terminal.
    Chat {
        /// Start from the static prompt instead of a live graph snapshot.
        #[arg(long)]
        no_context: bool,
        #[command(flatten)]
        common: Common,
    },
    /// Print the function descriptors handed to the model.
    Tools,
}

/// The conversation and summary services share one registry and one model client.
fn services(config: &AppConfig, root: &Span) -> anyhow::Result<(Arc<ConversationService>, Arc<SummaryService>)> {
    url::Url::parse(&config.graph_api_base).with_context(|| format!("invalid graph api base: {}", config.graph_api_base))?;
    let graph = Arc::new(HttpGraphService::new(config.graph_api_base.clone()));
    let registry = Arc::new(ToolRegistry::with_graph_tools(graph, root)?);
    let model = Arc::new(OpenAICompatible::new(config.openai_base_url.clone(), config.openai_api_key.clone()));
    let summaries = Arc::new(SummaryService::new(
        registry.clone(),
        model.clone(),
        config.model.clone(),
        Duration::from_secs(config.summary_cache_ttl_secs),
        root,
    ));
    let assistant = Arc::new(ResearchAssistant::new(model, registry, root));
    let store = Arc::new(SessionStore::new(root));
    Ok((Arc::new(ConversationService::new(assistant, store, config.defaults(), root)), summaries))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let mut config = AppConfig::from_env()?;
    let root = tracing::info_span!("research_assistant");

    match cli.command {
        Commands::Serve { listen, session_max_age_hours, sweep_interval_secs, common } => {
            common.apply(&mut config);
            if let Some(listen) = listen {
                config.listen = listen;
            }
            if let Some(h) = session_max_age_hours {
                config.session_max_age_hours = h;
            }
            if let Some(s) = sweep_interval_secs {
                config.sweep_interval_secs = s;
            }
            let addr: SocketAddr = config.listen.parse().with_context(|| format!("invalid listen address: {}", config.listen))?;
            let metrics = PrometheusBuilder::new().install_recorder()?;
            let (conversations, summaries) = services(&config, &root)?;
            let state = server::AppState::new(conversations, summaries, Some(metrics));
            tracing::info!(graph = %config.graph_api_base, model = %config.model, max_iterations = config.max_iterations, "starting");
            server::serve(addr, state, config.session_max_age_hours, Duration::from_secs(config.sweep_interval_secs.max(1))).await?;
        }
        Commands::Chat { no_context, common } => {
            common.apply(&mut config);
            let (conversations, _) = services(&config, &root)?;
            let stdin = tokio::io::BufReader::new(tokio::io::stdin());
            repl::run(conversations, !no_context, stdin, tokio::io::stdout()).await?;
        }
        Commands::Tools => {
            let graph = Arc::new(HttpGraphService::new(config.graph_api_base.clone()));
            let registry = ToolRegistry::with_graph_tools(graph, &root)?;
            println!("{}", serde_json::to_string_pretty(registry.specs())?);
        }
    }
    Ok(())
}
