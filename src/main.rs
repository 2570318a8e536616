use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use clap::{CommandFactory, Parser, Subcommand};
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

use wyre_core::config::{EngineConfig, RetryConfig};
use wyre_core::traits::LanguageModel;
use wyre_core::types::{ChatMessage, RunEvent};
use wyre_engine::{Environment, Graph, GraphSpec, RunScheduler};

#[derive(Parser)]
#[command(name = "wyre", version, about = "Blueprint graph execution engine")]
struct Cli {
    /// Path to config file
    #[arg(short, long, default_value = "wyre.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Execute a graph and print its outputs as JSON
    Run {
        /// Graph file (JSON)
        graph: PathBuf,
        /// Initial environment entries (KEY=VALUE, values parsed as JSON when possible)
        #[arg(short, long = "input")]
        inputs: Vec<String>,
        /// Conversation history sent before every prompt (JSON array of {role, content})
        #[arg(long)]
        history: Option<PathBuf>,
        /// Override the step budget
        #[arg(long)]
        max_steps: Option<usize>,
        /// Suppress streamed progress on stderr
        #[arg(short, long)]
        quiet: bool,
    },
    /// Check a graph for structural errors
    Validate {
        /// Graph file (JSON)
        graph: PathBuf,
    },
    /// Show current configuration
    Config,
    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("wyre=info,warn")),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    // Handle completions before config loading
    if let Commands::Completions { shell } = &cli.command {
        let mut cmd = Cli::command();
        clap_complete::generate(*shell, &mut cmd, "wyre", &mut std::io::stdout());
        return Ok(());
    }

    let mut config = if cli.config.exists() {
        EngineConfig::load(&cli.config)?
    } else {
        info!(path = %cli.config.display(), "No config file found, using defaults");
        EngineConfig::default()
    };

    match cli.command {
        Commands::Config => {
            println!("{}", toml::to_string_pretty(&config)?);
        }
        Commands::Validate { graph } => {
            let graph = load_graph(&graph)?;
            println!("ok: {} nodes", graph.len());
        }
        Commands::Run {
            graph,
            inputs,
            history,
            max_steps,
            quiet,
        } => {
            if let Some(max_steps) = max_steps {
                config.engine.max_steps = max_steps;
                config.validate()?;
            }
            let spec = read_spec(&graph)?;
            let mut env = parse_inputs(&inputs)?;
            if let Some(path) = history {
                env = env.with_history(read_history(&path)?);
            }
            let scheduler = RunScheduler::new(build_model(&config)?, &config);
            run_graph(&scheduler, spec, env, quiet).await?;
        }
        Commands::Completions { .. } => unreachable!("handled before config load"),
    }

    Ok(())
}

/// Wrap the configured model with retry and fallbacks when any are set.
fn build_model(config: &EngineConfig) -> anyhow::Result<Arc<dyn LanguageModel>> {
    let primary = wyre_llm::create_model(&config.model)?;
    if config.fallback_models.is_empty() && config.model.retry.is_none() {
        return Ok(Arc::from(primary));
    }

    let retry_config = config
        .model
        .retry
        .clone()
        .unwrap_or_else(RetryConfig::default);
    let mut fallbacks = Vec::with_capacity(config.fallback_models.len());
    for mc in &config.fallback_models {
        match wyre_llm::create_model(mc) {
            Ok(model) => fallbacks.push((mc.clone(), model)),
            Err(e) => warn!(provider = %mc.provider, error = %e, "Skipping fallback model"),
        }
    }
    Ok(Arc::new(wyre_llm::RetryingModel::new(
        primary,
        fallbacks,
        retry_config,
    )))
}

fn read_spec(path: &Path) -> anyhow::Result<GraphSpec> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("reading graph {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("parsing graph {}", path.display()))
}

fn load_graph(path: &Path) -> anyhow::Result<Graph> {
    Ok(Graph::new(read_spec(path)?)?)
}

fn read_history(path: &Path) -> anyhow::Result<Vec<ChatMessage>> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("reading history {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("parsing history {}", path.display()))
}

fn parse_inputs(inputs: &[String]) -> anyhow::Result<Environment> {
    let mut env = Environment::new();
    for entry in inputs {
        let (key, value) = entry
            .split_once('=')
            .with_context(|| format!("input '{entry}' is not KEY=VALUE"))?;
        env.set_raw(key.trim(), value);
    }
    Ok(env)
}

async fn run_graph(
    scheduler: &RunScheduler,
    spec: GraphSpec,
    env: Environment,
    quiet: bool,
) -> anyhow::Result<()> {
    let mut bus = scheduler.event_bus().subscribe();
    tokio::spawn(async move {
        loop {
            match bus.recv().await {
                Ok(event) => debug!(run_id = %event.run_id(), event = ?event, "Run event"),
                Err(RecvError::Lagged(skipped)) => warn!(skipped, "Event log fell behind"),
                Err(RecvError::Closed) => break,
            }
        }
    });

    let mut handle = scheduler.submit_spec(spec, env);

    // Cancel the run on Ctrl-C
    let cancel = handle.cancel_token();
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("Cancelling run...");
        cancel.cancel();
    });

    while let Some(event) = handle.events.recv().await {
        match event {
            RunEvent::StepStarted { label, step, .. } if !quiet => {
                eprintln!("[{step}] {label}");
            }
            RunEvent::Progress { chunk, .. } if !quiet => {
                eprint!("{chunk}");
                std::io::stderr().flush().ok();
            }
            RunEvent::Usage {
                input_tokens,
                output_tokens,
                ..
            } if !quiet => {
                eprintln!("\n[tokens: {input_tokens} in / {output_tokens} out]");
            }
            RunEvent::Failed { kind, detail, .. } => {
                eprintln!("[failed: {kind}] {detail}");
            }
            _ => {}
        }
    }

    let outcome = handle.wait().await;
    let outputs = outcome.result?;
    println!("{}", serde_json::to_string_pretty(&outputs)?);
    Ok(())
}
