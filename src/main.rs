use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context};
use clap::{CommandFactory, Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use ticketflow_core::config::AppConfig;
use ticketflow_core::event::EventBus;
use ticketflow_core::types::{ProviderRole, RunId};
use ticketflow_core::{Ticket, WorkflowState};

use ticketflow_capabilities::CapabilityRegistry;
use ticketflow_engine::{support_workflow, Engine, RunLogger};

#[derive(Parser)]
#[command(name = "ticketflow", version, about = "Customer-support ticket workflow engine")]
struct Cli {
    /// Path to config file
    #[arg(short, long, default_value = "ticketflow.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one ticket through the support workflow
    Run {
        /// Read the ticket from a JSON file instead of flags
        #[arg(long, conflicts_with_all = ["ticket_id", "customer_name", "email", "query"])]
        ticket_file: Option<PathBuf>,
        #[arg(long)]
        ticket_id: Option<String>,
        #[arg(long)]
        customer_name: Option<String>,
        #[arg(long)]
        email: Option<String>,
        #[arg(long)]
        query: Option<String>,
        #[arg(long, default_value = "1")]
        priority: u32,
        /// Print the final state as JSON
        #[arg(long)]
        json: bool,
    },
    /// Print the workflow graph
    Graph {
        /// Print edges as JSON
        #[arg(long)]
        json: bool,
    },
    /// List registered capabilities
    Capabilities,
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
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("ticketflow=info,warn")),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            ticket_file,
            ticket_id,
            customer_name,
            email,
            query,
            priority,
            json,
        } => {
            let ticket = match ticket_file {
                Some(path) => read_ticket(&path)?,
                None => Ticket::new(
                    ticket_id.context("--ticket-id is required")?,
                    customer_name.context("--customer-name is required")?,
                    email.context("--email is required")?,
                    query.context("--query is required")?,
                    priority,
                ),
            };
            let config = load_config(&cli.config)?;
            run_ticket(&config, ticket, json).await?;
        }
        Commands::Graph { json } => {
            let definition = support_workflow()?;
            if json {
                println!("{}", serde_json::to_string_pretty(&definition.edges())?);
            } else {
                println!("entry: {}", definition.entry());
                for edge in definition.edges() {
                    match (&edge.router, &edge.label) {
                        (Some(router), Some(label)) => {
                            println!("  {} --[{}: {}]--> {}", edge.from, router, label, edge.to)
                        }
                        _ => println!("  {} --> {}", edge.from, edge.to),
                    }
                }
            }
        }
        Commands::Capabilities => {
            let registry = CapabilityRegistry::with_builtins();
            for (role, title) in [
                (ProviderRole::Computation, "computation"),
                (ProviderRole::External, "external"),
            ] {
                println!("{}:", title);
                for name in registry.list_role(role) {
                    let description = registry
                        .get(name)
                        .map(|c| c.description().to_string())
                        .unwrap_or_default();
                    println!("  {:<24} {}", name, description);
                }
            }
        }
        Commands::Config => {
            let config = load_config(&cli.config)?;
            println!("{}", toml::to_string_pretty(&config)?);
        }
        Commands::Completions { shell } => {
            let mut cmd = Cli::command();
            clap_complete::generate(shell, &mut cmd, "ticketflow", &mut std::io::stdout());
        }
    }

    Ok(())
}

fn load_config(path: &Path) -> anyhow::Result<AppConfig> {
    if !path.exists() {
        info!(path = %path.display(), "No config file, using defaults");
    }
    Ok(AppConfig::load_or_default(path)?)
}

fn read_ticket(path: &Path) -> anyhow::Result<Ticket> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("reading ticket file {}", path.display()))?;
    let ticket: Ticket = serde_json::from_str(&text)
        .with_context(|| format!("parsing ticket file {}", path.display()))?;
    Ok(ticket)
}

async fn run_ticket(config: &AppConfig, ticket: Ticket, json: bool) -> anyhow::Result<()> {
    let definition = support_workflow()?;
    let registry =
        CapabilityRegistry::with_builtins().with_call_timeout(config.capabilities.call_timeout());
    let event_bus = Arc::new(EventBus::default());
    let engine = Engine::from_config(&config.engine).with_event_bus(event_bus.clone());

    let run_id = RunId::new();
    let cancel = CancellationToken::new();
    let logger = config
        .log
        .as_ref()
        .filter(|log| log.enabled)
        .map(|log| RunLogger::from_config(log).spawn(&event_bus, run_id.clone(), cancel.clone()));

    let outcome = engine
        .run_with_id(run_id, &definition, WorkflowState::new(ticket), &registry)
        .await;

    if let Some(handle) = logger {
        match handle.await {
            Ok(Some(path)) => info!(path = %path.display(), "Run log written"),
            Ok(None) => warn!("Run log could not be written"),
            Err(e) => warn!(error = %e, "Run logger task failed"),
        }
    }

    match outcome {
        Ok(result) => {
            if json {
                println!("{}", serde_json::to_string_pretty(&result.state)?);
            } else {
                let status = result
                    .state
                    .final_status()
                    .map(|s| s.to_string())
                    .unwrap_or_else(|| "-".to_string());
                println!("Final status: {}", status);
                println!(
                    "Final response:\n{}",
                    result.state.final_response().unwrap_or("")
                );
                println!("\nLog:");
                for line in result.log() {
                    println!("  {}", line);
                }
            }
            Ok(())
        }
        Err(failure) => {
            eprint!("{}", failure.report());
            if json {
                println!("{}", serde_json::to_string_pretty(&failure.state)?);
            }
            bail!("ticket {} was not processed", failure.state.ticket().ticket_id)
        }
    }
}
