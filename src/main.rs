//! vmchain command line
//!
//!   vmchain --config vmchain.yaml ask "list VMs on node n1"
//!   vmchain --config vmchain.yaml ask --node node5 "stop VM 101 on n5"
//!   vmchain --config vmchain.yaml nodes
//!   vmchain --config vmchain.yaml serve
//!
//! Node tokens are read from the environment variables named in the config.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing::info;

use vmchain::config::{AppConfig, CONFIG_ENV};
use vmchain::{app, server};

#[derive(Parser)]
#[command(name = "vmchain")]
#[command(about = "Ask questions of hypervisor management APIs")]
#[command(version)]
struct Cli {
    /// YAML configuration file
    #[arg(long, short, env = CONFIG_ENV, default_value = "vmchain.yaml")]
    config: PathBuf,

    /// Export spans to this OTLP collector (e.g. http://localhost:4317)
    #[arg(long, env = "OTEL_EXPORTER_OTLP_ENDPOINT")]
    otlp_endpoint: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Answer one question and print the result as JSON
    Ask {
        /// Skip the supervisor and ask this node directly
        #[arg(long, short)]
        node: Option<String>,

        question: String,
    },
    /// List configured nodes
    Nodes,
    /// Run the HTTP front-end
    Serve {
        /// Override the configured port
        #[arg(long, short)]
        port: Option<u16>,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let cli = Cli::parse();
    vmchain::tracing::init_tracing("vmchain", cli.otlp_endpoint.as_deref())?;

    let result = run(cli).await;
    vmchain::tracing::shutdown_tracing();
    result
}

async fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let mut config = AppConfig::load(&cli.config)?;

    match cli.command {
        Command::Nodes => {
            for node in &config.nodes {
                let methods: Vec<&str> = node.allowed_methods.iter().map(|m| m.as_str()).collect();
                println!("{}\t{}\t{}", node.name, node.base_url, methods.join(","));
            }
        }
        Command::Ask { node: Some(name), question } => {
            let team = app::build_team_from_env(&config)?;
            let chain = team
                .worker(&name)
                .ok_or_else(|| format!("no node named {name}"))?;
            let output = chain.invoke(&question).await?;
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
        Command::Ask { node: None, question } => {
            let team = app::build_team_from_env(&config)?;
            let outcome = team.route_and_answer(&question).await?;
            println!("{}", serde_json::to_string_pretty(&outcome)?);
        }
        Command::Serve { port } => {
            if let Some(port) = port {
                config.server.port = port;
            }
            let team = app::build_team_from_env(&config)?;
            info!(host = %config.server.host, port = config.server.port, "Starting server");
            server::serve(team, &config.server).await?;
        }
    }

    Ok(())
}
