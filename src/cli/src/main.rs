//! Cinegate CLI: operator commands over the Cinegate HTTP API.

mod client;
mod commands;
mod output;

use anyhow::Result;
use clap::{Parser, Subcommand};

use commands::{catalog, config, health, play};
use output::OutputFormat;

const DEFAULT_API_URL: &str = "http://localhost:8080";

#[derive(Parser)]
#[command(
    name = "cinegate",
    version,
    about = "Cinegate - catalog and playback service CLI",
    long_about = "Inspect service health, query and invalidate cached catalog data, and resolve playback sources.",
    propagate_version = true
)]
pub struct Cli {
    /// Output format
    #[arg(short, long, global = true, default_value = "table")]
    output: OutputFormat,

    /// API server URL
    #[arg(long, global = true, env = "CINEGATE_API_URL")]
    api_url: Option<String>,

    /// Disable colored output
    #[arg(long, global = true)]
    no_color: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check service health
    Health(health::HealthArgs),

    /// Fetch (or invalidate) a catalog endpoint
    Catalog(catalog::CatalogArgs),

    /// Resolve a playable stream
    Play(play::PlayArgs),

    /// Check whether a title's player page exists
    Available(play::Target),

    /// CLI configuration
    #[command(subcommand)]
    Config(config::ConfigCommands),
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    if cli.no_color {
        colored::control::set_override(false);
    }

    let api_url = cli
        .api_url
        .clone()
        .or_else(config::load_api_url)
        .unwrap_or_else(|| DEFAULT_API_URL.to_string());

    let client = client::ApiClient::new(&api_url)?;
    let format = cli.output;

    let result = match cli.command {
        Commands::Health(args) => health::execute(args, &client, format).await,
        Commands::Catalog(args) => catalog::execute(args, &client, format).await,
        Commands::Play(args) => play::play(args, &client, format).await,
        Commands::Available(target) => play::available(target, &client, format).await,
        Commands::Config(cmd) => config::execute(cmd, format).await,
    };

    if let Err(e) = result {
        output::print_error(&format!("{:#}", e));
        std::process::exit(1);
    }

    Ok(())
}
