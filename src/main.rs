//! oic CLI entry point
//!
//! Collects a product version's container images into a single archive for
//! air-gapped installs.

use clap::Parser;
use oic::cli::{Cli, Commands};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Bundle(args) => oic::cli::bundle::execute(args).await,
        Commands::Resolve(args) => oic::cli::resolve::execute(args).await,
        Commands::Versions(args) => oic::cli::versions::execute(args).await,
        Commands::Login(args) => oic::cli::login::execute(args).await,
        Commands::Check(args) => oic::cli::check::execute(args).await,
    }
}
