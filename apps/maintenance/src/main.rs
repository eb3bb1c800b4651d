//! Maintenance CLI for the document store.
//!
//! Duplicate slugs are tolerated on reads and only reported there. Cleanup
//! happens here, out of band.

use clap::Parser;
use tracing_subscriber::EnvFilter;

use anyhow::Context;
use quill_core::domain::AllowList;
use quill_infra::DatabaseConfig;

mod cli;
mod commands;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = cli::Cli::parse();

    let defaults = DatabaseConfig::default();
    let config = DatabaseConfig {
        url: cli
            .database_url
            .clone()
            .or_else(|| std::env::var("DATABASE_URL").ok())
            .unwrap_or(defaults.url),
        max_connections: 2,
        min_connections: 1,
    };

    let allow_list = AllowList::parse(&std::env::var("AUTHORIZED_USERS").unwrap_or_default())
        .context("invalid AUTHORIZED_USERS")?;

    let targets = commands::Targets::connect(&config, allow_list).await?;
    commands::run_command(cli, &targets, &mut std::io::stdout().lock()).await
}
