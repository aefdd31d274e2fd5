use std::path::PathBuf;

use axum::extract::FromRef;
use clap::{Parser, Subcommand};
use tracing::warn;
use tracing_subscriber::EnvFilter;

mod commands;
mod config;
mod controllers;
mod db;
mod error;
mod ids;
mod mapping;
mod models;
mod store;
mod sweeper;

use config::Config;
use db::Database;
pub(crate) use error::AppResult;
use ids::AnyIdGenerator;

/// Paste storage service.
#[derive(Parser)]
#[command(version, about)]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(short, long, default_value = "config.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Serve the HTTP API, sweeping expired pastes if enabled.
    Serve,
    /// Delete expired pastes once and exit.
    PurgeExpired,
}

#[derive(Clone, FromRef)]
pub struct App {
    config: Config,
    database: Database,
    ids: AnyIdGenerator,
}

impl App {
    async fn new(config: Config) -> anyhow::Result<Self> {
        let database = Database::connect(&config.database, &config.limits).await?;
        let ids = AnyIdGenerator::for_scheme(config.ids.scheme);
        Ok(App {
            config,
            database,
            ids,
        })
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    let config = if cli.config.exists() {
        Config::load(&cli.config).await?
    } else {
        warn!(
            "config file {} not found, using defaults",
            cli.config.display()
        );
        Config::default()
    };

    let app = App::new(config).await?;

    match cli.command {
        Command::Serve => commands::serve::run(app).await,
        Command::PurgeExpired => commands::purge_expired::run(app).await,
    }
}
