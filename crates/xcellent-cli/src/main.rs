mod snapshots;

use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;
use xcellent_core::AppConfig;
use xcellent_db::SnapshotStore;
use xcellent_engine::{EngineConfig, Period, SnapshotService};
use xcellent_source::{MetricsSource, XApiClient};

use crate::snapshots::SnapshotCommands;

#[derive(Debug, Parser)]
#[command(name = "xcellent-cli")]
#[command(about = "Xcellent account analytics command line interface")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Snapshot store operations
    Db {
        #[command(subcommand)]
        command: DbCommands,
    },
    /// Poll, backfill and inspect account snapshots
    Snapshots {
        /// Print JSON instead of a table
        #[arg(long, global = true)]
        json: bool,
        #[command(subcommand)]
        command: SnapshotCommands,
    },
}

#[derive(Debug, Subcommand)]
enum DbCommands {
    /// Check that the configured snapshot store is reachable
    Ping,
}

fn parse_period(raw: &str) -> Result<Period, String> {
    raw.parse::<Period>().map_err(|e| e.to_string())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let Some(command) = cli.command else {
        println!("xcellent-cli: run with --help to list commands");
        return Ok(());
    };

    let config = xcellent_core::load_app_config()?;
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(config.log_level.clone()))?;
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    let service = build_service(&config).await?;

    match command {
        Commands::Db {
            command: DbCommands::Ping,
        } => {
            service.store().ping().await?;
            println!("snapshot store ok");
        }
        Commands::Snapshots { json, command } => {
            snapshots::dispatch(&service, command, json).await?;
        }
    }

    Ok(())
}

async fn build_service(config: &AppConfig) -> anyhow::Result<SnapshotService> {
    let documents = xcellent_db::open_document_store(config).await?;
    let source = XApiClient::from_app_config(config)?
        .map(|client| Arc::new(client) as Arc<dyn MetricsSource>);
    if source.is_none() {
        tracing::warn!("X_BEARER_TOKEN, X_USER_ID or X_USERNAME not set; poll and backfill disabled");
    }
    Ok(SnapshotService::new(
        SnapshotStore::new(documents),
        source,
        EngineConfig::from_app_config(config),
    ))
}
