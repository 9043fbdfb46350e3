//! eventslog - maintenance commands for the project event log.

use std::sync::Arc;

use async_trait::async_trait;
use clap::{Parser, Subcommand};
use tracing::{error, info};

use eventslog::config::Config;
use eventslog::services::RetentionSweeper;
use eventslog::storage::{init_storage, StorageClients};
use eventslog::{AccessError, FailoverEventStore, Principal, ProjectAccess, Visibility};

#[derive(Parser)]
#[command(
    name = "eventslog",
    about = "Maintenance commands for the project event log",
    version
)]
struct Cli {
    /// Configuration file (YAML)
    #[arg(long, global = true)]
    config: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Report whether the primary store is reachable and local events are waiting
    Status,

    /// Delete primary events older than the retention age now
    Sweep,

    /// Delete every event of a project
    Purge {
        /// Project name
        project: String,
    },

    /// Copy locally stored events into the primary store
    Restore,
}

/// Maintenance never serves queries.
struct NoQueries;

#[async_trait]
impl ProjectAccess for NoQueries {
    async fn check(
        &self,
        _project: &str,
        _principal: &Principal,
    ) -> Result<Visibility, AccessError> {
        Ok(Visibility::Denied)
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    eventslog::utils::bootstrap::init_tracing();

    let cli = Cli::parse();
    let config = Config::load(cli.config.as_deref()).map_err(|e| {
        error!("Failed to load configuration: {}", e);
        e
    })?;

    let clients = init_storage(&config).await?;

    match cli.command {
        Commands::Status => status(&clients).await?,
        Commands::Sweep => {
            let sweeper = RetentionSweeper::new(clients.primary.clone());
            let deleted = sweeper.run_once(config.retention.max_age_days).await?;
            println!(
                "Deleted {} events older than {} days",
                deleted, config.retention.max_age_days
            );
        }
        Commands::Purge { project } => {
            let deleted = clients.primary.delete_project(&project).await?;
            println!("Deleted {} events of project {}", deleted, project);
        }
        Commands::Restore => {
            let sweeper = Arc::new(RetentionSweeper::new(clients.primary.clone()));
            let store = FailoverEventStore::new(
                clients.primary.clone(),
                clients.fallback.clone(),
                Arc::new(NoQueries),
                sweeper,
                config.failover_settings(),
            );
            store.start().await;
            store.restore_now().await;
            let mode = store.mode();
            store.stop().await;

            info!(%mode, "Restore finished");
            if store.is_online() {
                println!("Primary store reachable; local events restored");
            } else {
                println!("Primary store unreachable; local events kept");
            }
        }
    }

    clients.primary.close().await;
    clients.fallback.close().await;
    Ok(())
}

async fn status(
    clients: &StorageClients,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    match clients.primary.probe().await {
        Ok(()) => println!("primary: reachable"),
        Err(e) => println!("primary: unreachable ({})", e),
    }

    let waiting = if clients.fallback.exists().await? {
        clients.fallback.query_all().await?.len()
    } else {
        0
    };
    println!("local events waiting: {}", waiting);
    Ok(())
}
