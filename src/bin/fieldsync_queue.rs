use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use fieldsync::application::services::{DrainTrigger, OperationQueue, StatusPublisher};
use fieldsync::infrastructure::database::Database;
use fieldsync::infrastructure::store::SqliteLocalStore;
use fieldsync::shared::logging::init_logging;
use fieldsync::{AppConfig, LocalStore, NetworkState, OperationId};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::info;

#[derive(Parser)]
#[command(name = "fieldsync-queue")]
#[command(about = "Inspect and repair the fieldsync pending-operation log", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// SQLite database URL (defaults to the platform data directory)
    #[arg(short, long, env = "FIELDSYNC_DATABASE_URL")]
    database_url: Option<String>,

    /// Retry count at which an operation counts as failed
    #[arg(long, env = "FIELDSYNC_MAX_RETRIES")]
    max_retries: Option<u32>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "warn", env = "LOG_LEVEL")]
    log_level: String,

    /// Enable JSON logging
    #[arg(long, env = "JSON_LOGS")]
    json_logs: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// List unsynced operations, oldest first
    Pending,
    /// List operations flagged as failed
    Failed,
    /// Delete every failed operation
    ClearFailed,
    /// Delete one operation by id
    Delete {
        id: i64,
    },
    /// Print the current sync status
    Status,
}

#[derive(Serialize)]
struct Removed {
    removed: u64,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging(&cli.log_level, cli.json_logs)?;

    let mut config = AppConfig::from_env();
    if let Some(url) = cli.database_url {
        config.database.url = url;
    }
    if let Some(max_retries) = cli.max_retries {
        config.sync.max_retries = max_retries;
    }
    config
        .validate()
        .map_err(anyhow::Error::msg)
        .context("invalid configuration")?;

    let pool = Database::initialize(&config.database)
        .await
        .with_context(|| format!("failed to open {}", config.database.url))?;
    info!(target: "fieldsync::store", url = %config.database.url, "queue database opened");

    let store: Arc<dyn LocalStore> = Arc::new(SqliteLocalStore::new(pool.clone()));
    let status = Arc::new(StatusPublisher::new(
        Arc::clone(&store),
        config.sync.max_retries,
    ));
    // Never online: maintenance here must not trigger remote applies.
    let (_network, network_rx) = watch::channel(NetworkState::default());
    let (trigger, _requests) = DrainTrigger::channel(1);
    let queue = OperationQueue::new(Arc::clone(&store), Arc::clone(&status), network_rx, trigger);

    match cli.command {
        Commands::Pending => print_json(&queue.pending_operations().await?)?,
        Commands::Failed => print_json(&queue.failed_operations().await?)?,
        Commands::ClearFailed => {
            let removed = queue.clear_failed_operations().await?;
            print_json(&Removed { removed })?;
        }
        Commands::Delete { id } => {
            let id = OperationId::new(id).map_err(anyhow::Error::msg)?;
            let removed = u64::from(queue.delete_operation(id).await?);
            if removed == 0 {
                anyhow::bail!("operation {id} not found");
            }
            print_json(&Removed { removed })?;
        }
        Commands::Status => print_json(&status.refresh().await?)?,
    }

    pool.close().await;
    Ok(())
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let rendered = serde_json::to_string_pretty(value).context("failed to render output")?;
    println!("{rendered}");
    Ok(())
}
