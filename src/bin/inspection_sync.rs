use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use inspection_sync_lib::{AppConfig, AppState};
use tracing::info;

#[derive(Parser)]
#[command(name = "inspection-sync")]
#[command(about = "Inspect and drain the offline inspection report queue", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// SQLite database holding the offline queue
    #[arg(long, env = "INSPECTION_DATABASE_URL")]
    database_url: Option<String>,

    /// Base URL of the remote data API
    #[arg(long, env = "INSPECTION_REMOTE_URL")]
    remote_url: Option<String>,

    /// Pretty-print JSON output
    #[arg(long)]
    pretty: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Show pending counts and sync state
    Status,
    /// List queued mutations
    List,
    /// Run one sync pass now
    Sync,
    /// Release a held mutation so the next pass replays it
    Retry {
        /// Queued entity id
        id: String,
    },
    /// Drop a queued mutation and its attachments
    Discard {
        /// Queued entity id
        id: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    // ログ設定の初期化
    inspection_sync_lib::init_logging();

    let mut config = AppConfig::from_env();
    if let Some(url) = cli.database_url.as_deref() {
        config.database.url = url.trim().to_string();
    }
    if let Some(url) = cli.remote_url.as_deref() {
        config.remote.base_url = url.trim().trim_end_matches('/').to_string();
    }
    // One-shot runs never wait on the probe; the pass reports unreachable items itself.
    config.connectivity.assume_online = true;
    config.sync.auto_sync = false;

    info!("Starting inspection-sync v{}", env!("CARGO_PKG_VERSION"));
    let state = AppState::initialize(config)
        .await
        .context("failed to initialize offline state")?;
    let handler = &state.offline_handler;

    let result = match cli.command {
        Commands::Status => {
            let status = handler.status().await?;
            render(&status, cli.pretty)
        }
        Commands::List => {
            let pending = handler.list_pending_mutations().await?;
            render(&pending, cli.pretty)
        }
        Commands::Sync => {
            let outcome = handler.trigger_sync().await?;
            render(&outcome, cli.pretty)
        }
        Commands::Retry { id } => {
            handler.retry_held(id.clone()).await?;
            info!("Released {}", id);
            Ok(())
        }
        Commands::Discard { id } => {
            if handler.discard(id.clone()).await? {
                info!("Discarded {}", id);
            } else {
                info!("Nothing queued for {}", id);
            }
            Ok(())
        }
    };

    state.shutdown().await;
    result
}

fn render<T: serde::Serialize>(value: &T, pretty: bool) -> Result<()> {
    let output = if pretty {
        serde_json::to_string_pretty(value)?
    } else {
        serde_json::to_string(value)?
    };
    println!("{output}");
    Ok(())
}
