//! Liquidation Timeline
//!
//! Measures how long Aave V3 positions stayed liquidatable before they were
//! liquidated. Reads liquidation events from the indexer's Postgres schema,
//! replays each borrower's health factor against archive state and writes
//! one analysis row per event.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio::sync::watch;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use timeline_chain::{AaveChainClient, ChainStateClient, ReserveMetadataCache};
use timeline_core::{
    BatchOrchestrator, EngineConfig, LiquidatableBlockFinder, RunnerOptions, TimelineAnalyzer,
};
use timeline_store::{AnalysisQueue, ExportDocument, PgAnalysisQueue, Tables};

const DEFAULT_EXPORT_PATH: &str = "frontend/public/liquidations-data.json";

#[derive(Parser, Debug)]
#[command(name = "liquidation-timeline")]
#[command(about = "Measures how long liquidated Aave V3 positions were liquidatable")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the analysis loop (default)
    Run,
    /// Create the analysis table
    InitSchema {
        /// Drop the analysis table first, re-queueing every event
        #[arg(long)]
        reset: bool,
    },
    /// Write completed analyses to a JSON file for the dashboard
    Export {
        #[arg(long, default_value = DEFAULT_EXPORT_PATH)]
        output: PathBuf,
    },
    /// Print one page of liquidations as JSON
    List {
        #[arg(long, default_value_t = 10)]
        limit: i64,
        #[arg(long, default_value_t = 0)]
        offset: i64,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Load environment variables
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                EnvFilter::new("info,timeline_core=debug,timeline_chain=debug")
            }),
        )
        .init();

    match cli.command.unwrap_or(Command::Run) {
        Command::Run => run().await,
        Command::InitSchema { reset } => init_schema(reset).await,
        Command::Export { output } => export(&output).await,
        Command::List { limit, offset } => list(limit, offset).await,
    }
}

async fn run() -> Result<()> {
    let config = EngineConfig::load().context("invalid configuration")?;
    config.log_config();

    info!("Starting liquidation timeline engine");

    let client = AaveChainClient::connect(
        &config.chain.rpc_url,
        config.chain.chain_id,
        config.chain.rpc_timeout(),
    )
    .await
    .context("failed to connect to RPC endpoint")?;

    let metadata = ReserveMetadataCache::load(&client)
        .await
        .context("failed to load reserve list")?;

    let queue = open_queue(&config, true).await?;

    let chain: Arc<dyn ChainStateClient> = Arc::new(client);
    let finder = LiquidatableBlockFinder::new(
        chain.clone(),
        config.analysis.search_blocks_back,
        config.analysis.probe_delay(),
    );
    let analyzer = TimelineAnalyzer::new(chain, Arc::new(metadata), finder);
    let queue: Arc<dyn AnalysisQueue> = Arc::new(queue);
    let orchestrator = BatchOrchestrator::new(
        queue,
        analyzer,
        RunnerOptions {
            batch_size: config.runner.batch_size,
            max_workers: config.runner.max_workers,
            loop_interval: config.runner.loop_interval(),
        },
    );

    let (stop_tx, stop_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Ctrl-C received, stopping after the current batch");
            let _ = stop_tx.send(true);
        }
    });

    let state = orchestrator
        .run(stop_rx)
        .await
        .context("analysis loop aborted")?;

    info!(
        iterations = state.iteration,
        analyzed = state.total_analyzed,
        failed = state.total_failed,
        "Shutdown complete"
    );
    Ok(())
}

async fn init_schema(reset: bool) -> Result<()> {
    let config = database_config()?;
    let pool = timeline_store::connect(&config.database.url, 1)
        .await
        .context("failed to connect to database")?;
    let tables = Tables::new(&config.database.schema)?;

    timeline_store::ensure_schema(&pool, &tables, reset)
        .await
        .context("failed to create analysis table")?;
    Ok(())
}

async fn export(output: &Path) -> Result<()> {
    let config = database_config()?;
    let queue = open_queue(&config, false).await?;

    let rows = queue
        .completed()
        .await
        .context("failed to read completed analyses")?;
    let document = ExportDocument::new(rows, chrono::Utc::now());

    if let Some(dir) = output.parent().filter(|d| !d.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("failed to create {}", dir.display()))?;
    }
    let json = serde_json::to_string_pretty(&document)?;
    std::fs::write(output, json).with_context(|| format!("failed to write {}", output.display()))?;

    info!(
        rows = document.total_count,
        path = %output.display(),
        "Export written"
    );
    Ok(())
}

async fn list(limit: i64, offset: i64) -> Result<()> {
    let config = database_config()?;
    let queue = open_queue(&config, false).await?;

    let page = queue
        .page(limit, offset)
        .await
        .context("failed to read liquidations")?;
    println!("{}", serde_json::to_string_pretty(&page)?);
    Ok(())
}

/// Configuration for commands that only touch the database.
fn database_config() -> Result<EngineConfig> {
    let config = EngineConfig::from_env().context("invalid configuration")?;
    config
        .validate_database()
        .context("invalid database configuration")?;
    Ok(config)
}

async fn open_queue(config: &EngineConfig, bootstrap: bool) -> Result<PgAnalysisQueue> {
    let pool = timeline_store::connect(&config.database.url, config.pool_size())
        .await
        .context("failed to connect to database")?;
    let tables = Tables::new(&config.database.schema)?;

    if bootstrap {
        timeline_store::ensure_schema(&pool, &tables, false)
            .await
            .context("failed to create analysis table")?;
    }

    Ok(PgAnalysisQueue::new(pool, tables))
}
