use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use sqlx::postgres::PgPoolOptions;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use forum_import::{ProgressTicker, StagingDestination};
use forum_import_common::{load_config, AppConfig};
use forum_import_engine::{ImportOptions, Pipeline, PipelineError};
use forum_import_ledger::PgImportStore;

#[derive(Parser)]
#[command(name = "forum-import", about = "Resumable import of a legacy forum export")]
struct Cli {
    /// Path to config TOML file
    #[arg(long, default_value = "./config/forum-import.toml")]
    config: PathBuf,

    /// Export directory, overriding `export.root_path`
    #[arg(long)]
    export_root: Option<PathBuf>,

    /// Also run the irreversible finalization stage
    #[arg(long)]
    finalize: bool,

    /// Log as JSON instead of text
    #[arg(long)]
    json_logs: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.json_logs);

    if let Err(e) = run(cli).await {
        if let Some(PipelineError::StageFailed { stage, failures }) = e.downcast_ref::<PipelineError>() {
            eprintln!("Stage {stage} failed for {} item(s):", failures.len());
            for failure in failures {
                eprintln!("  {failure}");
            }
        }
        eprintln!("Error: {:#}", e);
        return ExitCode::from(1);
    }
    ExitCode::SUCCESS
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("forum_import=info"));
    let subscriber = tracing_subscriber::fmt().with_env_filter(filter);
    if json {
        subscriber.json().init();
    } else {
        subscriber.init();
    }
}

async fn run(cli: Cli) -> Result<()> {
    let app = AppConfig::from_env()?;
    let mut config = load_config(&cli.config)?;
    if let Some(root) = cli.export_root {
        config.export.root_path = root;
    }

    info!(
        site = %config.site.name,
        export = %config.export.root_path.display(),
        finalize = cli.finalize,
        "Starting import"
    );

    let pool = PgPoolOptions::new()
        .max_connections(config.database.max_connections)
        .connect(&app.database_url)
        .await
        .context("Failed to connect to Postgres")?;

    sqlx::migrate!("../../migrations")
        .run(&pool)
        .await
        .context("Failed to run migrations")?;

    let shutdown = CancellationToken::new();
    let on_signal = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, finishing in-flight items");
            on_signal.cancel();
        }
    });

    let store = Arc::new(PgImportStore::new(pool.clone()));
    let destination = Arc::new(StagingDestination::new(pool));
    let pipeline = Pipeline::from_config(&config, store, destination).with_shutdown(shutdown);

    let ticker = (!cli.json_logs).then(|| ProgressTicker::spawn(pipeline.progress()));
    let result = pipeline
        .import(ImportOptions {
            finalize: cli.finalize,
        })
        .await;
    if let Some(ticker) = ticker {
        ticker.finish();
    }

    let summary = result?;
    for stage in &summary.stages {
        info!(
            stage = %stage.stage,
            indexed = stage.indexed,
            imported = stage.dispatched,
            skipped = stage.skipped(),
            "Stage summary"
        );
    }
    info!(
        origin_id = summary.origin_id,
        destination_id = summary.destination_id,
        resumed = summary.resumed,
        state = ?summary.state,
        "Import complete"
    );

    Ok(())
}
