use std::{path::PathBuf, process::ExitCode, sync::Arc};

use clap::{Parser, Subcommand};
use sqlx::postgres::PgPoolOptions;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};
use tracklog::{
    BatchImporter, CancellationFlag, FileOutcome, ImportSource, Ingestor, MemoryStore,
    TrackStore, config::Config, database::Database, object_store_service::ObjectStoreService,
    parse_and_summarize,
};

#[derive(Parser)]
#[command(name = "tracklog", about = "Import GPX track logs and summarize them")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Import GPX files for an owner
    Import {
        /// Owner the tracks are stored under
        #[arg(long)]
        owner: String,
        /// Number of parallel parse workers
        #[arg(long)]
        workers: Option<usize>,
        /// Parse and summarize only; keep nothing
        #[arg(long)]
        dry_run: bool,
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },
    /// Print the statistics of one GPX file as JSON
    Summarize { file: PathBuf },
}

fn init_logging() {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    init_logging();
    let cli = Cli::parse();
    let config = Config::from_env()?;

    match cli.command {
        Commands::Import {
            owner,
            workers,
            dry_run,
            files,
        } => import(config, owner, workers, dry_run, files).await,
        Commands::Summarize { file } => {
            let content = std::fs::read(&file)?;
            let summary = parse_and_summarize(&content, &config.statistics)?;
            println!("{}", serde_json::to_string_pretty(&summary.statistics)?);
            Ok(ExitCode::SUCCESS)
        }
    }
}

async fn import(
    config: Config,
    owner: String,
    workers: Option<usize>,
    dry_run: bool,
    files: Vec<PathBuf>,
) -> anyhow::Result<ExitCode> {
    let store: Arc<dyn TrackStore> = match (&config.database_url, dry_run) {
        (Some(url), false) => {
            tracing::info!("Connecting to database");
            let pool = PgPoolOptions::new().max_connections(5).connect(url).await?;
            let db = Database::new(pool);
            db.migrate().await?;
            Arc::new(db)
        }
        _ => {
            if !dry_run {
                tracing::warn!("DATABASE_URL is not set, imported tracks will not be kept");
            }
            Arc::new(MemoryStore::new())
        }
    };

    let mut ingestor = Ingestor::new(store, config.statistics);
    if !dry_run {
        ingestor =
            ingestor.with_object_store(ObjectStoreService::new_local(&config.object_store_path)?);
    }

    let cancel = CancellationFlag::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupted, finishing files already in progress");
            on_interrupt.cancel();
        }
    });

    let importer = BatchImporter::new(ingestor, workers.unwrap_or(config.import_workers));
    let sources = files.into_iter().map(ImportSource::File).collect();
    let report = importer.run(&owner, sources, &cancel).await;

    for entry in &report.entries {
        match &entry.outcome {
            FileOutcome::Imported {
                track_id,
                distance_meters,
                notes,
                ..
            } => {
                print!("ok        {}  {track_id}  {:.2} km", entry.source, distance_meters / 1000.0);
                if notes.ordering_anomalies > 0 {
                    print!("  ({} out-of-order points)", notes.ordering_anomalies);
                }
                println!();
            }
            FileOutcome::Failed { kind, message } => {
                println!("failed    {}  {kind:?}: {message}", entry.source)
            }
            FileOutcome::Cancelled => println!("cancelled {}", entry.source),
        }
    }

    Ok(if report.has_failures() || report.cancelled_count() > 0 {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    })
}
