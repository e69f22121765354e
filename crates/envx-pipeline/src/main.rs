//! Environmental measurement pipeline runner
//!
//! Runs one job (or all of them) over an optional `[start, end)` date range:
//! - process / air-process: clean raw data and report counts
//! - aggregate / air-aggregate: hourly and daily buckets, appended to storage
//! - air-all / all: the stages above in order
//! - ingest: load a JSON file of raw records into the raw table

use anyhow::{Context, Result};
use chrono::NaiveDate;
use clap::Parser;
use std::path::PathBuf;
use std::time::Instant;
use tracing::info;

use envx_config::{AppConfig, DatabaseTarget};
use envx_core::{Dataset, Sink, Source, TimeRange};
use envx_db::{DbClient, DbConnectionBuilder};
use envx_pipeline::{Job, JsonFileSource, Orchestrator};
use envx_sinks::FsSink;

#[derive(Parser)]
#[command(name = "envx-pipeline")]
#[command(about = "Weather & air quality cleaning and aggregation pipeline", long_about = None)]
struct Cli {
    /// Which job to run
    #[arg(value_enum, default_value_t = Job::All)]
    job: Job,

    /// First day to include (YYYY-MM-DD)
    #[arg(long)]
    start_date: Option<NaiveDate>,

    /// First day to exclude (YYYY-MM-DD)
    #[arg(long)]
    end_date: Option<NaiveDate>,

    /// JSON array of raw records (ingest only)
    #[arg(short, long, required_if_eq("job", "ingest"))]
    input: Option<PathBuf>,

    /// Dataset of the ingested file
    #[arg(long, default_value = "air-quality")]
    dataset: Dataset,

    /// Write JSON lines here instead of the database
    #[arg(short = 'o', long)]
    output_dir: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = AppConfig::load().context("Failed to load configuration")?;
    envx_obs::init("envx-pipeline", config.json_logs());

    let range = TimeRange::from_dates(cli.start_date, cli.end_date);
    info!("Environmental data pipeline - job={:?}", cli.job);
    if range.is_unbounded() {
        info!("No date range given, processing all rows");
    } else {
        info!("Date range: {}", range);
    }

    let started = Instant::now();

    let output_dir = cli.output_dir.clone().or_else(|| config.output_dir().map(PathBuf::from));
    let needs_db = !cli.job.reads_files() || output_dir.is_none();
    let db = if needs_db {
        Some(connect(&config).await?)
    } else {
        None
    };

    // Kept to close the pool once the orchestrator is done with it
    let pool_handle = db.clone();

    let source: Box<dyn Source> = match (&cli.input, &db) {
        (Some(path), _) if cli.job.reads_files() => Box::new(JsonFileSource::new(path)),
        (_, Some(db)) => Box::new(db.clone()),
        _ => anyhow::bail!("No input available for job {:?}", cli.job),
    };
    let sink: Box<dyn Sink> = match (&output_dir, db) {
        (Some(dir), _) => {
            info!("Writing JSON lines to {:?}", dir);
            Box::new(FsSink::new(dir)?)
        }
        (None, Some(db)) => Box::new(db),
        (None, None) => anyhow::bail!("No output configured"),
    };

    let mut orchestrator = Orchestrator::new(source, sink);
    for dataset in Dataset::ALL {
        orchestrator = orchestrator.with_range_table(config.range_table(dataset)?);
    }

    let result = orchestrator.run(cli.job, cli.dataset, &range).await;
    drop(orchestrator);
    if let Some(db) = pool_handle {
        db.close().await;
    }
    let reports = result?;
    for report in &reports {
        info!(
            "{}: read={} cleaned={} nulled={} duplicates={} filled={} hourly={} daily={} written={}",
            report.stage,
            report.read,
            report.clean.output,
            report.clean.nulled,
            report.clean.duplicates,
            report.clean.filled,
            report.hourly_buckets,
            report.daily_buckets,
            report.written
        );
    }

    info!("Pipeline finished in {:.1}s", started.elapsed().as_secs_f64());
    Ok(())
}

async fn connect(config: &AppConfig) -> Result<DbClient> {
    let target = config.database_target()?;
    info!("Connecting to database {}", target);

    let max_connections = config.max_connections();
    let client = match target {
        DatabaseTarget::Url(url) => DbClient::new(&url, max_connections).await,
        DatabaseTarget::Params {
            host,
            port,
            name,
            user,
            password,
        } => {
            let mut builder = DbConnectionBuilder::new(name).host(host).port(port).username(user);
            if let Some(password) = password {
                builder = builder.password(password);
            }
            DbClient::with_options(builder.build(), max_connections).await
        }
    }
    .context("Failed to connect to database")?;

    client.ping().await.context("Database ping failed")?;
    info!("Database connection verified");

    Ok(client.with_batch_size(config.batch_size())?)
}
