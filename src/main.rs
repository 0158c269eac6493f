use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod aggregate;
mod bucket;
mod config;
mod distance;
mod error;
mod etl;
mod models;
mod normalize;
mod report;
mod retry;
mod store;

use config::{BucketOrdering, Config, DEFAULT_SINK_TABLE, DEFAULT_SOURCE_TABLE};
use etl::Etl;
use retry::{RetryPolicy, TokioSleeper};
use store::{MySqlSink, PgSource};

#[derive(Parser)]
#[command(name = "devices-analytics")]
#[command(about = "Hourly device statistics ETL: Postgres telemetry to MySQL summaries", long_about = None)]
struct Cli {
    /// Logging verbosity (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Source table holding raw device rows
    #[arg(long, default_value = DEFAULT_SOURCE_TABLE)]
    source_table: String,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Aggregate the source table into hourly statistics (default)
    Run {
        #[arg(long, default_value = DEFAULT_SINK_TABLE)]
        sink_table: String,
        /// Seconds to wait for the data generator before the first read
        #[arg(long, default_value_t = 20)]
        startup_delay_secs: u64,
        /// Milliseconds between connection attempts
        #[arg(long, default_value_t = 100)]
        retry_delay_ms: u64,
        /// Stop retrying a connection after this many attempts
        #[arg(long)]
        max_attempts: Option<usize>,
        /// Point order used for distance within an hour
        #[arg(long, value_enum, default_value_t = BucketOrdering::Arrival)]
        ordering: BucketOrdering,
        /// Rows shown when logging the stored results
        #[arg(long, default_value_t = 5)]
        verify_limit: usize,
        /// Write a markdown report of the stored results
        #[arg(long)]
        report: Option<PathBuf>,
    },
    /// Insert realistic device rows into the source table
    Seed,
    /// Import raw device rows from a CSV file
    Import {
        #[arg(long)]
        csv: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = EnvFilter::try_new(&cli.log_level)
        .with_context(|| format!("invalid log level: {}", cli.log_level))?;
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let source_url = std::env::var("POSTGRESQL_CS")
        .context("POSTGRESQL_CS must be set to the source Postgres connection string")?;

    let command = cli.command.unwrap_or(Commands::Run {
        sink_table: DEFAULT_SINK_TABLE.to_string(),
        startup_delay_secs: 20,
        retry_delay_ms: 100,
        max_attempts: None,
        ordering: BucketOrdering::Arrival,
        verify_limit: 5,
        report: None,
    });

    match command {
        Commands::Run {
            sink_table,
            startup_delay_secs,
            retry_delay_ms,
            max_attempts,
            ordering,
            verify_limit,
            report,
        } => {
            let sink_url = std::env::var("MYSQL_CS")
                .context("MYSQL_CS must be set to the destination MySQL connection string")?;

            let mut config = Config::new(source_url, sink_url);
            config.source_table = cli.source_table;
            config.sink_table = sink_table;
            config.startup_delay = Duration::from_secs(startup_delay_secs);
            config.retry = RetryPolicy {
                initial_delay: Duration::from_millis(retry_delay_ms),
                max_delay: Duration::from_millis(retry_delay_ms),
                max_attempts,
            };
            config.ordering = ordering;
            config.verify_limit = verify_limit;
            config.report_path = report;
            config.validate()?;

            let etl = Etl::new(config.clone(), TokioSleeper);
            etl.wait_for_upstream().await;

            let report = etl
                .run(
                    || PgSource::connect(&config.source_url, &config.source_table),
                    || MySqlSink::connect(&config.sink_url, &config.sink_table),
                )
                .await
                .context("ETL process failed")?;

            println!(
                "Run {}: aggregated {} records into {} device-hours ({} rows), stored {} rows into {}.",
                report.run_id,
                report.records_read,
                report.buckets,
                report.summaries.len(),
                report.rows_written,
                config.sink_table
            );
            if report.stored.is_none() {
                println!("Read-back of {} failed; see log for details.", config.sink_table);
            }
        }
        Commands::Seed => {
            let pool = store::connect_source_pool(&source_url).await?;
            let inserted = store::seed(&pool, &cli.source_table).await?;
            pool.close().await;
            println!("Inserted {inserted} device rows into {}.", cli.source_table);
        }
        Commands::Import { csv } => {
            let pool = store::connect_source_pool(&source_url).await?;
            let inserted = store::import_csv(&pool, &cli.source_table, &csv).await?;
            pool.close().await;
            println!("Inserted {inserted} device rows from {}.", csv.display());
        }
    }

    Ok(())
}
