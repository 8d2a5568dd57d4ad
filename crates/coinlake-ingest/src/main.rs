//! Coinlake - crypto market data ingestion tool

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use coinlake_common::logging::{init_logging, LogConfig, LogLevel};
use coinlake_common::types::{dataset_prefix, parse_partition_date, Dataset};
use coinlake_ingest::catalog::Catalog;
use coinlake_ingest::config::Config;
use coinlake_ingest::fetcher::Fetcher;
use coinlake_ingest::pipeline::{CollectReceipt, DumpSummary, Pipeline};
use coinlake_ingest::storage::{BlobStore, MemoryBlobStore, S3BlobStore};
use std::sync::Arc;
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(name = "coinlake")]
#[command(author, version, about = "Crypto market data ingestion into a Parquet data lake")]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Collect global stats, market pages and every catalog coin
    Dump {
        /// Number of market pages
        #[arg(long)]
        pages: Option<u32>,

        /// Records per market page (max 250)
        #[arg(long)]
        per_page: Option<u32>,

        /// Quote currency
        #[arg(long)]
        vs_currency: Option<String>,

        /// Keep archives in memory instead of uploading
        #[arg(long)]
        dry_run: bool,
    },

    /// Collect one market listing page
    Markets {
        #[arg(long)]
        vs_currency: Option<String>,

        #[arg(long)]
        per_page: Option<u32>,

        #[arg(long, default_value_t = 1)]
        page: u32,
    },

    /// Collect details of one coin by name, ticker or id
    Coin { name: String },

    /// Collect global market stats
    Global,

    /// Print the canonical id for a coin name
    Resolve { name: String },

    /// List archived objects of a dataset
    List {
        /// markets, coin_details or global
        #[arg(long)]
        dataset: Dataset,

        /// Partition day (YYYY-MM-DD)
        #[arg(long, value_parser = parse_partition_date)]
        date: Option<chrono::NaiveDate>,
    },

    /// List buckets of the object store
    Buckets,

    /// Check that the API answers
    Ping,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_level = if cli.verbose {
        LogLevel::Debug
    } else {
        LogLevel::Info
    };

    let log_config = LogConfig::builder()
        .level(log_level)
        .log_file_prefix("coinlake")
        .build();

    // Environment variables take precedence
    let log_config = log_config.merge_env().context("Invalid LOG_* environment")?;

    init_logging(&log_config)?;

    if let Err(e) = run(cli.command).await {
        error!(error = %e, "Command failed");
        return Err(e);
    }

    Ok(())
}

fn load_config() -> Result<Config> {
    Config::load().context("Failed to load configuration")
}

async fn run(command: Command) -> Result<()> {
    match command {
        Command::Resolve { name } => {
            let catalog = Catalog::builtin()?;
            match catalog.resolve(&name) {
                Some(entry) => println!("{} -> {} ({})", name, entry.id, entry.label()),
                None => bail!("No catalog entry matches '{}'", name),
            }
        },

        Command::Dump {
            pages,
            per_page,
            vs_currency,
            dry_run,
        } => {
            let mut config = load_config()?;
            if let Some(pages) = pages {
                config.dump.pages = pages;
            }
            if let Some(per_page) = per_page {
                config.dump.per_page = per_page;
            }
            if let Some(vs_currency) = vs_currency {
                config.dump.vs_currency = vs_currency;
            }
            config.validate()?;

            let store: Arc<dyn BlobStore> = if dry_run {
                info!("Dry run: archives stay in memory");
                Arc::new(MemoryBlobStore::with_buckets([config.lake.raw_bucket.clone()]))
            } else {
                Arc::new(S3BlobStore::new(&config.storage).await)
            };

            let pipeline = Pipeline::new(&config, store)?;
            let summary = pipeline.run_dump(&config.dump).await;
            print_summary(&summary);
        },

        Command::Markets {
            vs_currency,
            per_page,
            page,
        } => {
            let config = load_config()?;
            let vs_currency = vs_currency.unwrap_or_else(|| config.dump.vs_currency.clone());
            let per_page = per_page.unwrap_or(config.dump.per_page);

            let pipeline = s3_pipeline(&config).await?;
            let receipt = pipeline.collect_markets(&vs_currency, per_page, page).await?;
            print_receipt(&receipt);
        },

        Command::Coin { name } => {
            let config = load_config()?;
            let pipeline = s3_pipeline(&config).await?;
            let receipt = pipeline.collect_coin_details(&name).await?;
            print_receipt(&receipt);
        },

        Command::Global => {
            let config = load_config()?;
            let pipeline = s3_pipeline(&config).await?;
            let receipt = pipeline.collect_global().await?;
            print_receipt(&receipt);
        },

        Command::List { dataset, date } => {
            let config = load_config()?;
            let store = S3BlobStore::new(&config.storage).await;
            let prefix = dataset_prefix(&config.lake.root_prefix, dataset, date);
            let objects = store.list_objects(&config.lake.raw_bucket, &prefix).await?;

            for object in &objects {
                println!("{:>12}  {}", object.size, object.key);
            }
            println!("{} object(s) under {}/{}", objects.len(), config.lake.raw_bucket, prefix);
        },

        Command::Buckets => {
            let config = load_config()?;
            let store = S3BlobStore::new(&config.storage).await;
            for bucket in store.list_buckets().await? {
                println!("{}", bucket);
            }
        },

        Command::Ping => {
            let config = load_config()?;
            let body = Fetcher::new(&config.api)?.ping().await?;
            println!("{}", body);
        },
    }

    Ok(())
}

async fn s3_pipeline(config: &Config) -> Result<Pipeline> {
    let store = Arc::new(S3BlobStore::new(&config.storage).await);
    Ok(Pipeline::new(config, store)?)
}

fn print_receipt(receipt: &CollectReceipt) {
    println!("Archived {}/{}", receipt.archive.bucket, receipt.archive.path);
    println!(
        "  {} rows, {} columns, {:.2} MB",
        receipt.archive.row_count, receipt.archive.column_count, receipt.archive.size_mb
    );
}

fn print_summary(summary: &DumpSummary) {
    let mark = |ok: bool| if ok { "ok" } else { "failed" };

    println!("{}", "=".repeat(50));
    println!("Dump finished");
    println!("Global data:  {}", mark(summary.global_ok));
    println!("Markets:      {}/{} pages", summary.markets_ok, summary.markets_pages);
    println!("Coin details: {}/{} coins", summary.details_ok, summary.details_total);
    println!("Files written: {}", summary.expected_files());
    println!("{}", "=".repeat(50));
}
