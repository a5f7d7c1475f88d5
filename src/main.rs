mod config;
mod models;
mod pipeline;
mod source;
mod storage;
mod utils;
mod validator;

use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use std::time::Duration;
use tracing::{error, info};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

use crate::config::AppConfig;
use crate::pipeline::{Pipeline, PipelineReport};
use crate::source::{CoinGeckoSource, MarketDataSource, SyntheticSource};
use crate::storage::Repository;

#[derive(Parser)]
#[command(name = "coingecko-etl", about = "CoinGecko market data ETL", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum SourceKind {
    /// CoinGecko /coins/markets endpoint
    Live,
    /// Locally generated fake batch
    Synthetic,
}

#[derive(Subcommand)]
enum Command {
    /// Run the pipeline once: fetch, validate, store
    Run {
        #[arg(short, long, value_enum, default_value = "live")]
        source: SourceKind,
    },

    /// Keep running the pipeline on a fixed cadence
    Watch {
        #[arg(short, long, value_enum, default_value = "live")]
        source: SourceKind,

        /// Seconds between runs (overrides config; default 900)
        #[arg(long)]
        interval_secs: Option<u64>,
    },

    /// Show database statistics
    Stats,

    /// Apply schema migrations without loading data
    Migrate,
}

fn build_source(kind: SourceKind, config: &AppConfig) -> Result<Box<dyn MarketDataSource>> {
    Ok(match kind {
        SourceKind::Live => Box::new(CoinGeckoSource::new(&config.source)?),
        SourceKind::Synthetic => {
            let count = config.source.synthetic_count;
            match config.source.synthetic_seed {
                Some(seed) => Box::new(SyntheticSource::with_seed(count, seed)),
                None => Box::new(SyntheticSource::new(count)),
            }
        }
    })
}

fn print_report(report: &PipelineReport) {
    println!("─────────────────────────────────");
    println!("  Pipeline run — {} source", report.source);
    println!("─────────────────────────────────");
    println!("  Total    : {}", report.total);
    println!("  Valid    : {}", report.valid);
    println!("  Invalid  : {}", report.invalid);
    println!("  Success  : {:.1}%", report.success_rate * 100.0);
    println!("  Appended : {}", report.rows_appended);
    println!("  In table : {}", utils::fmt_number(report.table_rows));
    match &report.db_path {
        Some(path) => println!("  Database : {}", path.display()),
        None => println!("  Database : (no write performed)"),
    }
    println!("─────────────────────────────────");
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = match cli.verbose {
        0 => "coingecko_etl=info,warn",
        1 => "coingecko_etl=debug,info",
        _ => "trace",
    };

    tracing_subscriber::registry()
        .with(fmt::layer().compact().with_target(false))
        .with(EnvFilter::new(filter))
        .init();

    let config = AppConfig::load()?;

    match cli.command {
        Command::Run { source } => {
            let _t = utils::Timer::start("Pipeline run");
            let src = build_source(source, &config)?;
            let report = Pipeline::new(config).run(src.as_ref()).await?;
            print_report(&report);
        }

        Command::Watch {
            source,
            interval_secs,
        } => {
            let secs = interval_secs.unwrap_or(config.pipeline.interval_secs);
            let src = build_source(source, &config)?;
            let pipeline = Pipeline::new(config);

            info!("Watching: one run every {}s (ctrl-c to stop)", secs);
            let mut ticker = tokio::time::interval(Duration::from_secs(secs));
            loop {
                ticker.tick().await;
                match pipeline.run(src.as_ref()).await {
                    Ok(report) => info!(
                        "Run complete: {}/{} valid, {} rows appended, {} in table",
                        report.valid, report.total, report.rows_appended, report.table_rows
                    ),
                    Err(e) => error!("Run failed: {:#}", anyhow::Error::from(e)),
                }
            }
        }

        Command::Stats => {
            let repo = Repository::open(&config.storage.db_path)?;
            repo.run_migrations()?;
            let rows = repo.row_count()?;
            let coins = repo.coin_count()?;
            let runs = repo.run_count()?;
            let (first, last) = repo.fetched_at_range().unwrap_or((None, None));
            println!("─────────────────────────────────");
            println!("  CoinGecko ETL — Database Stats");
            println!("─────────────────────────────────");
            println!("  Rows     : {}", utils::fmt_number(rows));
            println!("  Coins    : {}", utils::fmt_number(coins));
            println!("  Runs     : {}", utils::fmt_number(runs));
            println!("  First    : {}", first.unwrap_or_else(|| "—".into()));
            println!("  Last     : {}", last.unwrap_or_else(|| "—".into()));
            println!("─────────────────────────────────");
        }

        Command::Migrate => {
            Repository::open(&config.storage.db_path)?.run_migrations()?;
            println!("Migrations applied.");
        }
    }

    Ok(())
}
