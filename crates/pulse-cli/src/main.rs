//! Command-line front end for pulse
//!
//! # Usage
//!
//! ```bash
//! # LLM_API_BASE, LLM_API_KEY and LLM_MODEL_NAME in the environment or .env
//! pulse etf
//! pulse stock --format plain
//! pulse etf --signals-only --format json
//! pulse etf --pool-file my_pool.json
//! ```

use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use pulse_engine::report::TELEGRAM_MESSAGE_LIMIT;
use pulse_engine::{InstrumentKind, OutputFormat, Pool, PulseConfig, ReportAssembler, formatter_for, split_message};
use std::path::PathBuf;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "pulse")]
#[command(about = "Analyse a watch pool of ETFs or stocks", long_about = None)]
struct Args {
    #[command(subcommand)]
    pool: PoolCommand,

    /// Load the pool from a JSON file instead of the built-in list
    #[arg(long, global = true)]
    pool_file: Option<PathBuf>,

    /// Skip the LLM stage and report signals only
    #[arg(long, global = true)]
    signals_only: bool,

    /// Output format
    #[arg(long, value_enum, default_value_t = Format::Markdown, global = true)]
    format: Format,
}

#[derive(Subcommand, Debug, Clone, Copy)]
enum PoolCommand {
    /// Core ETF pool
    Etf,
    /// Core stock pool
    Stock,
}

#[derive(ValueEnum, Debug, Clone, Copy)]
enum Format {
    Markdown,
    Plain,
    Json,
}

impl From<Format> for OutputFormat {
    fn from(format: Format) -> Self {
        match format {
            Format::Markdown => Self::Markdown,
            Format::Plain => Self::Plain,
            Format::Json => Self::Json,
        }
    }
}

fn load_pool(args: &Args) -> anyhow::Result<Pool> {
    if let Some(path) = &args.pool_file {
        return Pool::from_json_file(path)
            .with_context(|| format!("failed to load pool from {}", path.display()));
    }
    Ok(Pool::builtin(match args.pool {
        PoolCommand::Etf => InstrumentKind::Etf,
        PoolCommand::Stock => InstrumentKind::Stock,
    }))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    pulse_utils::init_tracing_with_default("warn,pulse_engine=info,pulse_cli=info");

    let args = Args::parse();
    let config = PulseConfig::from_env().context("invalid configuration")?;
    let pool = load_pool(&args)?;
    let assembler = ReportAssembler::from_config(&config, !args.signals_only)
        .context("failed to set up the pipeline")?;

    info!(pool = %pool.name, instruments = pool.len(), source = ?config.data_source, "starting run");

    let report = if args.signals_only {
        assembler.build_signal_report(&pool).await
    } else {
        assembler.build_report(&pool).await
    };

    let format = OutputFormat::from(args.format);
    let rendered = formatter_for(format, config.language).render(&report)?;

    match format {
        OutputFormat::Markdown => {
            let chunks = split_message(&rendered, TELEGRAM_MESSAGE_LIMIT);
            for (i, chunk) in chunks.iter().enumerate() {
                if i > 0 {
                    println!("\n---");
                }
                println!("{chunk}");
            }
        }
        OutputFormat::Plain | OutputFormat::Json => println!("{rendered}"),
    }

    Ok(())
}
