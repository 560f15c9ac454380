//! CLI Command Handlers
//!
//! Implementation of all CLI commands for the trade integrity service.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::adapters::http::{start_server, AppState};
use crate::adapters::market_data::build_candle_provider;
use crate::adapters::store::JsonTradeStore;
use crate::application::{BatchConfig, BatchRunner};
use crate::config::{load_config, Config, LoggingSection};
use crate::domain::{Direction, Instrument, InstrumentType, SignalStatus, TradeSignal};
use crate::evaluation::EvaluatorConfig;
use crate::ports::{StoreError, SystemClock, TradeStore};

const DEFAULT_CONFIG: &str = "config/default.toml";

/// Trade Integrity - verifies trade signals against one-minute candles
#[derive(Parser, Debug)]
#[command(
    name = "trade-integrity",
    version = env!("CARGO_PKG_VERSION"),
    author = env!("CARGO_PKG_AUTHORS"),
    about = "Verifies user-submitted trade signals against one-minute market candles",
    long_about = "Checks every open trade signal against market candles: confirms entries, \
                  resolves take-profit or stop-loss hits and flags claims the market data \
                  cannot substantiate."
)]
pub struct CliApp {
    /// The command to execute
    #[command(subcommand)]
    pub command: Command,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Enable debug logging
    #[arg(long, global = true)]
    pub debug: bool,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Start the admin HTTP server
    Serve(ServeCmd),

    /// Run one verification pass over all open signals
    RunBatch(RunBatchCmd),

    /// Evaluate a single signal
    Evaluate(EvaluateCmd),

    /// Import trade signals from a JSON file
    Import(ImportCmd),

    /// Show signal counts per status
    Status(StatusCmd),
}

impl Command {
    pub fn config_path(&self) -> &Path {
        match self {
            Command::Serve(cmd) => cmd.config.as_path(),
            Command::RunBatch(cmd) => cmd.config.as_path(),
            Command::Evaluate(cmd) => cmd.config.as_path(),
            Command::Import(cmd) => cmd.config.as_path(),
            Command::Status(cmd) => cmd.config.as_path(),
        }
    }
}

/// Start the admin HTTP server
#[derive(Parser, Debug)]
pub struct ServeCmd {
    /// Path to configuration file
    #[arg(short, long, value_name = "FILE", default_value = DEFAULT_CONFIG)]
    pub config: PathBuf,

    /// Override bind address
    #[arg(long, value_name = "ADDR")]
    pub bind: Option<String>,
}

/// Run one batch pass
#[derive(Parser, Debug)]
pub struct RunBatchCmd {
    /// Path to configuration file
    #[arg(short, long, value_name = "FILE", default_value = DEFAULT_CONFIG)]
    pub config: PathBuf,

    /// Print the summary as JSON
    #[arg(long)]
    pub json: bool,
}

/// Evaluate one signal
#[derive(Parser, Debug)]
pub struct EvaluateCmd {
    /// Signal id
    #[arg(value_name = "ID")]
    pub id: String,

    /// Path to configuration file
    #[arg(short, long, value_name = "FILE", default_value = DEFAULT_CONFIG)]
    pub config: PathBuf,
}

/// Import signals
#[derive(Parser, Debug)]
pub struct ImportCmd {
    /// JSON array of signals
    #[arg(value_name = "FILE")]
    pub file: PathBuf,

    /// Path to configuration file
    #[arg(short, long, value_name = "FILE", default_value = DEFAULT_CONFIG)]
    pub config: PathBuf,
}

/// Show store status
#[derive(Parser, Debug)]
pub struct StatusCmd {
    /// Path to configuration file
    #[arg(short, long, value_name = "FILE", default_value = DEFAULT_CONFIG)]
    pub config: PathBuf,

    /// List open signals as well
    #[arg(short, long)]
    pub detailed: bool,

    /// Output format (text, json)
    #[arg(short, long, value_name = "FORMAT", default_value = "text")]
    pub format: String,
}

/// One signal as accepted by `import`
#[derive(Debug, Clone, Deserialize)]
pub struct ImportRecord {
    pub id: String,
    #[serde(default)]
    pub user_id: Option<String>,
    pub instrument: String,
    pub instrument_type: InstrumentType,
    pub direction: Direction,
    pub entry_price: Decimal,
    pub stop_loss: Decimal,
    pub take_profit: Decimal,
    pub declared_entry_at: DateTime<Utc>,
}

impl From<ImportRecord> for TradeSignal {
    fn from(record: ImportRecord) -> Self {
        let signal = TradeSignal::new(
            record.id,
            Instrument::new(record.instrument, record.instrument_type),
            record.direction,
            record.entry_price,
            record.stop_loss,
            record.take_profit,
            record.declared_entry_at,
        );
        match record.user_id {
            Some(user) => signal.with_user(user),
            None => signal,
        }
    }
}

#[derive(Debug, Default, PartialEq, Eq)]
pub struct ImportReport {
    pub imported: usize,
    pub duplicates: usize,
    pub rejected: usize,
}

/// Execute the CLI command
pub async fn execute(app: CliApp) -> Result<()> {
    let config_path = app.command.config_path().to_path_buf();
    let config = load_config(&config_path)
        .with_context(|| format!("Failed to load configuration from {}", config_path.display()))?;

    init_logging(app.verbose, app.debug, &config.logging)?;

    match app.command {
        Command::Serve(cmd) => serve_command(cmd, config).await,
        Command::RunBatch(cmd) => run_batch_command(cmd, config).await,
        Command::Evaluate(cmd) => evaluate_command(cmd, config).await,
        Command::Import(cmd) => import_command(cmd, config).await,
        Command::Status(cmd) => status_command(cmd, config).await,
    }
}

/// Initialize logging system
///
/// `--debug` and `--verbose` win over the configured level; `RUST_LOG` wins
/// over everything.
fn init_logging(verbose: bool, debug: bool, logging: &LoggingSection) -> Result<()> {
    use tracing_subscriber::{fmt, EnvFilter};

    let level = if debug {
        "debug"
    } else if verbose {
        "info"
    } else {
        logging.level.as_str()
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let result = if logging.json {
        fmt().with_env_filter(filter).json().try_init()
    } else {
        fmt().with_env_filter(filter).with_target(false).try_init()
    };
    result.map_err(|e| anyhow::anyhow!("Failed to initialise logging: {}", e))
}

async fn open_store(config: &Config) -> Result<Arc<JsonTradeStore>> {
    let path = config.store.get_path();
    let store = JsonTradeStore::open(&path)
        .await
        .with_context(|| format!("Failed to open trade store at {}", path.display()))?;
    Ok(Arc::new(store))
}

async fn build_runner(config: &Config) -> Result<Arc<BatchRunner>> {
    let provider =
        build_candle_provider(&config.provider).context("Failed to build candle provider")?;
    let store = open_store(config).await?;

    Ok(Arc::new(BatchRunner::new(
        provider,
        store,
        Arc::new(SystemClock),
        EvaluatorConfig::from(config),
        BatchConfig::from(config),
    )))
}

/// Handle serve command
async fn serve_command(cmd: ServeCmd, config: Config) -> Result<()> {
    let runner = build_runner(&config).await?;
    let bind = cmd.bind.unwrap_or_else(|| config.server.bind.clone());
    let state = AppState::new(runner, config.server.get_admin_token());

    tracing::info!("Starting trade integrity server on {}", bind);
    start_server(&bind, state)
        .await
        .with_context(|| format!("HTTP server on {} failed", bind))?;
    tracing::info!("Server stopped");
    Ok(())
}

/// Handle run-batch command
async fn run_batch_command(cmd: RunBatchCmd, config: Config) -> Result<()> {
    let runner = build_runner(&config).await?;
    let summary = runner
        .evaluate_all_pending_trades()
        .await
        .context("Batch pass failed")?;

    if cmd.json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        println!("Batch pass {} -> {}", summary.started_at, summary.finished_at);
        println!("  Evaluated: {}", summary.evaluated);
        println!("  Entered:   {}", summary.entered);
        println!("  Resolved:  {}", summary.resolved);
        println!("  Flagged:   {}", summary.flagged);
        println!("  No change: {}", summary.noop);
        println!("  Errors:    {}", summary.errors);
    }
    Ok(())
}

/// Handle evaluate command
async fn evaluate_command(cmd: EvaluateCmd, config: Config) -> Result<()> {
    let runner = build_runner(&config).await?;
    let outcome = runner
        .evaluate_signal(&cmd.id)
        .await
        .with_context(|| format!("Failed to evaluate signal {}", cmd.id))?;

    println!("Signal {}: {}", outcome.id, outcome.result);
    println!("  Status: {} -> {}", outcome.previous_status, outcome.status);
    Ok(())
}

/// Handle import command
async fn import_command(cmd: ImportCmd, config: Config) -> Result<()> {
    let content = tokio::fs::read_to_string(&cmd.file)
        .await
        .with_context(|| format!("Failed to read {}", cmd.file.display()))?;
    let records: Vec<ImportRecord> = serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse signals in {}", cmd.file.display()))?;

    let store = open_store(&config).await?;
    let report = import_signals(store.as_ref(), records).await?;

    println!(
        "Imported {} signals ({} duplicates skipped, {} rejected)",
        report.imported, report.duplicates, report.rejected
    );
    Ok(())
}

/// Insert imported records as pending signals, skipping ids already stored
pub async fn import_signals(
    store: &dyn TradeStore,
    records: Vec<ImportRecord>,
) -> Result<ImportReport> {
    let mut report = ImportReport::default();

    for record in records {
        let id = record.id.clone();
        match store.insert(TradeSignal::from(record)).await {
            Ok(()) => report.imported += 1,
            Err(StoreError::Duplicate(_)) => {
                tracing::warn!("Signal {} already stored, skipping", id);
                report.duplicates += 1;
            }
            Err(StoreError::Invalid(reason)) => {
                tracing::warn!("Signal {} rejected: {}", id, reason);
                report.rejected += 1;
            }
            Err(e) => return Err(e).with_context(|| format!("Failed to store signal {}", id)),
        }
    }

    Ok(report)
}

/// Handle status command
async fn status_command(cmd: StatusCmd, config: Config) -> Result<()> {
    let store = open_store(&config).await?;
    let signals = store.list_all().await.context("Failed to read trade store")?;
    let counts = count_by_status(&signals);

    match cmd.format.as_str() {
        "json" => {
            let value = serde_json::json!({
                "store": config.store.get_path(),
                "total": signals.len(),
                "by_status": counts,
            });
            println!("{}", serde_json::to_string_pretty(&value)?);
        }
        _ => {
            println!("Trade store: {}", config.store.get_path().display());
            println!("  Total: {}", signals.len());
            for (status, count) in &counts {
                println!("  {:<12} {}", status, count);
            }
        }
    }

    if cmd.detailed {
        println!();
        for signal in signals.iter().filter(|s| s.is_open()) {
            println!(
                "  {} {} {} entry={} sl={} tp={} declared={} [{}]",
                signal.id,
                signal.direction,
                signal.instrument.symbol,
                signal.entry_price,
                signal.stop_loss,
                signal.take_profit,
                signal.declared_entry_at,
                signal.status
            );
        }
    }

    Ok(())
}

fn count_by_status(signals: &[TradeSignal]) -> BTreeMap<&'static str, usize> {
    let mut counts: BTreeMap<&'static str, usize> = [
        SignalStatus::Pending,
        SignalStatus::Entered,
        SignalStatus::ResolvedTp,
        SignalStatus::ResolvedSl,
        SignalStatus::Unverified,
    ]
    .iter()
    .map(|s| (s.as_str(), 0))
    .collect();

    for signal in signals {
        *counts.entry(signal.status.as_str()).or_default() += 1;
    }
    counts
}
