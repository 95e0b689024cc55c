//! listing-sync command line.

#![allow(clippy::uninlined_format_args)]

use std::num::NonZeroUsize;
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result, bail};
use clap::{Args, Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use listing_sync_lib::commands;
use listing_sync_lib::infrastructure::config::{AppConfig, ConfigManager};
use listing_sync_lib::infrastructure::logging::{init_logging_with_config, log_system_info};
use listing_sync_lib::{RunReport, SyncOptions};

#[derive(Parser)]
#[command(name = "listing-sync", version)]
#[command(about = "Reconcile marketplace listings against the system of record")]
struct Cli {
    /// Path to the TOML configuration file
    #[arg(short, long, global = true, env = "LISTING_SYNC_CONFIG")]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Search the marketplace for a model and create or update its records
    Sync(SyncArgs),
    /// Re-fetch the stored listings of a model and update them
    Validate(ValidateArgs),
}

#[derive(Args)]
struct Target {
    /// Model name as stored in the system of record
    model: Option<String>,

    /// Process every model
    #[arg(long, conflicts_with = "model")]
    all: bool,

    /// Show what would change without writing
    #[arg(long)]
    dry_run: bool,

    /// Models processed concurrently
    #[arg(short, long)]
    workers: Option<NonZeroUsize>,
}

#[derive(Args)]
struct SyncArgs {
    #[command(flatten)]
    target: Target,

    /// Search text instead of the model name
    #[arg(short, long)]
    search: Option<String>,

    /// Marketplace category slug instead of the model's own
    #[arg(long, conflicts_with = "no_category")]
    category: Option<String>,

    /// Search across all categories
    #[arg(long)]
    no_category: bool,
}

#[derive(Args)]
struct ValidateArgs {
    #[command(flatten)]
    target: Target,
}

impl Target {
    fn options(&self, config: &AppConfig) -> SyncOptions {
        let mut options = commands::default_options(config);
        options.dry_run = self.dry_run;
        if let Some(workers) = self.workers {
            options.concurrency = workers.get();
        }
        options
    }

    fn model(&self) -> Result<Option<&str>> {
        match (&self.model, self.all) {
            (Some(model), false) => Ok(Some(model.as_str())),
            (None, true) => Ok(None),
            _ => bail!("Name a model or pass --all"),
        }
    }
}

fn load_config(cli: &Cli) -> Result<AppConfig> {
    let mut config = AppConfig::load(cli.config.as_deref()).context("Invalid configuration")?;
    if let Some(level) = &cli.log_level {
        config.logging.level = level.clone();
    }
    Ok(config)
}

/// Cancels the run on the first Ctrl-C.
fn cancel_on_interrupt() -> CancellationToken {
    let token = CancellationToken::new();
    let trigger = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, finishing in-flight records");
            trigger.cancel();
        }
    });
    token
}

async fn execute(cli: Cli, config: AppConfig) -> Result<RunReport> {
    let cancel = cancel_on_interrupt();
    match &cli.command {
        Command::Sync(args) => {
            let mut options = args.target.options(&config);
            options.search_override = args.search.clone();
            options.category_override = args.category.clone();
            options.include_all_categories = args.no_category;
            match args.target.model()? {
                Some(model) => commands::sync_subject(&config, model, &options, &cancel).await,
                None => commands::sync_all(&config, &options, &cancel).await,
            }
        }
        Command::Validate(args) => {
            let options = args.target.options(&config);
            match args.target.model()? {
                Some(model) => commands::validate_subject(&config, model, &options, &cancel).await,
                None => commands::validate_all(&config, &options, &cancel).await,
            }
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match load_config(&cli) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            return ExitCode::from(2);
        }
    };
    if let Err(e) = init_logging_with_config(&config.logging) {
        eprintln!("Error: {:#}", e);
        return ExitCode::from(2);
    }
    log_system_info();
    ConfigManager::describe(cli.config.as_deref());

    match execute(cli, config).await {
        Ok(report) => {
            println!("{}", report);
            info!("🏁 Run {} finished", report.run_id);
            ExitCode::from(u8::try_from(report.exit_code()).unwrap_or(1))
        }
        Err(e) => {
            error!("{:#}", e);
            eprintln!("Error: {:#}", e);
            ExitCode::from(2)
        }
    }
}
