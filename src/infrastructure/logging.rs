//! Logging system configuration and initialization
//!
//! - Human readable console output on stderr (stdout carries the report)
//! - Optional daily rolling log file, plain or JSON lines
//! - `RUST_LOG` overrides the configured level

#![allow(clippy::uninlined_format_args)]

use std::path::PathBuf;

use anyhow::{Context, Result, anyhow};
use once_cell::sync::OnceCell;
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::{non_blocking, rolling};
use tracing_subscriber::{
    EnvFilter, Layer, Registry, fmt, layer::SubscriberExt, util::SubscriberInitExt,
};

pub use crate::infrastructure::config::LoggingConfig;
use crate::infrastructure::config::ConfigManager;

const LOG_FILE_PREFIX: &str = "listing-sync.log";

// Keeps the non-blocking file writer alive for the process lifetime
static LOG_GUARD: OnceCell<WorkerGuard> = OnceCell::new();

/// Directory log files are written to.
pub fn log_directory(config: &LoggingConfig) -> PathBuf {
    config.directory.clone().unwrap_or_else(ConfigManager::log_dir)
}

/// Filter for the configured level with noisy HTTP internals held back.
///
/// `RUST_LOG` wins when set, e.g. `RUST_LOG="debug,reqwest=debug"`.
pub fn build_filter(config: &LoggingConfig) -> Result<EnvFilter> {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return Ok(filter);
    }
    let mut filter = EnvFilter::try_new(&config.level)
        .with_context(|| format!("invalid log level '{}'", config.level))?;
    if !config.level.to_lowercase().contains("trace") {
        filter = filter
            .add_directive("reqwest=info".parse()?)
            .add_directive("hyper=warn".parse()?)
            .add_directive("hyper_util=warn".parse()?)
            .add_directive("h2=warn".parse()?)
            .add_directive("html5ever=warn".parse()?)
            .add_directive("selectors=warn".parse()?);
    }
    Ok(filter)
}

/// Initialize logging with custom configuration
pub fn init_logging_with_config(config: &LoggingConfig) -> Result<()> {
    if !config.console_output && !config.file_output {
        return Err(anyhow!("No logging output configured"));
    }

    let filter = build_filter(config)?;
    let mut layers: Vec<Box<dyn Layer<Registry> + Send + Sync>> = Vec::new();

    if config.console_output {
        layers.push(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false)
                .boxed(),
        );
    }

    let log_dir = log_directory(config);
    if config.file_output {
        std::fs::create_dir_all(&log_dir)
            .with_context(|| format!("Failed to create log directory {:?}", log_dir))?;
        let (writer, guard) = non_blocking(rolling::daily(&log_dir, LOG_FILE_PREFIX));
        // a second initialization keeps the first guard; its writer stays valid
        let _ = LOG_GUARD.set(guard);

        let layer = if config.json_format {
            fmt::layer()
                .json()
                .with_writer(writer)
                .with_target(true)
                .with_thread_ids(true)
                .with_current_span(true)
                .with_ansi(false)
                .boxed()
        } else {
            fmt::layer()
                .with_writer(writer)
                .with_target(false)
                .with_ansi(false)
                .boxed()
        };
        layers.push(layer);
    }

    tracing_subscriber::registry()
        .with(layers)
        .with(filter)
        .try_init()
        .map_err(|e| anyhow!("Failed to install logger: {}", e))?;

    info!("Logging system initialized");
    info!("Log level: {}", config.level);
    if config.file_output {
        info!("Log directory: {:?} (json: {})", log_dir, config.json_format);
    }
    Ok(())
}

/// Log system information for diagnostics
pub fn log_system_info() {
    info!("=== listing-sync {} ===", env!("CARGO_PKG_VERSION"));
    info!("Operating system: {} ({})", std::env::consts::OS, std::env::consts::ARCH);
    if let Ok(current_dir) = std::env::current_dir() {
        info!("Working directory: {:?}", current_dir);
    }
}
