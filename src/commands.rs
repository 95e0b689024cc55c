//! Entry points used by the CLI.
//!
//! Each command wires configuration to the HTTP adapters, runs the
//! orchestrator and hands back the [`RunReport`]. Startup failures
//! (configuration, unknown subject) are returned as `anyhow` errors before
//! any subject is processed.

use std::sync::Arc;

use anyhow::{Context, Result};
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::application::normalizer::Normalizer;
use crate::application::options::SyncOptions;
use crate::application::orchestrator::SyncOrchestrator;
use crate::domain::outcome::RunReport;
use crate::infrastructure::config::AppConfig;
use crate::infrastructure::odoo_client::OdooSystemOfRecord;
use crate::infrastructure::reverb_client::ReverbListingSource;

/// Orchestrator backed by the marketplace API and the configured store.
pub fn build_orchestrator(config: &AppConfig) -> Result<SyncOrchestrator> {
    let source = ReverbListingSource::new(&config.marketplace)
        .context("Failed to set up the marketplace client")?;
    let store = OdooSystemOfRecord::new(
        &config.store,
        &config.marketplace.currency,
        config.default_shipping(),
    )
    .context("Failed to set up the system of record client")?;
    info!("🚀 Marketplace {} → store {}", config.marketplace.api_base, config.store.url);

    Ok(SyncOrchestrator::new(
        Arc::new(source),
        Arc::new(store),
        Normalizer::new(config.normalizer_settings()),
        config.call_timeout(),
    ))
}

/// Run options seeded from configuration.
pub fn default_options(config: &AppConfig) -> SyncOptions {
    SyncOptions {
        concurrency: config.sync.concurrency,
        ..SyncOptions::default()
    }
}

pub async fn sync_subject(
    config: &AppConfig,
    name: &str,
    options: &SyncOptions,
    cancel: &CancellationToken,
) -> Result<RunReport> {
    let orchestrator = build_orchestrator(config)?;
    orchestrator
        .sync_subject(name, options, cancel)
        .await
        .with_context(|| format!("Cannot sync '{name}'"))
}

pub async fn sync_all(
    config: &AppConfig,
    options: &SyncOptions,
    cancel: &CancellationToken,
) -> Result<RunReport> {
    let orchestrator = build_orchestrator(config)?;
    orchestrator
        .sync_all(options, cancel)
        .await
        .context("Cannot list subjects")
}

pub async fn validate_subject(
    config: &AppConfig,
    name: &str,
    options: &SyncOptions,
    cancel: &CancellationToken,
) -> Result<RunReport> {
    let orchestrator = build_orchestrator(config)?;
    orchestrator
        .validate_subject(name, options, cancel)
        .await
        .with_context(|| format!("Cannot validate '{name}'"))
}

pub async fn validate_all(
    config: &AppConfig,
    options: &SyncOptions,
    cancel: &CancellationToken,
) -> Result<RunReport> {
    let orchestrator = build_orchestrator(config)?;
    orchestrator
        .validate_all(options, cancel)
        .await
        .context("Cannot list subjects")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn options_follow_configured_concurrency() {
        let mut config = AppConfig::default();
        config.sync.concurrency = 9;
        let options = default_options(&config);
        assert_eq!(options.concurrency, 9);
        assert!(!options.dry_run);
    }

    #[test]
    fn orchestrator_builds_without_contacting_remotes() {
        let mut config = AppConfig::default();
        config.store.url = "https://erp.example.com".into();
        assert!(build_orchestrator(&config).is_ok());
    }
}
