//! Configuration infrastructure
//!
//! Settings are layered with the `config` crate:
//! 1. Built-in defaults (see [`defaults`])
//! 2. Optional TOML file (`--config`, else the user config directory)
//! 3. `LISTING_SYNC_*` environment variables (`__` separates sections)
//! 4. The legacy `ODOO_*` connection variables

#![allow(clippy::uninlined_format_args)]

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};
use url::Url;

use crate::application::normalizer::NormalizerSettings;
use crate::domain::listing::Money;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to load config: {source}")]
    FileLoad {
        #[from]
        source: config::ConfigError,
    },

    #[error("Configuration validation failed: {message}")]
    Validation { message: String },
}

impl ConfigError {
    fn invalid(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }
}

/// Complete application configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Marketplace search API
    pub marketplace: MarketplaceConfig,
    /// System of record connection
    pub store: StoreConfig,
    /// Worker pool and per-call limits
    pub sync: SyncConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MarketplaceConfig {
    pub api_base: String,
    /// Display currency requested from the API (ISO 4217)
    pub currency: String,
    /// Destination region shipping rates are resolved for
    pub shipping_region: String,
    /// Shipping assumed when a subject's category has none
    pub default_shipping: f64,
    /// Results per search page (API maximum is 50)
    pub per_page: u32,
    /// Upper bound on search pages per subject; `None` fetches all
    pub max_pages: Option<u32>,
    pub requests_per_second: u32,
    pub request_timeout_secs: u64,
    pub user_agent: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Base URL of the store, e.g. `https://erp.example.com`
    pub url: String,
    pub database: String,
    pub login: String,
    pub password: String,
    pub request_timeout_secs: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Subjects processed concurrently
    pub concurrency: usize,
    /// Deadline of a single boundary call
    pub call_timeout_secs: u64,
}

/// Logging configuration settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,
    /// JSON lines in the log file
    pub json_format: bool,
    /// Human readable output on stderr
    pub console_output: bool,
    /// Daily rolling log file
    pub file_output: bool,
    /// Log file directory; the user data directory when unset
    pub directory: Option<PathBuf>,
}

impl Default for MarketplaceConfig {
    fn default() -> Self {
        Self {
            api_base: defaults::MARKETPLACE_API_BASE.to_string(),
            currency: defaults::CURRENCY.to_string(),
            shipping_region: defaults::SHIPPING_REGION.to_string(),
            default_shipping: defaults::DEFAULT_SHIPPING,
            per_page: defaults::PER_PAGE,
            max_pages: None,
            requests_per_second: defaults::REQUESTS_PER_SECOND,
            request_timeout_secs: defaults::MARKETPLACE_TIMEOUT_SECS,
            user_agent: defaults::USER_AGENT.to_string(),
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            database: String::new(),
            login: String::new(),
            password: String::new(),
            request_timeout_secs: defaults::STORE_TIMEOUT_SECS,
        }
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            concurrency: defaults::CONCURRENCY,
            call_timeout_secs: defaults::CALL_TIMEOUT_SECS,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: defaults::LOG_LEVEL.to_string(),
            json_format: defaults::LOG_JSON_FORMAT,
            console_output: defaults::LOG_CONSOLE_OUTPUT,
            file_output: defaults::LOG_FILE_OUTPUT,
            directory: None,
        }
    }
}

impl AppConfig {
    /// Loads file + environment layers and validates the result.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let path = path.map(Path::to_path_buf).or_else(ConfigManager::default_path);
        let mut config = Self::build(path.as_deref(), None)?;
        config.apply_store_overrides(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// Builds the layered configuration.
    ///
    /// `environment` replaces the process environment when given.
    pub fn build(
        path: Option<&Path>,
        environment: Option<config::Map<String, String>>,
    ) -> Result<Self, ConfigError> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            debug!("Reading configuration file {:?}", path);
            builder = builder.add_source(
                config::File::from(path.to_path_buf())
                    .format(config::FileFormat::Toml)
                    .required(path.exists()),
            );
        }
        let settings = builder
            .add_source(
                config::Environment::with_prefix(defaults::ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true)
                    .source(environment),
            )
            .build()?;
        Ok(settings.try_deserialize()?)
    }

    /// Applies `ODOO_HOSTNAME`, `ODOO_DATABASE`, `ODOO_LOGIN` and
    /// `ODOO_PASSWORD` when set and non-empty.
    pub fn apply_store_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let value = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        if let Some(host) = value("ODOO_HOSTNAME") {
            self.store.url = if host.contains("://") {
                host
            } else {
                format!("https://{}", host)
            };
        }
        if let Some(database) = value("ODOO_DATABASE") {
            self.store.database = database;
        }
        if let Some(login) = value("ODOO_LOGIN") {
            self.store.login = login;
        }
        if let Some(password) = value("ODOO_PASSWORD") {
            self.store.password = password;
        }
    }

    /// Rejects settings that would fail later at runtime.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (name, value) in [
            ("store.url", &self.store.url),
            ("store.database", &self.store.database),
            ("store.login", &self.store.login),
            ("store.password", &self.store.password),
        ] {
            if value.trim().is_empty() {
                return Err(ConfigError::invalid(format!("{} must be set", name)));
            }
        }
        for (name, value) in [
            ("store.url", &self.store.url),
            ("marketplace.api_base", &self.marketplace.api_base),
        ] {
            Url::parse(value)
                .map_err(|e| ConfigError::invalid(format!("{} is not a valid URL: {}", name, e)))?;
        }

        if self.sync.concurrency == 0 {
            return Err(ConfigError::invalid("sync.concurrency must be greater than 0"));
        }
        for (name, secs) in [
            ("sync.call_timeout_secs", self.sync.call_timeout_secs),
            ("store.request_timeout_secs", self.store.request_timeout_secs),
            ("marketplace.request_timeout_secs", self.marketplace.request_timeout_secs),
        ] {
            if secs == 0 {
                return Err(ConfigError::invalid(format!("{} must be greater than 0", name)));
            }
        }
        if self.marketplace.requests_per_second == 0 {
            return Err(ConfigError::invalid(
                "marketplace.requests_per_second must be greater than 0",
            ));
        }
        if self.marketplace.per_page == 0 || self.marketplace.per_page > defaults::MAX_PER_PAGE {
            return Err(ConfigError::invalid(format!(
                "marketplace.per_page must be between 1 and {}",
                defaults::MAX_PER_PAGE
            )));
        }
        let currency = &self.marketplace.currency;
        if currency.len() != 3 || !currency.chars().all(|c| c.is_ascii_alphabetic()) {
            return Err(ConfigError::invalid(format!(
                "marketplace.currency '{}' is not a three-letter code",
                currency
            )));
        }
        let shipping = self.marketplace.default_shipping;
        if !shipping.is_finite() || shipping < 0.0 {
            return Err(ConfigError::invalid(
                "marketplace.default_shipping must be a non-negative amount",
            ));
        }
        Ok(())
    }

    pub fn normalizer_settings(&self) -> NormalizerSettings {
        NormalizerSettings {
            currency: self.marketplace.currency.to_ascii_uppercase(),
            shipping_region: self.marketplace.shipping_region.to_ascii_uppercase(),
        }
    }

    /// Fallback shipping for subjects without a category default.
    pub fn default_shipping(&self) -> Money {
        Money::from_major(self.marketplace.default_shipping, &self.marketplace.currency)
            .unwrap_or_else(|| Money::new(0, &self.marketplace.currency))
    }

    pub fn call_timeout(&self) -> Duration {
        Duration::from_secs(self.sync.call_timeout_secs)
    }
}

/// Locates configuration and data directories.
pub struct ConfigManager;

impl ConfigManager {
    /// `<user config dir>/listing-sync/listing-sync.toml`
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join(defaults::APP_DIR).join(defaults::CONFIG_FILE))
    }

    /// `<user data dir>/listing-sync/logs`, or `./logs` without a data dir.
    pub fn log_dir() -> PathBuf {
        dirs::data_local_dir()
            .map(|dir| dir.join(defaults::APP_DIR).join("logs"))
            .unwrap_or_else(|| PathBuf::from("logs"))
    }

    /// Logs where configuration is read from.
    pub fn describe(path: Option<&Path>) {
        match path.map(Path::to_path_buf).or_else(Self::default_path) {
            Some(path) if path.exists() => info!("📁 Using configuration file: {:?}", path),
            Some(path) => {
                info!("No configuration file at {:?}, using defaults and environment", path);
            }
            None => info!("No user config directory, using defaults and environment"),
        }
    }
}

/// Default configuration values
pub mod defaults {
    pub const APP_DIR: &str = "listing-sync";
    pub const CONFIG_FILE: &str = "listing-sync.toml";
    pub const ENV_PREFIX: &str = "LISTING_SYNC";

    pub const MARKETPLACE_API_BASE: &str = "https://api.reverb.com/api";
    pub const CURRENCY: &str = "CAD";
    pub const SHIPPING_REGION: &str = "CA";
    /// Shipping assumed when neither the listing nor the category has one
    pub const DEFAULT_SHIPPING: f64 = 250.0;
    pub const PER_PAGE: u32 = 50;
    pub const MAX_PER_PAGE: u32 = 50;
    pub const REQUESTS_PER_SECOND: u32 = 5;
    pub const MARKETPLACE_TIMEOUT_SECS: u64 = 15;
    pub const USER_AGENT: &str = concat!("listing-sync/", env!("CARGO_PKG_VERSION"));

    pub const STORE_TIMEOUT_SECS: u64 = 30;

    pub const CONCURRENCY: usize = 4;
    pub const CALL_TIMEOUT_SECS: u64 = 30;

    pub const LOG_LEVEL: &str = "info";
    pub const LOG_JSON_FORMAT: bool = false;
    pub const LOG_CONSOLE_OUTPUT: bool = true;
    pub const LOG_FILE_OUTPUT: bool = false;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    fn valid() -> AppConfig {
        let mut config = AppConfig::default();
        config.store.url = "https://erp.example.com".into();
        config.store.database = "shop".into();
        config.store.login = "bot@example.com".into();
        config.store.password = "secret".into();
        config
    }

    #[test]
    fn defaults_match_the_documented_values() {
        let config = AppConfig::default();
        assert_eq!(config.sync.concurrency, 4);
        assert_eq!(config.marketplace.per_page, 50);
        assert_eq!(config.default_shipping(), Money::new(25_000, "CAD"));
        assert_eq!(config.call_timeout(), Duration::from_secs(30));
    }

    #[test]
    fn missing_credentials_are_rejected() {
        let err = AppConfig::default().validate().unwrap_err();
        assert!(err.to_string().contains("store.url must be set"));
        assert!(valid().validate().is_ok());
    }

    #[test]
    fn out_of_range_values_are_rejected() {
        let mut config = valid();
        config.marketplace.per_page = 51;
        assert!(config.validate().is_err());

        let mut config = valid();
        config.sync.concurrency = 0;
        assert!(config.validate().is_err());

        let mut config = valid();
        config.marketplace.currency = "C$".into();
        assert!(config.validate().is_err());

        let mut config = valid();
        config.store.url = "not a url".into();
        assert!(config.validate().is_err());
    }

    #[test]
    fn file_then_environment_layers() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            "[store]\nurl = \"https://erp.example.com\"\ndatabase = \"shop\"\n\n\
             [sync]\nconcurrency = 8"
        )
        .unwrap();

        let mut env = HashMap::new();
        env.insert("LISTING_SYNC_SYNC__CONCURRENCY".to_string(), "2".to_string());
        env.insert("LISTING_SYNC_MARKETPLACE__SHIPPING_REGION".to_string(), "US".to_string());

        let config = AppConfig::build(Some(file.path()), Some(env)).unwrap();
        assert_eq!(config.store.database, "shop");
        assert_eq!(config.sync.concurrency, 2);
        assert_eq!(config.marketplace.shipping_region, "US");
        assert_eq!(config.marketplace.currency, "CAD");
    }

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent.toml");
        let config = AppConfig::build(Some(&path), Some(HashMap::new())).unwrap();
        assert_eq!(config, AppConfig::default());
    }

    #[test]
    fn legacy_variables_override_the_store() {
        let mut config = valid();
        let env: HashMap<&str, &str> = [
            ("ODOO_HOSTNAME", "erp.internal"),
            ("ODOO_DATABASE", "prod"),
            ("ODOO_PASSWORD", ""),
        ]
        .into_iter()
        .collect();
        config.apply_store_overrides(|key| env.get(key).map(|v| (*v).to_string()));
        assert_eq!(config.store.url, "https://erp.internal");
        assert_eq!(config.store.database, "prod");
        assert_eq!(config.store.password, "secret");
    }
}
