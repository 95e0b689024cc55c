//! Infrastructure layer: configuration, logging and the adapters behind the
//! `ListingSource` and `SystemOfRecord` boundaries.

pub mod config;
pub mod http_client;
pub mod logging;
pub mod memory_store;
pub mod odoo_client;
pub mod reverb_client;

pub use config::{AppConfig, ConfigError, ConfigManager};
pub use http_client::{HttpClient, HttpClientConfig};
pub use logging::{init_logging_with_config, log_system_info};
pub use memory_store::{InMemorySystemOfRecord, StaticListingSource, StoreCalls, StoreOperation};
pub use odoo_client::OdooSystemOfRecord;
pub use reverb_client::ReverbListingSource;
