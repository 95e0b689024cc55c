//! listing-sync: reconciles marketplace listings against a system of record.
//!
//! Listings found by searching the marketplace for each subject are
//! normalized, matched to stored records by URL, diffed field by field and
//! written back as creates or minimal updates.

pub mod application;
pub mod commands;
pub mod domain;
pub mod infrastructure;

pub use application::{SyncOptions, SyncOrchestrator};
pub use domain::outcome::{RunMode, RunReport};
