//! Application layer: the reconciliation pipeline.
//!
//! normalizer → matcher → differ → reconciler, driven across subjects by the
//! orchestrator's worker pool.

pub mod deadline;
pub mod differ;
pub mod matcher;
pub mod normalizer;
pub mod options;
pub mod orchestrator;
pub mod reconciler;
pub mod text;

pub use differ::diff;
pub use matcher::Matcher;
pub use normalizer::{Normalizer, NormalizerSettings};
pub use options::SyncOptions;
pub use orchestrator::SyncOrchestrator;
pub use reconciler::{ReconcileState, Reconciler, Reconciliation};
