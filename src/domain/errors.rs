//! Error taxonomy shared by the reconciliation core and its adapters.
//!
//! Transport failures are reported by adapters as [`TransportError`]; the
//! core wraps them into [`SyncError`] according to the phase that failed
//! (lookup, mutation, listing source).

use thiserror::Error;

/// Failure of a remote call (marketplace API or system of record).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("HTTP error {status}: {message}")]
    Http { status: u16, message: String },

    #[error("authentication failed: {0}")]
    Authentication(String),

    #[error("request timed out: {0}")]
    Timeout(String),

    #[error("network error: {0}")]
    Network(String),

    #[error("unexpected response body: {0}")]
    Decode(String),

    #[error("remote call rejected: {0}")]
    Rejected(String),
}

impl TransportError {
    /// HTTP-like status code carried by the failure, when there is one.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Http { status, .. } => Some(*status),
            Self::Authentication(_) => Some(401),
            Self::Timeout(_) => Some(408),
            Self::Network(_) | Self::Decode(_) | Self::Rejected(_) => None,
        }
    }

    pub fn is_authentication(&self) -> bool {
        matches!(self, Self::Authentication(_))
    }

    pub fn http(status: u16, message: impl Into<String>) -> Self {
        Self::Http {
            status,
            message: message.into(),
        }
    }
}

/// Errors raised while reconciling a subject or one of its records.
///
/// None of these escape the orchestrator: per-record errors become
/// `RecordOutcome::Failed`, per-subject errors become `SubjectStatus::Failed`.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SyncError {
    #[error("malformed payload: field '{field}' {reason}")]
    MalformedPayload { field: String, reason: String },

    #[error("lookup failed: {0}")]
    Lookup(TransportError),

    #[error("{count} stored records match '{external_id}'")]
    AmbiguousMatch { external_id: String, count: usize },

    #[error("mutation failed: {0}")]
    Mutation(TransportError),

    #[error("listing source failed: {0}")]
    Source(TransportError),

    #[error("no subject found matching '{0}'")]
    SubjectNotFound(String),

    #[error("ambiguous subject name '{name}', matches: {}", candidates.join(", "))]
    AmbiguousSubject {
        name: String,
        candidates: Vec<String>,
    },
}

impl SyncError {
    pub fn malformed(field: &str, reason: impl Into<String>) -> Self {
        Self::MalformedPayload {
            field: field.to_string(),
            reason: reason.into(),
        }
    }

    /// Transport failure behind this error, if any.
    pub fn transport(&self) -> Option<&TransportError> {
        match self {
            Self::Lookup(e) | Self::Mutation(e) | Self::Source(e) => Some(e),
            _ => None,
        }
    }
}
