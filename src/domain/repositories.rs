//! Boundary interfaces consumed by the reconciliation core.
//!
//! Implementations live in the infrastructure layer (HTTP adapters and the
//! in-memory adapters used by tests).

use async_trait::async_trait;
use futures::stream::BoxStream;

use crate::domain::change_set::ChangeSet;
use crate::domain::errors::TransportError;
use crate::domain::fields::Field;
use crate::domain::listing::RawPayload;
use crate::domain::subject::{Subject, SubjectKey};
use crate::domain::system_record::{LookupCriteria, RecordId, SystemRecord};

/// Marketplace search API.
#[async_trait]
pub trait ListingSource: Send + Sync {
    /// Lazily paginated search results; the stream ends after the last page.
    fn search<'a>(
        &'a self,
        query: &'a str,
        category: Option<&'a str>,
    ) -> BoxStream<'a, Result<RawPayload, TransportError>>;

    async fn fetch_one(&self, url: &str) -> Result<RawPayload, TransportError>;

    /// Whether `url` points at a listing this source can fetch.
    fn handles(&self, url: &str) -> bool;
}

/// Remote store the core writes into.
#[async_trait]
pub trait SystemOfRecord: Send + Sync {
    async fn list_subjects(&self) -> Result<Vec<Subject>, TransportError>;

    /// Subjects whose name contains `name`, case-insensitively.
    async fn search_subjects(&self, name: &str) -> Result<Vec<Subject>, TransportError>;

    async fn find(
        &self,
        subject: SubjectKey,
        criteria: &LookupCriteria,
    ) -> Result<Vec<SystemRecord>, TransportError>;

    async fn create(
        &self,
        subject: SubjectKey,
        changes: &ChangeSet,
    ) -> Result<RecordId, TransportError>;

    async fn update(&self, id: RecordId, changes: &ChangeSet) -> Result<(), TransportError>;

    /// Fields this store persists. Change-sets are restricted to them.
    fn owned_fields(&self) -> Vec<Field> {
        Field::ALL.to_vec()
    }
}
