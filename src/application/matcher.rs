//! Matcher: finds the stored record of a canonical listing.

use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

use crate::application::deadline::within;
use crate::domain::errors::SyncError;
use crate::domain::listing::CanonicalRecord;
use crate::domain::repositories::SystemOfRecord;
use crate::domain::subject::SubjectKey;
use crate::domain::system_record::{LookupCriteria, SystemRecord};

/// Exact-string lookup on the stored external identifier, one round trip
/// per call and no caching.
#[derive(Clone)]
pub struct Matcher {
    store: Arc<dyn SystemOfRecord>,
    call_timeout: Duration,
}

impl Matcher {
    pub fn new(store: Arc<dyn SystemOfRecord>, call_timeout: Duration) -> Self {
        Self { store, call_timeout }
    }

    /// `Ok(None)` when nothing is stored, `AmbiguousMatch` when several
    /// records share the identifier.
    pub async fn find(
        &self,
        subject: SubjectKey,
        record: &CanonicalRecord,
    ) -> Result<Option<SystemRecord>, SyncError> {
        let external_id = record.external_id.as_str();
        let criteria = LookupCriteria::by_external_id(external_id);
        let mut found = within(self.call_timeout, "find", self.store.find(subject, &criteria))
            .await
            .map_err(SyncError::Lookup)?;

        debug!(external_id, matches = found.len(), "lookup finished");
        match found.len() {
            0 => Ok(None),
            1 => Ok(found.pop()),
            count => Err(SyncError::AmbiguousMatch {
                external_id: external_id.to_string(),
                count,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::change_set::ChangeSet;
    use crate::domain::errors::TransportError;
    use crate::domain::fields::{Field, FieldValue};
    use crate::domain::listing::ExternalId;
    use crate::infrastructure::memory_store::{InMemorySystemOfRecord, StoreOperation};

    const URL: &str = "https://reverb.com/item/1-godin";

    fn record() -> CanonicalRecord {
        CanonicalRecord::new(ExternalId::parse(URL).unwrap())
    }

    fn url_only() -> ChangeSet {
        [(Field::ExternalId, FieldValue::Text(URL.into()))].into_iter().collect()
    }

    #[tokio::test]
    async fn absent_single_and_ambiguous() {
        let store = Arc::new(InMemorySystemOfRecord::new());
        let matcher = Matcher::new(store.clone(), Duration::from_secs(1));

        assert_eq!(matcher.find(SubjectKey(1), &record()).await, Ok(None));

        let id = store.create(SubjectKey(1), &url_only()).await.unwrap();
        let found = matcher.find(SubjectKey(1), &record()).await.unwrap().unwrap();
        assert_eq!(found.id, id);

        // another subject's record never matches
        assert_eq!(matcher.find(SubjectKey(2), &record()).await, Ok(None));

        store.create(SubjectKey(1), &url_only()).await.unwrap();
        let err = matcher.find(SubjectKey(1), &record()).await.unwrap_err();
        assert_eq!(
            err,
            SyncError::AmbiguousMatch {
                external_id: URL.into(),
                count: 2
            }
        );
        assert_eq!(store.calls().await.find, 4);
    }

    #[tokio::test]
    async fn transport_failure_is_lookup_error() {
        let store = Arc::new(InMemorySystemOfRecord::new());
        store
            .fail(StoreOperation::Find, TransportError::Authentication("expired".into()))
            .await;
        let matcher = Matcher::new(store, Duration::from_secs(1));
        let err = matcher.find(SubjectKey(1), &record()).await.unwrap_err();
        assert!(matches!(err, SyncError::Lookup(TransportError::Authentication(_))));
    }
}
