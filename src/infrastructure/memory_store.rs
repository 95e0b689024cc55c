//! In-memory adapters for tests and offline previews.
//!
//! Both adapters count calls and accept injected failures so the core's
//! isolation and preview guarantees can be asserted without a network.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use futures::stream::{self, BoxStream, StreamExt};
use tokio::sync::Mutex;

use crate::domain::change_set::ChangeSet;
use crate::domain::errors::TransportError;
use crate::domain::fields::Field;
use crate::domain::listing::RawPayload;
use crate::domain::repositories::{ListingSource, SystemOfRecord};
use crate::domain::subject::{Subject, SubjectKey};
use crate::domain::system_record::{LookupCriteria, RecordId, SystemRecord};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreOperation {
    ListSubjects,
    SearchSubjects,
    Find,
    Create,
    Update,
}

/// Calls received by [`InMemorySystemOfRecord`], per operation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StoreCalls {
    pub list_subjects: usize,
    pub search_subjects: usize,
    pub find: usize,
    pub create: usize,
    pub update: usize,
}

impl StoreCalls {
    pub fn mutations(&self) -> usize {
        self.create + self.update
    }
}

#[derive(Default)]
struct StoreState {
    subjects: Vec<Subject>,
    records: Vec<SystemRecord>,
    next_id: i64,
    calls: StoreCalls,
    failures: HashMap<StoreOperation, TransportError>,
}

impl StoreState {
    fn record_call(&mut self, operation: StoreOperation) -> Result<(), TransportError> {
        let counter = match operation {
            StoreOperation::ListSubjects => &mut self.calls.list_subjects,
            StoreOperation::SearchSubjects => &mut self.calls.search_subjects,
            StoreOperation::Find => &mut self.calls.find,
            StoreOperation::Create => &mut self.calls.create,
            StoreOperation::Update => &mut self.calls.update,
        };
        *counter += 1;
        match self.failures.get(&operation) {
            Some(error) => Err(error.clone()),
            None => Ok(()),
        }
    }
}

/// System of record held in memory. Record ids start at 1.
#[derive(Default)]
pub struct InMemorySystemOfRecord {
    state: Mutex<StoreState>,
    owned: Option<Vec<Field>>,
}

impl InMemorySystemOfRecord {
    pub fn new() -> Self {
        Self::default()
    }

    /// Restricts the fields this store claims to persist.
    #[must_use]
    pub fn with_owned_fields(mut self, owned: Vec<Field>) -> Self {
        self.owned = Some(owned);
        self
    }

    pub async fn add_subject(&self, subject: Subject) {
        self.state.lock().await.subjects.push(subject);
    }

    /// Seeds a stored record directly, bypassing the call counters.
    pub async fn insert_record(&self, subject: SubjectKey, changes: &ChangeSet) -> RecordId {
        let mut state = self.state.lock().await;
        state.next_id += 1;
        let id = RecordId(state.next_id);
        state
            .records
            .push(SystemRecord::new(id, subject).apply(changes));
        id
    }

    /// Makes every later call of `operation` fail with `error`.
    pub async fn fail(&self, operation: StoreOperation, error: TransportError) {
        self.state.lock().await.failures.insert(operation, error);
    }

    pub async fn clear_failures(&self) {
        self.state.lock().await.failures.clear();
    }

    pub async fn calls(&self) -> StoreCalls {
        self.state.lock().await.calls
    }

    pub async fn records(&self) -> Vec<SystemRecord> {
        self.state.lock().await.records.clone()
    }

    pub async fn record(&self, id: RecordId) -> Option<SystemRecord> {
        self.state
            .lock()
            .await
            .records
            .iter()
            .find(|r| r.id == id)
            .cloned()
    }
}

#[async_trait]
impl SystemOfRecord for InMemorySystemOfRecord {
    async fn list_subjects(&self) -> Result<Vec<Subject>, TransportError> {
        let mut state = self.state.lock().await;
        state.record_call(StoreOperation::ListSubjects)?;
        Ok(state.subjects.clone())
    }

    async fn search_subjects(&self, name: &str) -> Result<Vec<Subject>, TransportError> {
        let mut state = self.state.lock().await;
        state.record_call(StoreOperation::SearchSubjects)?;
        let needle = name.trim().to_lowercase();
        Ok(state
            .subjects
            .iter()
            .filter(|s| s.name.to_lowercase().contains(&needle))
            .cloned()
            .collect())
    }

    async fn find(
        &self,
        subject: SubjectKey,
        criteria: &LookupCriteria,
    ) -> Result<Vec<SystemRecord>, TransportError> {
        let mut state = self.state.lock().await;
        state.record_call(StoreOperation::Find)?;
        Ok(state
            .records
            .iter()
            .filter(|r| r.subject == subject && criteria.matches(r))
            .cloned()
            .collect())
    }

    async fn create(
        &self,
        subject: SubjectKey,
        changes: &ChangeSet,
    ) -> Result<RecordId, TransportError> {
        let mut state = self.state.lock().await;
        state.record_call(StoreOperation::Create)?;
        state.next_id += 1;
        let id = RecordId(state.next_id);
        state
            .records
            .push(SystemRecord::new(id, subject).apply(changes));
        Ok(id)
    }

    async fn update(&self, id: RecordId, changes: &ChangeSet) -> Result<(), TransportError> {
        let mut state = self.state.lock().await;
        state.record_call(StoreOperation::Update)?;
        let record = state
            .records
            .iter_mut()
            .find(|r| r.id == id)
            .ok_or_else(|| TransportError::Rejected(format!("record {id} does not exist")))?;
        *record = record.apply(changes);
        Ok(())
    }

    fn owned_fields(&self) -> Vec<Field> {
        self.owned.clone().unwrap_or_else(|| Field::ALL.to_vec())
    }
}

/// Listing source answering from canned payloads.
///
/// Search results are keyed by query text; listings fetched one by one are
/// keyed by URL.
#[derive(Default)]
pub struct StaticListingSource {
    results: HashMap<String, Vec<RawPayload>>,
    listings: HashMap<String, RawPayload>,
    failing_queries: HashMap<String, TransportError>,
    /// Result count after which a query's stream fails.
    truncated_queries: HashMap<String, (usize, TransportError)>,
    latency: Option<Duration>,
    calls: Mutex<Vec<String>>,
}

impl StaticListingSource {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_results(mut self, query: &str, payloads: Vec<RawPayload>) -> Self {
        self.results.insert(query.to_string(), payloads);
        self
    }

    #[must_use]
    pub fn with_listing(mut self, url: &str, payload: RawPayload) -> Self {
        self.listings.insert(url.to_string(), payload);
        self
    }

    /// The first page of `query` fails with `error`.
    #[must_use]
    pub fn with_failing_query(mut self, query: &str, error: TransportError) -> Self {
        self.failing_queries.insert(query.to_string(), error);
        self
    }

    /// `query` yields `after` results and then fails with `error`.
    #[must_use]
    pub fn with_failure_after(mut self, query: &str, after: usize, error: TransportError) -> Self {
        self.truncated_queries.insert(query.to_string(), (after, error));
        self
    }

    /// Delay before every result and fetch.
    #[must_use]
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Searched queries and fetched URLs, in call order.
    pub async fn calls(&self) -> Vec<String> {
        self.calls.lock().await.clone()
    }

    async fn pause(&self) {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
    }
}

#[async_trait]
impl ListingSource for StaticListingSource {
    fn search<'a>(
        &'a self,
        query: &'a str,
        category: Option<&'a str>,
    ) -> BoxStream<'a, Result<RawPayload, TransportError>> {
        let label = match category {
            Some(category) => format!("search:{query}[{category}]"),
            None => format!("search:{query}"),
        };

        if let Some(error) = self.failing_queries.get(query) {
            let error = error.clone();
            return stream::once(async move {
                self.calls.lock().await.push(label);
                Err::<RawPayload, _>(error)
            })
            .boxed();
        }

        let mut items: Vec<Result<RawPayload, TransportError>> = self
            .results
            .get(query)
            .cloned()
            .unwrap_or_default()
            .into_iter()
            .map(Ok)
            .collect();
        if let Some((after, error)) = self.truncated_queries.get(query) {
            items.truncate(*after);
            items.push(Err(error.clone()));
        }

        stream::once(async move {
            self.calls.lock().await.push(label);
        })
        .flat_map(move |()| stream::iter(items.clone()))
        .then(move |item| async move {
            self.pause().await;
            item
        })
        .boxed()
    }

    async fn fetch_one(&self, url: &str) -> Result<RawPayload, TransportError> {
        self.calls.lock().await.push(format!("fetch:{url}"));
        self.pause().await;
        self.listings
            .get(url)
            .cloned()
            .ok_or_else(|| TransportError::http(404, format!("no listing at {url}")))
    }

    fn handles(&self, url: &str) -> bool {
        url.contains("reverb.com/item/")
    }
}
