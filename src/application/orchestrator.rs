//! Orchestrator: drives normalize → reconcile across subjects on a bounded
//! worker pool.
//!
//! Each worker takes one subject at a time from a shared queue and runs its
//! whole pipeline in a task of its own before taking the next. Reports are written back by queue
//! index so the run report keeps submission order regardless of which
//! worker finished first. A failing subject never touches the others.

#![allow(clippy::uninlined_format_args)]

use std::collections::{HashSet, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use serde_json::Value;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, error, info, info_span, warn};

use crate::application::deadline::within;
use crate::application::normalizer::Normalizer;
use crate::application::options::SyncOptions;
use crate::application::reconciler::Reconciler;
use crate::domain::errors::{SyncError, TransportError};
use crate::domain::listing::{ExternalId, RawPayload};
use crate::domain::outcome::{
    RecordOutcome, RecordReport, RunMode, RunReport, SubjectReport, SubjectStatus,
};
use crate::domain::repositories::{ListingSource, SystemOfRecord};
use crate::domain::subject::Subject;
use crate::domain::system_record::LookupCriteria;

/// Progress of one queued subject.
enum Slot {
    Queued,
    Running,
    Done(SubjectReport),
}

#[derive(Clone)]
pub struct SyncOrchestrator {
    source: Arc<dyn ListingSource>,
    store: Arc<dyn SystemOfRecord>,
    normalizer: Normalizer,
    reconciler: Reconciler,
    call_timeout: Duration,
}

impl SyncOrchestrator {
    pub fn new(
        source: Arc<dyn ListingSource>,
        store: Arc<dyn SystemOfRecord>,
        normalizer: Normalizer,
        call_timeout: Duration,
    ) -> Self {
        let reconciler = Reconciler::new(Arc::clone(&store), call_timeout);
        Self {
            source,
            store,
            normalizer,
            reconciler,
            call_timeout,
        }
    }

    /// Resolves a subject by name.
    ///
    /// A single case-insensitive exact match wins, otherwise the search must
    /// return exactly one subject.
    pub async fn find_subject(&self, name: &str) -> Result<Subject, SyncError> {
        let search = self.store.search_subjects(name);
        let mut found = within(self.call_timeout, "search_subjects", search)
            .await
            .map_err(SyncError::Lookup)?;

        let wanted = name.trim().to_lowercase();
        let exact: Vec<usize> = found
            .iter()
            .enumerate()
            .filter(|(_, s)| s.name.trim().to_lowercase() == wanted)
            .map(|(i, _)| i)
            .collect();

        match (exact.as_slice(), found.len()) {
            (_, 0) => Err(SyncError::SubjectNotFound(name.to_string())),
            ([only], _) => Ok(found.swap_remove(*only)),
            (_, 1) => Ok(found.remove(0)),
            _ => Err(SyncError::AmbiguousSubject {
                name: name.to_string(),
                candidates: found.iter().map(Subject::describe).collect(),
            }),
        }
    }

    pub async fn sync_subject(
        &self,
        name: &str,
        options: &SyncOptions,
        cancel: &CancellationToken,
    ) -> Result<RunReport, SyncError> {
        let subject = self.find_subject(name).await?;
        info!(subject = %subject.name, key = %subject.key, "Resolved subject");
        Ok(self.run(vec![subject], RunMode::Sync, options, cancel).await)
    }

    pub async fn sync_all(
        &self,
        options: &SyncOptions,
        cancel: &CancellationToken,
    ) -> Result<RunReport, SyncError> {
        let subjects = self.all_subjects().await?;
        Ok(self.run(subjects, RunMode::Sync, options, cancel).await)
    }

    pub async fn validate_subject(
        &self,
        name: &str,
        options: &SyncOptions,
        cancel: &CancellationToken,
    ) -> Result<RunReport, SyncError> {
        let subject = self.find_subject(name).await?;
        Ok(self.run(vec![subject], RunMode::Validate, options, cancel).await)
    }

    pub async fn validate_all(
        &self,
        options: &SyncOptions,
        cancel: &CancellationToken,
    ) -> Result<RunReport, SyncError> {
        let subjects = self.all_subjects().await?;
        Ok(self.run(subjects, RunMode::Validate, options, cancel).await)
    }

    async fn all_subjects(&self) -> Result<Vec<Subject>, SyncError> {
        let subjects = within(self.call_timeout, "list_subjects", self.store.list_subjects())
            .await
            .map_err(SyncError::Lookup)?;
        if subjects.is_empty() {
            warn!("No subjects found in the system of record");
        } else {
            info!("Found {} subject(s)", subjects.len());
        }
        Ok(subjects)
    }

    /// Runs `subjects` on `min(concurrency, subjects)` workers.
    pub async fn run(
        &self,
        subjects: Vec<Subject>,
        mode: RunMode,
        options: &SyncOptions,
        cancel: &CancellationToken,
    ) -> RunReport {
        let total = subjects.len();
        let workers = options.workers().min(total);
        info!(
            "🚀 Starting {} of {} subject(s) with {} worker(s){}",
            mode,
            total,
            workers,
            if options.dry_run { " (dry run)" } else { "" }
        );

        let queue = Arc::new(Mutex::new(
            subjects.iter().cloned().enumerate().collect::<VecDeque<_>>(),
        ));
        let slots = Arc::new(Mutex::new(
            (0..total).map(|_| Slot::Queued).collect::<Vec<_>>(),
        ));

        let mut handles = Vec::with_capacity(workers);
        for worker_id in 0..workers {
            let this = self.clone();
            let queue = Arc::clone(&queue);
            let slots = Arc::clone(&slots);
            let options = options.clone();
            let cancel = cancel.clone();

            handles.push(tokio::spawn(async move {
                loop {
                    if cancel.is_cancelled() {
                        debug!(worker_id, "cancellation requested, worker stopping");
                        break;
                    }
                    let Some((index, subject)) = queue.lock().await.pop_front() else {
                        break;
                    };
                    slots.lock().await[index] = Slot::Running;

                    // own task per subject: a panic fails this subject, not the worker
                    let span = info_span!("subject", subject = %subject.name, worker_id);
                    let task = {
                        let this = this.clone();
                        let subject = subject.clone();
                        let options = options.clone();
                        let cancel = cancel.clone();
                        tokio::spawn(
                            async move {
                                this.process_subject(&subject, mode, &options, &cancel).await
                            }
                            .instrument(span),
                        )
                    };
                    let report = match task.await {
                        Ok(report) => report,
                        Err(e) => {
                            error!(subject = %subject.name, "Subject task ended abnormally: {}", e);
                            SubjectReport::failed(
                                subject.name.clone(),
                                Some(subject.key),
                                format!("subject task ended abnormally: {e}"),
                            )
                        }
                    };
                    slots.lock().await[index] = Slot::Done(report);
                }
            }));
        }

        for handle in handles {
            if let Err(e) = handle.await {
                error!("Worker task ended abnormally: {}", e);
            }
        }

        let slots = std::mem::take(&mut *slots.lock().await);
        let reports = subjects
            .into_iter()
            .zip(slots)
            .map(|(subject, slot)| match slot {
                Slot::Done(report) => report,
                Slot::Running => SubjectReport::failed(
                    subject.name,
                    Some(subject.key),
                    "worker stopped while processing this subject",
                ),
                Slot::Queued if cancel.is_cancelled() => {
                    SubjectReport::cancelled(subject.name, Some(subject.key))
                }
                Slot::Queued => SubjectReport::failed(
                    subject.name,
                    Some(subject.key),
                    "no worker picked up this subject",
                ),
            })
            .collect();

        let report = RunReport::new(mode, options.dry_run, reports);
        let summary = report.summary();
        info!(
            "🏁 {} finished: created {}, updated {}, unchanged {}, failed {}",
            mode, summary.created, summary.updated, summary.unchanged, summary.failed
        );
        report
    }

    async fn process_subject(
        &self,
        subject: &Subject,
        mode: RunMode,
        options: &SyncOptions,
        cancel: &CancellationToken,
    ) -> SubjectReport {
        match mode {
            RunMode::Sync => self.sync_one(subject, options, cancel).await,
            RunMode::Validate => self.validate_one(subject, options, cancel).await,
        }
    }

    /// Search, normalize and reconcile every candidate listing of one subject.
    async fn sync_one(
        &self,
        subject: &Subject,
        options: &SyncOptions,
        cancel: &CancellationToken,
    ) -> SubjectReport {
        let query = options.search_query(subject);
        let category = options.effective_category(subject);
        info!("Searching listings for '{}' (category: {})", query, category.unwrap_or("all"));

        let mut report = SubjectReport::new(subject.name.clone(), Some(subject.key));
        let mut stream = self.source.search(query, category);
        let mut seen: HashSet<ExternalId> = HashSet::new();

        loop {
            if cancel.is_cancelled() {
                report.status = SubjectStatus::Cancelled;
                break;
            }
            let next = match tokio::time::timeout(self.call_timeout, stream.next()).await {
                Ok(Some(item)) => item,
                Ok(None) => break,
                Err(_) => Err(TransportError::Timeout(format!(
                    "search page did not arrive within {}s",
                    self.call_timeout.as_secs()
                ))),
            };
            let raw = match next {
                Ok(raw) => raw,
                Err(e) => {
                    let error = SyncError::Source(e);
                    warn!("Search failed: {}", error);
                    report.status = SubjectStatus::Failed(error.to_string());
                    break;
                }
            };

            let record = match self.normalizer.normalize(&raw, &subject.default_shipping) {
                Ok(record) => record,
                Err(error) => {
                    warn!("Skipping malformed listing: {}", error);
                    let outcome = RecordOutcome::Failed { error };
                    report.records.push(RecordReport::new(payload_url(&raw), outcome));
                    continue;
                }
            };
            if !seen.insert(record.external_id.clone()) {
                debug!(external_id = %record.external_id, "duplicate search result skipped");
                continue;
            }

            let notes = self.normalizer.notes(&record);
            let result = self
                .reconciler
                .reconcile(subject.key, &record, options.dry_run)
                .await;
            report.records.push(
                RecordReport::new(Some(record.external_id.to_string()), result.outcome)
                    .with_notes(notes),
            );
        }

        info!("'{}': {} unique listing(s) processed", subject.name, seen.len());
        report
    }

    /// Refresh every stored record of one subject from its listing URL.
    async fn validate_one(
        &self,
        subject: &Subject,
        options: &SyncOptions,
        cancel: &CancellationToken,
    ) -> SubjectReport {
        let mut report = SubjectReport::new(subject.name.clone(), Some(subject.key));
        let stored = match within(
            self.call_timeout,
            "find",
            self.store.find(subject.key, &LookupCriteria::all()),
        )
        .await
        {
            Ok(stored) => stored,
            Err(e) => {
                let error = SyncError::Lookup(e);
                warn!("Could not read stored records: {}", error);
                report.status = SubjectStatus::Failed(error.to_string());
                return report;
            }
        };
        info!("Validating {} stored record(s) of '{}'", stored.len(), subject.name);

        for existing in stored {
            if cancel.is_cancelled() {
                report.status = SubjectStatus::Cancelled;
                break;
            }
            let Some(url) = existing.external_id().map(str::to_owned) else {
                report.records.push(RecordReport::new(
                    None,
                    RecordOutcome::Skipped {
                        reason: format!("record {} has no listing url", existing.id),
                    },
                ));
                continue;
            };
            if !self.source.handles(&url) {
                report.records.push(RecordReport::new(
                    Some(url),
                    RecordOutcome::Skipped {
                        reason: "not a marketplace listing url".to_string(),
                    },
                ));
                continue;
            }

            let fetched = within(self.call_timeout, "fetch_one", self.source.fetch_one(&url))
                .await
                .map_err(SyncError::Source)
                .and_then(|raw| self.normalizer.normalize(&raw, &subject.default_shipping));
            let record = match fetched {
                Ok(record) => record,
                Err(error) => {
                    warn!(url = %url, "Could not refresh listing: {}", error);
                    report
                        .records
                        .push(RecordReport::new(Some(url), RecordOutcome::Failed { error }));
                    continue;
                }
            };

            let notes = self.normalizer.notes(&record);
            let result = self.reconciler.refresh(existing, &record, options.dry_run).await;
            report
                .records
                .push(RecordReport::new(Some(url), result.outcome).with_notes(notes));
        }
        report
    }
}

/// Best-effort listing URL of a payload that failed to normalize.
fn payload_url(raw: &RawPayload) -> Option<String> {
    [&["_links", "web", "href"][..], &["url"][..]]
        .into_iter()
        .filter_map(|path| raw.at(path).and_then(Value::as_str))
        .map(str::trim)
        .find(|url| !url.is_empty())
        .map(str::to_owned)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::listing::Money;
    use crate::domain::subject::SubjectKey;
    use crate::infrastructure::memory_store::{InMemorySystemOfRecord, StaticListingSource};

    fn subject(key: i64, name: &str) -> Subject {
        Subject::new(SubjectKey(key), name, Money::new(25_000, "CAD"))
    }

    async fn orchestrator(subjects: Vec<Subject>) -> SyncOrchestrator {
        let store = Arc::new(InMemorySystemOfRecord::new());
        for s in subjects {
            store.add_subject(s).await;
        }
        SyncOrchestrator::new(
            Arc::new(StaticListingSource::new()),
            store,
            Normalizer::default(),
            Duration::from_secs(5),
        )
    }

    #[tokio::test]
    async fn exact_name_beats_partial_matches() {
        let orch = orchestrator(vec![subject(1, "Arcane"), subject(2, "Arcane II")]).await;
        assert_eq!(orch.find_subject("arcane").await.unwrap().key, SubjectKey(1));
    }

    #[tokio::test]
    async fn single_partial_match_is_accepted() {
        let orch = orchestrator(vec![subject(1, "Godin Stadium HT"), subject(2, "Arcane")]).await;
        assert_eq!(orch.find_subject("stadium").await.unwrap().key, SubjectKey(1));
    }

    #[tokio::test]
    async fn several_partial_matches_are_ambiguous() {
        let orch = orchestrator(vec![subject(1, "Arcane"), subject(2, "Arcane II")]).await;
        let err = orch.find_subject("arc").await.unwrap_err();
        assert_eq!(
            err,
            SyncError::AmbiguousSubject {
                name: "arc".into(),
                candidates: vec!["'Arcane' (id=1)".into(), "'Arcane II' (id=2)".into()],
            }
        );
    }

    #[tokio::test]
    async fn unknown_name_is_not_found() {
        let orch = orchestrator(vec![subject(1, "Arcane")]).await;
        assert_eq!(
            orch.find_subject("Telecaster").await.unwrap_err(),
            SyncError::SubjectNotFound("Telecaster".into())
        );
    }
}
