//! Reconciler: the per-record decision core.
//!
//! ```text
//! Start ─► Matched ─► Diffed ─► NoOp
//!   │                   └────► UpdatePending ─┐
//!   └────► Unmatched ─► CreatePending ────────┴─► Applied | Previewed
//! any step ─► Failed
//! ```
//!
//! Each invocation owns its state; nothing is shared between records.

use std::sync::Arc;
use std::time::Duration;

use tracing::{Instrument, debug, error, info, info_span, warn};

use crate::application::deadline::within;
use crate::application::differ::diff;
use crate::application::matcher::Matcher;
use crate::domain::change_set::ChangeSet;
use crate::domain::errors::{SyncError, TransportError};
use crate::domain::fields::Field;
use crate::domain::listing::CanonicalRecord;
use crate::domain::outcome::RecordOutcome;
use crate::domain::repositories::SystemOfRecord;
use crate::domain::subject::SubjectKey;
use crate::domain::system_record::{RecordId, SystemRecord};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReconcileState {
    Start,
    Matched,
    Unmatched,
    Diffed,
    NoOp,
    CreatePending,
    UpdatePending,
    Applied,
    Previewed,
    Failed,
}

impl ReconcileState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::NoOp | Self::Applied | Self::Previewed | Self::Failed)
    }
}

/// Outcome of one record plus the states it went through.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reconciliation {
    pub outcome: RecordOutcome,
    pub trail: Vec<ReconcileState>,
}

impl Reconciliation {
    pub fn final_state(&self) -> ReconcileState {
        self.trail.last().copied().unwrap_or(ReconcileState::Start)
    }
}

enum Pending {
    Create(ChangeSet),
    Update(SystemRecord, ChangeSet),
}

enum Decision {
    Current(RecordId),
    Write(Pending),
}

#[derive(Clone)]
pub struct Reconciler {
    matcher: Matcher,
    store: Arc<dyn SystemOfRecord>,
    owned: Vec<Field>,
    call_timeout: Duration,
}

impl Reconciler {
    pub fn new(store: Arc<dyn SystemOfRecord>, call_timeout: Duration) -> Self {
        let owned = store.owned_fields();
        Self {
            matcher: Matcher::new(Arc::clone(&store), call_timeout),
            store,
            owned,
            call_timeout,
        }
    }

    /// Match, diff and (unless `preview`) write one observed listing.
    pub async fn reconcile(
        &self,
        subject: SubjectKey,
        incoming: &CanonicalRecord,
        preview: bool,
    ) -> Reconciliation {
        let span = info_span!("record", external_id = %incoming.external_id);
        async {
            let mut trail = vec![ReconcileState::Start];
            let pending = match self.matcher.find(subject, incoming).await {
                Err(error) => return fail(trail, error),
                Ok(None) => {
                    trail.push(ReconcileState::Unmatched);
                    trail.push(ReconcileState::CreatePending);
                    Pending::Create(diff(None, incoming).restricted_to(&self.owned))
                }
                Ok(Some(existing)) => {
                    trail.push(ReconcileState::Matched);
                    match decide_update(existing, incoming, &mut trail, &self.owned) {
                        Decision::Write(pending) => pending,
                        Decision::Current(id) => return no_op(trail, id),
                    }
                }
            };
            self.finish(subject, pending, trail, preview).await
        }
        .instrument(span)
        .await
    }

    /// Update-only pass over a record already read from the store.
    ///
    /// Never creates and never rewrites the stored external identifier.
    pub async fn refresh(
        &self,
        existing: SystemRecord,
        incoming: &CanonicalRecord,
        preview: bool,
    ) -> Reconciliation {
        let span = info_span!("record", external_id = %incoming.external_id, id = %existing.id);
        async {
            let mut trail = vec![ReconcileState::Start, ReconcileState::Matched];
            let owned: Vec<Field> = self
                .owned
                .iter()
                .copied()
                .filter(|f| *f != Field::ExternalId)
                .collect();
            let subject = existing.subject;
            match decide_update(existing, incoming, &mut trail, &owned) {
                Decision::Write(pending) => self.finish(subject, pending, trail, preview).await,
                Decision::Current(id) => no_op(trail, id),
            }
        }
        .instrument(span)
        .await
    }

    async fn finish(
        &self,
        subject: SubjectKey,
        pending: Pending,
        mut trail: Vec<ReconcileState>,
        preview: bool,
    ) -> Reconciliation {
        if preview {
            trail.push(ReconcileState::Previewed);
            let outcome = match pending {
                Pending::Create(changes) => RecordOutcome::WouldCreate { changes },
                Pending::Update(existing, changes) => RecordOutcome::WouldUpdate {
                    id: existing.id,
                    changes,
                },
            };
            debug!(outcome = %outcome, "preview only");
            return Reconciliation { outcome, trail };
        }

        let outcome = match pending {
            Pending::Create(changes) => {
                let create = self.store.create(subject, &changes);
                match within(self.call_timeout, "create", create).await {
                    Ok(id) => {
                        info!(%id, fields = changes.len(), "✅ created record");
                        RecordOutcome::Created { id, changes }
                    }
                    Err(e) => return fail(trail, SyncError::Mutation(e)),
                }
            }
            Pending::Update(existing, changes) => {
                let update = self.store.update(existing.id, &changes);
                match within(self.call_timeout, "update", update).await {
                    Ok(()) => {
                        info!(id = %existing.id, changes = %changes, "🔄 updated record");
                        RecordOutcome::Updated {
                            id: existing.id,
                            changes,
                        }
                    }
                    Err(e) => return fail(trail, SyncError::Mutation(e)),
                }
            }
        };
        trail.push(ReconcileState::Applied);
        Reconciliation { outcome, trail }
    }
}

fn decide_update(
    existing: SystemRecord,
    incoming: &CanonicalRecord,
    trail: &mut Vec<ReconcileState>,
    owned: &[Field],
) -> Decision {
    let changes = diff(Some(&existing), incoming).restricted_to(owned);
    trail.push(ReconcileState::Diffed);
    if changes.is_empty() {
        trail.push(ReconcileState::NoOp);
        debug!(id = %existing.id, "record is up to date");
        return Decision::Current(existing.id);
    }
    trail.push(ReconcileState::UpdatePending);
    Decision::Write(Pending::Update(existing, changes))
}

fn no_op(trail: Vec<ReconcileState>, id: RecordId) -> Reconciliation {
    Reconciliation {
        outcome: RecordOutcome::Unchanged { id },
        trail,
    }
}

fn fail(mut trail: Vec<ReconcileState>, error: SyncError) -> Reconciliation {
    if error.transport().is_some_and(TransportError::is_authentication) {
        error!(error = %error, "record failed, store rejected the credentials");
    } else {
        warn!(error = %error, "record failed");
    }
    trail.push(ReconcileState::Failed);
    Reconciliation {
        outcome: RecordOutcome::Failed { error },
        trail,
    }
}
