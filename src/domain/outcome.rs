//! Per-record outcomes and the run report they aggregate into.

use std::fmt;

use serde::Serialize;
use uuid::Uuid;

use crate::domain::change_set::ChangeSet;
use crate::domain::errors::SyncError;
use crate::domain::subject::SubjectKey;
use crate::domain::system_record::RecordId;

/// Terminal result of reconciling one record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordOutcome {
    Created { id: RecordId, changes: ChangeSet },
    Updated { id: RecordId, changes: ChangeSet },
    /// Preview of a create; nothing was written.
    WouldCreate { changes: ChangeSet },
    /// Preview of an update; nothing was written.
    WouldUpdate { id: RecordId, changes: ChangeSet },
    Unchanged { id: RecordId },
    Skipped { reason: String },
    Failed { error: SyncError },
}

impl RecordOutcome {
    /// Change-set that was (or would have been) written.
    pub fn changes(&self) -> Option<&ChangeSet> {
        match self {
            Self::Created { changes, .. }
            | Self::Updated { changes, .. }
            | Self::WouldCreate { changes }
            | Self::WouldUpdate { changes, .. } => Some(changes),
            Self::Unchanged { .. } | Self::Skipped { .. } | Self::Failed { .. } => None,
        }
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, Self::Failed { .. })
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Created { .. } => "created",
            Self::Updated { .. } => "updated",
            Self::WouldCreate { .. } => "would create",
            Self::WouldUpdate { .. } => "would update",
            Self::Unchanged { .. } => "unchanged",
            Self::Skipped { .. } => "skipped",
            Self::Failed { .. } => "failed",
        }
    }
}

impl fmt::Display for RecordOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Created { id, changes } => write!(f, "created {id} {changes}"),
            Self::Updated { id, changes } => write!(f, "updated {id} {changes}"),
            Self::WouldCreate { changes } => write!(f, "would create {changes}"),
            Self::WouldUpdate { id, changes } => write!(f, "would update {id} {changes}"),
            Self::Unchanged { id } => write!(f, "unchanged {id}"),
            Self::Skipped { reason } => write!(f, "skipped: {reason}"),
            Self::Failed { error } => write!(f, "failed: {error}"),
        }
    }
}

/// Outcome of one record, tagged with its external identifier when known.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordReport {
    pub external_id: Option<String>,
    pub outcome: RecordOutcome,
    pub notes: Vec<String>,
}

impl RecordReport {
    pub fn new(external_id: Option<String>, outcome: RecordOutcome) -> Self {
        Self {
            external_id,
            outcome,
            notes: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_notes(mut self, notes: Vec<String>) -> Self {
        self.notes = notes;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubjectStatus {
    Completed,
    /// The subject could not be processed at all (search failure, worker loss).
    Failed(String),
    Cancelled,
}

/// Everything that happened under one subject.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubjectReport {
    pub subject: String,
    pub key: Option<SubjectKey>,
    pub status: SubjectStatus,
    pub records: Vec<RecordReport>,
}

impl SubjectReport {
    pub fn new(subject: impl Into<String>, key: Option<SubjectKey>) -> Self {
        Self {
            subject: subject.into(),
            key,
            status: SubjectStatus::Completed,
            records: Vec::new(),
        }
    }

    pub fn failed(
        subject: impl Into<String>,
        key: Option<SubjectKey>,
        cause: impl Into<String>,
    ) -> Self {
        Self {
            status: SubjectStatus::Failed(cause.into()),
            ..Self::new(subject, key)
        }
    }

    pub fn cancelled(subject: impl Into<String>, key: Option<SubjectKey>) -> Self {
        Self {
            status: SubjectStatus::Cancelled,
            ..Self::new(subject, key)
        }
    }

    pub fn has_failures(&self) -> bool {
        matches!(self.status, SubjectStatus::Failed(_))
            || self.records.iter().any(|r| r.outcome.is_failed())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunMode {
    Sync,
    Validate,
}

impl fmt::Display for RunMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Sync => "sync",
            Self::Validate => "validate",
        })
    }
}

/// Outcome counts across a run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub created: usize,
    pub updated: usize,
    pub would_create: usize,
    pub would_update: usize,
    pub unchanged: usize,
    pub skipped: usize,
    pub failed: usize,
    pub failed_subjects: usize,
    pub cancelled_subjects: usize,
}

/// Final report of a run, subjects in submission order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunReport {
    pub run_id: Uuid,
    pub mode: RunMode,
    pub dry_run: bool,
    pub subjects: Vec<SubjectReport>,
}

impl RunReport {
    pub fn new(mode: RunMode, dry_run: bool, subjects: Vec<SubjectReport>) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            mode,
            dry_run,
            subjects,
        }
    }

    pub fn summary(&self) -> RunSummary {
        let mut summary = RunSummary::default();
        for subject in &self.subjects {
            match subject.status {
                SubjectStatus::Completed => {}
                SubjectStatus::Failed(_) => summary.failed_subjects += 1,
                SubjectStatus::Cancelled => summary.cancelled_subjects += 1,
            }
            for record in &subject.records {
                let slot = match record.outcome {
                    RecordOutcome::Created { .. } => &mut summary.created,
                    RecordOutcome::Updated { .. } => &mut summary.updated,
                    RecordOutcome::WouldCreate { .. } => &mut summary.would_create,
                    RecordOutcome::WouldUpdate { .. } => &mut summary.would_update,
                    RecordOutcome::Unchanged { .. } => &mut summary.unchanged,
                    RecordOutcome::Skipped { .. } => &mut summary.skipped,
                    RecordOutcome::Failed { .. } => &mut summary.failed,
                };
                *slot += 1;
            }
        }
        summary
    }

    pub fn has_failures(&self) -> bool {
        self.subjects.iter().any(SubjectReport::has_failures)
    }

    pub fn was_cancelled(&self) -> bool {
        self.subjects
            .iter()
            .any(|s| s.status == SubjectStatus::Cancelled)
    }

    /// 130 when cancelled, 1 when anything failed, 0 otherwise.
    pub fn exit_code(&self) -> i32 {
        if self.was_cancelled() {
            130
        } else if self.has_failures() {
            1
        } else {
            0
        }
    }
}

impl fmt::Display for RunReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let preview = if self.dry_run { " (dry run)" } else { "" };
        writeln!(f, "{} run {}{}", self.mode, self.run_id, preview)?;
        for subject in &self.subjects {
            match &subject.status {
                SubjectStatus::Completed => writeln!(f, "== {}", subject.subject)?,
                SubjectStatus::Failed(cause) => {
                    writeln!(f, "== {} FAILED: {cause}", subject.subject)?;
                }
                SubjectStatus::Cancelled => writeln!(f, "== {} (cancelled)", subject.subject)?,
            }
            for record in &subject.records {
                let id = record.external_id.as_deref().unwrap_or("<no url>");
                writeln!(f, "   {id}: {}", record.outcome)?;
                for note in &record.notes {
                    writeln!(f, "      note: {note}")?;
                }
            }
        }
        let s = self.summary();
        write!(
            f,
            "created {}, updated {}, would create {}, would update {}, \
             unchanged {}, skipped {}, failed {}",
            s.created, s.updated, s.would_create, s.would_update, s.unchanged, s.skipped, s.failed
        )?;
        if s.failed_subjects > 0 || s.cancelled_subjects > 0 {
            write!(
                f,
                "; subjects failed {}, cancelled {}",
                s.failed_subjects, s.cancelled_subjects
            )?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::errors::TransportError;

    fn record(outcome: RecordOutcome) -> RecordReport {
        RecordReport::new(Some("https://reverb.com/item/1".into()), outcome)
    }

    #[test]
    fn clean_run_exits_zero_even_without_changes() {
        let mut subject = SubjectReport::new("Stadium", Some(SubjectKey(1)));
        subject.records.push(record(RecordOutcome::Unchanged { id: RecordId(4) }));
        let report = RunReport::new(RunMode::Sync, false, vec![subject]);
        assert_eq!(report.exit_code(), 0);
        assert_eq!(report.summary().unchanged, 1);
    }

    #[test]
    fn any_failed_record_sets_exit_one() {
        let mut subject = SubjectReport::new("Stadium", Some(SubjectKey(1)));
        subject.records.push(record(RecordOutcome::Failed {
            error: SyncError::Mutation(TransportError::http(500, "boom")),
        }));
        let report = RunReport::new(RunMode::Sync, false, vec![subject]);
        assert!(report.has_failures());
        assert_eq!(report.exit_code(), 1);
    }

    #[test]
    fn cancellation_wins_over_failure() {
        let report = RunReport::new(
            RunMode::Validate,
            true,
            vec![
                SubjectReport::failed("A", None, "search failed"),
                SubjectReport::cancelled("B", None),
            ],
        );
        assert_eq!(report.exit_code(), 130);
        let summary = report.summary();
        assert_eq!(summary.failed_subjects, 1);
        assert_eq!(summary.cancelled_subjects, 1);
    }

    #[test]
    fn display_lists_subjects_and_notes() {
        let mut subject = SubjectReport::new("Stadium", Some(SubjectKey(1)));
        subject.records.push(
            record(RecordOutcome::Skipped { reason: "not a marketplace url".into() })
                .with_notes(vec!["listing ended (sold)".into()]),
        );
        let text = RunReport::new(RunMode::Sync, true, vec![subject]).to_string();
        assert!(text.contains("(dry run)"));
        assert!(text.contains("== Stadium"));
        assert!(text.contains("note: listing ended (sold)"));
        assert!(text.ends_with("skipped 1, failed 0"));
    }
}
