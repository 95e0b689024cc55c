//! Options accepted by the sync and validate entry points.

use serde::{Deserialize, Serialize};

use crate::domain::subject::Subject;

/// Default number of subjects processed concurrently.
pub const DEFAULT_CONCURRENCY: usize = 4;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncOptions {
    /// Compute every decision but issue no create/update call.
    pub dry_run: bool,
    /// Search text used instead of the subject name.
    pub search_override: Option<String>,
    /// Category slug used instead of the subject's own.
    pub category_override: Option<String>,
    /// Search across every category, ignoring both overrides and the subject's slug.
    pub include_all_categories: bool,
    pub concurrency: usize,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            dry_run: false,
            search_override: None,
            category_override: None,
            include_all_categories: false,
            concurrency: DEFAULT_CONCURRENCY,
        }
    }
}

impl SyncOptions {
    pub fn preview() -> Self {
        Self {
            dry_run: true,
            ..Self::default()
        }
    }

    pub fn search_query<'a>(&'a self, subject: &'a Subject) -> &'a str {
        self.search_override
            .as_deref()
            .filter(|q| !q.trim().is_empty())
            .unwrap_or(&subject.name)
    }

    /// `--no-category` beats `--category`, which beats the subject's slug.
    pub fn effective_category<'a>(&'a self, subject: &'a Subject) -> Option<&'a str> {
        if self.include_all_categories {
            None
        } else if let Some(category) = &self.category_override {
            Some(category.as_str())
        } else {
            subject.category_slug.as_deref()
        }
    }

    /// Worker count, never below one.
    pub fn workers(&self) -> usize {
        self.concurrency.max(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::listing::Money;
    use crate::domain::subject::SubjectKey;

    fn subject() -> Subject {
        Subject::new(SubjectKey(3), "Godin Stadium HT", Money::new(25_000, "CAD"))
            .with_category("electric-guitars")
    }

    #[test]
    fn category_precedence() {
        let subject = subject();
        let mut options = SyncOptions::default();
        assert_eq!(options.effective_category(&subject), Some("electric-guitars"));

        options.category_override = Some("bass-guitars".into());
        assert_eq!(options.effective_category(&subject), Some("bass-guitars"));

        options.include_all_categories = true;
        assert_eq!(options.effective_category(&subject), None);
    }

    #[test]
    fn search_override_replaces_name() {
        let subject = subject();
        let mut options = SyncOptions::default();
        assert_eq!(options.search_query(&subject), "Godin Stadium HT");
        options.search_override = Some("godin stadium".into());
        assert_eq!(options.search_query(&subject), "godin stadium");
        options.search_override = Some("  ".into());
        assert_eq!(options.search_query(&subject), "Godin Stadium HT");
    }

    #[test]
    fn zero_concurrency_still_runs_one_worker() {
        let options = SyncOptions {
            concurrency: 0,
            ..SyncOptions::default()
        };
        assert_eq!(options.workers(), 1);
    }
}
