//! Stored state of one listing in the system of record.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::domain::change_set::ChangeSet;
use crate::domain::fields::{Field, FieldMap, FieldValue};
use crate::domain::subject::SubjectKey;

/// Opaque identifier the system of record assigns to a stored record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RecordId(pub i64);

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Fields currently held for one subject's listing. Read fresh for every
/// reconciliation and never cached.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SystemRecord {
    pub id: RecordId,
    pub subject: SubjectKey,
    pub fields: FieldMap,
}

impl SystemRecord {
    pub fn new(id: RecordId, subject: SubjectKey) -> Self {
        Self {
            id,
            subject,
            fields: FieldMap::new(),
        }
    }

    pub fn get(&self, field: Field) -> Option<&FieldValue> {
        self.fields.get(&field)
    }

    pub fn external_id(&self) -> Option<&str> {
        self.get(Field::ExternalId).and_then(FieldValue::as_text)
    }

    /// State the store holds once `changes` is written.
    #[must_use]
    pub fn apply(&self, changes: &ChangeSet) -> Self {
        let mut next = self.clone();
        for (field, value) in changes.iter() {
            next.fields.insert(field, value.clone());
        }
        next
    }
}

/// Deterministic lookup keys passed to `SystemOfRecord::find`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LookupCriteria {
    /// Exact-string match on the stored external identifier.
    pub external_id: Option<String>,
}

impl LookupCriteria {
    pub fn by_external_id(id: &str) -> Self {
        Self {
            external_id: Some(id.to_string()),
        }
    }

    /// Every record of the subject.
    pub fn all() -> Self {
        Self::default()
    }

    pub fn matches(&self, record: &SystemRecord) -> bool {
        match &self.external_id {
            Some(wanted) => record.external_id() == Some(wanted.as_str()),
            None => true,
        }
    }
}
