//! Subjects: the named groupings (guitar models) listings are searched under.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::domain::listing::Money;

/// Opaque key of a subject in the system of record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SubjectKey(pub i64);

impl fmt::Display for SubjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subject {
    pub key: SubjectKey,
    pub name: String,
    /// Marketplace product type used to narrow searches.
    pub category_slug: Option<String>,
    /// Shipping written when a live listing has no rate for the region.
    pub default_shipping: Money,
}

impl Subject {
    pub fn new(key: SubjectKey, name: impl Into<String>, default_shipping: Money) -> Self {
        Self {
            key,
            name: name.into(),
            category_slug: None,
            default_shipping,
        }
    }

    pub fn with_category(mut self, slug: impl Into<String>) -> Self {
        self.category_slug = Some(slug.into());
        self
    }

    /// `'Name' (id=7)`, the form used in ambiguity reports.
    pub fn describe(&self) -> String {
        format!("'{}' (id={})", self.name, self.key)
    }
}
