//! Field catalogue of the canonical listing record.
//!
//! [`Field`] orders by declaration, which is what makes change-sets and
//! create payloads reproducible: a `BTreeMap<Field, _>` always iterates in
//! the order the attributes are declared on `CanonicalRecord`.

use std::collections::BTreeMap;
use std::fmt;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::domain::listing::{ListingStatus, Money};

/// Attribute of a canonical record, in declaration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Field {
    ExternalId,
    Name,
    Make,
    Model,
    Finish,
    Year,
    Condition,
    Price,
    Status,
    Ended,
    Shipping,
    ShipsToRegion,
    OffersEnabled,
    CreatedOn,
    PublishedOn,
    Seller,
    Location,
    Description,
    Views,
    Watchers,
    Categories,
    PhotoUrl,
}

impl Field {
    pub const ALL: [Field; 22] = [
        Field::ExternalId,
        Field::Name,
        Field::Make,
        Field::Model,
        Field::Finish,
        Field::Year,
        Field::Condition,
        Field::Price,
        Field::Status,
        Field::Ended,
        Field::Shipping,
        Field::ShipsToRegion,
        Field::OffersEnabled,
        Field::CreatedOn,
        Field::PublishedOn,
        Field::Seller,
        Field::Location,
        Field::Description,
        Field::Views,
        Field::Watchers,
        Field::Categories,
        Field::PhotoUrl,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Field::ExternalId => "external_id",
            Field::Name => "name",
            Field::Make => "make",
            Field::Model => "model",
            Field::Finish => "finish",
            Field::Year => "year",
            Field::Condition => "condition",
            Field::Price => "price",
            Field::Status => "status",
            Field::Ended => "ended",
            Field::Shipping => "shipping",
            Field::ShipsToRegion => "ships_to_region",
            Field::OffersEnabled => "offers_enabled",
            Field::CreatedOn => "created_on",
            Field::PublishedOn => "published_on",
            Field::Seller => "seller",
            Field::Location => "location",
            Field::Description => "description",
            Field::Views => "views",
            Field::Watchers => "watchers",
            Field::Categories => "categories",
            Field::PhotoUrl => "photo_url",
        }
    }

    /// Comparison semantics the differ applies to this field.
    pub fn policy(self) -> ComparePolicy {
        match self {
            Field::Seller | Field::Location => ComparePolicy::CaseInsensitiveTrimmed,
            Field::Views | Field::Watchers => ComparePolicy::HighWaterMark,
            Field::Categories => ComparePolicy::OrderedSequence,
            Field::PhotoUrl => ComparePolicy::PresenceOnly,
            Field::Status | Field::Ended => ComparePolicy::LifecyclePair,
            _ => ComparePolicy::Exact,
        }
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Typed value of one field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum FieldValue {
    Text(String),
    Money(Money),
    Status(ListingStatus),
    Flag(bool),
    Date(NaiveDate),
    Count(u64),
    List(Vec<String>),
}

impl FieldValue {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            FieldValue::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_count(&self) -> Option<u64> {
        match self {
            FieldValue::Count(n) => Some(*n),
            _ => None,
        }
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Text(s) => write!(f, "{s:?}"),
            FieldValue::Money(m) => write!(f, "{m}"),
            FieldValue::Status(s) => write!(f, "{s}"),
            FieldValue::Flag(b) => write!(f, "{b}"),
            FieldValue::Date(d) => write!(f, "{}", d.format("%Y-%m-%d")),
            FieldValue::Count(n) => write!(f, "{n}"),
            FieldValue::List(items) => write!(f, "[{}]", items.join(", ")),
        }
    }
}

/// Field values keyed (and ordered) by field.
pub type FieldMap = BTreeMap<Field, FieldValue>;

/// Per-field comparison semantics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComparePolicy {
    Exact,
    /// Compared after trimming and lower-casing both sides.
    CaseInsensitiveTrimmed,
    /// Monotonic counters: only a strictly higher observation is written.
    HighWaterMark,
    /// Ordered lists: any change in membership or order is a difference.
    OrderedSequence,
    /// Written only while the stored side has no value.
    PresenceOnly,
    /// Status and ended flag; the differ writes them together.
    LifecyclePair,
}

impl ComparePolicy {
    /// Whether `incoming` must be written over `stored`.
    pub fn requires_update(self, stored: Option<&FieldValue>, incoming: &FieldValue) -> bool {
        let Some(stored) = stored else {
            return true;
        };
        match self {
            ComparePolicy::Exact
            | ComparePolicy::OrderedSequence
            | ComparePolicy::LifecyclePair => stored != incoming,
            ComparePolicy::CaseInsensitiveTrimmed => match (stored, incoming) {
                (FieldValue::Text(a), FieldValue::Text(b)) => {
                    a.trim().to_lowercase() != b.trim().to_lowercase()
                }
                _ => stored != incoming,
            },
            ComparePolicy::HighWaterMark => match (stored, incoming) {
                (FieldValue::Count(a), FieldValue::Count(b)) => b > a,
                _ => stored != incoming,
            },
            ComparePolicy::PresenceOnly => false,
        }
    }
}
