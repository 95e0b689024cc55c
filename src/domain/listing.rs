//! Listing value objects: the raw source payload and the canonical record
//! the normalizer builds from it.

use std::fmt;

use chrono::NaiveDate;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::domain::errors::SyncError;
use crate::domain::fields::{Field, FieldValue};

/// Natural key of a listing: its URL without query string or fragment.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ExternalId(String);

impl ExternalId {
    pub fn parse(raw: &str) -> Result<Self, SyncError> {
        let trimmed = raw.trim();
        let cut = trimmed.find(['?', '#']).unwrap_or(trimmed.len());
        let cleaned = trimmed[..cut].trim_end();
        if cleaned.is_empty() {
            return Err(SyncError::malformed("external_id", "is empty"));
        }
        Ok(Self(cleaned.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for ExternalId {
    type Error = SyncError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<ExternalId> for String {
    fn from(id: ExternalId) -> Self {
        id.0
    }
}

impl fmt::Display for ExternalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

static CURRENCY_CODE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b([A-Z]{3})\b").expect("static currency regex"));

/// Non-negative monetary amount in minor units plus an ISO 4217 code.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Money {
    amount_minor: u64,
    currency: String,
}

impl Money {
    pub fn new(amount_minor: u64, currency: &str) -> Self {
        Self {
            amount_minor,
            currency: currency.trim().to_ascii_uppercase(),
        }
    }

    /// From a decimal amount in major units; rejects negative and non-finite input.
    pub fn from_major(amount: f64, currency: &str) -> Option<Self> {
        if !amount.is_finite() || amount < 0.0 {
            return None;
        }
        let minor = (amount * 100.0).round();
        if minor > u64::MAX as f64 {
            return None;
        }
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        Some(Self::new(minor as u64, currency))
    }

    /// Parses a locale formatted amount such as `"1,234.56"`, `"1 234,56"`
    /// or `"C$4,500"`.
    ///
    /// A three-letter code inside the text wins over `default_currency`.
    /// The last `.` or `,` is the decimal separator when one or two digits
    /// follow it; every other separator is a thousands separator.
    pub fn parse(text: &str, default_currency: &str) -> Option<Self> {
        let currency = CURRENCY_CODE
            .captures(text)
            .and_then(|c| c.get(1))
            .map_or(default_currency, |m| m.as_str());

        if text.contains('-') {
            return None;
        }
        let kept: String = text
            .chars()
            .filter(|c| c.is_ascii_digit() || *c == '.' || *c == ',')
            .collect();
        if !kept.chars().any(|c| c.is_ascii_digit()) {
            return None;
        }

        let (integer_part, fraction_part) = match kept.rfind(['.', ',']) {
            Some(pos) => {
                let tail = &kept[pos + 1..];
                if (1..=2).contains(&tail.len()) && tail.chars().all(|c| c.is_ascii_digit()) {
                    (&kept[..pos], tail)
                } else {
                    (kept.as_str(), "")
                }
            }
            None => (kept.as_str(), ""),
        };

        let mut major: u64 = 0;
        for digit in integer_part.chars().filter_map(|c| c.to_digit(10)) {
            major = major.checked_mul(10)?.checked_add(u64::from(digit))?;
        }
        let minor_fraction = match fraction_part.len() {
            0 => 0,
            1 => fraction_part.parse::<u64>().ok()? * 10,
            _ => fraction_part.parse::<u64>().ok()?,
        };
        let amount_minor = major.checked_mul(100)?.checked_add(minor_fraction)?;
        Some(Self::new(amount_minor, currency))
    }

    pub fn amount_minor(&self) -> u64 {
        self.amount_minor
    }

    pub fn currency(&self) -> &str {
        &self.currency
    }

    #[allow(clippy::cast_precision_loss)]
    pub fn to_major(&self) -> f64 {
        self.amount_minor as f64 / 100.0
    }

    pub fn is_zero(&self) -> bool {
        self.amount_minor == 0
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}.{:02} {}",
            self.amount_minor / 100,
            self.amount_minor % 100,
            self.currency
        )
    }
}

/// Lifecycle status of a listing on the marketplace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ListingStatus {
    Active,
    Ended,
    Unknown,
}

impl ListingStatus {
    /// Maps a marketplace state slug to `(status, ended)`.
    pub fn from_state_slug(slug: &str) -> (Self, bool) {
        match slug.trim().to_ascii_lowercase().as_str() {
            "live" => (Self::Active, false),
            "sold" | "ended" | "suspended" => (Self::Ended, true),
            _ => (Self::Unknown, false),
        }
    }

    pub fn is_known(self) -> bool {
        self != Self::Unknown
    }
}

impl fmt::Display for ListingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Active => "Active",
            Self::Ended => "Ended",
            Self::Unknown => "Unknown",
        };
        f.write_str(label)
    }
}

/// Source-shaped listing data, discarded once normalized.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RawPayload(Value);

impl RawPayload {
    pub fn new(body: Value) -> Self {
        Self(body)
    }

    pub fn body(&self) -> &Value {
        &self.0
    }

    /// Value at a nested object path, `None` when missing or JSON `null`.
    pub fn at(&self, path: &[&str]) -> Option<&Value> {
        let mut node = &self.0;
        for key in path {
            node = node.get(key)?;
        }
        (!node.is_null()).then_some(node)
    }

    /// Sets a top-level key, used by adapters to attach the requested URL.
    pub fn insert(&mut self, key: &str, value: Value) {
        if let Value::Object(map) = &mut self.0 {
            map.insert(key.to_string(), value);
        }
    }
}

/// Normalized, system-agnostic representation of one listing.
///
/// `None` always means "not observed"; it is never replaced with a
/// business default.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CanonicalRecord {
    pub external_id: ExternalId,
    pub name: Option<String>,
    pub make: Option<String>,
    pub model: Option<String>,
    pub finish: Option<String>,
    pub year: Option<String>,
    pub condition: Option<String>,
    pub price: Option<Money>,
    pub status: ListingStatus,
    pub ended: bool,
    pub shipping: Option<Money>,
    pub ships_to_region: Option<bool>,
    pub offers_enabled: Option<bool>,
    pub created_on: Option<NaiveDate>,
    pub published_on: Option<NaiveDate>,
    pub seller: Option<String>,
    pub location: Option<String>,
    pub description: Option<String>,
    pub views: Option<u64>,
    pub watchers: Option<u64>,
    pub categories: Option<Vec<String>>,
    pub photo_url: Option<String>,
}

impl CanonicalRecord {
    /// A record with nothing observed but its identifier.
    pub fn new(external_id: ExternalId) -> Self {
        Self {
            external_id,
            name: None,
            make: None,
            model: None,
            finish: None,
            year: None,
            condition: None,
            price: None,
            status: ListingStatus::Unknown,
            ended: false,
            shipping: None,
            ships_to_region: None,
            offers_enabled: None,
            created_on: None,
            published_on: None,
            seller: None,
            location: None,
            description: None,
            views: None,
            watchers: None,
            categories: None,
            photo_url: None,
        }
    }

    /// Present fields in declaration order.
    ///
    /// Status and ended are reported only when the status is known.
    pub fn observed_fields(&self) -> Vec<(Field, FieldValue)> {
        let text = |v: &Option<String>| v.clone().map(FieldValue::Text);
        let mut out = Vec::with_capacity(Field::ALL.len());
        out.push((
            Field::ExternalId,
            FieldValue::Text(self.external_id.as_str().to_string()),
        ));
        let candidates = [
            (Field::Name, text(&self.name)),
            (Field::Make, text(&self.make)),
            (Field::Model, text(&self.model)),
            (Field::Finish, text(&self.finish)),
            (Field::Year, text(&self.year)),
            (Field::Condition, text(&self.condition)),
            (Field::Price, self.price.clone().map(FieldValue::Money)),
            (
                Field::Status,
                self.status.is_known().then_some(FieldValue::Status(self.status)),
            ),
            (
                Field::Ended,
                self.status.is_known().then_some(FieldValue::Flag(self.ended)),
            ),
            (Field::Shipping, self.shipping.clone().map(FieldValue::Money)),
            (Field::ShipsToRegion, self.ships_to_region.map(FieldValue::Flag)),
            (Field::OffersEnabled, self.offers_enabled.map(FieldValue::Flag)),
            (Field::CreatedOn, self.created_on.map(FieldValue::Date)),
            (Field::PublishedOn, self.published_on.map(FieldValue::Date)),
            (Field::Seller, text(&self.seller)),
            (Field::Location, text(&self.location)),
            (Field::Description, text(&self.description)),
            (Field::Views, self.views.map(FieldValue::Count)),
            (Field::Watchers, self.watchers.map(FieldValue::Count)),
            (Field::Categories, self.categories.clone().map(FieldValue::List)),
            (Field::PhotoUrl, text(&self.photo_url)),
        ];
        out.extend(
            candidates
                .into_iter()
                .filter_map(|(field, value)| value.map(|v| (field, v))),
        );
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use serde_json::json;

    #[rstest]
    #[case("https://reverb.com/item/123-cool-guitar", "https://reverb.com/item/123-cool-guitar")]
    #[case(
        "https://reverb.com/item/123-cool-guitar?bk=abc&u=1",
        "https://reverb.com/item/123-cool-guitar"
    )]
    #[case("  https://reverb.com/item/9-x#photos ", "https://reverb.com/item/9-x")]
    fn external_id_drops_query(#[case] raw: &str, #[case] expected: &str) {
        assert_eq!(ExternalId::parse(raw).unwrap().as_str(), expected);
    }

    #[rstest]
    #[case("")]
    #[case("   ")]
    #[case("?utm=1")]
    fn external_id_rejects_blank(#[case] raw: &str) {
        assert!(matches!(
            ExternalId::parse(raw),
            Err(SyncError::MalformedPayload { .. })
        ));
    }

    #[rstest]
    #[case("4500.00", "CAD", 450_000, "CAD")]
    #[case("1,234.56", "CAD", 123_456, "CAD")]
    #[case("1 234,56", "CAD", 123_456, "CAD")]
    #[case("1.234,5", "EUR", 123_450, "EUR")]
    #[case("C$4,500", "CAD", 450_000, "CAD")]
    #[case("$900 USD", "CAD", 90_000, "USD")]
    #[case("0.00", "CAD", 0, "CAD")]
    #[case("12", "CAD", 1_200, "CAD")]
    fn parses_locale_amounts(
        #[case] text: &str,
        #[case] default_currency: &str,
        #[case] minor: u64,
        #[case] currency: &str,
    ) {
        let money = Money::parse(text, default_currency).unwrap();
        assert_eq!(money.amount_minor(), minor);
        assert_eq!(money.currency(), currency);
    }

    #[rstest]
    #[case("")]
    #[case("free")]
    #[case("-25.00")]
    fn rejects_unusable_amounts(#[case] text: &str) {
        assert!(Money::parse(text, "CAD").is_none());
    }

    #[test]
    fn money_from_major_rounds_to_cents() {
        let m = Money::from_major(175.499, "cad").unwrap();
        assert_eq!(m.amount_minor(), 17_550);
        assert_eq!(m.currency(), "CAD");
        assert_eq!(m.to_string(), "175.50 CAD");
        assert!(Money::from_major(-1.0, "CAD").is_none());
        assert!(Money::from_major(f64::NAN, "CAD").is_none());
    }

    #[rstest]
    #[case("live", ListingStatus::Active, false)]
    #[case("sold", ListingStatus::Ended, true)]
    #[case("ended", ListingStatus::Ended, true)]
    #[case("Suspended", ListingStatus::Ended, true)]
    #[case("draft", ListingStatus::Unknown, false)]
    fn state_slugs(#[case] slug: &str, #[case] status: ListingStatus, #[case] ended: bool) {
        assert_eq!(ListingStatus::from_state_slug(slug), (status, ended));
    }

    #[test]
    fn payload_paths_skip_null() {
        let payload = RawPayload::new(json!({"price": {"amount": "10.00", "currency": null}}));
        assert_eq!(payload.at(&["price", "amount"]), Some(&json!("10.00")));
        assert!(payload.at(&["price", "currency"]).is_none());
        assert!(payload.at(&["stats", "views"]).is_none());
    }

    #[test]
    fn observed_fields_skip_unknown_status() {
        let mut record = CanonicalRecord::new(ExternalId::parse("https://x/item/1").unwrap());
        record.views = Some(3);
        let fields: Vec<Field> = record.observed_fields().into_iter().map(|(f, _)| f).collect();
        assert_eq!(fields, vec![Field::ExternalId, Field::Views]);

        record.status = ListingStatus::Ended;
        record.ended = true;
        let fields: Vec<Field> = record.observed_fields().into_iter().map(|(f, _)| f).collect();
        assert_eq!(
            fields,
            vec![Field::ExternalId, Field::Status, Field::Ended, Field::Views]
        );
    }
}
