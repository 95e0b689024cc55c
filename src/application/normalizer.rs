//! Normalizer: raw marketplace payload → [`CanonicalRecord`].
//!
//! This is the single boundary where untyped source data is validated.
//! Missing optional attributes stay `None`; only a missing or untypeable
//! listing URL (or a value of the wrong JSON shape) is an error.

use serde_json::Value;
use tracing::trace;

use crate::application::text::{html_to_text, parse_calendar_date};
use crate::domain::errors::SyncError;
use crate::domain::listing::{CanonicalRecord, ExternalId, ListingStatus, Money, RawPayload};

/// Region codes treated as Canada when the destination region is `CA`.
const CANADIAN_REGION_CODES: &[&str] = &["CA", "CA_CON"];
/// Region codes of catch-all international rates.
const GLOBAL_REGION_CODES: &[&str] = &["XX", "EVERYWHERE_ELSE"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizerSettings {
    /// Currency applied when the payload omits one.
    pub currency: String,
    /// Destination region shipping rates are resolved for.
    pub shipping_region: String,
}

impl Default for NormalizerSettings {
    fn default() -> Self {
        Self {
            currency: "CAD".to_string(),
            shipping_region: "CA".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct Normalizer {
    settings: NormalizerSettings,
}

impl Normalizer {
    pub fn new(settings: NormalizerSettings) -> Self {
        Self { settings }
    }

    /// Builds the canonical record for one payload.
    ///
    /// `default_shipping` is used for live listings with no rate for the
    /// destination region.
    pub fn normalize(
        &self,
        raw: &RawPayload,
        default_shipping: &Money,
    ) -> Result<CanonicalRecord, SyncError> {
        let link = |path: &[&str]| -> Result<Option<String>, SyncError> {
            Ok(text_at(raw, path, "external_id")?.filter(|u| !u.is_empty()))
        };
        let url = link(&["_links", "web", "href"])?
            .or(link(&["url"])?)
            .ok_or_else(|| SyncError::malformed("external_id", "is missing"))?;
        let mut record = CanonicalRecord::new(ExternalId::parse(&url)?);

        record.name = text_at(raw, &["title"], "name")?;
        record.make = text_at(raw, &["make"], "make")?;
        record.model = text_at(raw, &["model"], "model")?;
        record.finish = text_at(raw, &["finish"], "finish")?;
        record.year = text_at(raw, &["year"], "year")?;
        record.condition = text_at(raw, &["condition", "display_name"], "condition")?;
        record.price = self.price(raw)?;

        if let Some(slug) = text_at(raw, &["state", "slug"], "status")? {
            (record.status, record.ended) = ListingStatus::from_state_slug(&slug);
        }

        if !record.ended {
            let (shipping, ships_to) = self.shipping(raw, default_shipping)?;
            record.shipping = Some(shipping);
            record.ships_to_region = Some(ships_to);
        }

        record.offers_enabled = flag_at(raw, &["offers_enabled"], "offers_enabled")?;
        record.created_on = text_at(raw, &["created_at"], "created_on")?
            .as_deref()
            .and_then(parse_calendar_date);
        record.published_on = text_at(raw, &["published_at"], "published_on")?
            .as_deref()
            .and_then(parse_calendar_date);
        record.seller = text_at(raw, &["shop_name"], "seller")?;
        record.location = text_at(raw, &["location", "display_location"], "location")?;
        record.description = text_at(raw, &["description"], "description")?
            .map(|html| html_to_text(&html));
        record.views = count_at(raw, &["stats", "views"], "views")?;
        record.watchers = count_at(raw, &["stats", "watches"], "watchers")?;
        record.categories = categories(raw)?;
        record.photo_url = text_at(raw, &["_links", "photo", "href"], "photo_url")?;

        trace!(external_id = %record.external_id, "normalized listing");
        Ok(record)
    }

    /// Informational notes for the run report.
    pub fn notes(&self, record: &CanonicalRecord) -> Vec<String> {
        let mut notes = Vec::new();
        if record.ended {
            notes.push(format!("listing is {}", record.status.to_string().to_lowercase()));
        } else if record.ships_to_region == Some(false) {
            notes.push(format!(
                "live listing does not ship to {}",
                self.settings.shipping_region
            ));
        }
        notes
    }

    /// Zero and unparsable amounts are treated as absent.
    fn price(&self, raw: &RawPayload) -> Result<Option<Money>, SyncError> {
        let currency = text_at(raw, &["price", "currency"], "price")?
            .unwrap_or_else(|| self.settings.currency.clone());
        let money = match raw.at(&["price", "amount"]) {
            None => None,
            Some(value) => money_from(value, &currency, "price")?,
        };
        Ok(money.filter(|m| !m.is_zero()))
    }

    /// Resolves `(amount, ships_to_region)` for a live listing.
    fn shipping(
        &self,
        raw: &RawPayload,
        default_shipping: &Money,
    ) -> Result<(Money, bool), SyncError> {
        let rates = match raw.at(&["shipping", "rates"]) {
            None => &[][..],
            Some(Value::Array(rates)) => rates.as_slice(),
            Some(_) => return Err(SyncError::malformed("shipping", "rates is not a list")),
        };
        let Some(rate) = self.find_rate(rates) else {
            return Ok((default_shipping.clone(), false));
        };
        let currency = rate
            .pointer("/rate/currency")
            .and_then(Value::as_str)
            .unwrap_or(&self.settings.currency);
        let amount = match rate.pointer("/rate/amount") {
            None | Some(Value::Null) => None,
            Some(value) => money_from(value, currency, "shipping")?,
        };
        Ok((amount.unwrap_or_else(|| default_shipping.clone()), true))
    }

    /// Exact region, then Canadian variants, then a global rate.
    fn find_rate<'a>(&self, rates: &'a [Value]) -> Option<&'a Value> {
        let target = self.settings.shipping_region.as_str();
        let with_code = |codes: &[&str]| {
            rates
                .iter()
                .find(|rate| region_code(rate).is_some_and(|code| codes.iter().any(|c| *c == code)))
        };

        with_code(&[target])
            .or_else(|| if target == "CA" { with_code(CANADIAN_REGION_CODES) } else { None })
            .or_else(|| with_code(GLOBAL_REGION_CODES))
    }
}

fn region_code(rate: &Value) -> Option<&str> {
    rate.get("region_code").and_then(Value::as_str)
}

fn text_at(raw: &RawPayload, path: &[&str], field: &str) -> Result<Option<String>, SyncError> {
    match raw.at(path) {
        None => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.trim().to_string())),
        Some(Value::Number(n)) => Ok(Some(n.to_string())),
        Some(_) => Err(SyncError::malformed(field, "is not text")),
    }
}

fn flag_at(raw: &RawPayload, path: &[&str], field: &str) -> Result<Option<bool>, SyncError> {
    match raw.at(path) {
        None => Ok(None),
        Some(Value::Bool(b)) => Ok(Some(*b)),
        Some(_) => Err(SyncError::malformed(field, "is not a boolean")),
    }
}

fn count_at(raw: &RawPayload, path: &[&str], field: &str) -> Result<Option<u64>, SyncError> {
    match raw.at(path) {
        None => Ok(None),
        Some(Value::Number(n)) => n
            .as_u64()
            .map(Some)
            .ok_or_else(|| SyncError::malformed(field, "is not a non-negative integer")),
        Some(Value::String(s)) => s
            .trim()
            .parse::<u64>()
            .map(Some)
            .map_err(|_| SyncError::malformed(field, "is not a non-negative integer")),
        Some(_) => Err(SyncError::malformed(field, "is not a counter")),
    }
}

fn money_from(value: &Value, currency: &str, field: &str) -> Result<Option<Money>, SyncError> {
    match value {
        Value::String(s) => Ok(Money::parse(s, currency)),
        Value::Number(n) => Ok(n.as_f64().and_then(|amount| Money::from_major(amount, currency))),
        Value::Null => Ok(None),
        _ => Err(SyncError::malformed(field, "amount is not a number")),
    }
}

/// Root-to-leaf category paths, in payload order.
fn categories(raw: &RawPayload) -> Result<Option<Vec<String>>, SyncError> {
    let entries = match raw.at(&["categories"]) {
        None => return Ok(None),
        Some(Value::Array(entries)) => entries,
        Some(_) => return Err(SyncError::malformed("categories", "is not a list")),
    };
    let mut paths = Vec::with_capacity(entries.len());
    for entry in entries {
        let path = match entry {
            Value::String(s) => s.trim().to_string(),
            Value::Object(_) => category_path(entry),
            _ => return Err(SyncError::malformed("categories", "entry is not an object")),
        };
        if !path.is_empty() {
            paths.push(path);
        }
    }
    Ok(Some(paths))
}

fn category_path(entry: &Value) -> String {
    if let Some(full) = entry.get("full_name").and_then(Value::as_str) {
        if !full.trim().is_empty() {
            return full.trim().to_string();
        }
    }
    let mut segments = Vec::new();
    let mut node = Some(entry);
    while let Some(current) = node {
        if let Some(name) = current.get("name").and_then(Value::as_str) {
            segments.push(name.trim());
        }
        node = current.get("parent").filter(|p| p.is_object());
    }
    segments.reverse();
    segments.join(" / ")
}
