//! Odoo system of record over JSON-RPC.
//!
//! Subjects are `x_models` rows, their search category and fallback shipping
//! come from the linked `x_reverb_category`. Listings are `x_guitar` rows.

#![allow(clippy::uninlined_format_args)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Map, Value, json};
use tokio::sync::OnceCell;
use tracing::{debug, info};

use crate::application::text::parse_calendar_date;
use crate::domain::change_set::ChangeSet;
use crate::domain::errors::TransportError;
use crate::domain::fields::{Field, FieldMap, FieldValue};
use crate::domain::listing::{ListingStatus, Money};
use crate::domain::repositories::SystemOfRecord;
use crate::domain::subject::{Subject, SubjectKey};
use crate::domain::system_record::{LookupCriteria, RecordId, SystemRecord};
use crate::infrastructure::config::StoreConfig;
use crate::infrastructure::http_client::{HttpClient, HttpClientConfig};

const SUBJECT_MODEL: &str = "x_models";
const CATEGORY_MODEL: &str = "x_reverb_category";
const RECORD_MODEL: &str = "x_guitar";
const PAGE_SIZE: usize = 200;

const SUBJECT_FIELDS: [&str; 2] = ["x_name", "x_studio_reverb_category_id"];
const CATEGORY_FIELDS: [&str; 2] = ["x_studio_slug", "x_studio_default_shipping_price"];
const RECORD_FIELDS: [&str; 7] = [
    "x_name",
    "x_studio_url",
    "x_studio_value",
    "x_studio_shipping",
    "x_studio_is_available",
    "x_studio_accept_offers",
    "x_studio_published_at_1",
];

/// Canonical fields with an `x_guitar` column.
pub const OWNED_FIELDS: [Field; 8] = [
    Field::ExternalId,
    Field::Name,
    Field::Price,
    Field::Status,
    Field::Ended,
    Field::Shipping,
    Field::OffersEnabled,
    Field::PublishedOn,
];

#[derive(Debug, Deserialize)]
struct RpcResponse {
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<RpcFault>,
}

#[derive(Debug, Deserialize)]
struct RpcFault {
    #[serde(default)]
    message: String,
    #[serde(default)]
    data: Option<RpcFaultData>,
}

#[derive(Debug, Default, Deserialize)]
struct RpcFaultData {
    #[serde(default)]
    name: String,
    #[serde(default)]
    message: String,
}

impl RpcFault {
    fn into_error(self) -> TransportError {
        let data = self.data.unwrap_or_default();
        let message = if data.message.is_empty() {
            self.message
        } else {
            data.message
        };
        if data.name.contains("AccessDenied") || data.name.contains("AccessError") {
            TransportError::Authentication(message)
        } else {
            TransportError::Rejected(message)
        }
    }
}

/// Authenticated JSON-RPC session. The uid is resolved on first use.
pub struct OdooRpc {
    http: HttpClient,
    endpoint: String,
    database: String,
    login: String,
    password: String,
    uid: OnceCell<i64>,
    next_id: AtomicU64,
}

impl OdooRpc {
    pub fn new(config: &StoreConfig) -> Result<Self, TransportError> {
        let http = HttpClient::new(HttpClientConfig {
            timeout_seconds: config.request_timeout_secs,
            ..HttpClientConfig::default()
        })?;
        Ok(Self {
            http,
            endpoint: format!("{}/jsonrpc", config.url.trim_end_matches('/')),
            database: config.database.clone(),
            login: config.login.clone(),
            password: config.password.clone(),
            uid: OnceCell::new(),
            next_id: AtomicU64::new(1),
        })
    }

    async fn call(
        &self,
        service: &str,
        method: &str,
        args: Value,
    ) -> Result<Value, TransportError> {
        let body = json!({
            "jsonrpc": "2.0",
            "method": "call",
            "params": { "service": service, "method": method, "args": args },
            "id": self.next_id.fetch_add(1, Ordering::Relaxed),
        });
        let response: RpcResponse = self.http.post_json(&self.endpoint, &body).await?;
        match (response.error, response.result) {
            (Some(fault), _) => Err(fault.into_error()),
            (None, Some(result)) => Ok(result),
            (None, None) => Err(TransportError::Decode("JSON-RPC reply without result".into())),
        }
    }

    async fn uid(&self) -> Result<i64, TransportError> {
        self.uid
            .get_or_try_init(|| async {
                let result = self
                    .call("common", "login", json!([self.database, self.login, self.password]))
                    .await?;
                let uid = result.as_i64().ok_or_else(|| {
                    TransportError::Authentication(format!(
                        "login refused for '{}' on database '{}'",
                        self.login, self.database
                    ))
                })?;
                info!("✅ Connected to system of record as uid {}", uid);
                Ok::<i64, TransportError>(uid)
            })
            .await
            .copied()
    }

    /// `object.execute_kw(model, method, args, kwargs)`
    pub async fn execute_kw(
        &self,
        model: &str,
        method: &str,
        args: Value,
        kwargs: Value,
    ) -> Result<Value, TransportError> {
        let uid = self.uid().await?;
        debug!("execute_kw {}.{}", model, method);
        self.call(
            "object",
            "execute_kw",
            json!([self.database, uid, self.password, model, method, args, kwargs]),
        )
        .await
    }

    /// Every row matching `domain`, fetched in pages.
    pub async fn search_read_all(
        &self,
        model: &str,
        domain: Value,
        fields: &[&str],
    ) -> Result<Vec<Value>, TransportError> {
        let mut rows = Vec::new();
        loop {
            let batch = self
                .execute_kw(
                    model,
                    "search_read",
                    json!([domain]),
                    json!({
                        "fields": fields,
                        "offset": rows.len(),
                        "limit": PAGE_SIZE,
                        "order": "id asc",
                    }),
                )
                .await?;
            let batch = match batch {
                Value::Array(batch) => batch,
                other => {
                    return Err(TransportError::Decode(format!(
                        "search_read on {} returned {}",
                        model, other
                    )));
                }
            };
            let done = batch.len() < PAGE_SIZE;
            rows.extend(batch);
            if done {
                return Ok(rows);
            }
        }
    }
}

pub struct OdooSystemOfRecord {
    rpc: OdooRpc,
    currency: String,
    default_shipping: Money,
}

impl OdooSystemOfRecord {
    pub fn new(
        config: &StoreConfig,
        currency: &str,
        default_shipping: Money,
    ) -> Result<Self, TransportError> {
        Ok(Self {
            rpc: OdooRpc::new(config)?,
            currency: currency.to_ascii_uppercase(),
            default_shipping,
        })
    }

    async fn subjects_matching(&self, domain: Value) -> Result<Vec<Subject>, TransportError> {
        let rows = self.rpc.search_read_all(SUBJECT_MODEL, domain, &SUBJECT_FIELDS).await?;
        let mut category_ids: Vec<i64> = rows
            .iter()
            .filter_map(|r| many2one_id(&r["x_studio_reverb_category_id"]))
            .collect();
        category_ids.sort_unstable();
        category_ids.dedup();

        let categories = if category_ids.is_empty() {
            Vec::new()
        } else {
            let domain = json!([["id", "in", category_ids]]);
            self.rpc
                .search_read_all(CATEGORY_MODEL, domain, &CATEGORY_FIELDS)
                .await?
        };
        subjects_from_rows(&rows, &categories, &self.default_shipping, &self.currency)
    }
}

#[async_trait]
impl SystemOfRecord for OdooSystemOfRecord {
    async fn list_subjects(&self) -> Result<Vec<Subject>, TransportError> {
        self.subjects_matching(json!([])).await
    }

    async fn search_subjects(&self, name: &str) -> Result<Vec<Subject>, TransportError> {
        self.subjects_matching(json!([["x_name", "ilike", name.trim()]])).await
    }

    async fn find(
        &self,
        subject: SubjectKey,
        criteria: &LookupCriteria,
    ) -> Result<Vec<SystemRecord>, TransportError> {
        let mut domain = vec![json!(["x_studio_models", "=", subject.0])];
        if let Some(external_id) = &criteria.external_id {
            domain.push(json!(["x_studio_url", "=", external_id]));
        }
        let rows = self
            .rpc
            .search_read_all(RECORD_MODEL, Value::Array(domain), &RECORD_FIELDS)
            .await?;
        rows.iter()
            .map(|row| record_from_row(row, subject, &self.currency))
            .collect()
    }

    async fn create(
        &self,
        subject: SubjectKey,
        changes: &ChangeSet,
    ) -> Result<RecordId, TransportError> {
        let values = create_values(subject, changes);
        let created = self
            .rpc
            .execute_kw(RECORD_MODEL, "create", json!([values]), json!({}))
            .await?;
        // create returns an id, or a one-element list on newer servers
        let id = created
            .as_i64()
            .or_else(|| created.get(0).and_then(Value::as_i64))
            .ok_or_else(|| TransportError::Decode(format!("create returned {}", created)))?;
        Ok(RecordId(id))
    }

    async fn update(&self, id: RecordId, changes: &ChangeSet) -> Result<(), TransportError> {
        let values = write_values(changes);
        if values.is_empty() {
            return Ok(());
        }
        let written = self
            .rpc
            .execute_kw(RECORD_MODEL, "write", json!([[id.0], values]), json!({}))
            .await?;
        if written == Value::Bool(true) {
            Ok(())
        } else {
            Err(TransportError::Rejected(format!("write on record {} returned {}", id, written)))
        }
    }

    fn owned_fields(&self) -> Vec<Field> {
        OWNED_FIELDS.to_vec()
    }
}

/// Id of a many2one value (`[id, "display name"]` or `false`).
fn many2one_id(value: &Value) -> Option<i64> {
    match value {
        Value::Array(pair) => pair.first().and_then(Value::as_i64),
        other => other.as_i64(),
    }
}

fn row_id(row: &Value) -> Result<i64, TransportError> {
    row["id"]
        .as_i64()
        .ok_or_else(|| TransportError::Decode(format!("row without id: {}", row)))
}

/// Odoo renders unset text columns as `false`.
fn text(row: &Value, column: &str) -> Option<String> {
    row.get(column)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

fn subjects_from_rows(
    rows: &[Value],
    categories: &[Value],
    fallback_shipping: &Money,
    currency: &str,
) -> Result<Vec<Subject>, TransportError> {
    let mut by_id = HashMap::new();
    for category in categories {
        by_id.insert(row_id(category)?, category);
    }

    rows.iter()
        .map(|row| {
            let name = text(row, "x_name").unwrap_or_default();
            let category =
                many2one_id(&row["x_studio_reverb_category_id"]).and_then(|id| by_id.get(&id));
            let shipping = category
                .and_then(|c| c["x_studio_default_shipping_price"].as_f64())
                .filter(|amount| *amount > 0.0)
                .and_then(|amount| Money::from_major(amount, currency))
                .unwrap_or_else(|| fallback_shipping.clone());
            let mut subject = Subject::new(SubjectKey(row_id(row)?), name, shipping);
            if let Some(slug) = category.and_then(|c| text(c, "x_studio_slug")) {
                subject = subject.with_category(slug);
            }
            Ok(subject)
        })
        .collect()
}

fn record_from_row(
    row: &Value,
    subject: SubjectKey,
    currency: &str,
) -> Result<SystemRecord, TransportError> {
    let mut fields = FieldMap::new();
    if let Some(url) = text(row, "x_studio_url") {
        fields.insert(Field::ExternalId, FieldValue::Text(url));
    }
    if let Some(name) = text(row, "x_name") {
        fields.insert(Field::Name, FieldValue::Text(name));
    }
    let money_columns = [("x_studio_value", Field::Price), ("x_studio_shipping", Field::Shipping)];
    for (column, field) in money_columns {
        let amount = row[column].as_f64();
        if let Some(money) = amount.and_then(|amount| Money::from_major(amount, currency)) {
            if field == Field::Shipping || !money.is_zero() {
                fields.insert(field, FieldValue::Money(money));
            }
        }
    }
    if let Some(available) = row["x_studio_is_available"].as_bool() {
        let status = if available {
            ListingStatus::Active
        } else {
            ListingStatus::Ended
        };
        fields.insert(Field::Status, FieldValue::Status(status));
        fields.insert(Field::Ended, FieldValue::Flag(!available));
    }
    if let Some(offers) = row["x_studio_accept_offers"].as_bool() {
        fields.insert(Field::OffersEnabled, FieldValue::Flag(offers));
    }
    let published = text(row, "x_studio_published_at_1").and_then(|raw| parse_calendar_date(&raw));
    if let Some(date) = published {
        fields.insert(Field::PublishedOn, FieldValue::Date(date));
    }

    let mut record = SystemRecord::new(RecordId(row_id(row)?), subject);
    record.fields = fields;
    Ok(record)
}

/// Column values for a write. Status is derived from `ended` in this store.
fn write_values(changes: &ChangeSet) -> Map<String, Value> {
    let mut values = Map::new();
    for (field, value) in changes {
        let (column, value) = match (field, value) {
            (Field::ExternalId, FieldValue::Text(url)) => ("x_studio_url", json!(url)),
            (Field::Name, FieldValue::Text(name)) => ("x_name", json!(name)),
            (Field::Price, FieldValue::Money(money)) => ("x_studio_value", json!(money.to_major())),
            (Field::Shipping, FieldValue::Money(money)) => {
                ("x_studio_shipping", json!(money.to_major()))
            }
            (Field::Ended, FieldValue::Flag(ended)) => ("x_studio_is_available", json!(!ended)),
            (Field::OffersEnabled, FieldValue::Flag(offers)) => {
                ("x_studio_accept_offers", json!(offers))
            }
            (Field::PublishedOn, FieldValue::Date(date)) => {
                ("x_studio_published_at_1", json!(format!("{} 00:00:00", date.format("%Y-%m-%d"))))
            }
            _ => continue,
        };
        values.insert(column.to_string(), value);
    }
    values
}

fn create_values(subject: SubjectKey, changes: &ChangeSet) -> Map<String, Value> {
    let mut values = write_values(changes);
    values.insert("x_studio_models".into(), json!(subject.0));
    values.insert("x_studio_model_type".into(), json!("Guitar"));
    values.insert("x_studio_active".into(), json!(true));
    values.insert("x_studio_taxed".into(), json!(false));
    values
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn changes() -> ChangeSet {
        [
            (Field::ExternalId, FieldValue::Text("https://reverb.com/item/1-a".into())),
            (Field::Price, FieldValue::Money(Money::new(450_000, "CAD"))),
            (Field::Status, FieldValue::Status(ListingStatus::Ended)),
            (Field::Ended, FieldValue::Flag(true)),
            (Field::PublishedOn, FieldValue::Date(NaiveDate::from_ymd_opt(2024, 3, 9).unwrap())),
            (Field::Views, FieldValue::Count(12)),
        ]
        .into_iter()
        .collect()
    }

    #[test]
    fn writes_map_onto_store_columns() {
        let values = write_values(&changes());
        assert_eq!(values["x_studio_url"], json!("https://reverb.com/item/1-a"));
        assert_eq!(values["x_studio_value"], json!(4500.0));
        assert_eq!(values["x_studio_is_available"], json!(false));
        assert_eq!(values["x_studio_published_at_1"], json!("2024-03-09 00:00:00"));
        assert_eq!(values.len(), 4);
    }

    #[test]
    fn creates_carry_the_subject_and_defaults() {
        let values = create_values(SubjectKey(7), &changes());
        assert_eq!(values["x_studio_models"], json!(7));
        assert_eq!(values["x_studio_model_type"], json!("Guitar"));
        assert_eq!(values["x_studio_active"], json!(true));
        assert_eq!(values["x_studio_taxed"], json!(false));
    }

    #[test]
    fn rows_read_back_into_canonical_fields() {
        let row = json!({
            "id": 42,
            "x_name": "Godin Stadium HT",
            "x_studio_url": "https://reverb.com/item/1-a",
            "x_studio_value": 4500.0,
            "x_studio_shipping": 0.0,
            "x_studio_is_available": false,
            "x_studio_accept_offers": true,
            "x_studio_published_at_1": "2024-03-09 00:00:00",
        });
        let record = record_from_row(&row, SubjectKey(7), "CAD").unwrap();
        assert_eq!(record.id, RecordId(42));
        assert_eq!(record.get(Field::Price), Some(&FieldValue::Money(Money::new(450_000, "CAD"))));
        assert_eq!(record.get(Field::Shipping), Some(&FieldValue::Money(Money::new(0, "CAD"))));
        assert_eq!(record.get(Field::Status), Some(&FieldValue::Status(ListingStatus::Ended)));
        assert_eq!(record.get(Field::Ended), Some(&FieldValue::Flag(true)));
        assert_eq!(
            record.get(Field::PublishedOn),
            Some(&FieldValue::Date(NaiveDate::from_ymd_opt(2024, 3, 9).unwrap()))
        );

        // the stored state round-trips into an identical write
        let rewritten: ChangeSet = record.fields.clone().into_iter().collect();
        assert_eq!(write_values(&rewritten)["x_studio_is_available"], json!(false));
    }

    #[test]
    fn unset_columns_are_absent() {
        let row = json!({"id": 3, "x_name": false, "x_studio_url": false, "x_studio_value": 0.0});
        let record = record_from_row(&row, SubjectKey(1), "CAD").unwrap();
        assert!(record.fields.is_empty());
    }

    #[test]
    fn subjects_take_category_slug_and_shipping() {
        let rows = vec![
            json!({
                "id": 1,
                "x_name": "Stadium HT",
                "x_studio_reverb_category_id": [5, "Electric"],
            }),
            json!({"id": 2, "x_name": "Arcane", "x_studio_reverb_category_id": false}),
        ];
        let categories = vec![json!({
            "id": 5,
            "x_studio_slug": "electric-guitars",
            "x_studio_default_shipping_price": 120.0,
        })];
        let fallback = Money::new(25_000, "CAD");
        let subjects = subjects_from_rows(&rows, &categories, &fallback, "CAD").unwrap();
        assert_eq!(subjects[0].category_slug.as_deref(), Some("electric-guitars"));
        assert_eq!(subjects[0].default_shipping, Money::new(12_000, "CAD"));
        assert_eq!(subjects[1].category_slug, None);
        assert_eq!(subjects[1].default_shipping, fallback);
    }

    #[test]
    fn access_faults_are_authentication_errors() {
        let fault = RpcFault {
            message: "Odoo Server Error".into(),
            data: Some(RpcFaultData {
                name: "odoo.exceptions.AccessDenied".into(),
                message: "Access Denied".into(),
            }),
        };
        assert!(fault.into_error().is_authentication());
    }
}
