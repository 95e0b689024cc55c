//! Normalization of recorded marketplace payloads
use chrono::NaiveDate;
use listing_sync_lib::application::normalizer::{Normalizer, NormalizerSettings};
use listing_sync_lib::domain::{ListingStatus, Money, RawPayload, SyncError};

fn fixture(json: &str) -> RawPayload {
    RawPayload::new(serde_json::from_str(json).unwrap())
}

fn fallback() -> Money {
    Money::new(25_000, "CAD")
}

#[test]
fn live_listing_is_fully_normalized() {
    let normalizer = Normalizer::default();
    let record = normalizer
        .normalize(&fixture(include_str!("fixtures/listing_live.json")), &fallback())
        .unwrap();

    assert_eq!(
        record.external_id.as_str(),
        "https://reverb.com/item/94370297-godin-stadium-ht-trans-black"
    );
    assert_eq!(record.name.as_deref(), Some("Godin Stadium HT  Trans Black"));
    assert_eq!(record.make.as_deref(), Some("Godin"));
    assert_eq!(record.year.as_deref(), Some("2021"));
    assert_eq!(record.condition.as_deref(), Some("Excellent"));
    assert_eq!(record.price, Some(Money::new(184_900, "CAD")));
    assert_eq!(record.status, ListingStatus::Active);
    assert!(!record.ended);
    // no exact CA rate, the Canadian variant wins over the global one
    assert_eq!(record.shipping, Some(Money::new(4_500, "CAD")));
    assert_eq!(record.ships_to_region, Some(true));
    assert_eq!(record.offers_enabled, Some(true));
    assert_eq!(record.created_on, NaiveDate::from_ymd_opt(2024, 3, 2));
    assert_eq!(record.published_on, NaiveDate::from_ymd_opt(2024, 3, 2));
    assert_eq!(record.seller.as_deref(), Some("Montreal Guitar Exchange"));
    assert_eq!(record.location.as_deref(), Some("Montreal, QC, Canada"));
    assert_eq!(
        record.description.as_deref(),
        Some("Lightly played, no fret wear.\nOriginal case\nSetup done")
    );
    assert_eq!(record.views, Some(412));
    assert_eq!(record.watchers, Some(17));
    assert_eq!(
        record.categories,
        Some(vec![
            "Electric Guitars / Solid Body".to_string(),
            "Electric Guitars / Single Cut".to_string(),
        ])
    );
    assert!(record.photo_url.as_deref().is_some_and(|u| u.ends_with("94370297.jpg")));
    assert!(normalizer.notes(&record).is_empty());
}

#[test]
fn sold_listing_leaves_shipping_unobserved() {
    let normalizer = Normalizer::default();
    let record = normalizer
        .normalize(&fixture(include_str!("fixtures/listing_sold.json")), &fallback())
        .unwrap();

    assert_eq!(record.status, ListingStatus::Ended);
    assert!(record.ended);
    assert_eq!(record.price, Some(Money::new(165_000, "CAD")));
    assert_eq!(record.shipping, None);
    assert_eq!(record.ships_to_region, None);
    // 23:30 in Vancouver is already the next day in UTC
    assert_eq!(record.published_on, NaiveDate::from_ymd_opt(2023, 12, 1));
    assert_eq!(normalizer.notes(&record), vec!["listing is ended".to_string()]);
}

#[test]
fn other_destination_falls_back_to_global_rate() {
    let normalizer = Normalizer::new(NormalizerSettings {
        currency: "CAD".into(),
        shipping_region: "FR".into(),
    });
    let record = normalizer
        .normalize(&fixture(include_str!("fixtures/listing_live.json")), &fallback())
        .unwrap();
    assert_eq!(record.shipping, Some(Money::new(18_000, "CAD")));
    assert_eq!(record.ships_to_region, Some(true));
}

#[test]
fn wrongly_typed_field_is_malformed() {
    let err = Normalizer::default()
        .normalize(&fixture(include_str!("fixtures/listing_malformed.json")), &fallback())
        .unwrap_err();
    assert!(matches!(err, SyncError::MalformedPayload { ref field, .. } if field == "name"));
}
