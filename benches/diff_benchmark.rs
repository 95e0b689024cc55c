//! Differ and normalizer throughput on a realistic listing

use criterion::{Criterion, black_box, criterion_group, criterion_main};
use serde_json::json;

use listing_sync_lib::application::differ::diff;
use listing_sync_lib::application::normalizer::Normalizer;
use listing_sync_lib::domain::{
    CanonicalRecord, Money, RawPayload, RecordId, SubjectKey, SystemRecord,
};

fn payload(views: u64) -> RawPayload {
    RawPayload::new(json!({
        "title": "Godin Stadium HT Trans Black",
        "make": "Godin",
        "model": "Stadium HT",
        "year": "2021",
        "condition": {"display_name": "Excellent"},
        "price": {"amount": "1,849.00", "currency": "CAD"},
        "state": {"slug": "live"},
        "offers_enabled": true,
        "published_at": "2024-03-02T09:00:00-05:00",
        "shop_name": "Montreal Guitar Exchange",
        "location": {"display_location": "Montreal, QC"},
        "description": "<p>Lightly played.</p><ul><li>Original case</li><li>Setup done</li></ul>",
        "stats": {"views": views, "watches": 17},
        "categories": [{"full_name": "Electric Guitars / Solid Body"}],
        "shipping": {"rates": [{"region_code": "CA", "rate": {"amount": "45.00"}}]},
        "_links": {"web": {"href": "https://reverb.com/item/94370297-godin-stadium-ht"}},
    }))
}

fn normalized(views: u64) -> CanonicalRecord {
    Normalizer::default()
        .normalize(&payload(views), &Money::new(25_000, "CAD"))
        .unwrap()
}

fn diff_benchmarks(c: &mut Criterion) {
    let stored = SystemRecord::new(RecordId(1), SubjectKey(1)).apply(&diff(None, &normalized(400)));
    let unchanged = normalized(400);
    let changed = normalized(412);

    c.bench_function("diff create payload", |b| b.iter(|| diff(None, black_box(&unchanged))));
    c.bench_function("diff unchanged record", |b| {
        b.iter(|| diff(Some(black_box(&stored)), black_box(&unchanged)))
    });
    c.bench_function("diff counter bump", |b| {
        b.iter(|| diff(Some(black_box(&stored)), black_box(&changed)))
    });
}

fn normalize_benchmark(c: &mut Criterion) {
    let normalizer = Normalizer::default();
    let raw = payload(412);
    let shipping = Money::new(25_000, "CAD");
    c.bench_function("normalize listing", |b| {
        b.iter(|| normalizer.normalize(black_box(&raw), &shipping))
    });
}

criterion_group!(benches, diff_benchmarks, normalize_benchmark);
criterion_main!(benches);
