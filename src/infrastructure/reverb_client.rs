//! Reverb marketplace adapter.
//!
//! Search pages are pulled lazily: the next page is requested only when the
//! consumer has drained the previous one.

#![allow(clippy::uninlined_format_args)]

use async_trait::async_trait;
use futures::stream::{self, BoxStream, StreamExt, TryStreamExt};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, info};

use crate::domain::errors::TransportError;
use crate::domain::listing::RawPayload;
use crate::domain::repositories::ListingSource;
use crate::infrastructure::config::{MarketplaceConfig, defaults};
use crate::infrastructure::http_client::{HttpClient, HttpClientConfig};

static LISTING_SLUG: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"/item/([^/?#]+)$").expect("valid slug regex"));

const LISTING_HOST_MARKER: &str = "reverb.com/item/";

#[derive(Debug, Deserialize)]
struct SearchPage {
    #[serde(default)]
    listings: Vec<Value>,
    #[serde(default)]
    total_pages: Option<u32>,
    #[serde(default)]
    total: Option<u64>,
}

/// Listing slug (`<id>-<title>`) of a marketplace URL.
pub fn listing_slug(url: &str) -> Option<&str> {
    let trimmed = url.split(['?', '#']).next().unwrap_or(url).trim_end_matches('/');
    LISTING_SLUG
        .captures(trimmed)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str())
}

pub struct ReverbListingSource {
    http: HttpClient,
    api_base: String,
    per_page: u32,
    max_pages: Option<u32>,
}

impl ReverbListingSource {
    pub fn new(config: &MarketplaceConfig) -> Result<Self, TransportError> {
        let http = HttpClient::new(HttpClientConfig {
            user_agent: config.user_agent.clone(),
            timeout_seconds: config.request_timeout_secs,
            max_requests_per_second: Some(config.requests_per_second),
            default_headers: vec![
                ("Accept".into(), "application/hal+json".into()),
                ("Accept-Version".into(), "3.0".into()),
                ("X-Display-Currency".into(), config.currency.to_ascii_uppercase()),
            ],
        })?;
        Ok(Self {
            http,
            api_base: config.api_base.trim_end_matches('/').to_string(),
            per_page: config.per_page.clamp(1, defaults::MAX_PER_PAGE),
            max_pages: config.max_pages,
        })
    }

    fn search_params(
        &self,
        query: &str,
        category: Option<&str>,
        page: u32,
    ) -> Vec<(&'static str, String)> {
        let mut params = vec![
            ("query", query.to_string()),
            ("per_page", self.per_page.to_string()),
            ("page", page.to_string()),
        ];
        if let Some(category) = category.filter(|c| !c.is_empty()) {
            params.push(("product_type", category.to_string()));
        }
        params
    }

    /// Last page to request given what the API reported.
    fn last_page(&self, total_pages: Option<u32>) -> u32 {
        let reported = total_pages.unwrap_or(1).max(1);
        match self.max_pages {
            Some(max) => reported.min(max.max(1)),
            None => reported,
        }
    }

    async fn fetch_page(
        &self,
        query: &str,
        category: Option<&str>,
        page: u32,
    ) -> Result<SearchPage, TransportError> {
        let url = format!("{}/listings", self.api_base);
        let params = self.search_params(query, category, page);
        let body: SearchPage = self.http.get_json(&url, &params).await?;
        if page == 1 {
            info!(
                "🔍 Search \"{}\": {} result(s), {} page(s)",
                query,
                body.total.unwrap_or(body.listings.len() as u64),
                body.total_pages.unwrap_or(1)
            );
        } else {
            debug!("Search \"{}\" page {}: {} listing(s)", query, page, body.listings.len());
        }
        Ok(body)
    }
}

#[async_trait]
impl ListingSource for ReverbListingSource {
    fn search<'a>(
        &'a self,
        query: &'a str,
        category: Option<&'a str>,
    ) -> BoxStream<'a, Result<RawPayload, TransportError>> {
        // state: (next page, last page once known)
        stream::try_unfold((1_u32, None::<u32>), move |(page, last)| async move {
            if last.is_some_and(|last| page > last) {
                return Ok(None);
            }
            let body = self.fetch_page(query, category, page).await?;
            let last = last.unwrap_or_else(|| self.last_page(body.total_pages));
            let next = if body.listings.is_empty() { last + 1 } else { page + 1 };
            let payloads: Vec<RawPayload> =
                body.listings.into_iter().map(RawPayload::new).collect();
            Ok::<_, TransportError>(Some((payloads, (next, Some(last)))))
        })
        .map_ok(|payloads| stream::iter(payloads.into_iter().map(Ok::<RawPayload, TransportError>)))
        .try_flatten()
        .boxed()
    }

    async fn fetch_one(&self, url: &str) -> Result<RawPayload, TransportError> {
        let slug = listing_slug(url)
            .ok_or_else(|| TransportError::Rejected(format!("not a listing URL: {}", url)))?;
        let api_url = format!("{}/listings/{}", self.api_base, slug);
        let body: Value = self.http.get_json(&api_url, &[] as &[(&str, &str)]).await?;
        let mut payload = RawPayload::new(body);
        if payload.at(&["url"]).is_none() {
            payload.insert("url", Value::String(url.to_string()));
        }
        Ok(payload)
    }

    fn handles(&self, url: &str) -> bool {
        url.contains(LISTING_HOST_MARKER) && listing_slug(url).is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn source(max_pages: Option<u32>) -> ReverbListingSource {
        ReverbListingSource::new(&MarketplaceConfig {
            max_pages,
            ..MarketplaceConfig::default()
        })
        .unwrap()
    }

    #[rstest]
    #[case("https://reverb.com/item/94370297-godin-stadium-ht", Some("94370297-godin-stadium-ht"))]
    #[case("https://reverb.com/item/94370297-godin-stadium-ht/", Some("94370297-godin-stadium-ht"))]
    #[case("https://reverb.com/item/1-a?utm_source=x", Some("1-a"))]
    #[case("https://reverb.com/shop/some-shop", None)]
    #[case("", None)]
    fn slugs_come_from_the_item_segment(#[case] url: &str, #[case] expected: Option<&str>) {
        assert_eq!(listing_slug(url), expected);
    }

    #[test]
    fn only_listing_urls_are_handled() {
        let source = source(None);
        assert!(source.handles("https://reverb.com/item/1-a"));
        assert!(!source.handles("https://example.com/item/1-a"));
        assert!(!source.handles("manual entry"));
    }

    #[test]
    fn category_is_sent_as_product_type() {
        let source = source(None);
        let params = source.search_params("godin", Some("electric-guitars"), 2);
        assert!(params.contains(&("page", "2".to_string())));
        assert!(params.contains(&("per_page", "50".to_string())));
        assert!(params.contains(&("product_type", "electric-guitars".to_string())));
        assert!(!source.search_params("godin", None, 1).iter().any(|(k, _)| *k == "product_type"));
    }

    #[test]
    fn max_pages_bounds_the_reported_total() {
        assert_eq!(source(None).last_page(Some(7)), 7);
        assert_eq!(source(Some(3)).last_page(Some(7)), 3);
        assert_eq!(source(Some(3)).last_page(None), 1);
    }

    #[tokio::test]
    async fn fetch_one_rejects_non_listing_urls() {
        let err = source(None).fetch_one("https://reverb.com/shop/x").await.unwrap_err();
        assert!(matches!(err, TransportError::Rejected(_)));
    }
}
