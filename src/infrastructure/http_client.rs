//! Rate limited JSON-over-HTTP client shared by the boundary adapters.
//!
//! Every failure is mapped onto [`TransportError`] so the core never sees
//! `reqwest` types.

use std::num::NonZeroU32;
use std::time::Duration;

use governor::{Quota, RateLimiter, clock::DefaultClock, state::{InMemoryState, direct::NotKeyed}};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, USER_AGENT};
use reqwest::{Client, Response, StatusCode};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::domain::errors::TransportError;

/// Longest response excerpt kept in an error message
const ERROR_BODY_LIMIT: usize = 200;

#[derive(Debug, Clone)]
pub struct HttpClientConfig {
    pub user_agent: String,
    pub timeout_seconds: u64,
    /// `None` disables client-side throttling
    pub max_requests_per_second: Option<u32>,
    pub default_headers: Vec<(String, String)>,
}

impl Default for HttpClientConfig {
    fn default() -> Self {
        Self {
            user_agent: concat!("listing-sync/", env!("CARGO_PKG_VERSION")).to_string(),
            timeout_seconds: 30,
            max_requests_per_second: None,
            default_headers: Vec::new(),
        }
    }
}

pub struct HttpClient {
    client: Client,
    rate_limiter: Option<RateLimiter<NotKeyed, InMemoryState, DefaultClock>>,
    config: HttpClientConfig,
}

impl HttpClient {
    pub fn new(config: HttpClientConfig) -> Result<Self, TransportError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&config.user_agent)
                .map_err(|e| TransportError::Network(format!("invalid user agent: {e}")))?,
        );
        for (name, value) in &config.default_headers {
            let name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|e| TransportError::Network(format!("invalid header name {name}: {e}")))?;
            let value = HeaderValue::from_str(value).map_err(|e| {
                TransportError::Network(format!("invalid header value for {name}: {e}"))
            })?;
            headers.insert(name, value);
        }

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .default_headers(headers)
            .build()
            .map_err(|e| TransportError::Network(format!("failed to create HTTP client: {e}")))?;

        let rate_limiter = config
            .max_requests_per_second
            .and_then(NonZeroU32::new)
            .map(|rate| RateLimiter::direct(Quota::per_second(rate)));

        Ok(Self {
            client,
            rate_limiter,
            config,
        })
    }

    pub fn config(&self) -> &HttpClientConfig {
        &self.config
    }

    /// GET `url` with `query` parameters and decode the JSON body.
    pub async fn get_json<T, Q>(&self, url: &str, query: &Q) -> Result<T, TransportError>
    where
        T: DeserializeOwned,
        Q: Serialize + ?Sized,
    {
        self.throttle().await;
        debug!("GET {}", url);
        let response = self
            .client
            .get(url)
            .query(query)
            .send()
            .await
            .map_err(classify)?;
        decode(check_status(response).await?).await
    }

    /// POST `body` as JSON to `url` and decode the JSON reply.
    pub async fn post_json<T, B>(&self, url: &str, body: &B) -> Result<T, TransportError>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        self.throttle().await;
        debug!("POST {}", url);
        let response = self
            .client
            .post(url)
            .json(body)
            .send()
            .await
            .map_err(classify)?;
        decode(check_status(response).await?).await
    }

    async fn throttle(&self) {
        if let Some(limiter) = &self.rate_limiter {
            limiter.until_ready().await;
        }
    }
}

async fn check_status(response: Response) -> Result<Response, TransportError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(status_error(status, &body))
}

async fn decode<T: DeserializeOwned>(response: Response) -> Result<T, TransportError> {
    let url = response.url().to_string();
    let bytes = response.bytes().await.map_err(classify)?;
    serde_json::from_slice(&bytes)
        .map_err(|e| TransportError::Decode(format!("unexpected response from {url}: {e}")))
}

/// Maps a non-success status onto the transport taxonomy.
pub fn status_error(status: StatusCode, body: &str) -> TransportError {
    let excerpt: String = body.trim().chars().take(ERROR_BODY_LIMIT).collect();
    let message = if excerpt.is_empty() {
        status.canonical_reason().unwrap_or("request failed").to_string()
    } else {
        excerpt
    };
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            TransportError::Authentication(format!("{}: {}", status.as_u16(), message))
        }
        StatusCode::REQUEST_TIMEOUT | StatusCode::GATEWAY_TIMEOUT => {
            TransportError::Timeout(format!("{}: {}", status.as_u16(), message))
        }
        _ => TransportError::http(status.as_u16(), message),
    }
}

fn classify(error: reqwest::Error) -> TransportError {
    if error.is_timeout() {
        TransportError::Timeout(error.to_string())
    } else if let Some(status) = error.status() {
        status_error(status, "")
    } else if error.is_decode() {
        TransportError::Decode(error.to_string())
    } else {
        TransportError::Network(error.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_builds_with_headers_and_rate() {
        let client = HttpClient::new(HttpClientConfig {
            max_requests_per_second: Some(2),
            default_headers: vec![("Accept-Version".into(), "3.0".into())],
            ..HttpClientConfig::default()
        })
        .unwrap();
        assert_eq!(client.config().max_requests_per_second, Some(2));
    }

    #[test]
    fn invalid_header_is_rejected() {
        let result = HttpClient::new(HttpClientConfig {
            default_headers: vec![("bad header".into(), "x".into())],
            ..HttpClientConfig::default()
        });
        assert!(result.is_err());
    }

    #[test]
    fn statuses_map_onto_the_taxonomy() {
        assert!(status_error(StatusCode::UNAUTHORIZED, "").is_authentication());
        assert!(status_error(StatusCode::FORBIDDEN, "denied").is_authentication());
        assert!(matches!(
            status_error(StatusCode::REQUEST_TIMEOUT, ""),
            TransportError::Timeout(_)
        ));
        let err = status_error(StatusCode::BAD_GATEWAY, "upstream down");
        assert_eq!(err.status(), Some(502));
        assert!(err.to_string().contains("upstream down"));
    }
}
