use anyhow::{Context, Result};
use reqwest::{Client, Method};
use serde_json::Value;
use std::time::Duration;
use syncarr_models::{Activity, CatalogItem, Library};
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, trace};

use crate::error::CatalogError;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Spaces requests so no more than `per_second` leave this client.
pub(crate) struct RateLimiter {
    min_interval: Duration,
    next_slot: Mutex<Instant>,
}

impl RateLimiter {
    pub(crate) fn new(per_second: f64) -> Self {
        let min_interval = if per_second > 0.0 {
            Duration::from_secs_f64(1.0 / per_second)
        } else {
            Duration::ZERO
        };
        Self {
            min_interval,
            next_slot: Mutex::new(Instant::now()),
        }
    }

    pub(crate) async fn acquire(&self) {
        let mut next_slot = self.next_slot.lock().await;
        let now = Instant::now();
        if *next_slot > now {
            tokio::time::sleep_until(*next_slot).await;
        }
        *next_slot = (*next_slot).max(now) + self.min_interval;
    }
}

/// HTTP layer: auth headers, rate limiting, status checking and JSON decoding.
pub struct PlexHttpClient {
    client: Client,
    base_url: String,
    limiter: RateLimiter,
}

impl PlexHttpClient {
    pub fn new(base_url: &str, token: &str, requests_per_second: f64) -> Result<Self> {
        let client = Client::builder()
            .default_headers({
                let mut headers = reqwest::header::HeaderMap::new();
                headers.insert(
                    reqwest::header::ACCEPT,
                    reqwest::header::HeaderValue::from_static("application/json"),
                );
                headers.insert(
                    reqwest::header::HeaderName::from_static("x-plex-token"),
                    reqwest::header::HeaderValue::from_str(token).context("Invalid token format")?,
                );
                headers.insert(
                    reqwest::header::HeaderName::from_static("x-plex-client-identifier"),
                    reqwest::header::HeaderValue::from_static("syncarr"),
                );
                headers
            })
            .timeout(REQUEST_TIMEOUT)
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            limiter: RateLimiter::new(requests_per_second),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn send(&self, method: Method, path: &str) -> Result<reqwest::Response, CatalogError> {
        self.limiter.acquire().await;

        let url = format!("{}{}", self.base_url, path);
        trace!(method = %method, url = %url, "Plex API request");

        let response = self
            .client
            .request(method.clone(), &url)
            .send()
            .await
            .map_err(|source| CatalogError::Http {
                path: path.to_string(),
                source,
            })?;

        let status = response.status();
        if status.is_success() {
            Ok(response)
        } else {
            let body = response.text().await.unwrap_or_default();
            Err(CatalogError::Status {
                method: method.to_string(),
                path: path.to_string(),
                status: status.as_u16(),
                body,
            })
        }
    }

    /// GET and return the `MediaContainer` object.
    pub async fn get_container(&self, path: &str) -> Result<Value, CatalogError> {
        let response = self.send(Method::GET, path).await?;
        let text = response.text().await.map_err(|source| CatalogError::Http {
            path: path.to_string(),
            source,
        })?;
        let mut json: Value = serde_json::from_str(&text).map_err(|source| CatalogError::Decode {
            path: path.to_string(),
            source,
        })?;
        Ok(json
            .get_mut("MediaContainer")
            .map(Value::take)
            .unwrap_or(Value::Null))
    }

    pub async fn get(&self, path: &str) -> Result<(), CatalogError> {
        self.send(Method::GET, path).await.map(|_| ())
    }

    pub async fn put(&self, path: &str) -> Result<(), CatalogError> {
        self.send(Method::PUT, path).await.map(|_| ())
    }
}

fn take_array(container: &mut Value, field: &str) -> Vec<Value> {
    match container.get_mut(field).map(Value::take) {
        Some(Value::Array(entries)) => entries,
        _ => Vec::new(),
    }
}

/// Decode `Metadata[]`, skipping entries that are not works, series or episodes.
pub(crate) fn parse_items(mut container: Value, context: &str) -> Vec<CatalogItem> {
    let entries = take_array(&mut container, "Metadata");
    let total = entries.len();
    let mut skipped = 0;

    let items: Vec<CatalogItem> = entries
        .into_iter()
        .filter_map(|entry| {
            let title = entry
                .get("title")
                .and_then(|t| t.as_str())
                .unwrap_or("unknown")
                .to_string();
            match serde_json::from_value::<CatalogItem>(entry) {
                Ok(item) => Some(item),
                Err(e) => {
                    skipped += 1;
                    if skipped <= 3 {
                        debug!("Plex {}: skipped '{}': {}", context, title, e);
                    }
                    None
                }
            }
        })
        .collect();

    if skipped > 0 {
        debug!("Plex {}: skipped {} of {} entries that couldn't be parsed", context, skipped, total);
    }
    items
}

pub(crate) fn parse_libraries(mut container: Value) -> Vec<Library> {
    take_array(&mut container, "Directory")
        .into_iter()
        .filter_map(|entry| serde_json::from_value::<Library>(entry).ok())
        .collect()
}

pub(crate) fn parse_activities(mut container: Value) -> Vec<Activity> {
    take_array(&mut container, "Activity")
        .into_iter()
        .map(|entry| {
            let section = entry
                .get("Context")
                .and_then(|c| c.get("librarySectionID"))
                .and_then(|id| match id {
                    Value::String(s) => Some(s.clone()),
                    Value::Number(n) => Some(n.to_string()),
                    _ => None,
                });
            Activity {
                kind: entry.get("type").and_then(|t| t.as_str()).unwrap_or_default().to_string(),
                title: entry.get("title").and_then(|t| t.as_str()).unwrap_or_default().to_string(),
                progress: entry.get("progress").and_then(|p| p.as_f64()),
                library_section_id: section,
            }
        })
        .collect()
}
