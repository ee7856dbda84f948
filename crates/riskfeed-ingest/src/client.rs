//! Ratings API client
//!
//! Owns the single `reqwest::Client` for a run. Authentication is HTTP
//! Basic with the API key as username and a blank password. Transient
//! failures (connect/timeout errors, HTTP 429, HTTP 5xx) are retried with
//! bounded exponential backoff; everything else maps to a typed error.

use reqwest::Url;
use serde_json::{Map, Value};
use std::time::Duration;

use crate::config::{ApiConfig, RetryConfig};
use crate::endpoint::Pagination;
use crate::error::{IngestError, Result};

/// Endpoint used for connectivity/auth validation.
const VALIDATE_PATH: &str = "/ratings/v1/current-ratings";

/// Maximum response-body length carried into error messages.
const ERROR_BODY_PREVIEW: usize = 500;

/// Position inside an endpoint's pagination sequence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Position {
    /// Beginning of the sequence.
    Start,
    /// Numeric offset into an offset-paginated endpoint.
    Offset(i64),
    /// Opaque cursor token for a cursor-paginated endpoint.
    Cursor(String),
}

/// One fetched page.
#[derive(Debug, Clone)]
pub struct Page {
    pub results: Vec<Value>,
    pub next: Option<Position>,
}

/// Authenticated API client with retry/backoff.
pub struct ApiClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    page_limit: i64,
    retry: RetryConfig,
}

enum Attempt {
    Transient(IngestError),
    Fatal(IngestError),
}

impl ApiClient {
    pub fn new(api: &ApiConfig, retry: &RetryConfig) -> Result<Self> {
        let api_key = api
            .api_key
            .clone()
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| IngestError::config("API key missing"))?;

        let mut builder = reqwest::Client::builder()
            .timeout(Duration::from_secs(api.timeout_secs));

        if let Some(ref proxy_url) = api.proxy.url {
            let mut proxy = reqwest::Proxy::all(proxy_url)?;
            if let (Some(user), Some(pass)) = (&api.proxy.username, &api.proxy.password) {
                proxy = proxy.basic_auth(user, pass);
            }
            builder = builder.proxy(proxy);
        }

        Ok(Self {
            http: builder.build()?,
            base_url: api.base_url.trim_end_matches('/').to_string(),
            api_key,
            page_limit: api.page_limit,
            retry: retry.clone(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Fetch one page of a paginated JSON endpoint.
    pub async fn fetch_page(
        &self,
        path: &str,
        pagination: Pagination,
        position: &Position,
        extra: &[(String, String)],
    ) -> Result<Page> {
        let mut query: Vec<(String, String)> = Vec::new();

        match pagination {
            Pagination::Offset => {
                let offset = match position {
                    Position::Offset(n) => *n,
                    _ => 0,
                };
                query.push(("limit".to_string(), self.page_limit.to_string()));
                query.push(("offset".to_string(), offset.to_string()));
            }
            Pagination::Cursor => {
                query.push(("limit".to_string(), self.page_limit.to_string()));
                if let Position::Cursor(token) = position {
                    query.push(("cursor".to_string(), token.clone()));
                }
            }
            Pagination::None => {}
        }
        query.extend_from_slice(extra);

        let url = self.url(path);
        let response = self.get_with_retry(&url, &query, "application/json").await?;
        let body: Value = response.json().await?;

        let results = body
            .get("results")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();

        let next_link = body
            .pointer("/links/next")
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty());

        let next = parse_next_position(pagination, position, results.len(), next_link);

        Ok(Page { results, next })
    }

    /// Fetch a single-object endpoint.
    pub async fn fetch_object(
        &self,
        path: &str,
        extra: &[(String, String)],
    ) -> Result<Value> {
        let url = self.url(path);
        let response = self.get_with_retry(&url, extra, "application/json").await?;
        Ok(response.json().await?)
    }

    /// Fetch a CSV report endpoint; each row becomes a JSON object keyed
    /// by the CSV header.
    pub async fn fetch_csv(
        &self,
        path: &str,
        extra: &[(String, String)],
    ) -> Result<Vec<Value>> {
        let mut query = vec![("format".to_string(), "csv".to_string())];
        query.extend_from_slice(extra);

        let url = self.url(path);
        let response = self.get_with_retry(&url, &query, "text/csv").await?;
        let text = response.text().await?;

        csv_rows(&text)
    }

    /// Connectivity and authentication probe.
    pub async fn validate(&self) -> Result<()> {
        let query = vec![
            ("limit".to_string(), "1".to_string()),
            ("offset".to_string(), "0".to_string()),
        ];
        self.get_with_retry(&self.url(VALIDATE_PATH), &query, "application/json")
            .await?;
        Ok(())
    }

    async fn get_with_retry(
        &self,
        url: &str,
        query: &[(String, String)],
        accept: &str,
    ) -> Result<reqwest::Response> {
        let mut backoff = self.retry.initial_backoff_ms;
        let mut attempt: u32 = 0;

        loop {
            let error = match self.get_once(url, query, accept).await {
                Ok(response) => return Ok(response),
                Err(Attempt::Fatal(e)) => return Err(e),
                Err(Attempt::Transient(e)) => e,
            };

            if attempt >= self.retry.max_retries {
                return Err(error);
            }
            attempt += 1;

            tracing::warn!(
                url,
                attempt,
                backoff_ms = backoff,
                error = %error,
                "Transient API failure, backing off"
            );
            tokio::time::sleep(Duration::from_millis(backoff)).await;
            backoff = backoff.saturating_mul(2).min(self.retry.max_backoff_ms);
        }
    }

    async fn get_once(
        &self,
        url: &str,
        query: &[(String, String)],
        accept: &str,
    ) -> std::result::Result<reqwest::Response, Attempt> {
        tracing::debug!(url, "Requesting");

        let response = self
            .http
            .get(url)
            .basic_auth(&self.api_key, Some(""))
            .header(reqwest::header::ACCEPT, accept)
            .query(query)
            .send()
            .await
            .map_err(|e| {
                if e.is_connect() || e.is_timeout() {
                    Attempt::Transient(e.into())
                } else {
                    Attempt::Fatal(e.into())
                }
            })?;

        let status = response.status().as_u16();
        match status {
            200..=299 => Ok(response),
            401 => Err(Attempt::Fatal(IngestError::Unauthorized)),
            403 => Err(Attempt::Fatal(IngestError::Forbidden)),
            404 => Err(Attempt::Fatal(IngestError::NotFound(url.to_string()))),
            429 => Err(Attempt::Transient(IngestError::RateLimited {
                retries: self.retry.max_retries,
            })),
            500..=599 => {
                let body = preview(response.text().await.unwrap_or_default());
                Err(Attempt::Transient(IngestError::UnexpectedResponse {
                    status,
                    body,
                }))
            }
            _ => {
                let body = preview(response.text().await.unwrap_or_default());
                Err(Attempt::Fatal(IngestError::UnexpectedResponse {
                    status,
                    body,
                }))
            }
        }
    }
}

/// Derive the next position from a `links.next` value.
///
/// The API encodes continuation in the next URL's query string; some
/// responses carry a bare token instead of a full URL, which is used
/// verbatim for cursor endpoints.
fn parse_next_position(
    pagination: Pagination,
    current: &Position,
    results_len: usize,
    next_link: Option<&str>,
) -> Option<Position> {
    let link = next_link?;

    match pagination {
        Pagination::None => None,
        Pagination::Offset => {
            if let Some(offset) = query_param(link, "offset").and_then(|v| v.parse().ok()) {
                return Some(Position::Offset(offset));
            }
            let current_offset = match current {
                Position::Offset(n) => *n,
                _ => 0,
            };
            Some(Position::Offset(current_offset + results_len as i64))
        }
        Pagination::Cursor => {
            if let Some(token) = query_param(link, "cursor") {
                return Some(Position::Cursor(token));
            }
            Some(Position::Cursor(link.to_string()))
        }
    }
}

fn query_param(link: &str, name: &str) -> Option<String> {
    let url = Url::parse(link).ok()?;
    url.query_pairs()
        .find(|(k, _)| k == name)
        .map(|(_, v)| v.into_owned())
}

/// Parse CSV text into one JSON object per row, keyed by header.
fn csv_rows(text: &str) -> Result<Vec<Value>> {
    let mut reader = csv::Reader::from_reader(text.as_bytes());
    let headers = reader.headers()?.clone();

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record?;
        let mut object = Map::new();
        for (header, cell) in headers.iter().zip(record.iter()) {
            object.insert(header.to_string(), Value::String(cell.to_string()));
        }
        rows.push(Value::Object(object));
    }
    Ok(rows)
}

fn preview(body: String) -> String {
    if body.len() > ERROR_BODY_PREVIEW {
        let mut end = ERROR_BODY_PREVIEW;
        while !body.is_char_boundary(end) {
            end -= 1;
        }
        body[..end].to_string()
    } else {
        body
    }
}
