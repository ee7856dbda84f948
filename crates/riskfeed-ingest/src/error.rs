//! Error types for ingestion operations

use thiserror::Error;

/// Result type alias for ingest operations
pub type Result<T> = std::result::Result<T, IngestError>;

/// Errors surfaced by the ingest library.
///
/// Transient transport conditions (connect failures, timeouts, HTTP 429,
/// HTTP 5xx) are retried inside the API client; what escapes here is either
/// non-retryable or already past the retry budget.
#[derive(Error, Debug)]
pub enum IngestError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("API request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("API returned 401 Unauthorized: check the configured API key")]
    Unauthorized,

    #[error("API returned 403 Forbidden: the API key is not entitled to this endpoint")]
    Forbidden,

    #[error("API resource not found: {0}")]
    NotFound(String),

    #[error("API rate limit still exceeded after {retries} retries")]
    RateLimited { retries: u32 },

    #[error("Unexpected API response (HTTP {status}): {body}")]
    UnexpectedResponse { status: u16, body: String },

    #[error("Response decode error: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("CSV decode error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Mapping failed for endpoint '{endpoint}' record '{identifier}': {reason}")]
    Mapping {
        endpoint: String,
        identifier: String,
        reason: String,
    },

    #[error("Unknown endpoint: '{0}'. Run 'riskfeed show' to list available endpoints.")]
    UnknownEndpoint(String),

    #[error("Unknown table: '{0}'. Run 'riskfeed show' to list ingestible tables.")]
    UnknownTable(String),

    #[error("Endpoint '{0}' requires --company-guid")]
    CompanyGuidRequired(String),

    #[error("Endpoint '{0}' does not support --since")]
    SinceUnsupported(String),
}

impl IngestError {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    pub fn mapping(
        endpoint: impl Into<String>,
        identifier: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::Mapping {
            endpoint: endpoint.into(),
            identifier: identifier.into(),
            reason: reason.into(),
        }
    }
}
