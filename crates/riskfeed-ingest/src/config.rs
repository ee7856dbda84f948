//! Configuration management
//!
//! Configuration is layered: built-in defaults, then the JSON config file
//! (`~/.riskfeed/config.json` unless `RISKFEED_CONFIG` points elsewhere),
//! then environment variables. Validation runs before any network or
//! database call so that bad configuration fails fast with no state
//! mutation.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{IngestError, Result};

// ============================================================================
// Configuration Constants
// ============================================================================

/// Default ratings API base URL.
pub const DEFAULT_BASE_URL: &str = "https://api.bitsighttech.com";

/// Default HTTP timeout in seconds.
pub const DEFAULT_TIMEOUT_SECS: u64 = 60;

/// Default page size requested from paginated endpoints.
pub const DEFAULT_PAGE_LIMIT: i64 = 100;

/// Default maximum database connections in the pool.
pub const DEFAULT_DATABASE_MAX_CONNECTIONS: u32 = 10;

/// Default minimum database connections in the pool.
pub const DEFAULT_DATABASE_MIN_CONNECTIONS: u32 = 2;

/// Default database connection timeout in seconds.
pub const DEFAULT_DATABASE_CONNECT_TIMEOUT_SECS: u64 = 10;

/// Default database idle timeout in seconds (10 minutes).
pub const DEFAULT_DATABASE_IDLE_TIMEOUT_SECS: u64 = 600;

/// Default bounded retry budget for transient API failures.
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Default initial retry backoff in milliseconds.
pub const DEFAULT_INITIAL_BACKOFF_MS: u64 = 500;

/// Default backoff ceiling in milliseconds.
pub const DEFAULT_MAX_BACKOFF_MS: u64 = 30_000;

/// HTTP(S) proxy configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ProxyConfig {
    pub url: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
}

/// Ratings API configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ApiConfig {
    pub api_key: Option<String>,
    pub base_url: String,
    pub timeout_secs: u64,
    pub page_limit: i64,
    pub proxy: ProxyConfig,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            page_limit: DEFAULT_PAGE_LIMIT,
            proxy: ProxyConfig::default(),
        }
    }
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct DatabaseConfig {
    pub url: Option<String>,
    pub max_connections: u32,
    pub min_connections: u32,
    pub connect_timeout_secs: u64,
    pub idle_timeout_secs: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: None,
            max_connections: DEFAULT_DATABASE_MAX_CONNECTIONS,
            min_connections: DEFAULT_DATABASE_MIN_CONNECTIONS,
            connect_timeout_secs: DEFAULT_DATABASE_CONNECT_TIMEOUT_SECS,
            idle_timeout_secs: DEFAULT_DATABASE_IDLE_TIMEOUT_SECS,
        }
    }
}

/// Retry/backoff policy for transient API failures
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct RetryConfig {
    pub max_retries: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            initial_backoff_ms: DEFAULT_INITIAL_BACKOFF_MS,
            max_backoff_ms: DEFAULT_MAX_BACKOFF_MS,
        }
    }
}

/// Top-level application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct AppConfig {
    pub api: ApiConfig,
    pub database: DatabaseConfig,
    pub retry: RetryConfig,
}

impl AppConfig {
    /// Load configuration: defaults, config file, then environment.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        dotenvy::dotenv().ok();

        let store = match path {
            Some(p) => ConfigStore::at(p),
            None => ConfigStore::default_location(),
        };

        let mut config = store.load()?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Overlay environment variables onto the current values.
    ///
    /// Recognized variables: `RISKFEED_API_KEY`, `RISKFEED_BASE_URL`,
    /// `RISKFEED_TIMEOUT_SECS`, `RISKFEED_PAGE_LIMIT`, `RISKFEED_PROXY_URL`,
    /// `RISKFEED_PROXY_USERNAME`, `RISKFEED_PROXY_PASSWORD`, `DATABASE_URL`,
    /// `RISKFEED_MAX_RETRIES`, `RISKFEED_INITIAL_BACKOFF_MS`.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(key) = std::env::var("RISKFEED_API_KEY") {
            self.api.api_key = Some(key);
        }
        if let Ok(url) = std::env::var("RISKFEED_BASE_URL") {
            self.api.base_url = url;
        }
        if let Ok(timeout) = std::env::var("RISKFEED_TIMEOUT_SECS") {
            if let Ok(secs) = timeout.parse() {
                self.api.timeout_secs = secs;
            }
        }
        if let Ok(limit) = std::env::var("RISKFEED_PAGE_LIMIT") {
            if let Ok(n) = limit.parse() {
                self.api.page_limit = n;
            }
        }
        if let Ok(url) = std::env::var("RISKFEED_PROXY_URL") {
            self.api.proxy.url = Some(url);
        }
        if let Ok(user) = std::env::var("RISKFEED_PROXY_USERNAME") {
            self.api.proxy.username = Some(user);
        }
        if let Ok(pass) = std::env::var("RISKFEED_PROXY_PASSWORD") {
            self.api.proxy.password = Some(pass);
        }
        if let Ok(url) = std::env::var("DATABASE_URL") {
            self.database.url = Some(url);
        }
        if let Ok(retries) = std::env::var("RISKFEED_MAX_RETRIES") {
            if let Ok(n) = retries.parse() {
                self.retry.max_retries = n;
            }
        }
        if let Ok(backoff) = std::env::var("RISKFEED_INITIAL_BACKOFF_MS") {
            if let Ok(ms) = backoff.parse() {
                self.retry.initial_backoff_ms = ms;
            }
        }
    }

    /// Structural validation; does not touch the network or the database.
    pub fn validate(&self) -> Result<()> {
        if !self.api.base_url.starts_with("http://") && !self.api.base_url.starts_with("https://")
        {
            return Err(IngestError::config(format!(
                "base_url must start with http:// or https:// (got '{}')",
                self.api.base_url
            )));
        }
        if self.api.timeout_secs == 0 {
            return Err(IngestError::config("timeout_secs must be greater than 0"));
        }
        if self.api.page_limit <= 0 {
            return Err(IngestError::config("page_limit must be greater than 0"));
        }

        if let Some(ref proxy_url) = self.api.proxy.url {
            if !proxy_url.starts_with("http://") && !proxy_url.starts_with("https://") {
                return Err(IngestError::config(
                    "proxy.url must start with http:// or https://",
                ));
            }
        }
        if self.api.proxy.url.is_none()
            && (self.api.proxy.username.is_some() || self.api.proxy.password.is_some())
        {
            return Err(IngestError::config(
                "proxy credentials provided but proxy.url is missing",
            ));
        }
        if self.api.proxy.username.is_some() != self.api.proxy.password.is_some() {
            return Err(IngestError::config(
                "proxy.username and proxy.password must be provided together",
            ));
        }

        if self.database.max_connections == 0 {
            return Err(IngestError::config(
                "database.max_connections must be greater than 0",
            ));
        }
        if self.database.min_connections > self.database.max_connections {
            return Err(IngestError::config(format!(
                "database.min_connections ({}) cannot be greater than max_connections ({})",
                self.database.min_connections, self.database.max_connections
            )));
        }

        Ok(())
    }

    /// Validation for commands that talk to the API.
    pub fn require_api_key(&self) -> Result<&str> {
        self.api
            .api_key
            .as_deref()
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| {
                IngestError::config(
                    "API key not configured. Set RISKFEED_API_KEY or run \
                     'riskfeed config set --api-key <KEY>'",
                )
            })
    }

    /// Validation for commands that talk to the database.
    pub fn require_database_url(&self) -> Result<&str> {
        self.database
            .url
            .as_deref()
            .filter(|u| !u.trim().is_empty())
            .ok_or_else(|| {
                IngestError::config(
                    "Database URL not configured. Set DATABASE_URL or run \
                     'riskfeed config set --database-url <URL>'",
                )
            })
    }
}

/// Reads and writes the JSON config file.
#[derive(Debug, Clone)]
pub struct ConfigStore {
    path: PathBuf,
}

impl ConfigStore {
    /// Store at an explicit path.
    pub fn at(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Store at `$RISKFEED_CONFIG`, falling back to `~/.riskfeed/config.json`.
    pub fn default_location() -> Self {
        if let Ok(path) = std::env::var("RISKFEED_CONFIG") {
            return Self::at(path);
        }
        let base = dirs::home_dir().unwrap_or_else(|| PathBuf::from("."));
        Self::at(base.join(".riskfeed").join("config.json"))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    /// Load the stored config; absent file yields defaults.
    pub fn load(&self) -> Result<AppConfig> {
        if !self.path.exists() {
            return Ok(AppConfig::default());
        }

        let data = std::fs::read_to_string(&self.path).map_err(|e| {
            IngestError::config(format!(
                "cannot read config file {}: {}",
                self.path.display(),
                e
            ))
        })?;

        serde_json::from_str(&data).map_err(|e| {
            IngestError::config(format!(
                "config file {} is not valid JSON: {}",
                self.path.display(),
                e
            ))
        })
    }

    pub fn save(&self, config: &AppConfig) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                IngestError::config(format!(
                    "cannot create config directory {}: {}",
                    parent.display(),
                    e
                ))
            })?;
        }

        let payload = serde_json::to_string_pretty(config)?;
        std::fs::write(&self.path, payload).map_err(|e| {
            IngestError::config(format!(
                "cannot write config file {}: {}",
                self.path.display(),
                e
            ))
        })?;

        Ok(())
    }

    pub fn reset(&self) -> Result<()> {
        if self.path.exists() {
            std::fs::remove_file(&self.path).map_err(|e| {
                IngestError::config(format!(
                    "cannot remove config file {}: {}",
                    self.path.display(),
                    e
                ))
            })?;
        }
        Ok(())
    }

    /// Strip secrets from the stored file, keeping everything else.
    pub fn clear_keys(&self) -> Result<()> {
        let mut config = self.load()?;
        config.api.api_key = None;
        config.api.proxy.password = None;
        self.save(&config)
    }
}
