//! CLI command implementations
//!
//! Each subcommand has its own module with a `run` function returning the
//! process exit code. Shared construction of config, backends, and the
//! engine lives here.

pub mod config;
pub mod db;
pub mod health;
pub mod ingest;
pub mod show;
pub mod stats;
pub mod status;

use std::sync::Arc;

use riskfeed_ingest::client::ApiClient;
use riskfeed_ingest::config::AppConfig;
use riskfeed_ingest::db::create_pool;
use riskfeed_ingest::gateway::{MemoryGateway, PgGateway, StorageGateway};
use riskfeed_ingest::state::{MemoryStateStore, PgStateStore, StateStore};

use crate::error::Result;
use crate::Cli;

/// Storage and state backends for one command invocation.
pub struct Backends {
    pub gateway: Arc<dyn StorageGateway>,
    pub state: Arc<dyn StateStore>,
}

/// Load, overlay, and validate configuration. Fails fast before any
/// network or database call.
pub fn load_config(cli: &Cli) -> Result<AppConfig> {
    let config = AppConfig::load(cli.config.as_deref())?;
    config.validate()?;
    Ok(config)
}

/// Build the API client; requires a configured key.
pub fn build_client(config: &AppConfig) -> Result<ApiClient> {
    config.require_api_key()?;
    Ok(ApiClient::new(&config.api, &config.retry)?)
}

/// Build storage backends: Postgres normally, in-memory under `--dry-run`.
pub async fn build_backends(cli: &Cli, config: &AppConfig) -> Result<Backends> {
    if cli.dry_run {
        let gateway = Arc::new(MemoryGateway::new());
        gateway.init_schema().await?;
        return Ok(Backends {
            gateway,
            state: Arc::new(MemoryStateStore::new()),
        });
    }

    let url = config.require_database_url()?;
    let pool = create_pool(&config.database, url).await?;
    Ok(Backends {
        gateway: Arc::new(PgGateway::new(pool.clone())),
        state: Arc::new(PgStateStore::new(pool)),
    })
}
