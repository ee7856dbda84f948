//! Riskfeed CLI Library
//!
//! Command-line surface for pulling BitSight security-ratings data into
//! PostgreSQL:
//!
//! - **Configuration**: manage credentials and targets (`riskfeed config`)
//! - **Schema lifecycle**: create and inspect tables (`riskfeed db`)
//! - **Ingestion**: run one endpoint or a group (`riskfeed ingest`,
//!   `riskfeed ingest-group`)
//! - **Introspection**: endpoint catalog, row counts, per-endpoint progress,
//!   connectivity (`riskfeed show`, `stats`, `status`, `health`)

pub mod commands;
pub mod error;

// Re-export commonly used types
pub use error::{CliError, Result};

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Riskfeed - security-ratings API to PostgreSQL ingestion
#[derive(Parser, Debug)]
#[command(name = "riskfeed")]
#[command(author, version, about, long_about = None)]
#[command(arg_required_else_help = true)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,

    /// Verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Emit logs as JSON
    #[arg(long, global = true)]
    pub json_logs: bool,

    /// Run against in-memory storage; no database writes
    #[arg(long, global = true)]
    pub dry_run: bool,

    /// Config file path (defaults to ~/.riskfeed/config.json)
    #[arg(long, env = "RISKFEED_CONFIG", global = true)]
    pub config: Option<PathBuf>,
}

/// Available CLI commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Manage configuration
    Config {
        #[command(subcommand)]
        command: ConfigCommand,
    },

    /// Database schema lifecycle and maintenance
    Db {
        #[command(subcommand)]
        command: DbCommand,
    },

    /// Ingest one endpoint
    Ingest {
        /// Endpoint name (see 'riskfeed show')
        endpoint: String,

        /// Only pull records changed on or after this date (YYYY-MM-DD)
        #[arg(long)]
        since: Option<String>,

        /// Company scope for per-company endpoints
        #[arg(long)]
        company_guid: Option<String>,

        /// Ignore stored progress and re-pull from the beginning
        #[arg(long)]
        backfill: bool,

        /// Abort the run on the first record that fails to map
        #[arg(long)]
        strict: bool,
    },

    /// Ingest every endpoint of a group
    IngestGroup {
        /// Group name: core, security, or all
        group: String,

        /// Only pull records changed on or after this date (YYYY-MM-DD)
        #[arg(long)]
        since: Option<String>,

        /// Company scope for per-company endpoints
        #[arg(long)]
        company_guid: Option<String>,

        /// Ignore stored progress and re-pull from the beginning
        #[arg(long)]
        backfill: bool,

        /// Abort a run on the first record that fails to map
        #[arg(long)]
        strict: bool,
    },

    /// List the endpoint catalog
    Show,

    /// Row counts per destination table
    Stats,

    /// Per-endpoint collection state (last run, position, outcome)
    Status,

    /// Check API and database connectivity
    Health,

    /// Exit cleanly (kept for operators scripting the interactive wrapper)
    #[command(alias = "quit", hide = true)]
    Exit,
}

/// Configuration subcommands
#[derive(Subcommand, Debug)]
pub enum ConfigCommand {
    /// Create a default config file
    Init,

    /// Show the effective configuration (secrets redacted)
    Show,

    /// Set configuration values
    Set {
        /// Ratings API key
        #[arg(long)]
        api_key: Option<String>,

        /// Ratings API base URL
        #[arg(long)]
        base_url: Option<String>,

        /// HTTP timeout in seconds
        #[arg(long)]
        timeout: Option<u64>,

        /// Page size for paginated endpoints
        #[arg(long)]
        page_limit: Option<i64>,

        /// HTTP(S) proxy URL
        #[arg(long)]
        proxy_url: Option<String>,

        /// Proxy username
        #[arg(long)]
        proxy_username: Option<String>,

        /// Proxy password
        #[arg(long)]
        proxy_password: Option<String>,

        /// PostgreSQL connection URL
        #[arg(long)]
        database_url: Option<String>,
    },

    /// Validate the stored configuration
    Validate,

    /// Delete the config file
    Reset,

    /// Remove secrets from the config file, keep everything else
    ClearKeys,
}

/// Database subcommands
#[derive(Subcommand, Debug)]
pub enum DbCommand {
    /// Create all tables (guarded; safe to re-run)
    Init,

    /// Connectivity and presence of each expected table
    Status,

    /// Delete rows from one or all ingestible tables
    Flush {
        /// Table to flush
        #[arg(long)]
        table: Option<String>,

        /// Flush every ingestible table
        #[arg(long)]
        all: bool,

        /// Also clear collection state (only with --all)
        #[arg(long)]
        include_state: bool,
    },

    /// Empty every ingestible table and clear collection state
    Clear,
}
