//! `riskfeed health` - API and database connectivity probe

use riskfeed_common::ExitCode;
use riskfeed_ingest::db;

use crate::commands::{build_client, load_config};
use crate::error::{ingest_exit_code, Result};
use crate::Cli;

pub async fn run(cli: &Cli) -> Result<ExitCode> {
    let config = load_config(cli)?;

    let client = build_client(&config)?;
    match client.validate().await {
        Ok(()) => println!("API: OK"),
        Err(error) => {
            println!("API: FAILED ({})", error);
            return Ok(ingest_exit_code(&error));
        }
    }

    if cli.dry_run {
        println!("Database: skipped (--dry-run)");
        return Ok(ExitCode::Success);
    }

    let url = config.require_database_url()?;
    let pool = match db::create_pool(&config.database, url).await {
        Ok(pool) => pool,
        Err(error) => {
            println!("Database: FAILED ({})", error);
            return Ok(ExitCode::DbConnectionFailed);
        }
    };
    match db::ping(&pool).await {
        Ok(()) => println!("Database: OK"),
        Err(error) => {
            println!("Database: FAILED ({})", error);
            return Ok(ExitCode::DbConnectionFailed);
        }
    }

    Ok(ExitCode::Success)
}
