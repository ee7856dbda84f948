//! `riskfeed db` - schema lifecycle and maintenance

use riskfeed_common::ExitCode;
use riskfeed_ingest::endpoint;
use riskfeed_ingest::gateway::FlushTarget;

use crate::commands::{build_backends, load_config};
use crate::error::{CliError, Result};
use crate::{Cli, DbCommand};

pub async fn run(cli: &Cli, command: &DbCommand) -> Result<ExitCode> {
    let config = load_config(cli)?;
    let backends = build_backends(cli, &config).await?;

    match command {
        DbCommand::Init => {
            backends.gateway.init_schema().await?;
            println!(
                "Schema initialized ({} tables + collection state)",
                endpoint::CATALOG.len()
            );
            Ok(ExitCode::Success)
        }

        DbCommand::Status => {
            let status = backends.gateway.status().await?;
            if !status.connected {
                println!("Database: NOT CONNECTED");
                return Ok(ExitCode::DbConnectionFailed);
            }

            println!("Database: connected");
            println!("{:<32} {:>8} {:>12}", "table", "present", "rows");
            let mut missing = false;
            for table in &status.tables {
                println!(
                    "{:<32} {:>8} {:>12}",
                    table.table,
                    if table.present { "yes" } else { "NO" },
                    table
                        .row_count
                        .map(|n| n.to_string())
                        .unwrap_or_else(|| "-".to_string())
                );
                missing |= !table.present;
            }

            if missing {
                println!("Some tables are missing; run 'riskfeed db init'");
                Ok(ExitCode::DbSchemaMissing)
            } else {
                Ok(ExitCode::Success)
            }
        }

        DbCommand::Flush {
            table,
            all,
            include_state,
        } => {
            if *include_state && !*all {
                return Err(CliError::usage("--include-state requires --all"));
            }

            let deleted = match (table, all) {
                (Some(name), false) => {
                    backends.gateway.flush(FlushTarget::Table(name)).await?
                }
                (None, true) => backends.gateway.flush(FlushTarget::All).await?,
                (Some(_), true) => {
                    return Err(CliError::usage("--table and --all are mutually exclusive"));
                }
                (None, false) => {
                    return Err(CliError::usage("flush requires --table <NAME> or --all"));
                }
            };
            println!("Deleted {} rows", deleted);

            if *include_state {
                let cleared = backends.state.clear().await?;
                println!("Cleared {} collection state rows", cleared);
            }
            Ok(ExitCode::Success)
        }

        DbCommand::Clear => {
            let deleted = backends.gateway.flush(FlushTarget::All).await?;
            let cleared = backends.state.clear().await?;
            println!(
                "Deleted {} rows, cleared {} collection state rows",
                deleted, cleared
            );
            Ok(ExitCode::Success)
        }
    }
}
