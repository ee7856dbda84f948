//! Riskfeed CLI - Main entry point

use clap::Parser;
use riskfeed_cli::commands::ingest::IngestArgs;
use riskfeed_cli::{Cli, Commands};
use riskfeed_common::logging::{init_logging, LogConfig, LogFormat, LogLevel};
use riskfeed_common::ExitCode;
use std::process;
use tracing::error;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Environment first, then command-line flags win
    let mut log_config = LogConfig::from_env().unwrap_or_default();
    log_config.log_file_prefix = "riskfeed".to_string();
    if cli.verbose {
        log_config.level = LogLevel::Debug;
    }
    if cli.json_logs {
        log_config.format = LogFormat::Json;
    }

    // The CLI must keep working even if logging cannot initialize
    let _ = init_logging(&log_config);

    let code = match execute(&cli).await {
        Ok(code) => code,
        Err(e) => {
            error!(error = %e, "Command failed");
            eprintln!("Error: {}", e);
            e.exit_code()
        }
    };

    process::exit(code.code());
}

/// Execute the CLI command, returning the process exit code.
async fn execute(cli: &Cli) -> riskfeed_cli::Result<ExitCode> {
    use riskfeed_cli::commands;

    match &cli.command {
        Commands::Config { command } => commands::config::run(cli, command).await,

        Commands::Db { command } => commands::db::run(cli, command).await,

        Commands::Ingest {
            endpoint,
            since,
            company_guid,
            backfill,
            strict,
        } => {
            let args = IngestArgs {
                since: since.as_deref(),
                company_guid: company_guid.as_deref(),
                backfill: *backfill,
                strict: *strict,
            };
            commands::ingest::run_endpoint(cli, endpoint, &args).await
        }

        Commands::IngestGroup {
            group,
            since,
            company_guid,
            backfill,
            strict,
        } => {
            let args = IngestArgs {
                since: since.as_deref(),
                company_guid: company_guid.as_deref(),
                backfill: *backfill,
                strict: *strict,
            };
            commands::ingest::run_group(cli, group, &args).await
        }

        Commands::Show => commands::show::run().await,

        Commands::Stats => commands::stats::run(cli).await,

        Commands::Status => commands::status::run(cli).await,

        Commands::Health => commands::health::run(cli).await,

        Commands::Exit => {
            println!("Thank you for using riskfeed");
            Ok(ExitCode::Success)
        }
    }
}
