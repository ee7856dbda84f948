//! `riskfeed status` - per-endpoint collection state

use riskfeed_common::ExitCode;

use crate::commands::{build_backends, load_config};
use crate::error::Result;
use crate::Cli;

pub async fn run(cli: &Cli) -> Result<ExitCode> {
    let config = load_config(cli)?;
    let backends = build_backends(cli, &config).await?;

    let states = backends.state.list().await?;
    if states.is_empty() {
        println!("No collection state recorded; nothing has been ingested yet");
        return Ok(ExitCode::Success);
    }

    println!(
        "{:<20} {:<8} {:<22} {:<12} {}",
        "endpoint", "status", "last run", "offset", "cursor"
    );
    for state in states {
        println!(
            "{:<20} {:<8} {:<22} {:<12} {}",
            state.endpoint_name,
            state.last_status.as_str(),
            state
                .last_run_at
                .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
                .unwrap_or_else(|| "-".to_string()),
            state
                .last_offset
                .map(|o| o.to_string())
                .unwrap_or_else(|| "-".to_string()),
            state.last_cursor.as_deref().unwrap_or("-")
        );
    }

    Ok(ExitCode::Success)
}
