//! `riskfeed stats` - row counts per destination table

use riskfeed_common::ExitCode;

use crate::commands::{build_backends, load_config};
use crate::error::Result;
use crate::Cli;

pub async fn run(cli: &Cli) -> Result<ExitCode> {
    let config = load_config(cli)?;
    let backends = build_backends(cli, &config).await?;

    let status = backends.gateway.status().await?;
    if !status.connected {
        println!("Database: NOT CONNECTED");
        return Ok(ExitCode::DbConnectionFailed);
    }

    let mut total: i64 = 0;
    println!("{:<32} {:>12}", "table", "rows");
    for table in &status.tables {
        let rows = table.row_count.unwrap_or(0);
        total += rows;
        println!("{:<32} {:>12}", table.table, rows);
    }
    println!("{:<32} {:>12}", "total", total);

    Ok(ExitCode::Success)
}
