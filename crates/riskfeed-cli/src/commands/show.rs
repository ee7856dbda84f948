//! `riskfeed show` - list the endpoint catalog

use riskfeed_common::ExitCode;
use riskfeed_ingest::endpoint::{Group, Pagination, CATALOG};

use crate::error::Result;

pub async fn run() -> Result<ExitCode> {
    println!(
        "{:<20} {:<10} {:<10} {:<32} {}",
        "endpoint", "group", "paging", "table", "primary key"
    );
    for descriptor in CATALOG {
        let paging = match descriptor.pagination {
            Pagination::Offset => "offset",
            Pagination::Cursor => "cursor",
            Pagination::None => "none",
        };
        let group = match descriptor.group {
            Group::Core => "core",
            Group::Security => "security",
        };
        let mut name = descriptor.name.to_string();
        if descriptor.requires_company {
            name.push('*');
        }
        println!(
            "{:<20} {:<10} {:<10} {:<32} {}",
            name,
            group,
            paging,
            descriptor.table,
            descriptor.key_columns.join(", ")
        );
    }
    println!();
    println!("* requires --company-guid");
    Ok(ExitCode::Success)
}
