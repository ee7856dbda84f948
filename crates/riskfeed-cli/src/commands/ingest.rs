//! `riskfeed ingest` and `riskfeed ingest-group` - run the engine

use chrono::NaiveDate;
use riskfeed_common::ExitCode;
use riskfeed_ingest::endpoint::{self, GroupSelector};
use riskfeed_ingest::engine::{IngestionEngine, RunOptions, RunSummary};
use riskfeed_ingest::IngestError;

use crate::commands::{build_backends, build_client, load_config};
use crate::error::{CliError, Result};
use crate::Cli;

/// Flags shared by `ingest` and `ingest-group`.
pub struct IngestArgs<'a> {
    pub since: Option<&'a str>,
    pub company_guid: Option<&'a str>,
    pub backfill: bool,
    pub strict: bool,
}

impl IngestArgs<'_> {
    fn to_options(&self) -> Result<RunOptions> {
        let since = self
            .since
            .map(|s| {
                NaiveDate::parse_from_str(s, "%Y-%m-%d").map_err(|_| {
                    CliError::usage(format!("--since must be YYYY-MM-DD (got '{}')", s))
                })
            })
            .transpose()?;

        Ok(RunOptions {
            since,
            resume: !self.backfill,
            strict: self.strict,
            company_guid: self.company_guid.map(String::from),
        })
    }
}

pub async fn run_endpoint(cli: &Cli, name: &str, args: &IngestArgs<'_>) -> Result<ExitCode> {
    // Usage problems fail before any construction
    let descriptor = endpoint::find(name)?;
    let options = args.to_options()?;

    let config = load_config(cli)?;
    let client = build_client(&config)?;
    let backends = build_backends(cli, &config).await?;
    let engine = IngestionEngine::new(client, backends.gateway, backends.state);

    let summary = engine.run(descriptor, &options).await?;
    print_summaries(std::slice::from_ref(&summary));

    Ok(summaries_exit_code(std::slice::from_ref(&summary)))
}

pub async fn run_group(cli: &Cli, group: &str, args: &IngestArgs<'_>) -> Result<ExitCode> {
    let selector: GroupSelector = group.parse()?;
    let options = args.to_options()?;

    let config = load_config(cli)?;
    let client = build_client(&config)?;
    let backends = build_backends(cli, &config).await?;
    let engine = IngestionEngine::new(client, backends.gateway, backends.state);

    let summaries = engine.run_group(selector, &options).await?;
    print_summaries(&summaries);

    Ok(summaries_exit_code(&summaries))
}

fn print_summaries(summaries: &[RunSummary]) {
    println!(
        "{:<20} {:<8} {:>6} {:>8} {:>8} {:>8} {:>10}",
        "endpoint", "status", "pages", "fetched", "written", "skipped", "elapsed"
    );
    for summary in summaries {
        println!(
            "{:<20} {:<8} {:>6} {:>8} {:>8} {:>8} {:>9.2}s",
            summary.endpoint,
            summary.status.as_str(),
            summary.pages_fetched,
            summary.records_fetched,
            summary.records_written,
            summary.records_skipped,
            summary.duration.as_secs_f64()
        );
        if let Some(reason) = summary.failure_reason() {
            println!("  failure: {}", reason);
        }
    }
}

/// Success only when every run succeeded; a single failed run decides the
/// exit code.
fn summaries_exit_code(summaries: &[RunSummary]) -> ExitCode {
    for summary in summaries {
        if !summary.succeeded() {
            return match &summary.failure {
                Some(IngestError::Mapping { .. }) => ExitCode::MappingFailed,
                _ => ExitCode::IngestFailed,
            };
        }
    }
    ExitCode::Success
}
