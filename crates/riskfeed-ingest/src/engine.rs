//! Ingestion engine
//!
//! Drives one endpoint's full ingestion run: read collection state, fetch
//! a page, map its records, upsert them in one transaction, advance the
//! position, persist collection state, repeat until the endpoint is
//! exhausted or a failure surfaces.
//!
//! The load-bearing invariant is at-least-once page delivery with
//! idempotent upsert: collection state only advances after the
//! corresponding page's rows are durably committed, and upserts are keyed
//! by natural identifier, so a re-applied page changes nothing. Pages are
//! processed strictly in the API's pagination order; there is no intra-run
//! parallelism.

use chrono::{DateTime, NaiveDate, Utc};
use std::sync::Arc;
use std::time::{Duration, Instant};
use uuid::Uuid;

use crate::client::{ApiClient, Page, Position};
use crate::endpoint::{self, EndpointDescriptor, GroupSelector, ResponseKind};
use crate::error::{IngestError, Result};
use crate::gateway::StorageGateway;
use crate::mapper::{self, MapContext};
use crate::state::{CollectionState, RunStatus, StateStore};

/// Per-run options.
#[derive(Debug, Clone)]
pub struct RunOptions {
    /// Lower-bound filter for incremental pulls; forces a fresh start.
    pub since: Option<NaiveDate>,
    /// Honor prior collection state. `--backfill` maps to `false`.
    pub resume: bool,
    /// Abort the run on the first record that fails to map.
    pub strict: bool,
    /// Company scope for per-company endpoints.
    pub company_guid: Option<String>,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            since: None,
            resume: true,
            strict: false,
            company_guid: None,
        }
    }
}

/// Outcome of one endpoint run.
#[derive(Debug)]
pub struct RunSummary {
    pub run_id: Uuid,
    pub endpoint: String,
    pub pages_fetched: u64,
    pub records_fetched: u64,
    pub records_written: u64,
    pub records_skipped: u64,
    pub status: RunStatus,
    pub started_at: DateTime<Utc>,
    pub duration: Duration,
    /// The error that ended a failed run.
    pub failure: Option<IngestError>,
}

impl RunSummary {
    fn new(endpoint: &str, started_at: DateTime<Utc>) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            endpoint: endpoint.to_string(),
            pages_fetched: 0,
            records_fetched: 0,
            records_written: 0,
            records_skipped: 0,
            status: RunStatus::Partial,
            started_at,
            duration: Duration::ZERO,
            failure: None,
        }
    }

    pub fn succeeded(&self) -> bool {
        self.status == RunStatus::Success
    }

    pub fn failure_reason(&self) -> Option<String> {
        self.failure.as_ref().map(|e| e.to_string())
    }
}

/// Orchestrates endpoint runs against the configured backends.
pub struct IngestionEngine {
    client: ApiClient,
    gateway: Arc<dyn StorageGateway>,
    state: Arc<dyn StateStore>,
}

impl IngestionEngine {
    pub fn new(
        client: ApiClient,
        gateway: Arc<dyn StorageGateway>,
        state: Arc<dyn StateStore>,
    ) -> Self {
        Self {
            client,
            gateway,
            state,
        }
    }

    /// Run one endpoint to completion or to a reported failure.
    ///
    /// Precondition violations (missing company guid, unsupported
    /// `--since`) fail fast with `Err` and no state mutation. A run that
    /// starts and then fails returns `Ok` with a `Failed` summary; the
    /// collection state keeps the position of the uncommitted page so the
    /// next run resumes there.
    pub async fn run(
        &self,
        descriptor: &EndpointDescriptor,
        options: &RunOptions,
    ) -> Result<RunSummary> {
        if options.since.is_some() && descriptor.since_param.is_none() {
            return Err(IngestError::SinceUnsupported(descriptor.name.to_string()));
        }
        let path = descriptor.resolve_path(options.company_guid.as_deref())?;

        let started_at = Utc::now();
        let clock = Instant::now();
        let mut summary = RunSummary::new(descriptor.name, started_at);
        let mut position = self.starting_position(descriptor, options).await?;

        tracing::info!(
            run_id = %summary.run_id,
            endpoint = descriptor.name,
            path = %path,
            resume_from = ?position,
            since = ?options.since,
            "Starting ingestion run"
        );

        let ctx = MapContext {
            company_guid: options.company_guid.clone(),
            ingested_at: started_at,
            strict: options.strict,
        };

        loop {
            let page = match self.fetch(descriptor, &path, &position, options).await {
                Ok(page) => page,
                Err(error) => {
                    return self
                        .fail(descriptor, summary, position, started_at, clock, error)
                        .await;
                }
            };

            // An empty page terminates the run successfully.
            if page.results.is_empty() {
                break;
            }

            summary.pages_fetched += 1;
            summary.records_fetched += page.results.len() as u64;

            let mut rows = Vec::with_capacity(page.results.len());
            for raw in &page.results {
                match mapper::map_record(descriptor, &ctx, raw) {
                    Ok(row) => rows.push(row),
                    Err(map_error) => {
                        let identifier = mapper::record_identifier(descriptor, raw);
                        if options.strict {
                            let error = IngestError::mapping(
                                descriptor.name,
                                identifier,
                                map_error.to_string(),
                            );
                            return self
                                .fail(descriptor, summary, position, started_at, clock, error)
                                .await;
                        }
                        tracing::warn!(
                            endpoint = descriptor.name,
                            identifier = %identifier,
                            error = %map_error,
                            "Skipping unmappable record"
                        );
                        summary.records_skipped += 1;
                    }
                }
            }

            if !rows.is_empty() {
                match self.gateway.upsert(descriptor, &rows).await {
                    Ok(written) => summary.records_written += written,
                    Err(error) => {
                        return self
                            .fail(descriptor, summary, position, started_at, clock, error)
                            .await;
                    }
                }
            }

            match page.next {
                Some(next) => {
                    // The page is committed; advancing the checkpoint here
                    // is what makes a crash resume at the next page.
                    position = next;
                    self.checkpoint(descriptor, &position, RunStatus::Partial, started_at)
                        .await?;
                }
                None => break,
            }
        }

        self.checkpoint(descriptor, &Position::Start, RunStatus::Success, started_at)
            .await?;
        summary.status = RunStatus::Success;
        summary.duration = clock.elapsed();

        tracing::info!(
            run_id = %summary.run_id,
            endpoint = descriptor.name,
            pages = summary.pages_fetched,
            fetched = summary.records_fetched,
            written = summary.records_written,
            skipped = summary.records_skipped,
            duration_ms = summary.duration.as_millis() as u64,
            "Ingestion run succeeded"
        );

        Ok(summary)
    }

    /// Run every endpoint of a group sequentially.
    ///
    /// Members that require a company guid are skipped with a warning when
    /// none is supplied; a member's run failure is recorded in its summary
    /// and does not stop the remaining members.
    pub async fn run_group(
        &self,
        selector: GroupSelector,
        options: &RunOptions,
    ) -> Result<Vec<RunSummary>> {
        let members = endpoint::group_members(selector);
        let mut summaries = Vec::with_capacity(members.len());

        for descriptor in members {
            if descriptor.requires_company && options.company_guid.is_none() {
                tracing::warn!(
                    endpoint = descriptor.name,
                    group = selector.as_str(),
                    "Skipping group member: requires --company-guid"
                );
                continue;
            }

            // Members without a since filter run unfiltered rather than
            // failing the whole group.
            let mut member_options = options.clone();
            if member_options.since.is_some() && descriptor.since_param.is_none() {
                tracing::debug!(
                    endpoint = descriptor.name,
                    "Endpoint has no since filter; running full pull"
                );
                member_options.since = None;
            }

            summaries.push(self.run(descriptor, &member_options).await?);
        }

        Ok(summaries)
    }

    /// Derive where the run starts.
    ///
    /// Stored positions are only honored when the previous run ended
    /// partial or failed; after a success a new run starts from the
    /// beginning, and `--since` or `--backfill` force a fresh start.
    async fn starting_position(
        &self,
        descriptor: &EndpointDescriptor,
        options: &RunOptions,
    ) -> Result<Position> {
        if !options.resume || options.since.is_some() {
            return Ok(Position::Start);
        }

        let state = self.state.read(descriptor.name).await?;
        Ok(match state {
            Some(ref s) if s.last_status != RunStatus::Success => {
                if let Some(ref cursor) = s.last_cursor {
                    Position::Cursor(cursor.clone())
                } else if let Some(offset) = s.last_offset {
                    Position::Offset(offset)
                } else {
                    Position::Start
                }
            }
            _ => Position::Start,
        })
    }

    async fn fetch(
        &self,
        descriptor: &EndpointDescriptor,
        path: &str,
        position: &Position,
        options: &RunOptions,
    ) -> Result<Page> {
        let mut extra: Vec<(String, String)> = Vec::new();
        if let (Some(since), Some(param)) = (options.since, descriptor.since_param) {
            extra.push((param.to_string(), since.format("%Y-%m-%d").to_string()));
        }

        match descriptor.response {
            ResponseKind::Results => {
                self.client
                    .fetch_page(path, descriptor.pagination, position, &extra)
                    .await
            }
            ResponseKind::Object => {
                let object = self.client.fetch_object(path, &extra).await?;
                Ok(Page {
                    results: vec![object],
                    next: None,
                })
            }
            ResponseKind::Csv => {
                let rows = self.client.fetch_csv(path, &extra).await?;
                Ok(Page {
                    results: rows,
                    next: None,
                })
            }
        }
    }

    /// Persist the failed checkpoint and close out the summary.
    async fn fail(
        &self,
        descriptor: &EndpointDescriptor,
        mut summary: RunSummary,
        position: Position,
        started_at: DateTime<Utc>,
        clock: Instant,
        error: IngestError,
    ) -> Result<RunSummary> {
        self.checkpoint(descriptor, &position, RunStatus::Failed, started_at)
            .await?;

        tracing::error!(
            run_id = %summary.run_id,
            endpoint = descriptor.name,
            position = ?position,
            error = %error,
            "Ingestion run failed; collection state kept at last committed page"
        );

        summary.status = RunStatus::Failed;
        summary.failure = Some(error);
        summary.duration = clock.elapsed();
        Ok(summary)
    }

    async fn checkpoint(
        &self,
        descriptor: &EndpointDescriptor,
        position: &Position,
        status: RunStatus,
        started_at: DateTime<Utc>,
    ) -> Result<()> {
        let (last_offset, last_cursor) = match position {
            Position::Start => (None, None),
            Position::Offset(offset) => (Some(*offset), None),
            Position::Cursor(cursor) => (None, Some(cursor.clone())),
        };

        self.state
            .write(&CollectionState {
                endpoint_name: descriptor.name.to_string(),
                last_run_at: Some(started_at),
                last_offset,
                last_cursor,
                last_status: status,
                ingested_at: Utc::now(),
            })
            .await
    }
}
