//! Ingestion engine integration tests
//!
//! The API is mocked with wiremock; storage and collection state run on
//! the in-memory backends, so these tests exercise the full
//! fetch-map-upsert-advance loop without external services.

use std::sync::Arc;

use chrono::NaiveDate;
use serde_json::json;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use riskfeed_ingest::client::ApiClient;
use riskfeed_ingest::config::{ApiConfig, RetryConfig};
use riskfeed_ingest::endpoint;
use riskfeed_ingest::engine::{IngestionEngine, RunOptions};
use riskfeed_ingest::error::IngestError;
use riskfeed_ingest::gateway::{MemoryGateway, StorageGateway};
use riskfeed_ingest::mapper::SqlValue;
use riskfeed_ingest::state::{CollectionState, MemoryStateStore, RunStatus, StateStore};

const COMPANY: &str = "a940bb61-33c4-42c9-9231-c8194c305db3";

struct Harness {
    engine: IngestionEngine,
    gateway: Arc<MemoryGateway>,
    state: Arc<MemoryStateStore>,
}

async fn harness(server: &MockServer) -> Harness {
    let api = ApiConfig {
        api_key: Some("test-key".to_string()),
        base_url: server.uri(),
        page_limit: 2,
        ..ApiConfig::default()
    };
    let retry = RetryConfig {
        max_retries: 3,
        initial_backoff_ms: 1,
        max_backoff_ms: 2,
    };

    let client = ApiClient::new(&api, &retry).unwrap();
    let gateway = Arc::new(MemoryGateway::new());
    let state = Arc::new(MemoryStateStore::new());
    gateway.init_schema().await.unwrap();

    let engine = IngestionEngine::new(
        client,
        gateway.clone() as Arc<dyn StorageGateway>,
        state.clone() as Arc<dyn StateStore>,
    );

    Harness {
        engine,
        gateway,
        state,
    }
}

fn observation(guid: &str) -> serde_json::Value {
    json!({
        "guid": guid,
        "finding_guid": "f-1",
        "observed_date": "2026-02-10",
        "type": "open_port"
    })
}

fn company(guid: &str, name: &str) -> serde_json::Value {
    json!({
        "guid": guid,
        "name": name,
        "industry": { "name": "Technology" },
        "rating": 700
    })
}

fn company_options() -> RunOptions {
    RunOptions {
        company_guid: Some(COMPANY.to_string()),
        ..RunOptions::default()
    }
}

/// Mount a two-page cursor sequence on the observations endpoint:
/// page 1 (no cursor) -> 2 records, next cursor "abc";
/// page 2 (cursor=abc) -> 1 record, terminal.
async fn mount_two_page_observations(server: &MockServer) {
    let obs_path = format!("/ratings/v1/companies/{}/observations", COMPANY);

    Mock::given(method("GET"))
        .and(path(obs_path.clone()))
        .and(query_param("cursor", "abc"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "results": [observation("obs-3")],
            "links": { "next": null }
        })))
        .mount(server)
        .await;

    Mock::given(method("GET"))
        .and(path(obs_path.clone()))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "results": [observation("obs-1"), observation("obs-2")],
            "links": {
                "next": format!("{}{}?limit=2&cursor=abc", server.uri(), obs_path)
            }
        })))
        .mount(server)
        .await;
}

#[tokio::test]
async fn two_page_cursor_run_upserts_all_rows_and_clears_cursor() {
    let server = MockServer::start().await;
    mount_two_page_observations(&server).await;
    let h = harness(&server).await;

    let descriptor = endpoint::find("observations").unwrap();
    let summary = h.engine.run(descriptor, &company_options()).await.unwrap();

    assert!(summary.succeeded());
    assert_eq!(summary.pages_fetched, 2);
    assert_eq!(summary.records_fetched, 3);
    assert_eq!(summary.records_written, 3);
    assert_eq!(summary.records_skipped, 0);
    assert_eq!(h.gateway.row_count("bitsight_observations"), 3);

    let state = h.state.read("observations").await.unwrap().unwrap();
    assert_eq!(state.last_status, RunStatus::Success);
    assert_eq!(state.last_cursor, None);
    assert_eq!(state.last_offset, None);
    assert!(state.last_run_at.is_some());
}

#[tokio::test]
async fn failed_second_page_keeps_first_page_and_resumable_cursor() {
    let server = MockServer::start().await;
    let obs_path = format!("/ratings/v1/companies/{}/observations", COMPANY);

    // Page 2 fails hard: the client retries 3 times (4 requests total),
    // then the engine reports the run as failed.
    Mock::given(method("GET"))
        .and(path(obs_path.clone()))
        .and(query_param("cursor", "abc"))
        .respond_with(ResponseTemplate::new(500).set_body_string("upstream exploded"))
        .expect(4)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path(obs_path.clone()))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "results": [observation("obs-1"), observation("obs-2")],
            "links": {
                "next": format!("{}{}?limit=2&cursor=abc", server.uri(), obs_path)
            }
        })))
        .mount(&server)
        .await;

    let h = harness(&server).await;
    let descriptor = endpoint::find("observations").unwrap();
    let summary = h.engine.run(descriptor, &company_options()).await.unwrap();

    assert_eq!(summary.status, RunStatus::Failed);
    assert!(matches!(
        summary.failure,
        Some(IngestError::UnexpectedResponse { status: 500, .. })
    ));
    // Exactly page 1's rows are present
    assert_eq!(h.gateway.row_count("bitsight_observations"), 2);

    // The stored cursor points at the failed page, so the next run
    // resumes from page 2, not from scratch.
    let state = h.state.read("observations").await.unwrap().unwrap();
    assert_eq!(state.last_status, RunStatus::Failed);
    assert_eq!(state.last_cursor.as_deref(), Some("abc"));
}

#[tokio::test]
async fn interrupted_run_resumes_to_uninterrupted_end_state() {
    // Reference run: both pages served.
    let full_server = MockServer::start().await;
    mount_two_page_observations(&full_server).await;
    let reference = harness(&full_server).await;
    let descriptor = endpoint::find("observations").unwrap();
    reference
        .engine
        .run(descriptor, &company_options())
        .await
        .unwrap();
    let expected: Vec<String> = reference
        .gateway
        .rows("bitsight_observations")
        .iter()
        .map(|r| r.key_string(descriptor.key_columns))
        .collect();

    // Interrupted run: page 1 was committed and its checkpoint written,
    // then the process died. Only page 2 may be requested on resume.
    let resume_server = MockServer::start().await;
    let obs_path = format!("/ratings/v1/companies/{}/observations", COMPANY);
    Mock::given(method("GET"))
        .and(path(obs_path))
        .and(query_param("cursor", "abc"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "results": [observation("obs-3")],
            "links": { "next": null }
        })))
        .expect(1)
        .mount(&resume_server)
        .await;

    let h = harness(&resume_server).await;

    // Seed the exact post-interrupt state: page 1 rows durably committed,
    // collection state pointing at page 2.
    let seeded: Vec<_> = reference
        .gateway
        .rows("bitsight_observations")
        .into_iter()
        .filter(|r| {
            let key = r.key_string(descriptor.key_columns);
            key.contains("obs-1") || key.contains("obs-2")
        })
        .collect();
    h.gateway.upsert(descriptor, &seeded).await.unwrap();
    h.state
        .write(&CollectionState {
            endpoint_name: "observations".to_string(),
            last_run_at: Some(chrono::Utc::now()),
            last_offset: None,
            last_cursor: Some("abc".to_string()),
            last_status: RunStatus::Partial,
            ingested_at: chrono::Utc::now(),
        })
        .await
        .unwrap();

    let summary = h.engine.run(descriptor, &company_options()).await.unwrap();
    assert!(summary.succeeded());
    assert_eq!(summary.pages_fetched, 1);

    let resumed: Vec<String> = h
        .gateway
        .rows("bitsight_observations")
        .iter()
        .map(|r| r.key_string(descriptor.key_columns))
        .collect();
    assert_eq!(resumed, expected);

    let state = h.state.read("observations").await.unwrap().unwrap();
    assert_eq!(state.last_status, RunStatus::Success);
    assert_eq!(state.last_cursor, None);
}

#[tokio::test]
async fn ingesting_the_same_pages_twice_is_idempotent() {
    let server = MockServer::start().await;
    let companies_path = "/ratings/v1/companies";

    Mock::given(method("GET"))
        .and(path(companies_path))
        .and(query_param("offset", "2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "results": [company("g-3", "Three")],
            "links": { "next": null }
        })))
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path(companies_path))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "results": [company("g-1", "One"), company("g-2", "Two")],
            "links": {
                "next": format!("{}{}?limit=2&offset=2", server.uri(), companies_path)
            }
        })))
        .mount(&server)
        .await;

    let h = harness(&server).await;
    let descriptor = endpoint::find("companies").unwrap();

    let first = h
        .engine
        .run(descriptor, &RunOptions::default())
        .await
        .unwrap();
    assert!(first.succeeded());
    assert_eq!(h.gateway.row_count("bitsight_companies"), 3);

    // A full re-run re-applies every page; the row set must not grow.
    let second = h
        .engine
        .run(descriptor, &RunOptions::default())
        .await
        .unwrap();
    assert!(second.succeeded());
    assert_eq!(second.records_written, 3);
    assert_eq!(h.gateway.row_count("bitsight_companies"), 3);
}

#[tokio::test]
async fn empty_endpoint_succeeds_with_no_rows() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/ratings/v1/companies"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "results": [],
            "links": { "next": null }
        })))
        .mount(&server)
        .await;

    let h = harness(&server).await;
    let descriptor = endpoint::find("companies").unwrap();
    let summary = h
        .engine
        .run(descriptor, &RunOptions::default())
        .await
        .unwrap();

    assert!(summary.succeeded());
    assert_eq!(summary.records_fetched, 0);
    assert_eq!(h.gateway.row_count("bitsight_companies"), 0);

    let state = h.state.read("companies").await.unwrap().unwrap();
    assert_eq!(state.last_status, RunStatus::Success);
}

#[tokio::test]
async fn unmappable_record_is_skipped_unless_strict() {
    let server = MockServer::start().await;
    // Second record has no usable primary key
    Mock::given(method("GET"))
        .and(path("/ratings/v1/companies"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "results": [company("g-1", "One"), { "name": "No Guid, Inc." }],
            "links": { "next": null }
        })))
        .mount(&server)
        .await;

    let h = harness(&server).await;
    let descriptor = endpoint::find("companies").unwrap();

    let lenient = h
        .engine
        .run(descriptor, &RunOptions::default())
        .await
        .unwrap();
    assert!(lenient.succeeded());
    assert_eq!(lenient.records_skipped, 1);
    assert_eq!(lenient.records_written, 1);
    assert_eq!(h.gateway.row_count("bitsight_companies"), 1);
}

#[tokio::test]
async fn strict_mode_aborts_the_run_and_commits_nothing() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/ratings/v1/companies"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "results": [company("g-1", "One"), { "name": "No Guid, Inc." }],
            "links": { "next": null }
        })))
        .mount(&server)
        .await;

    let h = harness(&server).await;
    let descriptor = endpoint::find("companies").unwrap();

    let options = RunOptions {
        strict: true,
        ..RunOptions::default()
    };
    let summary = h.engine.run(descriptor, &options).await.unwrap();

    assert_eq!(summary.status, RunStatus::Failed);
    assert!(matches!(summary.failure, Some(IngestError::Mapping { .. })));
    // The aborted page was never committed
    assert_eq!(h.gateway.row_count("bitsight_companies"), 0);

    let state = h.state.read("companies").await.unwrap().unwrap();
    assert_eq!(state.last_status, RunStatus::Failed);
}

#[tokio::test]
async fn since_filter_is_forwarded_to_the_api() {
    let server = MockServer::start().await;
    let findings_path = format!("/ratings/v1/companies/{}/findings", COMPANY);

    Mock::given(method("GET"))
        .and(path(findings_path))
        .and(query_param("last_seen_gte", "2026-01-01"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "results": [{
                "guid": "finding-1",
                "title": "Open telnet",
                "risk_vector": "open_ports",
                "severity": 7.5,
                "first_seen": "2026-01-03",
                "last_seen": "2026-02-01"
            }],
            "links": { "next": null }
        })))
        .expect(1)
        .mount(&server)
        .await;

    let h = harness(&server).await;
    let descriptor = endpoint::find("findings").unwrap();

    let options = RunOptions {
        since: NaiveDate::from_ymd_opt(2026, 1, 1),
        company_guid: Some(COMPANY.to_string()),
        ..RunOptions::default()
    };
    let summary = h.engine.run(descriptor, &options).await.unwrap();

    assert!(summary.succeeded());
    assert_eq!(h.gateway.row_count("bitsight_findings"), 1);

    let rows = h.gateway.rows("bitsight_findings");
    assert_eq!(
        rows[0].get("company_guid"),
        Some(&SqlValue::Text(Some(COMPANY.to_string())))
    );
}

#[tokio::test]
async fn snapshot_endpoint_upserts_one_row_per_day() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/ratings/v1/statistics"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "companies_rated": 40000,
            "ratings_issued": 123456
        })))
        .mount(&server)
        .await;

    let h = harness(&server).await;
    let descriptor = endpoint::find("statistics").unwrap();

    h.engine
        .run(descriptor, &RunOptions::default())
        .await
        .unwrap();
    h.engine
        .run(descriptor, &RunOptions::default())
        .await
        .unwrap();

    // Same calendar day: the snapshot row is overwritten, not appended
    assert_eq!(h.gateway.row_count("bitsight_statistics"), 1);
}

#[tokio::test]
async fn csv_report_rows_are_parsed_and_upserted() {
    let server = MockServer::start().await;
    let history_path = format!(
        "/ratings/v1/companies/{}/reports/ratings-history",
        COMPANY
    );

    Mock::given(method("GET"))
        .and(path(history_path))
        .and(query_param("format", "csv"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string("date,rating\n2026-03-01,680\n2026-03-02,682\n"),
        )
        .mount(&server)
        .await;

    let h = harness(&server).await;
    let descriptor = endpoint::find("ratings-history").unwrap();
    let summary = h.engine.run(descriptor, &company_options()).await.unwrap();

    assert!(summary.succeeded());
    assert_eq!(summary.records_written, 2);

    let rows = h.gateway.rows("bitsight_ratings_history");
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0].get("rating"), Some(&SqlValue::BigInt(Some(680))));
}

#[tokio::test]
async fn rate_limited_pages_are_retried_until_they_succeed() {
    let server = MockServer::start().await;

    // Two 429s, then the real page
    Mock::given(method("GET"))
        .and(path("/ratings/v1/companies"))
        .respond_with(ResponseTemplate::new(429))
        .up_to_n_times(2)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/ratings/v1/companies"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "results": [company("g-1", "One")],
            "links": { "next": null }
        })))
        .mount(&server)
        .await;

    let h = harness(&server).await;
    let descriptor = endpoint::find("companies").unwrap();
    let summary = h
        .engine
        .run(descriptor, &RunOptions::default())
        .await
        .unwrap();

    assert!(summary.succeeded());
    assert_eq!(h.gateway.row_count("bitsight_companies"), 1);
}

#[tokio::test]
async fn group_run_skips_company_scoped_members_without_a_guid() {
    let server = MockServer::start().await;

    // Every non-company-scoped security endpoint answers empty
    for p in [
        "/ratings/v2/threats",
        "/ratings/v1/my-infrastructure",
        "/ratings/v1/alerts",
    ] {
        Mock::given(method("GET"))
            .and(path(p))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "results": [],
                "links": { "next": null }
            })))
            .mount(&server)
            .await;
    }
    for p in ["/ratings/v2/threats/summaries", "/ratings/v1/statistics"] {
        Mock::given(method("GET"))
            .and(path(p))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"total": 0})))
            .mount(&server)
            .await;
    }

    let h = harness(&server).await;
    let summaries = h
        .engine
        .run_group(
            riskfeed_ingest::endpoint::GroupSelector::Security,
            &RunOptions::default(),
        )
        .await
        .unwrap();

    // findings and observations require a company guid and were skipped
    let ran: Vec<&str> = summaries.iter().map(|s| s.endpoint.as_str()).collect();
    assert!(!ran.contains(&"findings"));
    assert!(!ran.contains(&"observations"));
    assert!(ran.contains(&"threats"));
    assert!(ran.contains(&"statistics"));
    assert!(summaries.iter().all(|s| s.succeeded()));
}
