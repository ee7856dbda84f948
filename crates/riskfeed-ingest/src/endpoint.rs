//! Endpoint catalog
//!
//! One `EndpointDescriptor` per ingestible API resource. The descriptors
//! are static data: the generic ingestion engine, the record mapper, the
//! storage gateway, and the schema generator are all driven from this
//! table, so adding an endpoint is a catalog entry, not a new module.

use crate::error::{IngestError, Result};

/// Pagination style of an endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pagination {
    /// `limit`/`offset` query parameters, `links.next` to continue.
    Offset,
    /// Opaque cursor token carried in a `cursor` query parameter.
    Cursor,
    /// Single request, no pagination.
    None,
}

/// Shape of the endpoint's response body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseKind {
    /// JSON envelope: `{ "results": [...], "links": { "next": ... } }`.
    Results,
    /// A single JSON object; ingested as one record.
    Object,
    /// CSV report; each row becomes one record keyed by header.
    Csv,
}

/// Ingest group an endpoint belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Group {
    Core,
    Security,
}

/// Where a typed column's value comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnSource {
    /// Dot-separated path into the raw record (e.g. `industry.name`).
    Field(&'static str),
    /// First present path wins (API field naming drifts across versions).
    AnyField(&'static [&'static str]),
    /// The company guid the run was scoped to (per-company endpoints).
    CompanyGuid,
    /// The calendar date of the ingestion run (snapshot-keyed tables).
    SnapshotDate,
}

/// SQL type of a typed column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
    Text,
    BigInt,
    Double,
    Bool,
    Timestamp,
    Date,
    Json,
}

/// One extracted column of a destination table.
#[derive(Debug, Clone, Copy)]
pub struct ColumnSpec {
    pub name: &'static str,
    pub source: ColumnSource,
    pub ty: ColumnType,
}

const fn col(name: &'static str, source: ColumnSource, ty: ColumnType) -> ColumnSpec {
    ColumnSpec { name, source, ty }
}

/// Static definition of one ingestible resource.
#[derive(Debug, Clone, Copy)]
pub struct EndpointDescriptor {
    /// CLI-facing endpoint name (`riskfeed ingest <name>`).
    pub name: &'static str,
    /// API path; may contain a `{company_guid}` segment.
    pub path: &'static str,
    pub pagination: Pagination,
    pub response: ResponseKind,
    /// Destination table.
    pub table: &'static str,
    /// Primary-key columns of the destination table.
    pub key_columns: &'static [&'static str],
    /// Typed columns extracted alongside `ingested_at`/`raw_payload`.
    pub columns: &'static [ColumnSpec],
    /// Query parameter carrying the `--since` lower bound, when supported.
    pub since_param: Option<&'static str>,
    pub requires_company: bool,
    pub group: Group,
}

impl EndpointDescriptor {
    /// Substitute the company guid into the path template.
    pub fn resolve_path(&self, company_guid: Option<&str>) -> Result<String> {
        if self.requires_company {
            let guid = company_guid
                .ok_or_else(|| IngestError::CompanyGuidRequired(self.name.to_string()))?;
            Ok(self.path.replace("{company_guid}", guid))
        } else {
            Ok(self.path.to_string())
        }
    }
}

// ============================================================================
// Catalog
// ============================================================================

use self::ColumnSource::{AnyField, CompanyGuid, Field, SnapshotDate};
use self::ColumnType::{BigInt, Date, Double, Json, Text, Timestamp};

/// Every ingestible endpoint, in deterministic order.
pub const CATALOG: &[EndpointDescriptor] = &[
    EndpointDescriptor {
        name: "companies",
        path: "/ratings/v1/companies",
        pagination: Pagination::Offset,
        response: ResponseKind::Results,
        table: "bitsight_companies",
        key_columns: &["company_guid"],
        columns: &[
            col("company_guid", Field("guid"), Text),
            col("name", Field("name"), Text),
            col("domain", Field("domain"), Text),
            col("industry", Field("industry.name"), Text),
            col("sub_industry", Field("sub_industry.name"), Text),
            col("country", Field("country"), Text),
            col("added_date", Field("added_date"), Date),
            col("rating", Field("rating"), BigInt),
        ],
        since_param: None,
        requires_company: false,
        group: Group::Core,
    },
    EndpointDescriptor {
        name: "company-details",
        path: "/ratings/v1/companies/{company_guid}",
        pagination: Pagination::None,
        response: ResponseKind::Object,
        table: "bitsight_company_details",
        key_columns: &["company_guid"],
        columns: &[
            col("company_guid", Field("guid"), Text),
            col("name", Field("name"), Text),
            col("description", Field("description"), Text),
            col("industry", Field("industry.name"), Text),
            col("sub_industry", Field("sub_industry.name"), Text),
            col("primary_domain", Field("primary_domain"), Text),
            col("rating", Field("rating"), BigInt),
            col("network_size_v4", Field("network_size_v4"), BigInt),
        ],
        since_param: None,
        requires_company: true,
        group: Group::Core,
    },
    EndpointDescriptor {
        name: "portfolio",
        path: "/ratings/v2/portfolio",
        pagination: Pagination::Offset,
        response: ResponseKind::Results,
        table: "bitsight_portfolio",
        key_columns: &["company_guid"],
        columns: &[
            col("company_guid", Field("guid"), Text),
            col("custom_id", Field("custom_id"), Text),
            col("name", Field("name"), Text),
            col("shortname", Field("shortname"), Text),
            col("industry_name", Field("industry.name"), Text),
            col("tier_name", Field("tier.name"), Text),
            col("rating", Field("rating"), BigInt),
            col("rating_date", Field("rating_date"), Date),
            col("network_size_v4", Field("network_size_v4"), BigInt),
        ],
        since_param: None,
        requires_company: false,
        group: Group::Core,
    },
    EndpointDescriptor {
        name: "current-ratings",
        path: "/ratings/v1/current-ratings",
        pagination: Pagination::Offset,
        response: ResponseKind::Results,
        table: "bitsight_current_ratings",
        key_columns: &["company_guid"],
        columns: &[
            col("company_guid", Field("guid"), Text),
            col("company_name", Field("company_name"), Text),
            col("rating", Field("rating"), BigInt),
            col("rating_date", Field("rating_date"), Date),
            col("rating_level", Field("rating_level"), Text),
            col("industry_name", Field("industry.name"), Text),
            col("industry_slug", Field("industry.slug"), Text),
            col("sub_industry_name", Field("sub_industry.name"), Text),
            col("sub_industry_slug", Field("sub_industry.slug"), Text),
            col("network_size_v4", Field("network_size_v4"), BigInt),
        ],
        since_param: None,
        requires_company: false,
        group: Group::Core,
    },
    EndpointDescriptor {
        name: "ratings-history",
        path: "/ratings/v1/companies/{company_guid}/reports/ratings-history",
        pagination: Pagination::None,
        response: ResponseKind::Csv,
        table: "bitsight_ratings_history",
        key_columns: &["company_guid", "rating_date"],
        columns: &[
            col("company_guid", CompanyGuid, Text),
            col("rating_date", AnyField(&["date", "rating_date"]), Date),
            col("rating", Field("rating"), BigInt),
        ],
        since_param: None,
        requires_company: true,
        group: Group::Core,
    },
    EndpointDescriptor {
        name: "users",
        path: "/ratings/v2/users",
        pagination: Pagination::Offset,
        response: ResponseKind::Results,
        table: "bitsight_users",
        key_columns: &["user_guid"],
        columns: &[
            col("user_guid", Field("guid"), Text),
            col("friendly_name", Field("friendly_name"), Text),
            col("formal_name", Field("formal_name"), Text),
            col("email", Field("email"), Text),
            col("status", Field("status"), Text),
            col("mfa_status", Field("mfa_status"), Text),
            col("last_login_time", Field("last_login_time"), Timestamp),
            col("joined_time", Field("joined_time"), Timestamp),
        ],
        since_param: None,
        requires_company: false,
        group: Group::Core,
    },
    EndpointDescriptor {
        name: "user-quota",
        path: "/ratings/v1/users/quota",
        pagination: Pagination::None,
        response: ResponseKind::Object,
        table: "bitsight_user_quota",
        key_columns: &["snapshot_date"],
        columns: &[col("snapshot_date", SnapshotDate, Date)],
        since_param: None,
        requires_company: false,
        group: Group::Core,
    },
    EndpointDescriptor {
        name: "findings",
        path: "/ratings/v1/companies/{company_guid}/findings",
        pagination: Pagination::Offset,
        response: ResponseKind::Results,
        table: "bitsight_findings",
        key_columns: &["finding_guid"],
        columns: &[
            col("finding_guid", Field("guid"), Text),
            col("company_guid", CompanyGuid, Text),
            col("title", Field("title"), Text),
            col("category", Field("category"), Text),
            col("risk_vector", Field("risk_vector"), Text),
            col("severity", Field("severity"), Double),
            col("grade", Field("grade"), Text),
            col("status", Field("status"), Text),
            col("first_seen", Field("first_seen"), Date),
            col("last_seen", Field("last_seen"), Date),
            col("remediation_status", Field("remediation_status"), Text),
            col("observations", Field("observations"), Json),
        ],
        since_param: Some("last_seen_gte"),
        requires_company: true,
        group: Group::Security,
    },
    EndpointDescriptor {
        name: "observations",
        path: "/ratings/v1/companies/{company_guid}/observations",
        pagination: Pagination::Cursor,
        response: ResponseKind::Results,
        table: "bitsight_observations",
        key_columns: &["observation_guid"],
        columns: &[
            col("observation_guid", Field("guid"), Text),
            col("finding_guid", Field("finding_guid"), Text),
            col("company_guid", CompanyGuid, Text),
            col("observed_date", Field("observed_date"), Date),
            col("observation_type", Field("type"), Text),
        ],
        since_param: None,
        requires_company: true,
        group: Group::Security,
    },
    EndpointDescriptor {
        name: "threats",
        path: "/ratings/v2/threats",
        pagination: Pagination::Offset,
        response: ResponseKind::Results,
        table: "bitsight_threats",
        key_columns: &["threat_guid"],
        columns: &[
            col("threat_guid", Field("guid"), Text),
            col("name", Field("name"), Text),
            col("category_name", Field("category.name"), Text),
            col("severity_level", Field("severity.level"), Text),
            col("first_seen_date", Field("first_seen_date"), Date),
            col("last_seen_date", Field("last_seen_date"), Date),
            col("exposed_count", Field("exposed_count"), BigInt),
            col("mitigated_count", Field("mitigated_count"), BigInt),
            col("epss_score", Field("epss.score"), Double),
            col("epss_percentile", Field("epss.percentile"), Double),
            col("evidence_certainty", Field("evidence_certainty"), Text),
        ],
        since_param: Some("last_seen_gte"),
        requires_company: false,
        group: Group::Security,
    },
    EndpointDescriptor {
        name: "threat-statistics",
        path: "/ratings/v2/threats/summaries",
        pagination: Pagination::None,
        response: ResponseKind::Object,
        table: "bitsight_threat_statistics",
        key_columns: &["snapshot_date"],
        columns: &[col("snapshot_date", SnapshotDate, Date)],
        since_param: None,
        requires_company: false,
        group: Group::Security,
    },
    EndpointDescriptor {
        name: "statistics",
        path: "/ratings/v1/statistics",
        pagination: Pagination::None,
        response: ResponseKind::Object,
        table: "bitsight_statistics",
        key_columns: &["snapshot_date"],
        columns: &[col("snapshot_date", SnapshotDate, Date)],
        since_param: None,
        requires_company: false,
        group: Group::Security,
    },
    EndpointDescriptor {
        name: "my-infrastructure",
        path: "/ratings/v1/my-infrastructure",
        pagination: Pagination::Offset,
        response: ResponseKind::Results,
        table: "bitsight_my_infrastructure",
        key_columns: &["asset_guid"],
        columns: &[
            col("asset_guid", Field("guid"), Text),
            col("asset_type", Field("type"), Text),
            col("ip_address", Field("ip_address"), Text),
            col("domain", Field("domain"), Text),
            col("first_seen_date", Field("first_seen_date"), Date),
            col("last_seen_date", Field("last_seen_date"), Date),
        ],
        since_param: None,
        requires_company: false,
        group: Group::Security,
    },
    EndpointDescriptor {
        name: "alerts",
        path: "/ratings/v1/alerts",
        pagination: Pagination::Offset,
        response: ResponseKind::Results,
        table: "bitsight_alerts",
        key_columns: &["alert_guid"],
        columns: &[
            col("alert_guid", Field("guid"), Text),
            col("alert_type", Field("alert_type"), Text),
            col("alert_date", Field("alert_date"), Date),
            col("company_guid", Field("company_guid"), Text),
            col("company_name", Field("company_name"), Text),
            col("severity", Field("severity"), Text),
            col("trigger", Field("trigger"), Text),
        ],
        since_param: Some("alert_date_gte"),
        requires_company: false,
        group: Group::Security,
    },
];

/// Group selector for `ingest-group`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupSelector {
    Core,
    Security,
    All,
}

impl GroupSelector {
    pub fn as_str(&self) -> &'static str {
        match self {
            GroupSelector::Core => "core",
            GroupSelector::Security => "security",
            GroupSelector::All => "all",
        }
    }
}

impl std::str::FromStr for GroupSelector {
    type Err = IngestError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "core" => Ok(GroupSelector::Core),
            "security" => Ok(GroupSelector::Security),
            "all" => Ok(GroupSelector::All),
            other => Err(IngestError::config(format!(
                "unknown group '{}': expected core, security, or all",
                other
            ))),
        }
    }
}

/// Look up a descriptor by endpoint name.
pub fn find(name: &str) -> Result<&'static EndpointDescriptor> {
    CATALOG
        .iter()
        .find(|d| d.name == name)
        .ok_or_else(|| IngestError::UnknownEndpoint(name.to_string()))
}

/// Members of a group, in catalog order.
pub fn group_members(selector: GroupSelector) -> Vec<&'static EndpointDescriptor> {
    CATALOG
        .iter()
        .filter(|d| match selector {
            GroupSelector::Core => d.group == Group::Core,
            GroupSelector::Security => d.group == Group::Security,
            GroupSelector::All => true,
        })
        .collect()
}

/// All destination table names, in catalog order.
pub fn table_names() -> Vec<&'static str> {
    CATALOG.iter().map(|d| d.table).collect()
}

/// Whether a table name belongs to the ingestible catalog.
pub fn is_catalog_table(table: &str) -> bool {
    CATALOG.iter().any(|d| d.table == table)
}
