//! Storage gateway
//!
//! Schema lifecycle and bulk row application. The Postgres backend applies
//! each page of rows inside one transaction, so a crash mid-page can never
//! leave a half-applied page visible; the in-memory backend serves
//! `--dry-run` execution and tests.
//!
//! Flushes are operator-initiated only; ingestion never deletes rows.

use async_trait::async_trait;
use sqlx::postgres::PgArguments;
use sqlx::{PgPool, Postgres};
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use crate::endpoint::{self, EndpointDescriptor};
use crate::error::{IngestError, Result};
use crate::mapper::{MappedRow, SqlValue};
use crate::schema;
use crate::state::COLLECTION_STATE_TABLE;

/// What to flush.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushTarget<'a> {
    /// One ingestible table.
    Table(&'a str),
    /// Every ingestible table. Collection state is not touched; clear it
    /// explicitly through the state store.
    All,
}

/// Presence and size of one expected table.
#[derive(Debug, Clone)]
pub struct TableStatus {
    pub table: String,
    pub present: bool,
    pub row_count: Option<i64>,
}

/// Connectivity plus per-table status.
#[derive(Debug, Clone)]
pub struct GatewayStatus {
    pub connected: bool,
    pub tables: Vec<TableStatus>,
}

/// Schema lifecycle and transactional row application.
#[async_trait]
pub trait StorageGateway: Send + Sync {
    /// Idempotently create all expected tables.
    async fn init_schema(&self) -> Result<()>;

    /// Upsert one page of rows in a single transaction. Returns the number
    /// of rows applied.
    async fn upsert(&self, descriptor: &EndpointDescriptor, rows: &[MappedRow]) -> Result<u64>;

    /// Delete rows per the target. Returns the number of rows deleted.
    async fn flush(&self, target: FlushTarget<'_>) -> Result<u64>;

    /// Connectivity and presence of each expected table.
    async fn status(&self) -> Result<GatewayStatus>;
}

// ============================================================================
// Postgres backend
// ============================================================================

/// Gateway executing against Postgres.
pub struct PgGateway {
    pool: PgPool,
}

impl PgGateway {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

/// Build the upsert statement for one descriptor.
///
/// `INSERT INTO t (c1, .., ingested_at, raw_payload) VALUES ($1, ..)
///  ON CONFLICT (keys) DO UPDATE SET <non-key> = EXCLUDED.<non-key>, ..`
fn upsert_sql(descriptor: &EndpointDescriptor) -> String {
    let mut columns: Vec<&str> = descriptor.columns.iter().map(|c| c.name).collect();
    columns.push("ingested_at");
    columns.push("raw_payload");

    let placeholders: Vec<String> = (1..=columns.len()).map(|i| format!("${}", i)).collect();

    let updates: Vec<String> = columns
        .iter()
        .filter(|c| !descriptor.key_columns.contains(c))
        .map(|c| format!("{} = EXCLUDED.{}", c, c))
        .collect();

    format!(
        "INSERT INTO {} ({}) VALUES ({}) ON CONFLICT ({}) DO UPDATE SET {}",
        descriptor.table,
        columns.join(", "),
        placeholders.join(", "),
        descriptor.key_columns.join(", "),
        updates.join(", ")
    )
}

fn bind_value<'q>(
    query: sqlx::query::Query<'q, Postgres, PgArguments>,
    value: &SqlValue,
) -> sqlx::query::Query<'q, Postgres, PgArguments> {
    match value {
        SqlValue::Text(v) => query.bind(v.clone()),
        SqlValue::BigInt(v) => query.bind(*v),
        SqlValue::Double(v) => query.bind(*v),
        SqlValue::Bool(v) => query.bind(*v),
        SqlValue::Timestamp(v) => query.bind(*v),
        SqlValue::Date(v) => query.bind(*v),
        SqlValue::Json(v) => query.bind(v.clone()),
    }
}

#[async_trait]
impl StorageGateway for PgGateway {
    async fn init_schema(&self) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        for statement in schema::statements() {
            sqlx::query(&statement).execute(&mut *tx).await?;
        }
        tx.commit().await?;

        tracing::info!(
            tables = endpoint::CATALOG.len() + 1,
            "Schema initialized"
        );
        Ok(())
    }

    async fn upsert(&self, descriptor: &EndpointDescriptor, rows: &[MappedRow]) -> Result<u64> {
        if rows.is_empty() {
            return Ok(0);
        }

        let sql = upsert_sql(descriptor);
        let mut applied = 0u64;

        let mut tx = self.pool.begin().await?;
        for row in rows {
            let mut query = sqlx::query(&sql);
            for spec in descriptor.columns {
                let value = row
                    .get(spec.name)
                    .cloned()
                    .unwrap_or_else(|| SqlValue::null_of(spec.ty));
                query = bind_value(query, &value);
            }
            query = query.bind(row.ingested_at);
            query = query.bind(row.raw_payload.clone());

            let result = query.execute(&mut *tx).await?;
            applied += result.rows_affected();
        }
        tx.commit().await?;

        Ok(applied)
    }

    async fn flush(&self, target: FlushTarget<'_>) -> Result<u64> {
        match target {
            FlushTarget::Table(table) => {
                if !endpoint::is_catalog_table(table) {
                    return Err(IngestError::UnknownTable(table.to_string()));
                }
                let result = sqlx::query(&format!("DELETE FROM {}", table))
                    .execute(&self.pool)
                    .await?;
                Ok(result.rows_affected())
            }
            FlushTarget::All => {
                let mut deleted = 0u64;
                let mut tx = self.pool.begin().await?;
                for table in endpoint::table_names() {
                    let result = sqlx::query(&format!("DELETE FROM {}", table))
                        .execute(&mut *tx)
                        .await?;
                    deleted += result.rows_affected();
                }
                tx.commit().await?;
                Ok(deleted)
            }
        }
    }

    async fn status(&self) -> Result<GatewayStatus> {
        if sqlx::query("SELECT 1").execute(&self.pool).await.is_err() {
            return Ok(GatewayStatus {
                connected: false,
                tables: Vec::new(),
            });
        }

        let mut expected: Vec<&str> = vec![COLLECTION_STATE_TABLE];
        expected.extend(endpoint::table_names());

        let mut tables = Vec::with_capacity(expected.len());
        for table in expected {
            let present: bool = sqlx::query_scalar(
                "SELECT EXISTS (SELECT 1 FROM information_schema.tables \
                 WHERE table_schema = 'public' AND table_name = $1)",
            )
            .bind(table)
            .fetch_one(&self.pool)
            .await?;

            let row_count = if present {
                let count: i64 = sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {}", table))
                    .fetch_one(&self.pool)
                    .await?;
                Some(count)
            } else {
                None
            };

            tables.push(TableStatus {
                table: table.to_string(),
                present,
                row_count,
            });
        }

        Ok(GatewayStatus {
            connected: true,
            tables,
        })
    }
}

// ============================================================================
// In-memory backend
// ============================================================================

/// Gateway holding rows in memory; backs `--dry-run` execution and tests.
#[derive(Default)]
pub struct MemoryGateway {
    initialized: AtomicBool,
    tables: Mutex<HashMap<String, BTreeMap<String, MappedRow>>>,
}

impl MemoryGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of rows currently held for a table.
    pub fn row_count(&self, table: &str) -> usize {
        let tables = self.lock();
        tables.get(table).map(BTreeMap::len).unwrap_or(0)
    }

    /// Snapshot of a table's rows, in key order.
    pub fn rows(&self, table: &str) -> Vec<MappedRow> {
        let tables = self.lock();
        tables
            .get(table)
            .map(|rows| rows.values().cloned().collect())
            .unwrap_or_default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, BTreeMap<String, MappedRow>>> {
        self.tables
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

#[async_trait]
impl StorageGateway for MemoryGateway {
    async fn init_schema(&self) -> Result<()> {
        let mut tables = self.lock();
        for table in endpoint::table_names() {
            tables.entry(table.to_string()).or_default();
        }
        drop(tables);
        self.initialized.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn upsert(&self, descriptor: &EndpointDescriptor, rows: &[MappedRow]) -> Result<u64> {
        let mut tables = self.lock();
        let table = tables.entry(descriptor.table.to_string()).or_default();

        for row in rows {
            let key = row.key_string(descriptor.key_columns);
            table.insert(key, row.clone());
        }
        Ok(rows.len() as u64)
    }

    async fn flush(&self, target: FlushTarget<'_>) -> Result<u64> {
        let mut tables = self.lock();
        match target {
            FlushTarget::Table(table) => {
                if !endpoint::is_catalog_table(table) {
                    return Err(IngestError::UnknownTable(table.to_string()));
                }
                Ok(tables
                    .get_mut(table)
                    .map(|rows| {
                        let n = rows.len() as u64;
                        rows.clear();
                        n
                    })
                    .unwrap_or(0))
            }
            FlushTarget::All => {
                let mut deleted = 0u64;
                for rows in tables.values_mut() {
                    deleted += rows.len() as u64;
                    rows.clear();
                }
                Ok(deleted)
            }
        }
    }

    async fn status(&self) -> Result<GatewayStatus> {
        let initialized = self.initialized.load(Ordering::SeqCst);
        let tables = self.lock();

        let statuses = endpoint::table_names()
            .into_iter()
            .map(|table| {
                let present = initialized || tables.contains_key(table);
                TableStatus {
                    table: table.to_string(),
                    present,
                    row_count: tables.get(table).map(|rows| rows.len() as i64),
                }
            })
            .collect();

        Ok(GatewayStatus {
            connected: true,
            tables: statuses,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mapper::{map_record, MapContext};
    use chrono::Utc;
    use serde_json::json;

    fn company_row(guid: &str, name: &str) -> MappedRow {
        let descriptor = endpoint::find("companies").unwrap();
        let ctx = MapContext {
            company_guid: None,
            ingested_at: Utc::now(),
            strict: false,
        };
        map_record(
            descriptor,
            &ctx,
            &json!({ "guid": guid, "name": name, "rating": 700 }),
        )
        .unwrap()
    }

    #[test]
    fn test_upsert_sql_shape() {
        let descriptor = endpoint::find("companies").unwrap();
        let sql = upsert_sql(descriptor);

        assert!(sql.starts_with("INSERT INTO bitsight_companies ("));
        assert!(sql.contains("ON CONFLICT (company_guid) DO UPDATE SET"));
        assert!(sql.contains("raw_payload = EXCLUDED.raw_payload"));
        // Key columns are never updated
        assert!(!sql.contains("company_guid = EXCLUDED.company_guid"));
        // 8 typed columns + ingested_at + raw_payload
        assert!(sql.contains("$10"));
        assert!(!sql.contains("$11"));
    }

    #[test]
    fn test_upsert_sql_composite_key() {
        let descriptor = endpoint::find("ratings-history").unwrap();
        let sql = upsert_sql(descriptor);
        assert!(sql.contains("ON CONFLICT (company_guid, rating_date)"));
    }

    #[tokio::test]
    async fn test_memory_upsert_is_idempotent() {
        let gateway = MemoryGateway::new();
        gateway.init_schema().await.unwrap();
        let descriptor = endpoint::find("companies").unwrap();

        let rows = vec![company_row("g-1", "One"), company_row("g-2", "Two")];
        gateway.upsert(descriptor, &rows).await.unwrap();
        gateway.upsert(descriptor, &rows).await.unwrap();

        assert_eq!(gateway.row_count("bitsight_companies"), 2);
    }

    #[tokio::test]
    async fn test_memory_upsert_overwrites_by_key() {
        let gateway = MemoryGateway::new();
        gateway.init_schema().await.unwrap();
        let descriptor = endpoint::find("companies").unwrap();

        gateway
            .upsert(descriptor, &[company_row("g-1", "Before")])
            .await
            .unwrap();
        gateway
            .upsert(descriptor, &[company_row("g-1", "After")])
            .await
            .unwrap();

        let rows = gateway.rows("bitsight_companies");
        assert_eq!(rows.len(), 1);
        assert_eq!(
            rows[0].get("name"),
            Some(&SqlValue::Text(Some("After".to_string())))
        );
    }

    #[tokio::test]
    async fn test_memory_flush_table_scopes_to_one_table() {
        let gateway = MemoryGateway::new();
        gateway.init_schema().await.unwrap();
        let companies = endpoint::find("companies").unwrap();
        let portfolio = endpoint::find("portfolio").unwrap();

        gateway
            .upsert(companies, &[company_row("g-1", "One")])
            .await
            .unwrap();
        gateway
            .upsert(portfolio, &[company_row("g-2", "Two")])
            .await
            .unwrap();

        let deleted = gateway
            .flush(FlushTarget::Table("bitsight_companies"))
            .await
            .unwrap();
        assert_eq!(deleted, 1);
        assert_eq!(gateway.row_count("bitsight_companies"), 0);
        assert_eq!(gateway.row_count("bitsight_portfolio"), 1);
    }

    #[tokio::test]
    async fn test_memory_flush_all_empties_every_table() {
        let gateway = MemoryGateway::new();
        gateway.init_schema().await.unwrap();
        let companies = endpoint::find("companies").unwrap();

        gateway
            .upsert(companies, &[company_row("g-1", "One"), company_row("g-2", "Two")])
            .await
            .unwrap();

        assert_eq!(gateway.flush(FlushTarget::All).await.unwrap(), 2);
        assert_eq!(gateway.row_count("bitsight_companies"), 0);
    }

    #[tokio::test]
    async fn test_flush_rejects_unknown_table() {
        let gateway = MemoryGateway::new();
        gateway.init_schema().await.unwrap();

        let err = gateway
            .flush(FlushTarget::Table("bitsight_collection_state"))
            .await
            .unwrap_err();
        assert!(matches!(err, IngestError::UnknownTable(_)));
    }

    #[tokio::test]
    async fn test_memory_status_reports_all_tables() {
        let gateway = MemoryGateway::new();
        gateway.init_schema().await.unwrap();

        let status = gateway.status().await.unwrap();
        assert!(status.connected);
        assert_eq!(status.tables.len(), endpoint::CATALOG.len());
        assert!(status.tables.iter().all(|t| t.present));
    }
}
