//! Collection state store
//!
//! Durable per-endpoint progress markers: one row per endpoint name,
//! written by the ingestion engine after each committed page and at run
//! end. A subsequent run reads the row to decide where to resume.
//!
//! No cross-process coordination is provided beyond the storage's own
//! transaction isolation; overlapping runs of the same endpoint are the
//! operator's responsibility.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{PgPool, Row};
use std::collections::HashMap;
use std::sync::Mutex;

use crate::error::Result;

/// Table holding one progress row per endpoint.
pub const COLLECTION_STATE_TABLE: &str = "bitsight_collection_state";

/// Outcome of the most recent run of an endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Success,
    Partial,
    Failed,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Success => "success",
            RunStatus::Partial => "partial",
            RunStatus::Failed => "failed",
        }
    }
}

impl From<&str> for RunStatus {
    fn from(s: &str) -> Self {
        match s {
            "success" => RunStatus::Success,
            "partial" => RunStatus::Partial,
            _ => RunStatus::Failed,
        }
    }
}

/// One endpoint's progress row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollectionState {
    pub endpoint_name: String,
    pub last_run_at: Option<DateTime<Utc>>,
    pub last_offset: Option<i64>,
    pub last_cursor: Option<String>,
    pub last_status: RunStatus,
    pub ingested_at: DateTime<Utc>,
}

/// Durable read-modify-write access to collection state.
#[async_trait]
pub trait StateStore: Send + Sync {
    /// Read one endpoint's state, if any.
    async fn read(&self, endpoint_name: &str) -> Result<Option<CollectionState>>;

    /// Upsert one endpoint's state (single row, single transaction).
    async fn write(&self, state: &CollectionState) -> Result<()>;

    /// All stored states, ordered by endpoint name.
    async fn list(&self) -> Result<Vec<CollectionState>>;

    /// Remove every progress row. Returns the number of rows removed.
    async fn clear(&self) -> Result<u64>;
}

// ============================================================================
// Postgres backend
// ============================================================================

/// Collection state persisted in Postgres.
pub struct PgStateStore {
    pool: PgPool,
}

impl PgStateStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn state_from_row(row: &sqlx::postgres::PgRow) -> Result<CollectionState> {
        let status: String = row.try_get("last_status")?;
        Ok(CollectionState {
            endpoint_name: row.try_get("endpoint_name")?,
            last_run_at: row.try_get("last_run_at")?,
            last_offset: row.try_get("last_offset")?,
            last_cursor: row.try_get("last_cursor")?,
            last_status: status.as_str().into(),
            ingested_at: row.try_get("ingested_at")?,
        })
    }
}

#[async_trait]
impl StateStore for PgStateStore {
    async fn read(&self, endpoint_name: &str) -> Result<Option<CollectionState>> {
        let row = sqlx::query(
            "SELECT endpoint_name, last_run_at, last_offset, last_cursor, last_status, ingested_at \
             FROM bitsight_collection_state WHERE endpoint_name = $1",
        )
        .bind(endpoint_name)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(Self::state_from_row).transpose()
    }

    async fn write(&self, state: &CollectionState) -> Result<()> {
        sqlx::query(
            "INSERT INTO bitsight_collection_state \
                 (endpoint_name, last_run_at, last_offset, last_cursor, last_status, ingested_at) \
             VALUES ($1, $2, $3, $4, $5, $6) \
             ON CONFLICT (endpoint_name) DO UPDATE SET \
                 last_run_at = EXCLUDED.last_run_at, \
                 last_offset = EXCLUDED.last_offset, \
                 last_cursor = EXCLUDED.last_cursor, \
                 last_status = EXCLUDED.last_status, \
                 ingested_at = EXCLUDED.ingested_at",
        )
        .bind(&state.endpoint_name)
        .bind(state.last_run_at)
        .bind(state.last_offset)
        .bind(&state.last_cursor)
        .bind(state.last_status.as_str())
        .bind(state.ingested_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn list(&self) -> Result<Vec<CollectionState>> {
        let rows = sqlx::query(
            "SELECT endpoint_name, last_run_at, last_offset, last_cursor, last_status, ingested_at \
             FROM bitsight_collection_state ORDER BY endpoint_name",
        )
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(Self::state_from_row).collect()
    }

    async fn clear(&self) -> Result<u64> {
        let result = sqlx::query("DELETE FROM bitsight_collection_state")
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}

// ============================================================================
// In-memory backend
// ============================================================================

/// Collection state held in memory; backs `--dry-run` execution and tests.
#[derive(Default)]
pub struct MemoryStateStore {
    states: Mutex<HashMap<String, CollectionState>>,
}

impl MemoryStateStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl StateStore for MemoryStateStore {
    async fn read(&self, endpoint_name: &str) -> Result<Option<CollectionState>> {
        let states = self.states.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        Ok(states.get(endpoint_name).cloned())
    }

    async fn write(&self, state: &CollectionState) -> Result<()> {
        let mut states = self.states.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        states.insert(state.endpoint_name.clone(), state.clone());
        Ok(())
    }

    async fn list(&self) -> Result<Vec<CollectionState>> {
        let states = self.states.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        let mut all: Vec<_> = states.values().cloned().collect();
        all.sort_by(|a, b| a.endpoint_name.cmp(&b.endpoint_name));
        Ok(all)
    }

    async fn clear(&self) -> Result<u64> {
        let mut states = self.states.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        let count = states.len() as u64;
        states.clear();
        Ok(count)
    }
}
