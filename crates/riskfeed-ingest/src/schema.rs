//! Embedded database schema
//!
//! DDL is generated from the endpoint catalog so the schema can never
//! drift from the descriptors driving ingestion. Every statement is
//! guarded (`CREATE TABLE IF NOT EXISTS`), so initialization is
//! idempotent and re-runnable without error.

use crate::endpoint::{ColumnType, EndpointDescriptor, CATALOG};

/// DDL for the collection state table, keyed by endpoint name.
pub const COLLECTION_STATE_DDL: &str = "\
CREATE TABLE IF NOT EXISTS bitsight_collection_state (
    endpoint_name TEXT PRIMARY KEY,
    last_run_at TIMESTAMPTZ,
    last_offset BIGINT,
    last_cursor TEXT,
    last_status TEXT NOT NULL,
    ingested_at TIMESTAMPTZ NOT NULL
)";

fn sql_type(ty: ColumnType) -> &'static str {
    match ty {
        ColumnType::Text => "TEXT",
        ColumnType::BigInt => "BIGINT",
        ColumnType::Double => "DOUBLE PRECISION",
        ColumnType::Bool => "BOOLEAN",
        ColumnType::Timestamp => "TIMESTAMPTZ",
        ColumnType::Date => "DATE",
        ColumnType::Json => "JSONB",
    }
}

/// DDL for one endpoint's destination table.
pub fn table_ddl(descriptor: &EndpointDescriptor) -> String {
    let mut columns: Vec<String> = descriptor
        .columns
        .iter()
        .map(|c| {
            if descriptor.key_columns.contains(&c.name) {
                // Key columns are NOT NULL; the mapper guarantees at least
                // one is populated, the table requires all of them.
                format!("    {} {} NOT NULL", c.name, sql_type(c.ty))
            } else {
                format!("    {} {}", c.name, sql_type(c.ty))
            }
        })
        .collect();

    columns.push("    ingested_at TIMESTAMPTZ NOT NULL".to_string());
    columns.push("    raw_payload JSONB".to_string());
    columns.push(format!(
        "    PRIMARY KEY ({})",
        descriptor.key_columns.join(", ")
    ));

    format!(
        "CREATE TABLE IF NOT EXISTS {} (\n{}\n)",
        descriptor.table,
        columns.join(",\n")
    )
}

/// Every schema statement, in deterministic order: collection state
/// first, then one table per catalog entry.
pub fn statements() -> Vec<String> {
    let mut all = vec![COLLECTION_STATE_DDL.to_string()];
    all.extend(CATALOG.iter().map(table_ddl));
    all
}
