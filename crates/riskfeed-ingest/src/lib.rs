//! Riskfeed Ingest Library
//!
//! The core of riskfeed: pulls data from the BitSight security-ratings API
//! and persists it into PostgreSQL, one table per endpoint, preserving the
//! original response payload alongside selected typed columns.
//!
//! # Overview
//!
//! - **Configuration** ([`config`]): API credentials, database settings,
//!   retry policy; JSON config file plus environment overrides
//! - **API Client** ([`client`]): authenticated requests, pagination,
//!   bounded retry with exponential backoff
//! - **Endpoint Catalog** ([`endpoint`]): static descriptors driving the
//!   generic ingestion engine
//! - **Record Mapper** ([`mapper`]): raw JSON record -> typed row + raw payload
//! - **Collection State** ([`state`]): durable per-endpoint progress markers
//! - **Storage Gateway** ([`gateway`]): schema init, transactional upserts,
//!   flush, status
//! - **Ingestion Engine** ([`engine`]): the fetch-map-upsert-advance loop

pub mod client;
pub mod config;
pub mod db;
pub mod endpoint;
pub mod engine;
pub mod error;
pub mod gateway;
pub mod mapper;
pub mod schema;
pub mod state;

// Re-export commonly used types
pub use client::{ApiClient, Page, Position};
pub use config::AppConfig;
pub use endpoint::EndpointDescriptor;
pub use engine::{IngestionEngine, RunOptions, RunSummary};
pub use error::{IngestError, Result};
pub use state::{CollectionState, RunStatus};
