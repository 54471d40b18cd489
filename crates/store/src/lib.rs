//! Timeline persistence layer.
//!
//! This crate provides:
//! - Typed liquidation events read from the indexer's table
//! - The analysis work queue (unresolved selection and idempotent upserts)
//! - Schema bootstrap for the analysis table
//! - Joined read views for the dashboard listing and export

mod error;
mod models;
mod queue;
pub mod schema;
mod views;

pub use error::StoreError;
pub use models::{AnalysisRecord, AnalysisStatus, LiquidationEvent};
pub use queue::{AnalysisQueue, MemoryQueue, PgAnalysisQueue};
pub use schema::{connect, ensure_schema, Tables};
pub use views::{ExportDocument, LiquidationPage, LiquidationView};
