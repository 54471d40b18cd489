//! Connection pool, table naming and schema bootstrap.

use std::time::Duration;

use sqlx::postgres::{PgPool, PgPoolOptions};
use tracing::{info, warn};

use crate::error::StoreError;

/// Indexer-owned input table.
pub const EVENTS_TABLE: &str = "LiquidationCall";
/// Output table owned by this service.
pub const ANALYSIS_TABLE: &str = "LiquidationAnalysis";

const ACQUIRE_TIMEOUT: Duration = Duration::from_secs(10);

/// Open a Postgres pool. Failure here is fatal for the caller.
pub async fn connect(url: &str, max_connections: u32) -> Result<PgPool, StoreError> {
    let pool = PgPoolOptions::new()
        .max_connections(max_connections)
        .acquire_timeout(ACQUIRE_TIMEOUT)
        .connect(url)
        .await?;

    sqlx::query("SELECT 1").execute(&pool).await?;
    info!(max_connections, "Database pool ready");

    Ok(pool)
}

/// Quote an SQL identifier, doubling embedded quotes.
pub fn quote_ident(name: &str) -> Result<String, StoreError> {
    if name.is_empty() || name.contains('\0') || name.len() > 63 {
        return Err(StoreError::InvalidIdentifier(name.to_string()));
    }
    Ok(format!("\"{}\"", name.replace('"', "\"\"")))
}

/// Fully qualified, quoted table names for one schema.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tables {
    pub schema: String,
    pub events: String,
    pub analysis: String,
}

impl Tables {
    pub fn new(schema: &str) -> Result<Self, StoreError> {
        let quoted = quote_ident(schema)?;
        Ok(Self {
            events: format!("{quoted}.{}", quote_ident(EVENTS_TABLE)?),
            analysis: format!("{quoted}.{}", quote_ident(ANALYSIS_TABLE)?),
            schema: quoted,
        })
    }
}

/// Columns of the analysis table, in DDL order. Tables created by the
/// external bootstrap have exactly these, so writes must stay within them.
pub(crate) const ANALYSIS_COLUMNS: [&str; 13] = [
    "id",
    "analysis_status",
    "first_liquidatable_block",
    "first_liquidatable_time",
    "latency_seconds",
    "blocks_liquidatable",
    "collateral_symbol",
    "collateral_decimals",
    "collateral_price_usd",
    "debt_symbol",
    "debt_decimals",
    "debt_price_usd",
    "error_message",
];

/// DDL for the analysis table. Column types match what the dashboard reads.
pub(crate) fn create_analysis_sql(tables: &Tables) -> String {
    format!(
        r#"CREATE TABLE IF NOT EXISTS {table} (
    id TEXT PRIMARY KEY,
    analysis_status TEXT NOT NULL DEFAULT 'PENDING',
    first_liquidatable_block BIGINT,
    first_liquidatable_time TIMESTAMP,
    latency_seconds INTEGER,
    blocks_liquidatable BIGINT,
    collateral_symbol TEXT,
    collateral_decimals INTEGER,
    collateral_price_usd REAL,
    debt_symbol TEXT,
    debt_decimals INTEGER,
    debt_price_usd REAL,
    error_message TEXT
)"#,
        table = tables.analysis
    )
}

/// Create the schema and analysis table if missing. With `reset`, the
/// analysis table is dropped first so every event becomes unresolved again.
pub async fn ensure_schema(pool: &PgPool, tables: &Tables, reset: bool) -> Result<(), StoreError> {
    sqlx::query(&format!("CREATE SCHEMA IF NOT EXISTS {}", tables.schema))
        .execute(pool)
        .await?;

    if reset {
        warn!(table = %tables.analysis, "Dropping analysis table");
        sqlx::query(&format!("DROP TABLE IF EXISTS {}", tables.analysis))
            .execute(pool)
            .await?;
    }

    sqlx::query(&create_analysis_sql(tables)).execute(pool).await?;
    info!(table = %tables.analysis, reset, "Analysis table ready");

    Ok(())
}
