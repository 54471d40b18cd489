//! The work queue: unresolved events in, terminal analysis rows out.
//!
//! An event is unresolved while no analysis row exists for its id. Every
//! commit is an upsert keyed by id, so rewriting a row is idempotent and a
//! second commit for the same id never creates a duplicate.

use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::Mutex;
use sqlx::postgres::PgPool;
use sqlx::Row;
use tracing::{debug, warn};

use crate::error::StoreError;
use crate::models::{AnalysisRecord, AnalysisStatus, LiquidationEvent};
use crate::schema::Tables;

/// Source of unresolved events and sink for their terminal status.
#[async_trait]
pub trait AnalysisQueue: Send + Sync {
    /// Up to `limit` events with no analysis row, oldest block first.
    async fn pull_unresolved(&self, limit: usize) -> Result<Vec<LiquidationEvent>, StoreError>;

    /// Upsert a fully computed row. Clears any earlier error message.
    async fn commit_analyzed(&self, record: &AnalysisRecord) -> Result<(), StoreError>;

    /// Upsert a FAILED row. Only status and message are written.
    async fn commit_failed(&self, id: &str, message: &str) -> Result<(), StoreError>;
}

/// Postgres-backed queue over the indexer's schema.
#[derive(Debug, Clone)]
pub struct PgAnalysisQueue {
    pub(crate) pool: PgPool,
    pub(crate) tables: Tables,
}

impl PgAnalysisQueue {
    pub fn new(pool: PgPool, tables: Tables) -> Self {
        Self { pool, tables }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub fn tables(&self) -> &Tables {
        &self.tables
    }

    /// Read back one analysis row.
    pub async fn get_analysis(&self, id: &str) -> Result<Option<AnalysisRecord>, StoreError> {
        let sql = format!(
            r#"SELECT id, analysis_status, first_liquidatable_block,
                   first_liquidatable_time, latency_seconds::bigint AS latency_seconds,
                   blocks_liquidatable, collateral_symbol, collateral_decimals,
                   collateral_price_usd::float8 AS collateral_price_usd,
                   debt_symbol, debt_decimals, debt_price_usd::float8 AS debt_price_usd,
                   error_message
            FROM {analysis} WHERE id = $1"#,
            analysis = self.tables.analysis
        );

        let row = sqlx::query(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(AnalysisRecord::from_row).transpose()
    }
}

fn pull_sql(tables: &Tables) -> String {
    format!(
        r#"SELECT lc.id,
               lc.user_address::text AS user_address,
               lc.liquidator::text AS liquidator,
               lc.collateral_asset::text AS collateral_asset,
               lc.debt_asset::text AS debt_asset,
               lc.debt_to_cover::text AS debt_to_cover,
               lc.liquidated_collateral_amount::text AS liquidated_collateral_amount,
               lc.block_number::bigint AS block_number,
               lc.block_timestamp::bigint AS block_timestamp,
               lc.tx_hash::text AS tx_hash
        FROM {events} lc
        LEFT JOIN {analysis} la ON lc.id = la.id
        WHERE la.id IS NULL
        ORDER BY lc.block_number ASC
        LIMIT $1"#,
        events = tables.events,
        analysis = tables.analysis
    )
}

fn analyzed_upsert_sql(tables: &Tables) -> String {
    format!(
        r#"INSERT INTO {analysis} (
            id, analysis_status, first_liquidatable_block, first_liquidatable_time,
            latency_seconds, blocks_liquidatable,
            collateral_symbol, collateral_decimals, collateral_price_usd,
            debt_symbol, debt_decimals, debt_price_usd,
            error_message
        ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, NULL)
        ON CONFLICT (id) DO UPDATE SET
            analysis_status = EXCLUDED.analysis_status,
            first_liquidatable_block = EXCLUDED.first_liquidatable_block,
            first_liquidatable_time = EXCLUDED.first_liquidatable_time,
            latency_seconds = EXCLUDED.latency_seconds,
            blocks_liquidatable = EXCLUDED.blocks_liquidatable,
            collateral_symbol = EXCLUDED.collateral_symbol,
            collateral_decimals = EXCLUDED.collateral_decimals,
            collateral_price_usd = EXCLUDED.collateral_price_usd,
            debt_symbol = EXCLUDED.debt_symbol,
            debt_decimals = EXCLUDED.debt_decimals,
            debt_price_usd = EXCLUDED.debt_price_usd,
            error_message = NULL"#,
        analysis = tables.analysis
    )
}

fn failed_upsert_sql(tables: &Tables) -> String {
    format!(
        r#"INSERT INTO {analysis} (id, analysis_status, error_message)
        VALUES ($1, $2, $3)
        ON CONFLICT (id) DO UPDATE SET
            analysis_status = EXCLUDED.analysis_status,
            error_message = EXCLUDED.error_message"#,
        analysis = tables.analysis
    )
}

/// Rows that decoded, and `(id, reason)` for the ones that did not.
fn split_decoded<I>(rows: I) -> (Vec<LiquidationEvent>, Vec<(String, String)>)
where
    I: IntoIterator<Item = (String, Result<LiquidationEvent, StoreError>)>,
{
    let mut events = Vec::new();
    let mut rejected = Vec::new();
    for (id, decoded) in rows {
        match decoded {
            Ok(event) => events.push(event),
            Err(e) => rejected.push((id, format!("malformed indexer row: {e}"))),
        }
    }
    (events, rejected)
}

#[async_trait]
impl AnalysisQueue for PgAnalysisQueue {
    /// Rows that fail to decode are committed FAILED and left out of the
    /// batch.
    async fn pull_unresolved(&self, limit: usize) -> Result<Vec<LiquidationEvent>, StoreError> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let rows = sqlx::query(&pull_sql(&self.tables))
            .bind(limit)
            .fetch_all(&self.pool)
            .await?;

        let decoded = rows
            .iter()
            .map(|row| -> Result<_, StoreError> {
                let id: String = row.try_get("id")?;
                Ok((id, LiquidationEvent::from_row(row)))
            })
            .collect::<Result<Vec<_>, StoreError>>()?;
        let (events, rejected) = split_decoded(decoded);

        for (id, reason) in &rejected {
            warn!(%id, %reason, "Rejecting indexer row");
            self.commit_failed(id, reason).await?;
        }

        debug!(
            count = events.len(),
            rejected = rejected.len(),
            "Pulled unresolved events"
        );
        Ok(events)
    }

    async fn commit_analyzed(&self, record: &AnalysisRecord) -> Result<(), StoreError> {
        let to_i64 = |v: Option<u64>| v.and_then(|v| i64::try_from(v).ok());
        let latency = record
            .latency_seconds
            .map(|s| i32::try_from(s.max(0)).unwrap_or(i32::MAX));

        sqlx::query(&analyzed_upsert_sql(&self.tables))
            .bind(&record.id)
            .bind(record.status.as_str())
            .bind(to_i64(record.first_liquidatable_block))
            .bind(record.first_liquidatable_time.map(|t| t.naive_utc()))
            .bind(latency)
            .bind(to_i64(record.blocks_liquidatable))
            .bind(record.collateral_symbol.as_deref())
            .bind(record.collateral_decimals.map(i32::from))
            .bind(record.collateral_price_usd.map(|p| p as f32))
            .bind(record.debt_symbol.as_deref())
            .bind(record.debt_decimals.map(i32::from))
            .bind(record.debt_price_usd.map(|p| p as f32))
            .execute(&self.pool)
            .await?;

        debug!(id = %record.id, status = %record.status, "Committed analysis");
        Ok(())
    }

    async fn commit_failed(&self, id: &str, message: &str) -> Result<(), StoreError> {
        sqlx::query(&failed_upsert_sql(&self.tables))
            .bind(id)
            .bind(AnalysisStatus::Failed.as_str())
            .bind(message)
            .execute(&self.pool)
            .await?;

        debug!(id, "Committed failure");
        Ok(())
    }
}

/// In-process queue with the same upsert and exclusion rules, for tests
/// that have no database.
#[derive(Debug, Default)]
pub struct MemoryQueue {
    events: Mutex<Vec<LiquidationEvent>>,
    records: Mutex<HashMap<String, AnalysisRecord>>,
}

impl MemoryQueue {
    pub fn new(events: Vec<LiquidationEvent>) -> Self {
        Self {
            events: Mutex::new(events),
            records: Mutex::new(HashMap::new()),
        }
    }

    pub fn record(&self, id: &str) -> Option<AnalysisRecord> {
        self.records.lock().get(id).cloned()
    }

    pub fn record_count(&self) -> usize {
        self.records.lock().len()
    }
}

#[async_trait]
impl AnalysisQueue for MemoryQueue {
    async fn pull_unresolved(&self, limit: usize) -> Result<Vec<LiquidationEvent>, StoreError> {
        let records = self.records.lock();
        let mut pending: Vec<LiquidationEvent> = self
            .events
            .lock()
            .iter()
            .filter(|e| !records.contains_key(&e.id))
            .cloned()
            .collect();

        pending.sort_by_key(|e| e.block_number);
        pending.truncate(limit);
        Ok(pending)
    }

    async fn commit_analyzed(&self, record: &AnalysisRecord) -> Result<(), StoreError> {
        let mut stored = record.clone();
        stored.error_message = None;
        stored.latency_seconds = stored.latency_seconds.map(|s| s.max(0));
        self.records.lock().insert(stored.id.clone(), stored);
        Ok(())
    }

    async fn commit_failed(&self, id: &str, message: &str) -> Result<(), StoreError> {
        let mut records = self.records.lock();
        match records.get_mut(id) {
            Some(existing) => {
                existing.status = AnalysisStatus::Failed;
                existing.error_message = Some(message.to_string());
            }
            None => {
                records.insert(id.to_string(), AnalysisRecord::failed(id, message));
            }
        }
        Ok(())
    }
}
