//! Read side for the dashboard: joined event and analysis rows.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::postgres::PgRow;
use sqlx::Row;

use crate::error::StoreError;
use crate::queue::PgAnalysisQueue;

/// One liquidation joined with its analysis. Field names are what the
/// dashboard reads.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LiquidationView {
    pub id: String,
    #[serde(rename = "user")]
    pub user_address: String,
    pub liquidator: String,
    pub collateral_asset: String,
    pub debt_asset: String,
    pub debt_to_cover: String,
    pub liquidated_collateral_amount: String,
    pub block_timestamp: i64,
    pub latency_seconds: Option<i64>,
    pub collateral_symbol: Option<String>,
    pub collateral_decimals: Option<i32>,
    pub collateral_price_usd: Option<f64>,
    pub debt_symbol: Option<String>,
    pub debt_decimals: Option<i32>,
    pub debt_price_usd: Option<f64>,
}

impl LiquidationView {
    fn from_row(row: &PgRow) -> Result<Self, StoreError> {
        Ok(Self {
            id: row.try_get("id")?,
            user_address: row.try_get("user_address")?,
            liquidator: row.try_get("liquidator")?,
            collateral_asset: row.try_get("collateral_asset")?,
            debt_asset: row.try_get("debt_asset")?,
            debt_to_cover: row.try_get("debt_to_cover")?,
            liquidated_collateral_amount: row.try_get("liquidated_collateral_amount")?,
            block_timestamp: row.try_get("block_timestamp")?,
            latency_seconds: row.try_get("latency_seconds")?,
            collateral_symbol: row.try_get("collateral_symbol")?,
            collateral_decimals: row.try_get("collateral_decimals")?,
            collateral_price_usd: row.try_get("collateral_price_usd")?,
            debt_symbol: row.try_get("debt_symbol")?,
            debt_decimals: row.try_get("debt_decimals")?,
            debt_price_usd: row.try_get("debt_price_usd")?,
        })
    }
}

/// One page of liquidations, newest first.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LiquidationPage {
    pub data: Vec<LiquidationView>,
    pub total_count: i64,
    pub limit: i64,
    pub offset: i64,
}

/// Static snapshot consumed by the dashboard build.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportDocument {
    pub data: Vec<LiquidationView>,
    pub total_count: i64,
    pub limit: i64,
    pub offset: i64,
    pub exported_at: DateTime<Utc>,
}

impl ExportDocument {
    pub fn new(data: Vec<LiquidationView>, exported_at: DateTime<Utc>) -> Self {
        let total_count = i64::try_from(data.len()).unwrap_or(i64::MAX);
        Self {
            data,
            total_count,
            limit: total_count,
            offset: 0,
            exported_at,
        }
    }
}

const VIEW_COLUMNS: &str = r#"lc.id,
       lc.user_address::text AS user_address,
       lc.liquidator::text AS liquidator,
       lc.collateral_asset::text AS collateral_asset,
       lc.debt_asset::text AS debt_asset,
       lc.debt_to_cover::text AS debt_to_cover,
       lc.liquidated_collateral_amount::text AS liquidated_collateral_amount,
       lc.block_timestamp::bigint AS block_timestamp,
       la.latency_seconds::bigint AS latency_seconds,
       la.collateral_symbol,
       la.collateral_decimals,
       la.collateral_price_usd::float8 AS collateral_price_usd,
       la.debt_symbol,
       la.debt_decimals,
       la.debt_price_usd::float8 AS debt_price_usd"#;

impl PgAnalysisQueue {
    /// Paginated listing over every event, analyzed or not.
    pub async fn page(&self, limit: i64, offset: i64) -> Result<LiquidationPage, StoreError> {
        let limit = limit.clamp(1, 1000);
        let offset = offset.max(0);

        let sql = format!(
            r#"SELECT {VIEW_COLUMNS}
            FROM {events} lc
            LEFT JOIN {analysis} la ON lc.id = la.id
            ORDER BY lc.block_timestamp DESC
            LIMIT $1 OFFSET $2"#,
            events = self.tables.events,
            analysis = self.tables.analysis
        );
        let rows = sqlx::query(&sql)
            .bind(limit)
            .bind(offset)
            .fetch_all(&self.pool)
            .await?;

        let total_count: i64 = sqlx::query_scalar(&format!(
            "SELECT COUNT(*) FROM {}",
            self.tables.events
        ))
        .fetch_one(&self.pool)
        .await?;

        Ok(LiquidationPage {
            data: rows
                .iter()
                .map(LiquidationView::from_row)
                .collect::<Result<_, _>>()?,
            total_count,
            limit,
            offset,
        })
    }

    /// Every event that has a measured latency, newest first.
    pub async fn completed(&self) -> Result<Vec<LiquidationView>, StoreError> {
        let sql = format!(
            r#"SELECT {VIEW_COLUMNS}
            FROM {events} lc
            INNER JOIN {analysis} la ON lc.id = la.id
            WHERE la.latency_seconds IS NOT NULL
            ORDER BY lc.block_timestamp DESC"#,
            events = self.tables.events,
            analysis = self.tables.analysis
        );
        let rows = sqlx::query(&sql).fetch_all(&self.pool).await?;

        rows.iter().map(LiquidationView::from_row).collect()
    }
}
