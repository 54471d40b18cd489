//! Typed records crossing the database boundary.

use std::fmt;
use std::str::FromStr;

use alloy::primitives::{Address, TxHash, U256};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::postgres::PgRow;
use sqlx::Row;

use crate::error::StoreError;

/// One liquidation as recorded by the external indexer. Read-only input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LiquidationEvent {
    /// `{tx_hash}-{log_index}`
    pub id: String,
    pub user_address: Address,
    pub liquidator: Address,
    pub collateral_asset: Address,
    pub debt_asset: Address,
    /// Base-unit amount of debt repaid
    pub debt_to_cover: U256,
    /// Base-unit amount of collateral seized
    pub liquidated_collateral_amount: U256,
    pub block_number: u64,
    pub block_timestamp: DateTime<Utc>,
    pub tx_hash: TxHash,
}

impl LiquidationEvent {
    /// Decode a row by column name. Extra columns are ignored.
    pub fn from_row(row: &PgRow) -> Result<Self, StoreError> {
        let id: String = row.try_get("id")?;

        let text = |field: &'static str| -> Result<String, StoreError> {
            Ok(row.try_get::<String, _>(field)?)
        };
        let invalid = |field: &'static str, reason: String| StoreError::InvalidRow {
            id: id.clone(),
            field,
            reason,
        };
        let address = |field: &'static str| -> Result<Address, StoreError> {
            let raw = text(field)?;
            raw.trim()
                .parse::<Address>()
                .map_err(|e| invalid(field, format!("{raw:?}: {e}")))
        };
        let amount = |field: &'static str| -> Result<U256, StoreError> {
            let raw = text(field)?;
            raw.trim()
                .parse::<U256>()
                .map_err(|e| invalid(field, format!("{raw:?}: {e}")))
        };

        let block_number: i64 = row.try_get("block_number")?;
        let block_number = u64::try_from(block_number)
            .map_err(|_| invalid("block_number", format!("negative value {block_number}")))?;

        let block_timestamp: i64 = row.try_get("block_timestamp")?;
        let block_timestamp = DateTime::<Utc>::from_timestamp(block_timestamp, 0)
            .ok_or_else(|| invalid("block_timestamp", format!("out of range {block_timestamp}")))?;

        let tx_hash_raw = text("tx_hash")?;
        let tx_hash = tx_hash_raw
            .trim()
            .parse::<TxHash>()
            .map_err(|e| invalid("tx_hash", format!("{tx_hash_raw:?}: {e}")))?;

        Ok(Self {
            user_address: address("user_address")?,
            liquidator: address("liquidator")?,
            collateral_asset: address("collateral_asset")?,
            debt_asset: address("debt_asset")?,
            debt_to_cover: amount("debt_to_cover")?,
            liquidated_collateral_amount: amount("liquidated_collateral_amount")?,
            block_number,
            block_timestamp,
            tx_hash,
            id,
        })
    }

    /// Short tx hash for log lines.
    pub fn short_tx(&self) -> String {
        let full = self.tx_hash.to_string();
        full.chars().take(18).collect()
    }
}

/// Lifecycle of an analysis row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AnalysisStatus {
    Pending,
    Analyzed,
    Failed,
}

impl AnalysisStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Analyzed => "ANALYZED",
            Self::Failed => "FAILED",
        }
    }

    /// Whether the status ends processing for the event.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Analyzed | Self::Failed)
    }
}

impl fmt::Display for AnalysisStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AnalysisStatus {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(Self::Pending),
            "ANALYZED" => Ok(Self::Analyzed),
            "FAILED" => Ok(Self::Failed),
            other => Err(StoreError::UnknownStatus(other.to_string())),
        }
    }
}

/// One row of the analysis table. Exactly one per event id.
#[derive(Debug, Clone, PartialEq)]
pub struct AnalysisRecord {
    pub id: String,
    pub status: AnalysisStatus,
    pub first_liquidatable_block: Option<u64>,
    pub first_liquidatable_time: Option<DateTime<Utc>>,
    pub latency_seconds: Option<i64>,
    pub blocks_liquidatable: Option<u64>,
    pub collateral_symbol: Option<String>,
    pub collateral_decimals: Option<u8>,
    pub collateral_price_usd: Option<f64>,
    pub debt_symbol: Option<String>,
    pub debt_decimals: Option<u8>,
    pub debt_price_usd: Option<f64>,
    pub error_message: Option<String>,
}

impl AnalysisRecord {
    /// A FAILED record carrying only the reason.
    pub fn failed(id: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            status: AnalysisStatus::Failed,
            first_liquidatable_block: None,
            first_liquidatable_time: None,
            latency_seconds: None,
            blocks_liquidatable: None,
            collateral_symbol: None,
            collateral_decimals: None,
            collateral_price_usd: None,
            debt_symbol: None,
            debt_decimals: None,
            debt_price_usd: None,
            error_message: Some(message.into()),
        }
    }

    pub(crate) fn from_row(row: &PgRow) -> Result<Self, StoreError> {
        let id: String = row.try_get("id")?;
        let status: String = row.try_get("analysis_status")?;
        let first_liquidatable_time: Option<chrono::NaiveDateTime> =
            row.try_get("first_liquidatable_time")?;
        let to_u64 = |v: Option<i64>| v.and_then(|v| u64::try_from(v).ok());
        let to_u8 = |v: Option<i32>| v.and_then(|v| u8::try_from(v).ok());

        Ok(Self {
            status: status.parse()?,
            first_liquidatable_block: to_u64(row.try_get("first_liquidatable_block")?),
            first_liquidatable_time: first_liquidatable_time.map(|t| t.and_utc()),
            latency_seconds: row.try_get("latency_seconds")?,
            blocks_liquidatable: to_u64(row.try_get("blocks_liquidatable")?),
            collateral_symbol: row.try_get("collateral_symbol")?,
            collateral_decimals: to_u8(row.try_get("collateral_decimals")?),
            collateral_price_usd: row.try_get("collateral_price_usd")?,
            debt_symbol: row.try_get("debt_symbol")?,
            debt_decimals: to_u8(row.try_get("debt_decimals")?),
            debt_price_usd: row.try_get("debt_price_usd")?,
            error_message: row.try_get("error_message")?,
            id,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_round_trip() {
        for status in [
            AnalysisStatus::Pending,
            AnalysisStatus::Analyzed,
            AnalysisStatus::Failed,
        ] {
            assert_eq!(status.as_str().parse::<AnalysisStatus>().unwrap(), status);
        }
        assert!(matches!(
            "DONE".parse::<AnalysisStatus>(),
            Err(StoreError::UnknownStatus(_))
        ));
    }

    #[test]
    fn test_terminal_statuses() {
        assert!(!AnalysisStatus::Pending.is_terminal());
        assert!(AnalysisStatus::Analyzed.is_terminal());
        assert!(AnalysisStatus::Failed.is_terminal());
    }

    #[test]
    fn test_failed_record_has_no_timeline() {
        let record = AnalysisRecord::failed("0xabc-1", "no sub-1.0 block in window");
        assert_eq!(record.status, AnalysisStatus::Failed);
        assert!(record.first_liquidatable_block.is_none());
        assert!(record.latency_seconds.is_none());
        assert_eq!(
            record.error_message.as_deref(),
            Some("no sub-1.0 block in window")
        );
    }
}
