//! Per-event timeline analysis.

use std::sync::Arc;

use alloy::primitives::Address;
use tracing::{debug, info, instrument};

use timeline_chain::u256_math::price_to_usd;
use timeline_chain::{AssetMetadata, ChainStateClient, ReserveMetadataCache};
use timeline_store::{AnalysisRecord, AnalysisStatus, LiquidationEvent};

use crate::error::AnalysisError;
use crate::finder::{LiquidatableBlockFinder, SearchOutcome};

/// What one analysis concluded.
#[derive(Debug, Clone, PartialEq)]
pub enum AnalysisOutcome {
    /// Ready to commit as ANALYZED
    Analyzed(AnalysisRecord),
    /// The window holds no sub-1.0 block. Committed as FAILED with the reason.
    Inconclusive { reason: String },
}

/// Asset description at the liquidation block.
#[derive(Debug, Clone, PartialEq)]
struct PricedAsset {
    metadata: AssetMetadata,
    price_usd: f64,
}

/// Computes how long a position sat liquidatable before it was liquidated.
#[derive(Clone)]
pub struct TimelineAnalyzer {
    chain: Arc<dyn ChainStateClient>,
    metadata: Arc<ReserveMetadataCache>,
    finder: LiquidatableBlockFinder,
}

impl TimelineAnalyzer {
    pub fn new(
        chain: Arc<dyn ChainStateClient>,
        metadata: Arc<ReserveMetadataCache>,
        finder: LiquidatableBlockFinder,
    ) -> Self {
        Self {
            chain,
            metadata,
            finder,
        }
    }

    /// Analyze one liquidation.
    ///
    /// Errors are per-event: a failed price or timestamp lookup. An
    /// inconclusive search is an outcome, not an error.
    #[instrument(skip_all, fields(id = %event.id, block = event.block_number))]
    pub async fn analyze(&self, event: &LiquidationEvent) -> Result<AnalysisOutcome, AnalysisError> {
        let collateral = self
            .price_asset(event.block_number, event.collateral_asset)
            .await?;
        let debt = self.price_asset(event.block_number, event.debt_asset).await?;

        let search = self
            .finder
            .find_first_liquidatable_block(event.user_address, event.block_number)
            .await;

        if !search.sub_threshold_observed {
            return Ok(AnalysisOutcome::Inconclusive {
                reason: inconclusive_reason(&search),
            });
        }

        let first_block = search.block;
        let first_time = self
            .chain
            .block_timestamp(first_block)
            .await
            .map_err(AnalysisError::chain("first liquidatable block timestamp"))?;

        let blocks_liquidatable = event.block_number.saturating_sub(first_block);
        let latency_seconds = (event.block_timestamp - first_time).num_seconds().max(0);

        info!(
            first_block,
            blocks_liquidatable,
            latency_seconds,
            probes = search.probes,
            failed_probes = search.failed_probes,
            "Timeline resolved"
        );

        Ok(AnalysisOutcome::Analyzed(AnalysisRecord {
            id: event.id.clone(),
            status: AnalysisStatus::Analyzed,
            first_liquidatable_block: Some(first_block),
            first_liquidatable_time: Some(first_time),
            latency_seconds: Some(latency_seconds),
            blocks_liquidatable: Some(blocks_liquidatable),
            collateral_symbol: collateral.metadata.symbol,
            collateral_decimals: collateral.metadata.decimals,
            collateral_price_usd: Some(collateral.price_usd),
            debt_symbol: debt.metadata.symbol,
            debt_decimals: debt.metadata.decimals,
            debt_price_usd: Some(debt.price_usd),
            error_message: None,
        }))
    }

    async fn price_asset(&self, block: u64, asset: Address) -> Result<PricedAsset, AnalysisError> {
        let metadata = self.metadata.resolve(&asset);
        let price = self
            .chain
            .asset_price_at_block(block, asset)
            .await
            .map_err(AnalysisError::chain("asset price lookup"))?;
        let price_usd = price_to_usd(price);

        debug!(%asset, symbol = ?metadata.symbol, price_usd, "Asset priced");
        Ok(PricedAsset {
            metadata,
            price_usd,
        })
    }
}

fn inconclusive_reason(search: &SearchOutcome) -> String {
    if search.all_probes_failed() {
        format!(
            "Could not find when position became liquidatable: all {} probes in blocks {}..={} failed",
            search.probes, search.window_start, search.block
        )
    } else {
        format!(
            "Could not find when position became liquidatable: health factor stayed >= 1.0 in blocks {}..={} ({} probes, {} failed)",
            search.window_start, search.block, search.probes, search.failed_probes
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{event, usdc, user, weth, SyntheticChain};
    use alloy::primitives::U256;
    use std::time::Duration;
    use timeline_chain::ReserveEntry;

    fn metadata() -> Arc<ReserveMetadataCache> {
        Arc::new(ReserveMetadataCache::from_entries(vec![
            ReserveEntry {
                asset: weth(),
                symbol: "WETH".to_string(),
                decimals: Some(18),
            },
            ReserveEntry {
                asset: usdc(),
                symbol: "USDC".to_string(),
                decimals: Some(6),
            },
        ]))
    }

    fn analyzer(mut chain: SyntheticChain, metadata: Arc<ReserveMetadataCache>) -> TimelineAnalyzer {
        chain.prices.insert(weth(), U256::from(2_000_00000000u64));
        let chain: Arc<dyn ChainStateClient> = Arc::new(chain);
        let finder = LiquidatableBlockFinder::new(chain.clone(), 100, Duration::ZERO);
        TimelineAnalyzer::new(chain, metadata, finder)
    }

    #[tokio::test]
    async fn test_analyzed_record() {
        let a = analyzer(SyntheticChain::with_user(user(1), 950), metadata());

        let outcome = a.analyze(&event("0xab-1", user(1), 1000)).await.unwrap();
        let AnalysisOutcome::Analyzed(record) = outcome else {
            panic!("expected analyzed outcome, got {outcome:?}");
        };

        assert_eq!(record.id, "0xab-1");
        assert_eq!(record.status, AnalysisStatus::Analyzed);
        assert_eq!(record.first_liquidatable_block, Some(950));
        assert_eq!(record.blocks_liquidatable, Some(50));
        assert_eq!(record.latency_seconds, Some(50 * crate::testing::BLOCK_TIME));
        assert_eq!(record.collateral_symbol.as_deref(), Some("WETH"));
        assert_eq!(record.collateral_decimals, Some(18));
        assert_eq!(record.collateral_price_usd, Some(2000.0));
        assert_eq!(record.debt_symbol.as_deref(), Some("USDC"));
        assert_eq!(record.debt_price_usd, Some(1.0));
        assert!(record.error_message.is_none());
    }

    #[tokio::test]
    async fn test_liquidated_at_first_unhealthy_block() {
        let a = analyzer(SyntheticChain::with_user(user(1), 1000), metadata());

        let outcome = a.analyze(&event("0xab-1", user(1), 1000)).await.unwrap();
        let AnalysisOutcome::Analyzed(record) = outcome else {
            panic!("expected analyzed outcome");
        };
        assert_eq!(record.blocks_liquidatable, Some(0));
        assert_eq!(record.latency_seconds, Some(0));
    }

    #[tokio::test]
    async fn test_latency_is_clamped() {
        let a = analyzer(SyntheticChain::with_user(user(1), 950), metadata());
        let mut liquidation = event("0xab-1", user(1), 1000);
        // Indexer timestamp earlier than the chain's view of block 950
        liquidation.block_timestamp = crate::testing::timestamp_of(900);

        let AnalysisOutcome::Analyzed(record) = a.analyze(&liquidation).await.unwrap() else {
            panic!("expected analyzed outcome");
        };
        assert_eq!(record.latency_seconds, Some(0));
    }

    #[tokio::test]
    async fn test_unknown_asset_has_empty_metadata() {
        let a = analyzer(
            SyntheticChain::with_user(user(1), 950),
            Arc::new(ReserveMetadataCache::default()),
        );

        let AnalysisOutcome::Analyzed(record) =
            a.analyze(&event("0xab-1", user(1), 1000)).await.unwrap()
        else {
            panic!("expected analyzed outcome");
        };
        assert!(record.collateral_symbol.is_none());
        assert!(record.collateral_decimals.is_none());
        assert!(record.debt_symbol.is_none());
        assert_eq!(record.collateral_price_usd, Some(2000.0));
    }

    #[tokio::test]
    async fn test_never_liquidatable_is_inconclusive() {
        let a = analyzer(SyntheticChain::default(), metadata());

        let outcome = a.analyze(&event("0xab-1", user(1), 1000)).await.unwrap();
        match outcome {
            AnalysisOutcome::Inconclusive { reason } => {
                assert!(reason.contains("stayed >= 1.0"));
                assert!(reason.contains("900..=1000"));
            }
            other => panic!("expected inconclusive, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_all_probes_failed_is_inconclusive() {
        let chain = SyntheticChain {
            fail_all_snapshots: true,
            ..SyntheticChain::with_user(user(1), 950)
        };
        let a = analyzer(chain, metadata());

        match a.analyze(&event("0xab-1", user(1), 1000)).await.unwrap() {
            AnalysisOutcome::Inconclusive { reason } => assert!(reason.contains("probes")),
            other => panic!("expected inconclusive, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_price_failure_is_an_error() {
        let chain = SyntheticChain {
            fail_prices: true,
            ..SyntheticChain::with_user(user(1), 950)
        };
        let a = analyzer(chain, metadata());

        let err = a.analyze(&event("0xab-1", user(1), 1000)).await.unwrap_err();
        assert!(err.to_string().starts_with("asset price lookup"));
    }
}
