//! In-memory chain used by unit tests.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU32, Ordering};

use alloy::primitives::{Address, TxHash, U256};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use timeline_chain::u256_math::WAD;
use timeline_chain::{AccountSnapshot, ChainError, ChainStateClient};
use timeline_store::LiquidationEvent;

/// Seconds per block in the synthetic timeline.
pub(crate) const BLOCK_TIME: i64 = 12;
/// Timestamp of block 0.
pub(crate) const GENESIS: i64 = 1_700_000_000;

pub(crate) fn timestamp_of(block: u64) -> DateTime<Utc> {
    DateTime::<Utc>::from_timestamp(GENESIS + block as i64 * BLOCK_TIME, 0).unwrap()
}

/// Chain where each user's health factor drops below 1.0 at a fixed block
/// and stays there.
#[derive(Default)]
pub(crate) struct SyntheticChain {
    /// First unhealthy block per user. Users absent here are always healthy.
    pub liquidatable_from: HashMap<Address, u64>,
    /// Blocks whose account reads fail
    pub failing_blocks: HashSet<u64>,
    pub fail_all_snapshots: bool,
    pub fail_prices: bool,
    pub prices: HashMap<Address, U256>,
    pub snapshot_calls: AtomicU32,
}

impl SyntheticChain {
    pub fn with_user(user: Address, first_unhealthy: u64) -> Self {
        let mut chain = Self::default();
        chain.liquidatable_from.insert(user, first_unhealthy);
        chain
    }

    pub fn snapshot_calls(&self) -> u32 {
        self.snapshot_calls.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl ChainStateClient for SyntheticChain {
    async fn account_snapshot(
        &self,
        user: Address,
        block: u64,
    ) -> Result<AccountSnapshot, ChainError> {
        self.snapshot_calls.fetch_add(1, Ordering::Relaxed);
        if self.fail_all_snapshots || self.failing_blocks.contains(&block) {
            return Err(ChainError::Query {
                call: "getUserAccountData",
                block: block.to_string(),
                message: "missing trie node".to_string(),
            });
        }

        let unhealthy = self
            .liquidatable_from
            .get(&user)
            .is_some_and(|from| block >= *from);
        let health_factor = if unhealthy { WAD / U256::from(2) } else { WAD * U256::from(2) };

        Ok(AccountSnapshot {
            block_number: block,
            health_factor,
            total_collateral: U256::from(1_000_00000000u64),
            total_debt: U256::from(800_00000000u64),
            available_borrows: U256::ZERO,
            liquidation_threshold: U256::from(8_250),
            ltv: U256::from(8_000),
        })
    }

    async fn asset_price_at_block(&self, block: u64, asset: Address) -> Result<U256, ChainError> {
        if self.fail_prices {
            return Err(ChainError::Timeout {
                call: "getAssetPrice",
                block: block.to_string(),
                secs: 30,
            });
        }
        Ok(self
            .prices
            .get(&asset)
            .copied()
            .unwrap_or(U256::from(1_00000000u64)))
    }

    async fn block_timestamp(&self, block: u64) -> Result<DateTime<Utc>, ChainError> {
        Ok(timestamp_of(block))
    }
}

pub(crate) fn user(n: u8) -> Address {
    Address::repeat_byte(n)
}

pub(crate) fn weth() -> Address {
    "0xC02aaA39b223FE8D0A0e5C4F27eAD9083C756Cc2".parse().unwrap()
}

pub(crate) fn usdc() -> Address {
    "0xA0b86991c6218b36c1d19D4a2e9Eb0cE3606eB48".parse().unwrap()
}

/// Event for `user` liquidated at `block`, WETH collateral and USDC debt.
pub(crate) fn event(id: &str, user: Address, block: u64) -> LiquidationEvent {
    LiquidationEvent {
        id: id.to_string(),
        user_address: user,
        liquidator: Address::repeat_byte(0xee),
        collateral_asset: weth(),
        debt_asset: usdc(),
        debt_to_cover: U256::from(1_000_000_000u64),
        liquidated_collateral_amount: U256::from(500_000_000_000_000_000u64),
        block_number: block,
        block_timestamp: timestamp_of(block),
        tx_hash: TxHash::repeat_byte(0xab),
    }
}
