//! Historical chain state access.
//! Uses Alloy providers for type-safe, block-pinned contract reads.

use std::future::IntoFuture;
use std::time::Duration;

use alloy::eips::{BlockId, BlockNumberOrTag};
use alloy::primitives::{Address, U256};
use alloy::providers::{Provider, RootProvider};
use alloy::transports::http::reqwest::Url;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::{debug, info};

use crate::contracts::aave_v3::{
    IPool, IPoolAddressesProvider, IPriceOracle, IUiPoolDataProviderV3,
};
use crate::contracts::AaveDeployment;
use crate::error::ChainError;
use crate::u256_math::{self, BASE_CURRENCY_DECIMALS};

/// Account data for one user at one block. Never persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountSnapshot {
    pub block_number: u64,
    /// Health factor, WAD scaled. 0 or `U256::MAX` means no debt.
    pub health_factor: U256,
    /// Total collateral in base currency (8 decimals)
    pub total_collateral: U256,
    /// Total debt in base currency (8 decimals)
    pub total_debt: U256,
    /// Available borrows in base currency (8 decimals)
    pub available_borrows: U256,
    /// Weighted liquidation threshold (basis points)
    pub liquidation_threshold: U256,
    /// Weighted loan-to-value (basis points)
    pub ltv: U256,
}

impl AccountSnapshot {
    /// Check if position is liquidatable (HF < 1.0).
    pub fn is_liquidatable(&self) -> bool {
        u256_math::is_liquidatable_wad(self.health_factor)
    }

    /// Health factor as f64, infinite when the account has no debt.
    pub fn health_factor_f64(&self) -> f64 {
        if u256_math::is_no_debt_hf(self.health_factor) {
            f64::INFINITY
        } else {
            u256_math::wad_to_f64(self.health_factor)
        }
    }

    pub fn total_collateral_usd(&self) -> f64 {
        u256_math::to_f64_scaled(self.total_collateral, BASE_CURRENCY_DECIMALS)
    }

    pub fn total_debt_usd(&self) -> f64 {
        u256_math::to_f64_scaled(self.total_debt, BASE_CURRENCY_DECIMALS)
    }

    /// Weighted liquidation threshold as a ratio (0.825 for 8250 bps).
    pub fn liquidation_threshold_ratio(&self) -> f64 {
        u256_math::to_f64_scaled(self.liquidation_threshold, 0) / u256_math::BPS_DENOMINATOR
    }
}

/// Reserve entry from the aggregate reserve read.
#[derive(Debug, Clone)]
pub struct ReserveEntry {
    pub asset: Address,
    pub symbol: String,
    pub decimals: Option<u8>,
}

/// Read-only access to historical chain state.
///
/// Implementations hold no per-call state and are shared by every worker.
/// Nothing is cached: each call is one network round trip.
#[async_trait]
pub trait ChainStateClient: Send + Sync {
    /// Account data for `user` as of `block`.
    ///
    /// Fails when the node cannot serve state at that height or the call
    /// reverts. A healthy account is not an error.
    async fn account_snapshot(&self, user: Address, block: u64)
        -> Result<AccountSnapshot, ChainError>;

    /// Oracle price of `asset` at `block` (8-decimal USD).
    ///
    /// The oracle address is resolved at the same block since the
    /// addresses provider may point to a different oracle over time.
    async fn asset_price_at_block(&self, block: u64, asset: Address) -> Result<U256, ChainError>;

    /// Timestamp of `block`.
    async fn block_timestamp(&self, block: u64) -> Result<DateTime<Utc>, ChainError>;
}

/// Aave V3 chain client bound to one RPC endpoint and one market.
///
/// The underlying provider is reference counted, so cloning is cheap and all
/// clones share one HTTP connection pool.
#[derive(Clone)]
pub struct AaveChainClient {
    provider: RootProvider,
    deployment: AaveDeployment,
    /// Upper bound for every RPC call
    call_timeout: Duration,
}

impl std::fmt::Debug for AaveChainClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AaveChainClient")
            .field("deployment", &self.deployment.name)
            .field("call_timeout", &self.call_timeout)
            .finish()
    }
}

impl AaveChainClient {
    /// Connect to an RPC endpoint and verify it serves the expected chain.
    pub async fn connect(
        rpc_url: &str,
        chain_id: u64,
        call_timeout: Duration,
    ) -> Result<Self, ChainError> {
        let deployment =
            *AaveDeployment::for_chain(chain_id).ok_or(ChainError::UnsupportedChain(chain_id))?;

        let url: Url = rpc_url
            .parse()
            .map_err(|e| ChainError::InvalidUrl(format!("{rpc_url}: {e}")))?;
        let client = Self {
            provider: RootProvider::new_http(url),
            deployment,
            call_timeout,
        };

        // Test connection
        let actual = client
            .bounded("eth_chainId", None, client.provider.get_chain_id())
            .await?;
        if actual != chain_id {
            return Err(ChainError::ChainIdMismatch {
                expected: chain_id,
                actual,
            });
        }
        let head = client
            .bounded("eth_blockNumber", None, client.provider.get_block_number())
            .await?;

        info!(
            chain_id,
            market = deployment.name,
            pool = %deployment.pool,
            head_block = head,
            "Provider connection verified"
        );

        Ok(client)
    }

    /// Market this client reads from.
    pub fn deployment(&self) -> &AaveDeployment {
        &self.deployment
    }

    /// Current head block.
    pub async fn block_number(&self) -> Result<u64, ChainError> {
        self.bounded("eth_blockNumber", None, self.provider.get_block_number())
            .await
    }

    /// All reserves listed on the market at head, from one aggregate read.
    pub async fn reserve_list(&self) -> Result<Vec<ReserveEntry>, ChainError> {
        let data_provider =
            IUiPoolDataProviderV3::new(self.deployment.ui_pool_data_provider, &self.provider);
        let call = data_provider.getReservesData(self.deployment.addresses_provider);
        let reserves = self.bounded("getReservesData", None, call.call()).await?;

        Ok(reserves
            ._0
            .into_iter()
            .map(|r| ReserveEntry {
                asset: r.underlyingAsset,
                symbol: r.symbol,
                decimals: u8::try_from(r.decimals).ok(),
            })
            .collect())
    }

    /// Run one RPC future under the call timeout, mapping failures into
    /// [`ChainError`].
    async fn bounded<T, E, F>(
        &self,
        call: &'static str,
        block: Option<u64>,
        fut: F,
    ) -> Result<T, ChainError>
    where
        F: IntoFuture<Output = Result<T, E>>,
        E: std::fmt::Display,
    {
        let block_label = || block.map_or_else(|| "latest".to_string(), |b| b.to_string());

        match tokio::time::timeout(self.call_timeout, fut.into_future()).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => Err(ChainError::Query {
                call,
                block: block_label(),
                message: e.to_string(),
            }),
            Err(_) => Err(ChainError::Timeout {
                call,
                block: block_label(),
                secs: self.call_timeout.as_secs(),
            }),
        }
    }
}

#[async_trait]
impl ChainStateClient for AaveChainClient {
    async fn account_snapshot(
        &self,
        user: Address,
        block: u64,
    ) -> Result<AccountSnapshot, ChainError> {
        let pool = IPool::new(self.deployment.pool, &self.provider);
        let call = pool
            .getUserAccountData(user)
            .block(BlockId::number(block));
        let data = self
            .bounded("getUserAccountData", Some(block), call.call())
            .await?;

        let snapshot = AccountSnapshot {
            block_number: block,
            health_factor: data.healthFactor,
            total_collateral: data.totalCollateralBase,
            total_debt: data.totalDebtBase,
            available_borrows: data.availableBorrowsBase,
            liquidation_threshold: data.currentLiquidationThreshold,
            ltv: data.ltv,
        };

        debug!(
            user = %user,
            block,
            health_factor = snapshot.health_factor_f64(),
            debt_usd = snapshot.total_debt_usd(),
            liquidation_threshold = snapshot.liquidation_threshold_ratio(),
            "Account snapshot"
        );

        Ok(snapshot)
    }

    async fn asset_price_at_block(&self, block: u64, asset: Address) -> Result<U256, ChainError> {
        let provider_contract =
            IPoolAddressesProvider::new(self.deployment.addresses_provider, &self.provider);
        let oracle_call = provider_contract
            .getPriceOracle()
            .block(BlockId::number(block));
        let oracle = self
            .bounded("getPriceOracle", Some(block), oracle_call.call())
            .await?
            ._0;

        let oracle_contract = IPriceOracle::new(oracle, &self.provider);
        let price_call = oracle_contract
            .getAssetPrice(asset)
            .block(BlockId::number(block));
        let price = self
            .bounded("getAssetPrice", Some(block), price_call.call())
            .await?
            ._0;

        debug!(asset = %asset, oracle = %oracle, block, price = %price, "Asset price");
        Ok(price)
    }

    async fn block_timestamp(&self, block: u64) -> Result<DateTime<Utc>, ChainError> {
        let block_data = self
            .bounded(
                "eth_getBlockByNumber",
                Some(block),
                self.provider
                    .get_block_by_number(BlockNumberOrTag::Number(block)),
            )
            .await?
            .ok_or(ChainError::BlockNotFound(block))?;

        let timestamp = block_data.header.timestamp;
        i64::try_from(timestamp)
            .ok()
            .and_then(|secs| DateTime::<Utc>::from_timestamp(secs, 0))
            .ok_or(ChainError::InvalidTimestamp { block, timestamp })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::u256_math::WAD;

    fn snapshot(health_factor: U256) -> AccountSnapshot {
        AccountSnapshot {
            block_number: 100,
            health_factor,
            total_collateral: U256::from(150_000_000_000u64), // $1,500
            total_debt: U256::from(100_000_000_000u64),       // $1,000
            available_borrows: U256::ZERO,
            liquidation_threshold: U256::from(8250u64),
            ltv: U256::from(8000u64),
        }
    }

    #[test]
    fn test_snapshot_liquidatable() {
        let s = snapshot(WAD - U256::from(1u64));
        assert!(s.is_liquidatable());
        assert!(s.health_factor_f64() < 1.0);
        assert!((s.total_debt_usd() - 1000.0).abs() < 1e-9);
        assert!((s.total_collateral_usd() - 1500.0).abs() < 1e-9);
        assert!((s.liquidation_threshold_ratio() - 0.825).abs() < 1e-12);
    }

    #[test]
    fn test_snapshot_without_debt_is_healthy() {
        let s = snapshot(U256::ZERO);
        assert!(!s.is_liquidatable());
        assert!(s.health_factor_f64().is_infinite());

        let s = snapshot(U256::MAX);
        assert!(!s.is_liquidatable());
    }

    #[tokio::test]
    async fn test_unsupported_chain_rejected_before_network() {
        let result =
            AaveChainClient::connect("http://127.0.0.1:1", 999, Duration::from_secs(1)).await;
        assert!(matches!(result, Err(ChainError::UnsupportedChain(999))));
    }

    #[tokio::test]
    async fn test_invalid_url_rejected() {
        let result = AaveChainClient::connect("not a url", 1, Duration::from_secs(1)).await;
        assert!(matches!(result, Err(ChainError::InvalidUrl(_))));
    }

    #[tokio::test]
    #[ignore] // Requires network
    async fn test_mainnet_account_snapshot() {
        let url = std::env::var("RPC_URL").unwrap();
        let client = AaveChainClient::connect(&url, 1, Duration::from_secs(30))
            .await
            .unwrap();
        let head = client.block_number().await.unwrap();
        let snapshot = client
            .account_snapshot(Address::repeat_byte(0x42), head)
            .await
            .unwrap();
        assert!(!snapshot.is_liquidatable());

        let reserves = client.reserve_list().await.unwrap();
        assert!(reserves.iter().any(|r| r.symbol == "WETH"));
    }
}
