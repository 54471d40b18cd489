//! Contract bindings and deployment addresses for lending protocols.
//!
//! # Example
//!
//! ```rust,ignore
//! use timeline_chain::contracts::{aave_v3::IPool, AaveDeployment};
//!
//! let deployment = AaveDeployment::for_chain(1).unwrap();
//! let pool = IPool::new(deployment.pool, &provider);
//! let data = pool.getUserAccountData(user).block(BlockId::number(block)).call().await?;
//! ```

pub mod aave_v3;

use alloy::primitives::{address, Address};

/// Aave V3 market contracts on one chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AaveDeployment {
    /// Chain ID
    pub chain_id: u64,
    /// Human-readable market name
    pub name: &'static str,
    /// Pool (getUserAccountData)
    pub pool: Address,
    /// PoolAddressesProvider (historical price-oracle lookup)
    pub addresses_provider: Address,
    /// UiPoolDataProviderV3 (aggregate reserve list)
    pub ui_pool_data_provider: Address,
}

/// Aave V3 Ethereum core market.
pub const ETHEREUM: AaveDeployment = AaveDeployment {
    chain_id: 1,
    name: "Aave V3 Ethereum",
    pool: address!("87870Bca3F3fD6335C3F4ce8392D69350B4fA4E2"),
    addresses_provider: address!("2f39d218133AFaB8F2B819B1066c7E434Ad94E9e"),
    ui_pool_data_provider: address!("3F78BBD206e4D3c504Eb854232EdA7e47E9Fd8FC"),
};

const DEPLOYMENTS: &[AaveDeployment] = &[ETHEREUM];

impl AaveDeployment {
    /// Look up the market registered for a chain ID.
    pub fn for_chain(chain_id: u64) -> Option<&'static AaveDeployment> {
        DEPLOYMENTS.iter().find(|d| d.chain_id == chain_id)
    }
}
