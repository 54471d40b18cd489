//! Reserve metadata snapshot.
//!
//! Symbol and decimals for every reserve on the market, read once at startup
//! and never refreshed. Reserves listed later stay invisible until restart.

use std::collections::HashMap;

use alloy::primitives::Address;
use tracing::info;

use crate::error::ChainError;
use crate::provider::{AaveChainClient, ReserveEntry};

/// Symbol and decimals of one asset. Both empty for unknown assets.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AssetMetadata {
    pub symbol: Option<String>,
    pub decimals: Option<u8>,
}

/// Immutable asset registry keyed by token address.
///
/// Keys are parsed [`Address`] values, so lookups are case-insensitive with
/// respect to the hex text they came from.
#[derive(Debug, Clone, Default)]
pub struct ReserveMetadataCache {
    by_token: HashMap<Address, AssetMetadata>,
}

impl ReserveMetadataCache {
    /// Load the reserve list with one aggregate read.
    pub async fn load(client: &AaveChainClient) -> Result<Self, ChainError> {
        let reserves = client.reserve_list().await?;
        let cache = Self::from_entries(reserves);

        info!(
            reserve_count = cache.len(),
            market = client.deployment().name,
            "Reserve metadata loaded"
        );

        Ok(cache)
    }

    /// Build a registry from reserve entries.
    pub fn from_entries(entries: impl IntoIterator<Item = ReserveEntry>) -> Self {
        let by_token = entries
            .into_iter()
            .map(|entry| {
                (
                    entry.asset,
                    AssetMetadata {
                        symbol: Some(entry.symbol),
                        decimals: entry.decimals,
                    },
                )
            })
            .collect();

        Self { by_token }
    }

    /// Get metadata by token address.
    pub fn get(&self, token: &Address) -> Option<&AssetMetadata> {
        self.by_token.get(token)
    }

    /// Metadata for `token`, empty if the asset is not listed.
    pub fn resolve(&self, token: &Address) -> AssetMetadata {
        self.get(token).cloned().unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.by_token.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_token.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn weth() -> ReserveEntry {
        ReserveEntry {
            asset: "0xC02aaA39b223FE8D0A0e5C4F27eAD9083C756Cc2".parse().unwrap(),
            symbol: "WETH".to_string(),
            decimals: Some(18),
        }
    }

    #[test]
    fn test_lookup_ignores_hex_case() {
        let cache = ReserveMetadataCache::from_entries(vec![weth()]);

        let lower: Address = "0xc02aaa39b223fe8d0a0e5c4f27ead9083c756cc2".parse().unwrap();
        let meta = cache.resolve(&lower);
        assert_eq!(meta.symbol.as_deref(), Some("WETH"));
        assert_eq!(meta.decimals, Some(18));
    }

    #[test]
    fn test_unknown_asset_resolves_empty() {
        let cache = ReserveMetadataCache::from_entries(vec![weth()]);
        let meta = cache.resolve(&Address::repeat_byte(0x99));
        assert_eq!(meta, AssetMetadata::default());
        assert!(meta.symbol.is_none());
        assert!(cache.get(&Address::repeat_byte(0x99)).is_none());
    }

    #[test]
    fn test_len() {
        assert!(ReserveMetadataCache::default().is_empty());
        assert_eq!(ReserveMetadataCache::from_entries(vec![weth()]).len(), 1);
    }
}
