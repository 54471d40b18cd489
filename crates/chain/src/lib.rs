//! Timeline chain interaction layer.
//!
//! This crate provides:
//! - Contract bindings and deployment addresses for Aave V3 markets
//! - A read-only, block-pinned chain state client (account data, oracle
//!   prices, block timestamps)
//! - The startup reserve metadata snapshot
//! - Fixed-point helpers for WAD health factors and 8-decimal prices

pub mod contracts;
mod error;
mod provider;
mod reserves;
pub mod u256_math;

pub use contracts::AaveDeployment;
pub use error::ChainError;
pub use provider::{AaveChainClient, AccountSnapshot, ChainStateClient, ReserveEntry};
pub use reserves::{AssetMetadata, ReserveMetadataCache};
