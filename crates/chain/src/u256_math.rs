//! Fixed-point helpers for Aave account data.
//!
//! Health factors are WAD (1e18) scaled, base-currency totals and oracle
//! prices carry 8 decimals, thresholds are basis points.

use alloy::primitives::U256;

/// WAD constant: 1e18 for 18-decimal fixed-point arithmetic
pub const WAD: U256 = U256::from_limbs([1_000_000_000_000_000_000u64, 0, 0, 0]);

/// Oracle price decimals (8)
pub const PRICE_DECIMALS: u8 = 8;

/// Base currency decimals used by getUserAccountData totals (8)
pub const BASE_CURRENCY_DECIMALS: u8 = 8;

/// Basis points denominator (10000 = 100%)
pub const BPS_DENOMINATOR: f64 = 10_000.0;

/// Convert a fixed-point integer with `decimals` decimals to f64.
/// Use only for display and persistence, not for comparisons.
#[inline(always)]
pub fn to_f64_scaled(value: U256, decimals: u8) -> f64 {
    let raw = if value <= U256::from(u128::MAX) {
        let v: u128 = value.to();
        v as f64
    } else {
        let limbs = value.as_limbs();
        let base = u64::MAX as f64 + 1.0;
        limbs
            .iter()
            .rev()
            .fold(0.0, |acc, limb| acc * base + *limb as f64)
    };
    raw / 10f64.powi(decimals as i32)
}

/// Convert WAD (18 decimals) to f64.
#[inline(always)]
pub fn wad_to_f64(wad: U256) -> f64 {
    to_f64_scaled(wad, 18)
}

/// Convert an 8-decimal oracle price to USD.
#[inline(always)]
pub fn price_to_usd(price: U256) -> f64 {
    to_f64_scaled(price, PRICE_DECIMALS)
}

/// Whether a health factor is an "infinite" sentinel.
///
/// Aave reports `uint256::MAX` for accounts without debt; a raw zero is
/// treated the same way.
#[inline(always)]
pub fn is_no_debt_hf(hf_wad: U256) -> bool {
    hf_wad.is_zero() || hf_wad == U256::MAX
}

/// Check if health factor indicates liquidatable position (HF < 1.0).
#[inline(always)]
pub fn is_liquidatable_wad(hf_wad: U256) -> bool {
    !is_no_debt_hf(hf_wad) && hf_wad < WAD
}
