//! Earliest liquidatable block search.
//!
//! Binary search over a bounded window before the liquidation block, assuming
//! the health factor never recovers above 1.0 once it has dropped below it.
//! Accounts that dip, recover and dip again are reported at some block of a
//! sub-1.0 stretch, not necessarily the first one.

use std::sync::Arc;
use std::time::Duration;

use alloy::primitives::Address;
use tracing::{debug, warn};

use timeline_chain::ChainStateClient;

/// Result of one search.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SearchOutcome {
    /// Earliest sub-1.0 block seen, or the liquidation block as fallback
    pub block: u64,
    /// False when no probe in the window returned HF < 1.0
    pub sub_threshold_observed: bool,
    pub probes: u32,
    pub failed_probes: u32,
    pub window_start: u64,
}

impl SearchOutcome {
    /// Every probe failed, so the window says nothing about the account.
    pub fn all_probes_failed(&self) -> bool {
        self.probes > 0 && self.failed_probes == self.probes
    }
}

/// Finds the first block at which an account became liquidatable.
#[derive(Clone)]
pub struct LiquidatableBlockFinder {
    chain: Arc<dyn ChainStateClient>,
    /// Window size in blocks
    window: u64,
    /// Pause between probes
    probe_delay: Duration,
}

impl LiquidatableBlockFinder {
    pub fn new(chain: Arc<dyn ChainStateClient>, window: u64, probe_delay: Duration) -> Self {
        Self {
            chain,
            window,
            probe_delay,
        }
    }

    /// Inclusive search range `[max(1, L - W), L]`.
    pub fn search_range(&self, liquidation_block: u64) -> (u64, u64) {
        (
            liquidation_block.saturating_sub(self.window).max(1),
            liquidation_block,
        )
    }

    /// Search for the earliest block in the window where `user` had HF < 1.0.
    ///
    /// Never fails. Probes whose query fails are skipped by moving the lower
    /// bound past them.
    pub async fn find_first_liquidatable_block(
        &self,
        user: Address,
        liquidation_block: u64,
    ) -> SearchOutcome {
        let (window_start, _) = self.search_range(liquidation_block);
        let (mut low, mut high) = (window_start, liquidation_block);
        let mut candidate = None;
        let mut probes = 0u32;
        let mut failed_probes = 0u32;

        while low <= high {
            if probes > 0 && !self.probe_delay.is_zero() {
                tokio::time::sleep(self.probe_delay).await;
            }

            let mid = low + (high - low) / 2;
            probes += 1;

            match self.chain.account_snapshot(user, mid).await {
                Ok(snapshot) if snapshot.is_liquidatable() => {
                    debug!(
                        block = mid,
                        hf = snapshot.health_factor_f64(),
                        "Probe below threshold"
                    );
                    candidate = Some(mid);
                    // mid >= 1, so this never underflows
                    high = mid - 1;
                }
                Ok(snapshot) => {
                    debug!(
                        block = mid,
                        hf = snapshot.health_factor_f64(),
                        "Probe healthy"
                    );
                    low = mid + 1;
                }
                Err(e) => {
                    warn!(
                        block = mid,
                        error = %e,
                        transient = e.is_query_failure(),
                        "Probe failed, skipping"
                    );
                    failed_probes += 1;
                    low = mid + 1;
                }
            }
        }

        SearchOutcome {
            block: candidate.unwrap_or(liquidation_block),
            sub_threshold_observed: candidate.is_some(),
            probes,
            failed_probes,
            window_start,
        }
    }
}
