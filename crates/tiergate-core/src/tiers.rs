//! # Tier Table
//!
//! Ordered (purchase-count threshold, discount rate) bands.
//!
//! ## Resolution
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  Standard table:   threshold   0 ─── 5 ─── 10 ──────── 20 ─────────►    │
//! │                    rate          0%    5%     10%          15%          │
//! │                                                                         │
//! │  rate_for(count) = rate of the HIGHEST threshold <= count               │
//! │                    (inclusive: count 5 is already in the 5% band)       │
//! │                    0% below the lowest threshold                        │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Invariants
//! - Thresholds strictly ascending
//! - Every rate in [0, 10000] bps
//! - Rates non-decreasing from one tier to the next
//! - At most [`MAX_TIERS`](crate::MAX_TIERS) tiers
//!
//! Every mutating method validates a candidate table first and only swaps it
//! in when valid, so a rejected change leaves the table untouched.

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult};
use crate::types::{DiscountRate, PurchaseCount};
use crate::MAX_TIERS;

// =============================================================================
// Discount Tier
// =============================================================================

/// A single discount band.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscountTier {
    /// Minimum purchase count (inclusive) for this band.
    pub threshold: PurchaseCount,
    /// Discount applied inside this band.
    pub rate: DiscountRate,
}

impl DiscountTier {
    pub const fn new(threshold: PurchaseCount, rate: DiscountRate) -> Self {
        DiscountTier { threshold, rate }
    }
}

// =============================================================================
// Tier Table
// =============================================================================

/// Validated, ordered set of discount tiers.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "Vec<DiscountTier>", into = "Vec<DiscountTier>")]
pub struct TierTable {
    tiers: Vec<DiscountTier>,
}

impl TierTable {
    /// Builds a table from tiers given in ascending threshold order.
    pub fn new(tiers: Vec<DiscountTier>) -> CoreResult<Self> {
        Self::validate(&tiers)?;
        Ok(TierTable { tiers })
    }

    /// A table without tiers: every account pays full price.
    pub fn empty() -> Self {
        TierTable { tiers: Vec::new() }
    }

    /// The standard loyalty table.
    ///
    /// | Purchases | Discount |
    /// |-----------|----------|
    /// | 0 - 4     | 0%       |
    /// | 5 - 9     | 5%       |
    /// | 10 - 19   | 10%      |
    /// | 20+       | 15%      |
    pub fn standard() -> Self {
        TierTable {
            tiers: vec![
                DiscountTier::new(5, DiscountRate::from_percent(5)),
                DiscountTier::new(10, DiscountRate::from_percent(10)),
                DiscountTier::new(20, DiscountRate::from_percent(15)),
            ],
        }
    }

    /// Returns the tiers in ascending threshold order.
    pub fn tiers(&self) -> &[DiscountTier] {
        &self.tiers
    }

    pub fn len(&self) -> usize {
        self.tiers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tiers.is_empty()
    }

    /// Returns the tier an account with `count` purchases falls into.
    pub fn tier_for(&self, count: PurchaseCount) -> Option<&DiscountTier> {
        let idx = self.tiers.partition_point(|t| t.threshold <= count);
        idx.checked_sub(1).map(|i| &self.tiers[i])
    }

    /// Returns the rate for `count` purchases (0% below the first tier).
    pub fn rate_for(&self, count: PurchaseCount) -> DiscountRate {
        self.tier_for(count)
            .map(|t| t.rate)
            .unwrap_or_else(DiscountRate::zero)
    }

    /// Returns the next tier above `count`, if any.
    pub fn next_tier(&self, count: PurchaseCount) -> Option<&DiscountTier> {
        let idx = self.tiers.partition_point(|t| t.threshold <= count);
        self.tiers.get(idx)
    }

    /// Inserts a new tier at its sorted position.
    ///
    /// Fails on a duplicate threshold or when the rate would break
    /// monotonicity with its neighbours.
    pub fn add_tier(&mut self, tier: DiscountTier) -> CoreResult<()> {
        let idx = self.tiers.partition_point(|t| t.threshold < tier.threshold);
        if self.tiers.get(idx).map(|t| t.threshold) == Some(tier.threshold) {
            return Err(CoreError::tier(format!(
                "a tier with threshold {} already exists",
                tier.threshold
            )));
        }

        let mut candidate = self.tiers.clone();
        candidate.insert(idx, tier);
        Self::validate(&candidate)?;
        self.tiers = candidate;
        Ok(())
    }

    /// Removes the tier with `threshold` and returns it.
    pub fn remove_tier(&mut self, threshold: PurchaseCount) -> CoreResult<DiscountTier> {
        let idx = self.position(threshold)?;
        Ok(self.tiers.remove(idx))
    }

    /// Changes the rate of the tier with `threshold`, returning the old tier.
    pub fn update_tier(
        &mut self,
        threshold: PurchaseCount,
        rate: DiscountRate,
    ) -> CoreResult<DiscountTier> {
        let idx = self.position(threshold)?;
        let mut candidate = self.tiers.clone();
        let previous = candidate[idx];
        candidate[idx].rate = rate;
        Self::validate(&candidate)?;
        self.tiers = candidate;
        Ok(previous)
    }

    /// Checks every table invariant.
    pub fn validate(tiers: &[DiscountTier]) -> CoreResult<()> {
        if tiers.len() > MAX_TIERS {
            return Err(CoreError::tier(format!(
                "at most {} tiers are allowed, got {}",
                MAX_TIERS,
                tiers.len()
            )));
        }

        for tier in tiers {
            if !tier.rate.is_valid() {
                return Err(CoreError::tier(format!(
                    "rate {} bps at threshold {} exceeds 10000 bps",
                    tier.rate.bps(),
                    tier.threshold
                )));
            }
        }

        for pair in tiers.windows(2) {
            let (lower, upper) = (pair[0], pair[1]);
            if upper.threshold <= lower.threshold {
                return Err(CoreError::tier(format!(
                    "thresholds must be strictly ascending ({} after {})",
                    upper.threshold, lower.threshold
                )));
            }
            if upper.rate < lower.rate {
                return Err(CoreError::tier(format!(
                    "rate at threshold {} ({}) is lower than at threshold {} ({})",
                    upper.threshold, upper.rate, lower.threshold, lower.rate
                )));
            }
        }

        Ok(())
    }

    fn position(&self, threshold: PurchaseCount) -> CoreResult<usize> {
        self.tiers
            .binary_search_by_key(&threshold, |t| t.threshold)
            .map_err(|_| CoreError::tier(format!("no tier with threshold {}", threshold)))
    }
}

impl TryFrom<Vec<DiscountTier>> for TierTable {
    type Error = CoreError;

    fn try_from(tiers: Vec<DiscountTier>) -> Result<Self, Self::Error> {
        TierTable::new(tiers)
    }
}

impl From<TierTable> for Vec<DiscountTier> {
    fn from(table: TierTable) -> Self {
        table.tiers
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn tier(threshold: u64, pct: u32) -> DiscountTier {
        DiscountTier::new(threshold, DiscountRate::from_percent(pct))
    }

    #[test]
    fn test_standard_rates_inclusive_boundaries() {
        let table = TierTable::standard();
        assert_eq!(table.rate_for(0).bps(), 0);
        assert_eq!(table.rate_for(4).bps(), 0);
        assert_eq!(table.rate_for(5).bps(), 500);
        assert_eq!(table.rate_for(9).bps(), 500);
        assert_eq!(table.rate_for(10).bps(), 1000);
        assert_eq!(table.rate_for(19).bps(), 1000);
        assert_eq!(table.rate_for(20).bps(), 1500);
        assert_eq!(table.rate_for(u64::MAX).bps(), 1500);
    }

    #[test]
    fn test_empty_table_is_full_price() {
        let table = TierTable::empty();
        assert!(table.is_empty());
        assert!(table.rate_for(1_000).is_zero());
        assert!(table.tier_for(1_000).is_none());
    }

    #[test]
    fn test_next_tier() {
        let table = TierTable::standard();
        assert_eq!(table.next_tier(0).map(|t| t.threshold), Some(5));
        assert_eq!(table.next_tier(5).map(|t| t.threshold), Some(10));
        assert_eq!(table.next_tier(20), None);
    }

    #[test]
    fn test_rejects_non_ascending_thresholds() {
        let err = TierTable::new(vec![tier(10, 5), tier(5, 10)]).unwrap_err();
        assert!(matches!(err, CoreError::TierConfiguration { .. }));

        assert!(TierTable::new(vec![tier(5, 5), tier(5, 10)]).is_err());
    }

    #[test]
    fn test_rejects_decreasing_rates() {
        assert!(TierTable::new(vec![tier(5, 10), tier(10, 5)]).is_err());
        // Equal rates are allowed
        assert!(TierTable::new(vec![tier(5, 10), tier(10, 10)]).is_ok());
    }

    #[test]
    fn test_rejects_rate_out_of_range() {
        let bad = DiscountTier::new(5, DiscountRate::from_bps(10_001));
        assert!(TierTable::new(vec![bad]).is_err());
        let full = DiscountTier::new(5, DiscountRate::from_bps(10_000));
        assert!(TierTable::new(vec![full]).is_ok());
    }

    #[test]
    fn test_rejects_too_many_tiers() {
        let tiers: Vec<DiscountTier> = (0..=MAX_TIERS as u64).map(|i| tier(i, 0)).collect();
        assert!(TierTable::new(tiers).is_err());
    }

    #[test]
    fn test_add_tier_sorted_insert() {
        let mut table = TierTable::standard();
        table.add_tier(tier(15, 12)).unwrap();
        let thresholds: Vec<u64> = table.tiers().iter().map(|t| t.threshold).collect();
        assert_eq!(thresholds, vec![5, 10, 15, 20]);
        assert_eq!(table.rate_for(16).bps(), 1200);
    }

    #[test]
    fn test_add_tier_rejection_leaves_table_unchanged() {
        let mut table = TierTable::standard();
        let before = table.clone();

        // Duplicate threshold
        assert!(table.add_tier(tier(10, 10)).is_err());
        // Breaks monotonicity (between 10% and 15%)
        assert!(table.add_tier(tier(15, 20)).is_err());

        assert_eq!(table, before);
    }

    #[test]
    fn test_remove_tier() {
        let mut table = TierTable::standard();
        let removed = table.remove_tier(10).unwrap();
        assert_eq!(removed.rate.bps(), 1000);
        assert_eq!(table.rate_for(12).bps(), 500);
        assert!(table.remove_tier(10).is_err());
    }

    #[test]
    fn test_update_tier() {
        let mut table = TierTable::standard();
        let previous = table.update_tier(10, DiscountRate::from_percent(12)).unwrap();
        assert_eq!(previous.rate.bps(), 1000);
        assert_eq!(table.rate_for(10).bps(), 1200);

        // Would exceed the next tier's rate
        assert!(table.update_tier(10, DiscountRate::from_percent(20)).is_err());
        assert_eq!(table.rate_for(10).bps(), 1200);

        assert!(table.update_tier(7, DiscountRate::zero()).is_err());
    }

    #[test]
    fn test_serde_validates_on_load() {
        let table: TierTable =
            serde_json::from_str(r#"[{"threshold":5,"rate":500},{"threshold":10,"rate":1000}]"#)
                .unwrap();
        assert_eq!(table.len(), 2);

        let invalid = serde_json::from_str::<TierTable>(
            r#"[{"threshold":10,"rate":500},{"threshold":5,"rate":1000}]"#,
        );
        assert!(invalid.is_err());
    }
}
