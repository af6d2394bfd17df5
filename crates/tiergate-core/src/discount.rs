//! # Discount Engine
//!
//! Maps (amount, purchase count, context) to the amount actually charged.
//!
//! ## Pipeline
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Discount Evaluation Order                          │
//! │                                                                         │
//! │  amount ──► BASE RATE ─────────────────────────────────────────────►   │
//! │             custom override (if set) REPLACES the tier rate             │
//! │                 │                                                       │
//! │                 ▼                                                       │
//! │  MODIFIERS (fixed order, each floors its own discount)                  │
//! │    1. bulk          quantity >= min_quantity                            │
//! │    2. seasonal      starts_at <= at < ends_at                           │
//! │    3. happy hour    from_hour <= hour(at) < to_hour (UTC)               │
//! │    4. loyalty       account flagged as loyalty member                   │
//! │    5. referral      account flagged as referred                         │
//! │    6. first purchase  purchase_count == 0                               │
//! │                 │                                                       │
//! │                 ▼                                                       │
//! │  CAP: total discount <= max_combined_rate × amount                      │
//! │  FLOOR: charge is never below 1 unit                                    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Modifiers stack multiplicatively: 10% then 5% takes 14.5% off, not 15%.
//! Every function here is pure; the caller supplies the clock through
//! [`DiscountContext::at`].

use chrono::{DateTime, Timelike, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::amount::Amount;
use crate::error::{CoreError, CoreResult};
use crate::tiers::{DiscountTier, TierTable};
use crate::types::{DiscountRate, PurchaseCount};
use crate::validation::{validate_amount, validate_batch, validate_rate};
use crate::{DEFAULT_MAX_COMBINED_BPS, MAX_BATCH_SIZE};

/// Smallest charge a positive amount can be discounted to.
const MIN_CHARGE: Amount = Amount::from_units(1);

// =============================================================================
// Context
// =============================================================================

/// Facts about the purchase the modifiers look at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscountContext {
    /// Purchases completed before this one.
    pub purchase_count: PurchaseCount,
    /// Units bought in this purchase.
    pub quantity: u64,
    /// Evaluation time.
    pub at: DateTime<Utc>,
    pub loyalty_member: bool,
    pub referred: bool,
}

impl DiscountContext {
    /// Context with a quantity of one and no account flags.
    pub fn new(purchase_count: PurchaseCount, at: DateTime<Utc>) -> Self {
        DiscountContext {
            purchase_count,
            quantity: 1,
            at,
            loyalty_member: false,
            referred: false,
        }
    }

    pub fn with_quantity(mut self, quantity: u64) -> Self {
        self.quantity = quantity;
        self
    }

    pub fn with_loyalty(mut self, loyalty_member: bool) -> Self {
        self.loyalty_member = loyalty_member;
        self
    }

    pub fn with_referral(mut self, referred: bool) -> Self {
        self.referred = referred;
        self
    }
}

// =============================================================================
// Modifiers
// =============================================================================

/// Modifier kinds in application order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModifierKind {
    Bulk,
    Seasonal,
    HappyHour,
    Loyalty,
    Referral,
    FirstPurchase,
}

impl fmt::Display for ModifierKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ModifierKind::Bulk => "bulk",
            ModifierKind::Seasonal => "seasonal",
            ModifierKind::HappyHour => "happy_hour",
            ModifierKind::Loyalty => "loyalty",
            ModifierKind::Referral => "referral",
            ModifierKind::FirstPurchase => "first_purchase",
        };
        f.write_str(name)
    }
}

/// An optional discount stacked on top of the base rate.
///
/// ## Config Example
/// ```toml
/// [[discount.modifiers]]
/// kind = "bulk"
/// min_quantity = 10
/// rate = 500
///
/// [[discount.modifiers]]
/// kind = "happy_hour"
/// from_hour = 14
/// to_hour = 17
/// rate = 300
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DiscountModifier {
    /// Applies when at least `min_quantity` units are bought.
    Bulk { min_quantity: u64, rate: DiscountRate },

    /// Applies inside the half-open window `[starts_at, ends_at)`.
    Seasonal {
        starts_at: DateTime<Utc>,
        ends_at: DateTime<Utc>,
        rate: DiscountRate,
    },

    /// Applies daily between `from_hour` (inclusive) and `to_hour`
    /// (exclusive), UTC. Wraps midnight when `from_hour > to_hour`.
    HappyHour {
        from_hour: u32,
        to_hour: u32,
        rate: DiscountRate,
    },

    /// Applies to loyalty (VIP) members.
    Loyalty { rate: DiscountRate },

    /// Applies to referred accounts.
    Referral { rate: DiscountRate },

    /// Applies to an account's very first purchase.
    FirstPurchase { rate: DiscountRate },
}

impl DiscountModifier {
    pub fn kind(&self) -> ModifierKind {
        match self {
            DiscountModifier::Bulk { .. } => ModifierKind::Bulk,
            DiscountModifier::Seasonal { .. } => ModifierKind::Seasonal,
            DiscountModifier::HappyHour { .. } => ModifierKind::HappyHour,
            DiscountModifier::Loyalty { .. } => ModifierKind::Loyalty,
            DiscountModifier::Referral { .. } => ModifierKind::Referral,
            DiscountModifier::FirstPurchase { .. } => ModifierKind::FirstPurchase,
        }
    }

    pub fn rate(&self) -> DiscountRate {
        match self {
            DiscountModifier::Bulk { rate, .. }
            | DiscountModifier::Seasonal { rate, .. }
            | DiscountModifier::HappyHour { rate, .. }
            | DiscountModifier::Loyalty { rate }
            | DiscountModifier::Referral { rate }
            | DiscountModifier::FirstPurchase { rate } => *rate,
        }
    }

    /// Checks whether the modifier is active for `ctx`.
    pub fn applies(&self, ctx: &DiscountContext) -> bool {
        match self {
            DiscountModifier::Bulk { min_quantity, .. } => ctx.quantity >= *min_quantity,
            DiscountModifier::Seasonal {
                starts_at, ends_at, ..
            } => *starts_at <= ctx.at && ctx.at < *ends_at,
            DiscountModifier::HappyHour {
                from_hour, to_hour, ..
            } => {
                let hour = ctx.at.hour();
                if from_hour <= to_hour {
                    *from_hour <= hour && hour < *to_hour
                } else {
                    hour >= *from_hour || hour < *to_hour
                }
            }
            DiscountModifier::Loyalty { .. } => ctx.loyalty_member,
            DiscountModifier::Referral { .. } => ctx.referred,
            DiscountModifier::FirstPurchase { .. } => ctx.purchase_count == 0,
        }
    }

    /// Applies the modifier to `amount` (no-op when inactive).
    pub fn apply(&self, amount: Amount, ctx: &DiscountContext) -> Amount {
        if self.applies(ctx) {
            amount.apply_discount(self.rate())
        } else {
            amount
        }
    }

    /// Checks the modifier's own parameters.
    pub fn validate(&self) -> CoreResult<()> {
        if !self.rate().is_valid() {
            return Err(CoreError::tier(format!(
                "{} modifier rate {} bps exceeds 10000 bps",
                self.kind(),
                self.rate().bps()
            )));
        }

        match self {
            DiscountModifier::Seasonal {
                starts_at, ends_at, ..
            } if starts_at >= ends_at => Err(CoreError::tier(
                "seasonal modifier must start before it ends",
            )),
            DiscountModifier::HappyHour {
                from_hour, to_hour, ..
            } if *from_hour > 23 || *to_hour > 23 || from_hour == to_hour => Err(
                CoreError::tier("happy hour bounds must be distinct hours in 0..=23"),
            ),
            DiscountModifier::Bulk { min_quantity, .. } if *min_quantity == 0 => Err(
                CoreError::tier("bulk modifier min_quantity must be positive"),
            ),
            _ => Ok(()),
        }
    }
}

// =============================================================================
// Policy
// =============================================================================

fn default_max_combined_rate() -> DiscountRate {
    DiscountRate::from_bps(DEFAULT_MAX_COMBINED_BPS)
}

/// Complete discount configuration: tiers, modifiers and the combined cap.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscountPolicy {
    /// Upper bound on the total discount, in bps of the original amount.
    #[serde(default = "default_max_combined_rate")]
    pub max_combined_rate: DiscountRate,

    #[serde(default = "TierTable::standard")]
    pub tiers: TierTable,

    #[serde(default)]
    pub modifiers: Vec<DiscountModifier>,
}

impl Default for DiscountPolicy {
    fn default() -> Self {
        DiscountPolicy::new(TierTable::standard())
    }
}

impl DiscountPolicy {
    /// Policy with the given tiers, no modifiers and the default cap.
    pub fn new(tiers: TierTable) -> Self {
        DiscountPolicy {
            max_combined_rate: default_max_combined_rate(),
            tiers,
            modifiers: Vec::new(),
        }
    }

    pub fn with_modifier(mut self, modifier: DiscountModifier) -> Self {
        self.modifiers.push(modifier);
        self
    }

    pub fn with_max_combined_rate(mut self, rate: DiscountRate) -> Self {
        self.max_combined_rate = rate;
        self
    }

    /// Validates tiers, modifiers and the cap.
    ///
    /// No tier may exceed the cap, so a tier always applies at its
    /// configured rate.
    pub fn validate(&self) -> CoreResult<()> {
        TierTable::validate(self.tiers.tiers())?;
        for modifier in &self.modifiers {
            modifier.validate()?;
        }
        if !self.max_combined_rate.is_valid() {
            return Err(CoreError::tier(format!(
                "max combined rate {} bps exceeds 10000 bps",
                self.max_combined_rate.bps()
            )));
        }
        for tier in self.tiers.tiers() {
            self.check_base_rate("tier", tier.rate)?;
        }
        Ok(())
    }

    /// Fails when `rate` is above the combined cap.
    pub fn check_base_rate(&self, field: &str, rate: DiscountRate) -> CoreResult<()> {
        if rate > self.max_combined_rate {
            return Err(CoreError::tier(format!(
                "{} rate {} exceeds the max combined rate {}",
                field, rate, self.max_combined_rate
            )));
        }
        Ok(())
    }

    /// Modifiers in application order (stable within a kind).
    pub fn ordered_modifiers(&self) -> Vec<&DiscountModifier> {
        let mut ordered: Vec<&DiscountModifier> = self.modifiers.iter().collect();
        ordered.sort_by_key(|m| m.kind());
        ordered
    }
}

// =============================================================================
// Breakdown
// =============================================================================

/// Where the base rate came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "source", rename_all = "snake_case")]
pub enum BaseRateSource {
    /// Account is below the lowest threshold.
    None,
    /// Resolved from the tier starting at `threshold`.
    Tier { threshold: PurchaseCount },
    /// Per-account override set by an admin.
    Custom,
}

/// One applied modifier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscountStep {
    pub kind: ModifierKind,
    pub rate: DiscountRate,
    pub before: Amount,
    pub after: Amount,
}

/// Full explanation of a discount evaluation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscountBreakdown {
    pub original: Amount,
    pub base_rate: DiscountRate,
    pub base_source: BaseRateSource,
    /// Amount after the base rate, before modifiers.
    pub after_base: Amount,
    pub steps: Vec<DiscountStep>,
    /// True when the combined cap raised the charge.
    pub capped: bool,
    /// What the account is charged.
    pub charged: Amount,
}

impl DiscountBreakdown {
    /// Total amount taken off.
    pub fn discount(&self) -> Amount {
        self.original.saturating_sub(self.charged)
    }
}

// =============================================================================
// Engine
// =============================================================================

/// Pure discount calculator over a [`DiscountPolicy`].
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DiscountEngine {
    policy: DiscountPolicy,
}

impl DiscountEngine {
    /// Engine over a tier table with no modifiers.
    ///
    /// The cap is raised to the highest tier rate when that rate is above
    /// the default.
    pub fn new(tiers: TierTable) -> Self {
        let top = tiers
            .tiers()
            .last()
            .map(|t| t.rate)
            .unwrap_or_else(DiscountRate::zero);
        let policy = DiscountPolicy::new(tiers);
        let cap = policy.max_combined_rate.max(top);
        DiscountEngine {
            policy: policy.with_max_combined_rate(cap),
        }
    }

    /// Engine over a full policy.
    pub fn with_policy(policy: DiscountPolicy) -> CoreResult<Self> {
        policy.validate()?;
        Ok(DiscountEngine { policy })
    }

    pub fn policy(&self) -> &DiscountPolicy {
        &self.policy
    }

    pub fn tiers(&self) -> &TierTable {
        &self.policy.tiers
    }

    /// Adds a tier. Its rate may not exceed the combined cap.
    pub fn add_tier(&mut self, tier: DiscountTier) -> CoreResult<()> {
        self.policy.check_base_rate("tier", tier.rate)?;
        self.policy.tiers.add_tier(tier)
    }

    pub fn remove_tier(&mut self, threshold: PurchaseCount) -> CoreResult<DiscountTier> {
        self.policy.tiers.remove_tier(threshold)
    }

    /// Changes a tier's rate. The new rate may not exceed the combined cap.
    pub fn update_tier(
        &mut self,
        threshold: PurchaseCount,
        rate: DiscountRate,
    ) -> CoreResult<DiscountTier> {
        self.policy.check_base_rate("tier", rate)?;
        self.policy.tiers.update_tier(threshold, rate)
    }

    /// Tier-only discount: the amount charged for `amount` after
    /// `purchase_count` previous purchases.
    ///
    /// ## Example
    /// ```rust
    /// use tiergate_core::{Amount, DiscountEngine, TierTable};
    ///
    /// let engine = DiscountEngine::new(TierTable::standard());
    /// assert_eq!(engine.compute_discount(Amount::from_units(1000), 0).unwrap().units(), 1000);
    /// assert_eq!(engine.compute_discount(Amount::from_units(1000), 10).unwrap().units(), 900);
    /// assert_eq!(engine.compute_discount(Amount::from_units(1000), 20).unwrap().units(), 850);
    /// ```
    pub fn compute_discount(
        &self,
        amount: Amount,
        purchase_count: PurchaseCount,
    ) -> CoreResult<Amount> {
        validate_amount(amount)?;
        let rate = self.policy.tiers.rate_for(purchase_count);
        Ok(self.finish(amount, amount.apply_discount(rate)).0)
    }

    /// Element-wise [`compute_discount`](Self::compute_discount).
    ///
    /// The outer error covers the batch shape (lengths, size) and is raised
    /// before any element is evaluated.
    pub fn compute_batch(
        &self,
        amounts: &[Amount],
        counts: &[PurchaseCount],
    ) -> CoreResult<Vec<CoreResult<Amount>>> {
        validate_batch(amounts.len(), counts.len(), MAX_BATCH_SIZE)?;
        Ok(amounts
            .iter()
            .zip(counts)
            .map(|(amount, count)| self.compute_discount(*amount, *count))
            .collect())
    }

    /// Full evaluation: base rate (or `custom_rate`), modifiers, cap, floor.
    pub fn evaluate(
        &self,
        amount: Amount,
        ctx: &DiscountContext,
        custom_rate: Option<DiscountRate>,
    ) -> CoreResult<DiscountBreakdown> {
        validate_amount(amount)?;
        if let Some(rate) = custom_rate {
            validate_rate("custom discount", rate)?;
            self.policy.check_base_rate("custom discount", rate)?;
        }

        let (base_rate, base_source) = match custom_rate {
            Some(rate) => (rate, BaseRateSource::Custom),
            None => match self.policy.tiers.tier_for(ctx.purchase_count) {
                Some(tier) => (
                    tier.rate,
                    BaseRateSource::Tier {
                        threshold: tier.threshold,
                    },
                ),
                None => (DiscountRate::zero(), BaseRateSource::None),
            },
        };

        let after_base = amount.apply_discount(base_rate);
        let mut running = after_base;
        let mut steps = Vec::new();
        for modifier in self.policy.ordered_modifiers() {
            if !modifier.applies(ctx) {
                continue;
            }
            let before = running;
            running = modifier.apply(running, ctx);
            steps.push(DiscountStep {
                kind: modifier.kind(),
                rate: modifier.rate(),
                before,
                after: running,
            });
        }

        let (charged, capped) = self.finish(amount, running);
        Ok(DiscountBreakdown {
            original: amount,
            base_rate,
            base_source,
            after_base,
            steps,
            capped,
            charged,
        })
    }

    /// Applies the combined cap and the one-unit floor.
    fn finish(&self, original: Amount, discounted: Amount) -> (Amount, bool) {
        let cap_floor = original.apply_discount(self.policy.max_combined_rate);
        let capped = discounted < cap_floor;
        let charged = discounted.max(cap_floor).max(MIN_CHARGE).min(original);
        (charged, capped)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 6, 15, hour, 30, 0).unwrap()
    }

    fn units(n: u64) -> Amount {
        Amount::from_units(n)
    }

    fn uncapped(policy: DiscountPolicy) -> DiscountEngine {
        DiscountEngine::with_policy(policy.with_max_combined_rate(DiscountRate::MAX)).unwrap()
    }

    #[test]
    fn test_standard_examples() {
        let engine = DiscountEngine::new(TierTable::standard());
        assert_eq!(engine.compute_discount(units(1000), 0).unwrap(), units(1000));
        assert_eq!(engine.compute_discount(units(1000), 5).unwrap(), units(950));
        assert_eq!(engine.compute_discount(units(1000), 10).unwrap(), units(900));
        assert_eq!(engine.compute_discount(units(1000), 20).unwrap(), units(850));
    }

    #[test]
    fn test_zero_amount_rejected() {
        let engine = DiscountEngine::new(TierTable::standard());
        let err = engine.compute_discount(Amount::zero(), 5).unwrap_err();
        assert!(matches!(err, CoreError::Validation(_)));
    }

    #[test]
    fn test_floor_division() {
        let engine = DiscountEngine::new(TierTable::standard());
        // 999 at 5% = 49.95 off → 49 off
        assert_eq!(engine.compute_discount(units(999), 5).unwrap(), units(950));
        // 1 at 15% = 0.15 off → nothing off
        assert_eq!(engine.compute_discount(units(1), 20).unwrap(), units(1));
    }

    #[test]
    fn test_full_rate_keeps_minimum_charge() {
        let tiers = TierTable::new(vec![DiscountTier::new(0, DiscountRate::MAX)]).unwrap();
        let engine = uncapped(DiscountPolicy::new(tiers));
        assert_eq!(engine.compute_discount(units(500), 0).unwrap(), units(1));
    }

    #[test]
    fn test_tier_above_cap_applies_at_its_rate() {
        let tiers = TierTable::new(vec![DiscountTier::new(0, DiscountRate::from_percent(80))])
            .unwrap();
        let engine = DiscountEngine::new(tiers);
        assert_eq!(engine.policy().max_combined_rate, DiscountRate::from_percent(80));
        assert_eq!(engine.compute_discount(units(1000), 0).unwrap(), units(200));
    }

    #[test]
    fn test_policy_rejects_tier_above_cap() {
        let tiers = TierTable::new(vec![DiscountTier::new(0, DiscountRate::from_percent(80))])
            .unwrap();
        let err = DiscountEngine::with_policy(DiscountPolicy::new(tiers)).unwrap_err();
        assert!(matches!(err, CoreError::TierConfiguration { .. }));
    }

    #[test]
    fn test_tier_mutations_respect_cap() {
        let mut engine = DiscountEngine::with_policy(DiscountPolicy::default()).unwrap();

        let err = engine
            .add_tier(DiscountTier::new(100, DiscountRate::from_percent(80)))
            .unwrap_err();
        assert!(matches!(err, CoreError::TierConfiguration { .. }));
        let err = engine
            .update_tier(20, DiscountRate::from_percent(60))
            .unwrap_err();
        assert!(matches!(err, CoreError::TierConfiguration { .. }));
        assert_eq!(engine.tiers(), &TierTable::standard());

        engine
            .add_tier(DiscountTier::new(100, DiscountRate::from_percent(50)))
            .unwrap();
        assert_eq!(engine.compute_discount(units(1000), 100).unwrap(), units(500));
    }

    #[test]
    fn test_custom_rate_above_cap_rejected() {
        let engine = DiscountEngine::with_policy(DiscountPolicy::default()).unwrap();
        let ctx = DiscountContext::new(0, at(9));
        let err = engine
            .evaluate(units(1000), &ctx, Some(DiscountRate::from_percent(60)))
            .unwrap_err();
        assert!(matches!(err, CoreError::TierConfiguration { .. }));
    }

    #[test]
    fn test_custom_rate_replaces_tier() {
        let engine = DiscountEngine::new(TierTable::standard());
        let ctx = DiscountContext::new(20, at(9));

        let breakdown = engine
            .evaluate(units(1000), &ctx, Some(DiscountRate::from_percent(3)))
            .unwrap();
        assert_eq!(breakdown.base_source, BaseRateSource::Custom);
        assert_eq!(breakdown.charged, units(970));

        let breakdown = engine.evaluate(units(1000), &ctx, None).unwrap();
        assert_eq!(breakdown.base_source, BaseRateSource::Tier { threshold: 20 });
        assert_eq!(breakdown.charged, units(850));
    }

    #[test]
    fn test_custom_rate_out_of_range() {
        let engine = DiscountEngine::new(TierTable::standard());
        let ctx = DiscountContext::new(0, at(9));
        assert!(engine
            .evaluate(units(1000), &ctx, Some(DiscountRate::from_bps(10_001)))
            .is_err());
    }

    #[test]
    fn test_modifiers_apply_in_fixed_order_and_stack() {
        // Declared out of order on purpose
        let policy = DiscountPolicy::new(TierTable::standard())
            .with_modifier(DiscountModifier::Referral {
                rate: DiscountRate::from_percent(5),
            })
            .with_modifier(DiscountModifier::Bulk {
                min_quantity: 10,
                rate: DiscountRate::from_percent(10),
            });
        let engine = uncapped(policy);

        let ctx = DiscountContext::new(10, at(9))
            .with_quantity(10)
            .with_referral(true);
        let breakdown = engine.evaluate(units(1000), &ctx, None).unwrap();

        let kinds: Vec<ModifierKind> = breakdown.steps.iter().map(|s| s.kind).collect();
        assert_eq!(kinds, vec![ModifierKind::Bulk, ModifierKind::Referral]);

        // 1000 → 900 (tier 10%) → 810 (bulk 10%) → 770 (referral 5% of 810 = 40.5 → 40)
        assert_eq!(breakdown.after_base, units(900));
        assert_eq!(breakdown.steps[0].after, units(810));
        assert_eq!(breakdown.charged, units(770));
        assert!(!breakdown.capped);
    }

    #[test]
    fn test_combined_cap() {
        let policy = DiscountPolicy::new(TierTable::standard())
            .with_modifier(DiscountModifier::Loyalty {
                rate: DiscountRate::from_percent(40),
            })
            .with_max_combined_rate(DiscountRate::from_percent(30));
        let engine = DiscountEngine::with_policy(policy).unwrap();

        let ctx = DiscountContext::new(20, at(9)).with_loyalty(true);
        let breakdown = engine.evaluate(units(1000), &ctx, None).unwrap();
        // 1000 → 850 → 510 uncapped; cap keeps it at 700
        assert!(breakdown.capped);
        assert_eq!(breakdown.charged, units(700));
        assert_eq!(breakdown.discount(), units(300));
    }

    #[test]
    fn test_first_purchase_modifier() {
        let policy = DiscountPolicy::new(TierTable::standard()).with_modifier(
            DiscountModifier::FirstPurchase {
                rate: DiscountRate::from_percent(10),
            },
        );
        let engine = DiscountEngine::with_policy(policy).unwrap();

        let first = engine
            .evaluate(units(1000), &DiscountContext::new(0, at(9)), None)
            .unwrap();
        assert_eq!(first.charged, units(900));

        let second = engine
            .evaluate(units(1000), &DiscountContext::new(1, at(9)), None)
            .unwrap();
        assert_eq!(second.charged, units(1000));
    }

    #[test]
    fn test_happy_hour_window() {
        let modifier = DiscountModifier::HappyHour {
            from_hour: 14,
            to_hour: 17,
            rate: DiscountRate::from_percent(5),
        };
        assert!(!modifier.applies(&DiscountContext::new(0, at(13))));
        assert!(modifier.applies(&DiscountContext::new(0, at(14))));
        assert!(modifier.applies(&DiscountContext::new(0, at(16))));
        assert!(!modifier.applies(&DiscountContext::new(0, at(17))));

        let overnight = DiscountModifier::HappyHour {
            from_hour: 22,
            to_hour: 2,
            rate: DiscountRate::from_percent(5),
        };
        assert!(overnight.applies(&DiscountContext::new(0, at(23))));
        assert!(overnight.applies(&DiscountContext::new(0, at(1))));
        assert!(!overnight.applies(&DiscountContext::new(0, at(12))));
    }

    #[test]
    fn test_seasonal_window() {
        let modifier = DiscountModifier::Seasonal {
            starts_at: Utc.with_ymd_and_hms(2026, 6, 1, 0, 0, 0).unwrap(),
            ends_at: Utc.with_ymd_and_hms(2026, 7, 1, 0, 0, 0).unwrap(),
            rate: DiscountRate::from_percent(5),
        };
        assert!(modifier.applies(&DiscountContext::new(0, at(9))));
        let later = Utc.with_ymd_and_hms(2026, 7, 1, 0, 0, 0).unwrap();
        assert!(!modifier.applies(&DiscountContext::new(0, later)));
    }

    #[test]
    fn test_modifier_validation() {
        let bad_hours = DiscountModifier::HappyHour {
            from_hour: 5,
            to_hour: 5,
            rate: DiscountRate::from_percent(5),
        };
        assert!(bad_hours.validate().is_err());

        let bad_bulk = DiscountModifier::Bulk {
            min_quantity: 0,
            rate: DiscountRate::from_percent(5),
        };
        assert!(bad_bulk.validate().is_err());

        let policy = DiscountPolicy::default().with_modifier(bad_bulk);
        assert!(DiscountEngine::with_policy(policy).is_err());
    }

    #[test]
    fn test_batch_matches_single() {
        let engine = DiscountEngine::new(TierTable::standard());
        let amounts = [units(1000), units(0), units(1000)];
        let counts = [5, 5, 20];
        let results = engine.compute_batch(&amounts, &counts).unwrap();

        for ((amount, count), result) in amounts.iter().zip(counts).zip(&results) {
            assert_eq!(result, &engine.compute_discount(*amount, count));
        }
    }

    #[test]
    fn test_batch_length_mismatch() {
        let engine = DiscountEngine::new(TierTable::standard());
        let err = engine.compute_batch(&[units(1)], &[1, 2]).unwrap_err();
        assert_eq!(err, CoreError::ArrayLengthMismatch { left: 1, right: 2 });
    }

    #[test]
    fn test_policy_deserializes_modifiers() {
        let json = r#"{
            "tiers": [{"threshold": 3, "rate": 200}],
            "modifiers": [{"kind": "bulk", "min_quantity": 10, "rate": 500}],
            "max_combined_rate": 2500
        }"#;
        let policy: DiscountPolicy = serde_json::from_str(json).unwrap();
        assert_eq!(policy.tiers.rate_for(3).bps(), 200);
        assert_eq!(policy.modifiers[0].kind(), ModifierKind::Bulk);
        assert_eq!(policy.max_combined_rate.bps(), 2500);
    }
}
