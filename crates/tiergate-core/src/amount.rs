//! # Amount Module
//!
//! Provides the `Amount` type for value that moves between accounts.
//!
//! ## Why Integer Amounts?
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  THE ROUNDING PROBLEM                                                   │
//! │                                                                         │
//! │  Floating point:                                                        │
//! │    1000 × 0.15 = 149.99999999999997  ❌ WRONG!                          │
//! │                                                                         │
//! │  OUR SOLUTION: Smallest units + basis points                            │
//! │    1000 × 1500 / 10000 = 150 (floor division)                          │
//! │    Discounts always round DOWN, so the charge rounds UP in favour      │
//! │    of the seller and never exceeds the original amount                 │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//! ```rust
//! use tiergate_core::{Amount, DiscountRate};
//!
//! let price = Amount::from_units(1000);
//! let charged = price.apply_discount(DiscountRate::from_bps(500));
//! assert_eq!(charged.units(), 950);
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{CoreError, CoreResult};
use crate::types::DiscountRate;
use crate::BPS_SCALE;

// =============================================================================
// Amount Type
// =============================================================================

/// A non-negative value in the smallest unit of the settlement ledger.
///
/// ## Design Decisions
/// - **u64 (unsigned)**: amounts can never be negative
/// - **u128 intermediates**: `amount * bps` cannot overflow
/// - **Checked arithmetic**: overflow is an error, never a wrap
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Amount(u64);

impl Amount {
    /// Creates an Amount from smallest units.
    #[inline]
    pub const fn from_units(units: u64) -> Self {
        Amount(units)
    }

    /// Returns the value in smallest units.
    #[inline]
    pub const fn units(&self) -> u64 {
        self.0
    }

    /// Returns the zero amount.
    #[inline]
    pub const fn zero() -> Self {
        Amount(0)
    }

    /// Checks if the value is zero.
    #[inline]
    pub const fn is_zero(&self) -> bool {
        self.0 == 0
    }

    /// Checks if the value is chargeable (greater than zero).
    #[inline]
    pub const fn is_positive(&self) -> bool {
        self.0 > 0
    }

    /// Adds two amounts, failing on overflow.
    pub fn checked_add(self, other: Amount) -> CoreResult<Amount> {
        self.0
            .checked_add(other.0)
            .map(Amount)
            .ok_or(CoreError::AmountOverflow)
    }

    /// Subtracts, clamping at zero.
    #[inline]
    pub const fn saturating_sub(self, other: Amount) -> Amount {
        Amount(self.0.saturating_sub(other.0))
    }

    /// Returns the portion of this amount that `rate` takes off.
    ///
    /// ## Implementation
    /// `floor(amount * bps / 10000)` in 128-bit space. Floor division means
    /// a discount is never rounded up.
    ///
    /// ## Example
    /// ```rust
    /// use tiergate_core::{Amount, DiscountRate};
    ///
    /// // 999 at 10% = 99.9 → 99
    /// let off = Amount::from_units(999).portion(DiscountRate::from_bps(1000));
    /// assert_eq!(off.units(), 99);
    /// ```
    pub fn portion(&self, rate: DiscountRate) -> Amount {
        let bps = rate.bps().min(BPS_SCALE) as u128;
        let off = self.0 as u128 * bps / BPS_SCALE as u128;
        // off <= self.0 because bps <= BPS_SCALE
        Amount(off as u64)
    }

    /// Applies a percentage discount and returns the discounted amount.
    ///
    /// ## Example
    /// ```rust
    /// use tiergate_core::{Amount, DiscountRate};
    ///
    /// let charged = Amount::from_units(1000).apply_discount(DiscountRate::from_bps(1500));
    /// assert_eq!(charged.units(), 850);
    /// ```
    pub fn apply_discount(&self, rate: DiscountRate) -> Amount {
        self.saturating_sub(self.portion(rate))
    }
}

// =============================================================================
// Trait Implementations
// =============================================================================

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for Amount {
    fn from(units: u64) -> Self {
        Amount(units)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_units() {
        let amount = Amount::from_units(1099);
        assert_eq!(amount.units(), 1099);
        assert!(amount.is_positive());
        assert!(!amount.is_zero());
        assert!(Amount::zero().is_zero());
    }

    #[test]
    fn test_display() {
        assert_eq!(Amount::from_units(1099).to_string(), "1099");
        assert_eq!(Amount::zero().to_string(), "0");
    }

    #[test]
    fn test_portion_floors() {
        let amount = Amount::from_units(999);
        assert_eq!(amount.portion(DiscountRate::from_bps(1000)).units(), 99);
        assert_eq!(amount.portion(DiscountRate::zero()).units(), 0);
        assert_eq!(amount.portion(DiscountRate::from_bps(10_000)).units(), 999);
    }

    #[test]
    fn test_apply_discount() {
        let amount = Amount::from_units(1000);
        assert_eq!(amount.apply_discount(DiscountRate::from_bps(500)).units(), 950);
        assert_eq!(amount.apply_discount(DiscountRate::from_bps(1500)).units(), 850);
    }

    #[test]
    fn test_no_overflow_at_max() {
        let amount = Amount::from_units(u64::MAX);
        let charged = amount.apply_discount(DiscountRate::from_bps(1));
        assert!(charged < amount);
    }

    #[test]
    fn test_checked_add() {
        let a = Amount::from_units(10);
        assert_eq!(a.checked_add(Amount::from_units(5)).unwrap().units(), 15);
        assert_eq!(
            Amount::from_units(u64::MAX).checked_add(a),
            Err(CoreError::AmountOverflow)
        );
    }

    #[test]
    fn test_serde_is_transparent() {
        let json = serde_json::to_string(&Amount::from_units(42)).unwrap();
        assert_eq!(json, "42");
    }
}
