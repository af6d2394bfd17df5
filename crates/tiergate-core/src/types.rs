//! # Domain Types
//!
//! Core domain types used throughout TierGate.
//!
//! ## Type Overview
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Domain Types                                    │
//! │                                                                         │
//! │  ┌─────────────────┐   ┌─────────────────┐   ┌─────────────────┐       │
//! │  │ TransferRequest │   │ TransferRecord  │   │ PurchaseStats   │       │
//! │  │  ─────────────  │   │  ─────────────  │   │  ─────────────  │       │
//! │  │  sender/source/ │   │  trace_id       │   │  account        │       │
//! │  │  destination    │   │  original /     │   │  purchase_count │       │
//! │  │  amount, memo   │   │  discounted     │   │  total_spent    │       │
//! │  │  trace_id       │   │  committed_at   │   │  last_purchase  │       │
//! │  └─────────────────┘   └─────────────────┘   └─────────────────┘       │
//! │                                                                         │
//! │  ┌─────────────────┐   ┌─────────────────┐   ┌─────────────────┐       │
//! │  │  DiscountRate   │   │   AccountId     │   │    TraceId      │       │
//! │  │  bps (u32)      │   │   16 bytes      │   │   16 bytes      │       │
//! │  │  500 = 5%       │   │   nil = invalid │   │   nil = invalid │       │
//! │  └─────────────────┘   └─────────────────┘   └─────────────────┘       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::amount::Amount;
use crate::error::ValidationError;
use crate::BPS_SCALE;

/// Number of completed chargeable operations for an account.
pub type PurchaseCount = u64;

// =============================================================================
// Discount Rate
// =============================================================================

/// Discount rate represented in basis points (bps).
///
/// ## Why Basis Points?
/// 1 basis point = 0.01% = 1/10000
/// 500 bps = 5%, 10000 bps = 100%
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct DiscountRate(u32);

impl DiscountRate {
    /// The largest valid rate (100%).
    pub const MAX: DiscountRate = DiscountRate(BPS_SCALE);

    /// Creates a rate from basis points.
    #[inline]
    pub const fn from_bps(bps: u32) -> Self {
        DiscountRate(bps)
    }

    /// Creates a rate from a whole percentage.
    #[inline]
    pub const fn from_percent(pct: u32) -> Self {
        DiscountRate(pct.saturating_mul(100))
    }

    /// Returns the rate in basis points.
    #[inline]
    pub const fn bps(&self) -> u32 {
        self.0
    }

    /// Zero rate.
    #[inline]
    pub const fn zero() -> Self {
        DiscountRate(0)
    }

    /// Checks if the rate is zero.
    #[inline]
    pub const fn is_zero(&self) -> bool {
        self.0 == 0
    }

    /// Checks the rate lies in [0, 10000].
    #[inline]
    pub const fn is_valid(&self) -> bool {
        self.0 <= BPS_SCALE
    }
}

impl fmt::Display for DiscountRate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{:02}%", self.0 / 100, self.0 % 100)
    }
}

// =============================================================================
// Identifiers
// =============================================================================

/// Opaque identifier of a ledger participant.
///
/// The nil UUID is the reserved zero value and is rejected by validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AccountId(Uuid);

impl AccountId {
    /// The reserved, always-invalid identifier.
    pub const ZERO: AccountId = AccountId(Uuid::nil());

    /// Generates a fresh random identifier.
    pub fn generate() -> Self {
        AccountId(Uuid::new_v4())
    }

    /// Wraps an existing UUID.
    #[inline]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        AccountId(uuid)
    }

    /// Builds an identifier from a raw integer (handy for fixtures).
    #[inline]
    pub const fn from_u128(raw: u128) -> Self {
        AccountId(Uuid::from_u128(raw))
    }

    /// Returns the underlying UUID.
    #[inline]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }

    /// Checks for the reserved zero value.
    #[inline]
    pub fn is_zero(&self) -> bool {
        self.0.is_nil()
    }
}

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

impl FromStr for AccountId {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s.trim())
            .map(AccountId)
            .map_err(|e| ValidationError::InvalidFormat {
                field: "account id".to_string(),
                reason: e.to_string(),
            })
    }
}

/// Correlation identifier of a single transfer intent.
///
/// Unique per intent: a retry after a failure must use a fresh trace id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TraceId(Uuid);

impl TraceId {
    /// The reserved, always-invalid trace id.
    pub const ZERO: TraceId = TraceId(Uuid::nil());

    /// Generates a fresh random trace id.
    pub fn generate() -> Self {
        TraceId(Uuid::new_v4())
    }

    #[inline]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        TraceId(uuid)
    }

    #[inline]
    pub const fn from_u128(raw: u128) -> Self {
        TraceId(Uuid::from_u128(raw))
    }

    #[inline]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }

    #[inline]
    pub fn is_zero(&self) -> bool {
        self.0.is_nil()
    }
}

impl fmt::Display for TraceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

impl FromStr for TraceId {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s.trim())
            .map(TraceId)
            .map_err(|e| ValidationError::InvalidFormat {
                field: "trace id".to_string(),
                reason: e.to_string(),
            })
    }
}

// =============================================================================
// Account Role
// =============================================================================

/// The part an account plays in a transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccountRole {
    /// The purchasing account whose count drives the discount.
    Sender,
    /// The account funds are taken from.
    Source,
    /// The account funds are delivered to.
    Destination,
    /// The state gateway itself (checked when it is replaced).
    Oracle,
}

impl fmt::Display for AccountRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AccountRole::Sender => write!(f, "sender"),
            AccountRole::Source => write!(f, "source"),
            AccountRole::Destination => write!(f, "destination"),
            AccountRole::Oracle => write!(f, "oracle"),
        }
    }
}

// =============================================================================
// Transfer Request
// =============================================================================

/// A request to move value from `source` to `destination` on behalf of
/// `sender`, charged at the sender's discounted price.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferRequest {
    pub sender: AccountId,
    pub source: AccountId,
    pub destination: AccountId,
    /// Undiscounted amount in smallest units.
    pub amount: Amount,
    /// Opaque caller values forwarded to settlement and events.
    pub aux1: u64,
    pub aux2: u64,
    /// Free-form description, must be non-empty.
    pub memo: String,
    pub trace_id: TraceId,
    /// Units purchased; only consulted by the bulk modifier.
    #[serde(default = "default_quantity")]
    pub quantity: u64,
}

fn default_quantity() -> u64 {
    1
}

impl TransferRequest {
    /// Creates a request with zero aux values and a quantity of one.
    pub fn new(
        sender: AccountId,
        source: AccountId,
        destination: AccountId,
        amount: Amount,
        memo: impl Into<String>,
        trace_id: TraceId,
    ) -> Self {
        TransferRequest {
            sender,
            source,
            destination,
            amount,
            aux1: 0,
            aux2: 0,
            memo: memo.into(),
            trace_id,
            quantity: default_quantity(),
        }
    }

    /// Sets the two opaque aux values.
    pub fn with_aux(mut self, aux1: u64, aux2: u64) -> Self {
        self.aux1 = aux1;
        self.aux2 = aux2;
        self
    }

    /// Sets the purchased quantity.
    pub fn with_quantity(mut self, quantity: u64) -> Self {
        self.quantity = quantity;
        self
    }

    /// Returns every participant with its role, in check order.
    pub fn participants(&self) -> [(AccountRole, AccountId); 3] {
        [
            (AccountRole::Sender, self.sender),
            (AccountRole::Source, self.source),
            (AccountRole::Destination, self.destination),
        ]
    }
}

// =============================================================================
// Transfer Record
// =============================================================================

/// Immutable audit record of a committed transfer.
///
/// Created only after settlement succeeded. Never updated; removed only by
/// an explicit administrative purge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferRecord {
    pub trace_id: TraceId,
    pub sender: AccountId,
    pub source: AccountId,
    pub destination: AccountId,
    pub original_amount: Amount,
    pub discounted_amount: Amount,
    pub aux1: u64,
    pub aux2: u64,
    pub memo: String,
    /// Sender's count used for the discount (before this purchase).
    pub purchase_count_before: PurchaseCount,
    pub committed_at: DateTime<Utc>,
}

impl TransferRecord {
    /// Builds the record for a request once its charge is known.
    pub fn from_request(
        request: &TransferRequest,
        discounted_amount: Amount,
        purchase_count_before: PurchaseCount,
        committed_at: DateTime<Utc>,
    ) -> Self {
        TransferRecord {
            trace_id: request.trace_id,
            sender: request.sender,
            source: request.source,
            destination: request.destination,
            original_amount: request.amount,
            discounted_amount,
            aux1: request.aux1,
            aux2: request.aux2,
            memo: request.memo.clone(),
            purchase_count_before,
            committed_at,
        }
    }

    /// Amount taken off the original price.
    pub fn discount(&self) -> Amount {
        self.original_amount.saturating_sub(self.discounted_amount)
    }
}

// =============================================================================
// Purchase Stats
// =============================================================================

/// Aggregate purchase history of one account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PurchaseStats {
    pub account: AccountId,
    pub purchase_count: PurchaseCount,
    /// Sum of discounted amounts actually charged.
    pub total_spent: Amount,
    pub last_purchase_at: Option<DateTime<Utc>>,
}

impl PurchaseStats {
    /// Stats of an account that has never been observed.
    pub fn empty(account: AccountId) -> Self {
        PurchaseStats {
            account,
            purchase_count: 0,
            total_spent: Amount::zero(),
            last_purchase_at: None,
        }
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_discount_rate() {
        let rate = DiscountRate::from_percent(5);
        assert_eq!(rate.bps(), 500);
        assert_eq!(rate.to_string(), "5.00%");
        assert!(rate.is_valid());
        assert!(!DiscountRate::from_bps(10_001).is_valid());
        assert_eq!(DiscountRate::from_bps(825).to_string(), "8.25%");
    }

    #[test]
    fn test_account_id_zero() {
        assert!(AccountId::ZERO.is_zero());
        assert!(!AccountId::generate().is_zero());
        assert!(!AccountId::from_u128(1).is_zero());
    }

    #[test]
    fn test_account_id_parse() {
        let id: AccountId = "550e8400-e29b-41d4-a716-446655440000".parse().unwrap();
        assert_eq!(id.to_string(), "550e8400-e29b-41d4-a716-446655440000");
        assert!("not-an-id".parse::<AccountId>().is_err());
    }

    #[test]
    fn test_request_defaults() {
        let request = TransferRequest::new(
            AccountId::from_u128(1),
            AccountId::from_u128(2),
            AccountId::from_u128(3),
            Amount::from_units(100),
            "order",
            TraceId::from_u128(9),
        );
        assert_eq!(request.quantity, 1);
        assert_eq!(request.aux1, 0);

        let roles: Vec<AccountRole> = request.participants().iter().map(|(r, _)| *r).collect();
        assert_eq!(
            roles,
            vec![AccountRole::Sender, AccountRole::Source, AccountRole::Destination]
        );
    }

    #[test]
    fn test_record_discount() {
        let request = TransferRequest::new(
            AccountId::from_u128(1),
            AccountId::from_u128(2),
            AccountId::from_u128(3),
            Amount::from_units(1000),
            "order",
            TraceId::from_u128(9),
        );
        let record = TransferRecord::from_request(&request, Amount::from_units(950), 5, Utc::now());
        assert_eq!(record.discount().units(), 50);
        assert_eq!(record.purchase_count_before, 5);
    }
}
