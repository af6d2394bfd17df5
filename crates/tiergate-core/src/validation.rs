//! # Validation Module
//!
//! Input validation for transfer requests and admin calls.
//!
//! ## Validation Strategy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Validation Layers                                  │
//! │                                                                         │
//! │  Layer 1: THIS MODULE (pure)                                           │
//! │  ├── Zero identifiers, empty memo, zero amount                         │
//! │  └── Parallel array lengths, batch bounds                              │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 2: Orchestrator                                                 │
//! │  ├── Pause flag, admin rights, reentrancy                              │
//! │  └── Account activity through the state gateway                        │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 3: Database (SQLite)                                            │
//! │  ├── CHECK (purchase_count >= 0)                                       │
//! │  └── PRIMARY KEY on trace_id                                           │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//! ```rust
//! use tiergate_core::validation::{validate_memo, validate_batch};
//!
//! assert!(validate_memo("order #42").is_ok());
//! assert!(validate_memo("   ").is_err());
//! assert!(validate_batch(3, 2, 100).is_err());
//! ```

use crate::amount::Amount;
use crate::error::{CoreError, CoreResult, ValidationError};
use crate::types::{AccountId, DiscountRate, TraceId, TransferRequest};
use crate::MAX_MEMO_LEN;

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

// =============================================================================
// Identifier Validators
// =============================================================================

/// Rejects the reserved zero account id.
pub fn validate_account_id(field: &str, id: AccountId) -> ValidationResult<()> {
    if id.is_zero() {
        return Err(ValidationError::ZeroIdentifier {
            field: field.to_string(),
        });
    }
    Ok(())
}

/// Rejects the reserved zero trace id.
pub fn validate_trace_id(id: TraceId) -> ValidationResult<()> {
    if id.is_zero() {
        return Err(ValidationError::ZeroIdentifier {
            field: "trace_id".to_string(),
        });
    }
    Ok(())
}

// =============================================================================
// Value Validators
// =============================================================================

/// Amounts must be strictly positive.
pub fn validate_amount(amount: Amount) -> ValidationResult<()> {
    if amount.is_zero() {
        return Err(ValidationError::MustBePositive {
            field: "amount".to_string(),
        });
    }
    Ok(())
}

/// Validates a memo.
///
/// ## Rules
/// - Must contain something other than whitespace
/// - At most [`MAX_MEMO_LEN`] bytes
pub fn validate_memo(memo: &str) -> ValidationResult<()> {
    if memo.trim().is_empty() {
        return Err(ValidationError::Required {
            field: "memo".to_string(),
        });
    }

    if memo.len() > MAX_MEMO_LEN {
        return Err(ValidationError::TooLong {
            field: "memo".to_string(),
            max: MAX_MEMO_LEN,
        });
    }

    Ok(())
}

/// Rates live in [0, 10000] bps.
pub fn validate_rate(field: &str, rate: DiscountRate) -> ValidationResult<()> {
    if !rate.is_valid() {
        return Err(ValidationError::OutOfRange {
            field: field.to_string(),
            min: 0,
            max: DiscountRate::MAX.bps() as u64,
        });
    }
    Ok(())
}

/// Purchased quantity must be at least one.
pub fn validate_quantity(quantity: u64) -> ValidationResult<()> {
    if quantity == 0 {
        return Err(ValidationError::MustBePositive {
            field: "quantity".to_string(),
        });
    }
    Ok(())
}

/// Checks every field of a transfer request that needs no external state.
///
/// Participant ids are checked in role order, then amount, memo and trace id.
pub fn validate_request(request: &TransferRequest) -> ValidationResult<()> {
    for (role, id) in request.participants() {
        validate_account_id(&role.to_string(), id)?;
    }
    validate_amount(request.amount)?;
    validate_memo(&request.memo)?;
    validate_trace_id(request.trace_id)?;
    validate_quantity(request.quantity)?;
    Ok(())
}

// =============================================================================
// Batch Validators
// =============================================================================

/// Checks two parallel arrays have the same length and fit the batch limit.
///
/// The length check runs first so a mismatched call always reports the
/// mismatch.
pub fn validate_batch(left: usize, right: usize, max: usize) -> CoreResult<()> {
    if left != right {
        return Err(CoreError::ArrayLengthMismatch { left, right });
    }
    validate_batch_size(left, max)
}

/// Checks a single batch fits the limit.
pub fn validate_batch_size(len: usize, max: usize) -> CoreResult<()> {
    if len > max {
        return Err(CoreError::BatchTooLarge { len, max });
    }
    Ok(())
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> TransferRequest {
        TransferRequest::new(
            AccountId::from_u128(1),
            AccountId::from_u128(2),
            AccountId::from_u128(3),
            Amount::from_units(100),
            "order",
            TraceId::from_u128(7),
        )
    }

    #[test]
    fn test_valid_request() {
        assert!(validate_request(&request()).is_ok());
    }

    #[test]
    fn test_zero_participant_named_by_role() {
        let mut req = request();
        req.source = AccountId::ZERO;
        assert_eq!(
            validate_request(&req),
            Err(ValidationError::ZeroIdentifier {
                field: "source".to_string()
            })
        );
    }

    #[test]
    fn test_zero_amount() {
        let mut req = request();
        req.amount = Amount::zero();
        assert!(matches!(
            validate_request(&req),
            Err(ValidationError::MustBePositive { .. })
        ));
    }

    #[test]
    fn test_memo_rules() {
        assert!(validate_memo("").is_err());
        assert!(validate_memo(" \t ").is_err());
        assert!(validate_memo(&"m".repeat(MAX_MEMO_LEN)).is_ok());
        assert!(matches!(
            validate_memo(&"m".repeat(MAX_MEMO_LEN + 1)),
            Err(ValidationError::TooLong { .. })
        ));
    }

    #[test]
    fn test_zero_trace_id() {
        let mut req = request();
        req.trace_id = TraceId::ZERO;
        assert!(validate_request(&req).is_err());
    }

    #[test]
    fn test_rate_bounds() {
        assert!(validate_rate("rate", DiscountRate::from_bps(10_000)).is_ok());
        assert!(validate_rate("rate", DiscountRate::from_bps(10_001)).is_err());
    }

    #[test]
    fn test_batch_mismatch_reported_before_size() {
        assert_eq!(
            validate_batch(200, 3, 100),
            Err(CoreError::ArrayLengthMismatch { left: 200, right: 3 })
        );
        assert_eq!(
            validate_batch(101, 101, 100),
            Err(CoreError::BatchTooLarge { len: 101, max: 100 })
        );
        assert!(validate_batch(0, 0, 100).is_ok());
        assert!(validate_batch(100, 100, 100).is_ok());
    }
}
