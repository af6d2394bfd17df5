//! # Error Types
//!
//! Domain-specific error types for tiergate-core.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Error Types                                     │
//! │                                                                         │
//! │  tiergate-core errors (this file)                                      │
//! │  ├── CoreError        - Tier configuration, batch shape, arithmetic    │
//! │  └── ValidationError  - Input validation failures                      │
//! │                                                                         │
//! │  tiergate-db errors (separate crate)                                   │
//! │  └── DbError          - Database operation failures                    │
//! │                                                                         │
//! │  tiergate-engine errors                                                │
//! │  └── TransferError    - What callers of the orchestrator see           │
//! │                                                                         │
//! │  Flow: ValidationError → CoreError → TransferError → caller            │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Design Principles
//! 1. Use `thiserror` for derive macros (not manual impl)
//! 2. Include context in error messages (field, threshold, lengths)
//! 3. Errors are enum variants, never String
//! 4. Configuration errors stay distinct from bad request input

use thiserror::Error;

// =============================================================================
// Core Error
// =============================================================================

/// Core business logic errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CoreError {
    /// The tier table violates one of its invariants.
    ///
    /// ## When This Occurs
    /// - Thresholds not strictly ascending
    /// - Rate above 10000 bps
    /// - A higher tier with a lower rate than an earlier tier
    /// - Removing or updating a threshold that does not exist
    #[error("Invalid tier configuration: {reason}")]
    TierConfiguration { reason: String },

    /// Two parallel input arrays have different lengths.
    #[error("Array length mismatch: {left} vs {right}")]
    ArrayLengthMismatch { left: usize, right: usize },

    /// A bulk operation exceeded the configured element limit.
    #[error("Batch of {len} elements exceeds the limit of {max}")]
    BatchTooLarge { len: usize, max: usize },

    /// Amount arithmetic left the representable range.
    #[error("Amount overflow")]
    AmountOverflow,

    /// Validation error (wraps ValidationError).
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),
}

impl CoreError {
    /// Creates a TierConfiguration error.
    pub fn tier(reason: impl Into<String>) -> Self {
        CoreError::TierConfiguration {
            reason: reason.into(),
        }
    }
}

// =============================================================================
// Validation Error
// =============================================================================

/// Input validation errors.
///
/// These errors occur when request input doesn't meet requirements.
/// Raised before any state is read or mutated.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// A required field is missing or empty.
    #[error("{field} is required")]
    Required { field: String },

    /// Field value is too long.
    #[error("{field} must be at most {max} bytes")]
    TooLong { field: String, max: usize },

    /// Numeric value is out of range.
    #[error("{field} must be between {min} and {max}")]
    OutOfRange { field: String, min: u64, max: u64 },

    /// Value must be positive.
    #[error("{field} must be positive")]
    MustBePositive { field: String },

    /// Identifier is the reserved all-zero value.
    #[error("{field} must not be the zero identifier")]
    ZeroIdentifier { field: String },

    /// Invalid format (e.g., unparseable identifier).
    #[error("{field} has invalid format: {reason}")]
    InvalidFormat { field: String, reason: String },
}

// =============================================================================
// Result Type Alias
// =============================================================================

/// Convenience type alias for Results with CoreError.
pub type CoreResult<T> = Result<T, CoreError>;

// =============================================================================
// Unit Tests
// =============================================================================
