//! # Transfer Errors
//!
//! Every failure an orchestrator operation can report.
//!
//! ## Error Categories
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         TransferError                                   │
//! │                                                                         │
//! │  VALIDATION         "resubmit with different input"                    │
//! │  ───────────        InvalidArgument, ArrayLengthMismatch,              │
//! │                     BatchTooLarge, DuplicateTrace                      │
//! │                                                                         │
//! │  BUSINESS RULE      "the accounts are not in a state to transfer"      │
//! │  ─────────────      NotActive, InsufficientBalance, Paused, Reentrant  │
//! │                                                                         │
//! │  CONFIGURATION      "fix the deployment or the caller's role"          │
//! │  ─────────────      Unauthorized, AlreadyInitialized, NotInitialized,  │
//! │                     TierConfigurationInvalid                           │
//! │                                                                         │
//! │  EXTERNAL           "a collaborator failed"                            │
//! │  ────────           LookupFailure, SettlementFailure, Ledger           │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Every variant except `Ledger` after a settled transfer is raised before
//! any state changes.

use std::fmt;
use thiserror::Error;

use crate::gateway::LookupError;
use crate::ledger::LedgerError;
use tiergate_core::{AccountId, AccountRole, Amount, CoreError, TraceId, ValidationError};

#[derive(Debug, Error)]
pub enum TransferError {
    // =========================================================================
    // Validation
    // =========================================================================
    /// Input rejected before any state was read.
    #[error("Invalid argument: {0}")]
    InvalidArgument(ValidationError),

    #[error("Array length mismatch: {left} vs {right}")]
    ArrayLengthMismatch { left: usize, right: usize },

    #[error("Batch of {len} elements exceeds the limit of {max}")]
    BatchTooLarge { len: usize, max: usize },

    /// The trace id is already recorded or in flight.
    ///
    /// ## When This Occurs
    /// - A retry reused the trace id of a committed transfer
    /// - Two concurrent requests share a trace id
    #[error("Trace {0} has already been used")]
    DuplicateTrace(TraceId),

    // =========================================================================
    // Business Rules
    // =========================================================================
    #[error("The {role} account {account} is not active")]
    NotActive { role: AccountRole, account: AccountId },

    #[error("Insufficient balance on {account}: has {balance}, needs {required}")]
    InsufficientBalance {
        account: AccountId,
        balance: Amount,
        required: Amount,
    },

    #[error("Transfers are paused")]
    Paused,

    /// Another operation holds one of the resources.
    #[error("Reentrant call rejected: {resource} is in use")]
    Reentrant { resource: String },

    // =========================================================================
    // Configuration / Administration
    // =========================================================================
    #[error("Caller {caller} is not authorized for this operation")]
    Unauthorized { caller: AccountId },

    #[error("Orchestrator is already initialized")]
    AlreadyInitialized,

    #[error("Orchestrator is not initialized")]
    NotInitialized,

    #[error("Invalid tier configuration: {reason}")]
    TierConfigurationInvalid { reason: String },

    // =========================================================================
    // External Collaborators
    // =========================================================================
    #[error("State lookup failed: {0}")]
    LookupFailure(#[from] LookupError),

    /// The transfer service declined or failed. Never retried.
    #[error("Settlement of {trace_id} failed: {reason}")]
    SettlementFailure { trace_id: TraceId, reason: String },

    #[error(transparent)]
    Ledger(LedgerError),
}

impl From<ValidationError> for TransferError {
    fn from(err: ValidationError) -> Self {
        TransferError::InvalidArgument(err)
    }
}

impl From<CoreError> for TransferError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::Validation(e) => TransferError::InvalidArgument(e),
            CoreError::TierConfiguration { reason } => {
                TransferError::TierConfigurationInvalid { reason }
            }
            CoreError::ArrayLengthMismatch { left, right } => {
                TransferError::ArrayLengthMismatch { left, right }
            }
            CoreError::BatchTooLarge { len, max } => TransferError::BatchTooLarge { len, max },
            CoreError::AmountOverflow => TransferError::InvalidArgument(ValidationError::OutOfRange {
                field: "amount".to_string(),
                min: 1,
                max: u64::MAX,
            }),
        }
    }
}

impl From<LedgerError> for TransferError {
    fn from(err: LedgerError) -> Self {
        match err {
            LedgerError::DuplicateTrace(trace_id) => TransferError::DuplicateTrace(trace_id),
            other => TransferError::Ledger(other),
        }
    }
}

// =============================================================================
// Categorization
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Validation,
    BusinessRule,
    Configuration,
    External,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorCategory::Validation => write!(f, "validation"),
            ErrorCategory::BusinessRule => write!(f, "business_rule"),
            ErrorCategory::Configuration => write!(f, "configuration"),
            ErrorCategory::External => write!(f, "external"),
        }
    }
}

impl TransferError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            TransferError::InvalidArgument(_)
            | TransferError::ArrayLengthMismatch { .. }
            | TransferError::BatchTooLarge { .. }
            | TransferError::DuplicateTrace(_) => ErrorCategory::Validation,

            TransferError::NotActive { .. }
            | TransferError::InsufficientBalance { .. }
            | TransferError::Paused
            | TransferError::Reentrant { .. } => ErrorCategory::BusinessRule,

            TransferError::Unauthorized { .. }
            | TransferError::AlreadyInitialized
            | TransferError::NotInitialized
            | TransferError::TierConfigurationInvalid { .. } => ErrorCategory::Configuration,

            TransferError::LookupFailure(_)
            | TransferError::SettlementFailure { .. }
            | TransferError::Ledger(_) => ErrorCategory::External,
        }
    }

    /// Whether the same request may succeed if resubmitted unchanged later.
    ///
    /// Settlement failures are not: a retry needs a fresh trace id.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            TransferError::Reentrant { .. } | TransferError::Paused | TransferError::LookupFailure(_)
        )
    }

    pub(crate) fn reentrant(resource: impl fmt::Display) -> Self {
        TransferError::Reentrant {
            resource: resource.to_string(),
        }
    }
}

pub type TransferResult<T> = Result<T, TransferError>;
