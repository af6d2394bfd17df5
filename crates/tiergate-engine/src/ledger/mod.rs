//! # Purchase Ledger
//!
//! Per-account purchase counters and the transfer audit trail, written with
//! a staged, all-or-nothing commit.
//!
//! ## Staged Commit
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    One Transfer, One Ledger Write                       │
//! │                                                                         │
//! │   stage(record) ──► Staged  (nothing visible yet)                      │
//! │        │                                                                │
//! │        ├── settlement OK ──────► commit(staged)                        │
//! │        │                          • sender count + 1                   │
//! │        │                          • total spent + discounted amount    │
//! │        │                          • record appended                    │
//! │        │                                                                │
//! │        └── declined / failed ──► rollback(staged)  (no trace left)     │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Implementations
//! - [`InMemoryLedger`] - process memory, validates on commit
//! - [`SqliteLedger`] - stages in memory, one SQLite transaction per commit

use async_trait::async_trait;
use thiserror::Error;

use tiergate_core::{AccountId, PurchaseCount, PurchaseStats, TraceId, TransferRecord};
use tiergate_db::DbError;

pub mod memory;
pub mod sqlite;

pub use memory::InMemoryLedger;
pub use sqlite::SqliteLedger;

// =============================================================================
// Ledger Error
// =============================================================================

#[derive(Debug, Error)]
pub enum LedgerError {
    /// The trace id is already recorded.
    #[error("Trace {0} has already been recorded")]
    DuplicateTrace(TraceId),

    /// A counter or spend total would leave its range.
    #[error("Purchase totals of account {0} overflowed")]
    Overflow(AccountId),

    /// The storage backend failed.
    #[error("Ledger storage error: {0}")]
    Storage(#[from] DbError),
}

pub type LedgerResult<T> = Result<T, LedgerError>;

// =============================================================================
// Ledger Trait
// =============================================================================

/// Durable purchase state behind the orchestrator.
///
/// Counters start at zero implicitly and only move through `commit`,
/// `reset` or `bulk_set`.
#[async_trait]
pub trait PurchaseLedger: Send + Sync {
    /// A prepared, not yet visible, transfer write.
    type Staged: Send;

    async fn purchase_count(&self, account: AccountId) -> LedgerResult<PurchaseCount>;

    async fn stats(&self, account: AccountId) -> LedgerResult<PurchaseStats>;

    async fn contains_trace(&self, trace_id: TraceId) -> LedgerResult<bool>;

    /// Prepares the record insert and the sender's increment.
    async fn stage(&self, record: TransferRecord) -> LedgerResult<Self::Staged>;

    /// Makes a staged write visible, returning the sender's new count.
    async fn commit(&self, staged: Self::Staged) -> LedgerResult<PurchaseCount>;

    /// Discards a staged write.
    async fn rollback(&self, staged: Self::Staged) -> LedgerResult<()>;

    /// Sets `account` back to zero, returning the previous count.
    async fn reset(&self, account: AccountId) -> LedgerResult<PurchaseCount>;

    /// Overwrites several counters at once.
    async fn bulk_set(&self, entries: &[(AccountId, PurchaseCount)]) -> LedgerResult<()>;

    async fn record(&self, trace_id: TraceId) -> LedgerResult<Option<TransferRecord>>;

    /// Records `account` took part in, newest first.
    async fn history(&self, account: AccountId, limit: usize) -> LedgerResult<Vec<TransferRecord>>;

    /// Deletes a record. Returns false when none matched.
    async fn purge(&self, trace_id: TraceId) -> LedgerResult<bool>;
}
