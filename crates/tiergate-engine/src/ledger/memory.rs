//! In-memory [`PurchaseLedger`].
//!
//! Staging is free; `commit` re-checks the trace id and the totals under
//! the write lock and applies everything or nothing.

use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;
use tracing::debug;

use super::{LedgerError, LedgerResult, PurchaseLedger};
use tiergate_core::{AccountId, PurchaseCount, PurchaseStats, TraceId, TransferRecord};

#[derive(Debug, Default)]
struct LedgerState {
    stats: HashMap<AccountId, PurchaseStats>,
    records: HashMap<TraceId, TransferRecord>,
    /// Insertion order of `records`.
    order: Vec<TraceId>,
}

/// A transfer write waiting for settlement.
#[derive(Debug)]
pub struct StagedRecord {
    record: TransferRecord,
}

#[derive(Debug, Default)]
pub struct InMemoryLedger {
    state: RwLock<LedgerState>,
}

impl InMemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PurchaseLedger for InMemoryLedger {
    type Staged = StagedRecord;

    async fn purchase_count(&self, account: AccountId) -> LedgerResult<PurchaseCount> {
        let state = self.state.read().await;
        Ok(state
            .stats
            .get(&account)
            .map(|s| s.purchase_count)
            .unwrap_or(0))
    }

    async fn stats(&self, account: AccountId) -> LedgerResult<PurchaseStats> {
        let state = self.state.read().await;
        Ok(state
            .stats
            .get(&account)
            .cloned()
            .unwrap_or_else(|| PurchaseStats::empty(account)))
    }

    async fn contains_trace(&self, trace_id: TraceId) -> LedgerResult<bool> {
        Ok(self.state.read().await.records.contains_key(&trace_id))
    }

    async fn stage(&self, record: TransferRecord) -> LedgerResult<StagedRecord> {
        if self.contains_trace(record.trace_id).await? {
            return Err(LedgerError::DuplicateTrace(record.trace_id));
        }
        Ok(StagedRecord { record })
    }

    async fn commit(&self, staged: StagedRecord) -> LedgerResult<PurchaseCount> {
        let record = staged.record;
        let mut state = self.state.write().await;

        if state.records.contains_key(&record.trace_id) {
            return Err(LedgerError::DuplicateTrace(record.trace_id));
        }

        let current = state
            .stats
            .get(&record.sender)
            .cloned()
            .unwrap_or_else(|| PurchaseStats::empty(record.sender));
        let purchase_count = current
            .purchase_count
            .checked_add(1)
            .ok_or(LedgerError::Overflow(record.sender))?;
        let total_spent = current
            .total_spent
            .checked_add(record.discounted_amount)
            .map_err(|_| LedgerError::Overflow(record.sender))?;

        state.stats.insert(
            record.sender,
            PurchaseStats {
                account: record.sender,
                purchase_count,
                total_spent,
                last_purchase_at: Some(record.committed_at),
            },
        );
        state.order.push(record.trace_id);
        debug!(trace_id = %record.trace_id, purchase_count, "Ledger commit");
        state.records.insert(record.trace_id, record);

        Ok(purchase_count)
    }

    async fn rollback(&self, staged: StagedRecord) -> LedgerResult<()> {
        debug!(trace_id = %staged.record.trace_id, "Ledger rollback");
        Ok(())
    }

    async fn reset(&self, account: AccountId) -> LedgerResult<PurchaseCount> {
        let mut state = self.state.write().await;
        let previous = match state.stats.get_mut(&account) {
            Some(stats) => std::mem::replace(&mut stats.purchase_count, 0),
            None => 0,
        };
        Ok(previous)
    }

    async fn bulk_set(&self, entries: &[(AccountId, PurchaseCount)]) -> LedgerResult<()> {
        let mut state = self.state.write().await;
        for (account, count) in entries {
            state
                .stats
                .entry(*account)
                .or_insert_with(|| PurchaseStats::empty(*account))
                .purchase_count = *count;
        }
        Ok(())
    }

    async fn record(&self, trace_id: TraceId) -> LedgerResult<Option<TransferRecord>> {
        Ok(self.state.read().await.records.get(&trace_id).cloned())
    }

    async fn history(&self, account: AccountId, limit: usize) -> LedgerResult<Vec<TransferRecord>> {
        let state = self.state.read().await;
        Ok(state
            .order
            .iter()
            .rev()
            .filter_map(|trace| state.records.get(trace))
            .filter(|r| r.sender == account || r.source == account || r.destination == account)
            .take(limit)
            .cloned()
            .collect())
    }

    async fn purge(&self, trace_id: TraceId) -> LedgerResult<bool> {
        let mut state = self.state.write().await;
        let removed = state.records.remove(&trace_id).is_some();
        if removed {
            state.order.retain(|t| *t != trace_id);
        }
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use tiergate_core::{Amount, TransferRequest};

    fn record(trace: u128) -> TransferRecord {
        let request = TransferRequest::new(
            AccountId::from_u128(1),
            AccountId::from_u128(2),
            AccountId::from_u128(3),
            Amount::from_units(1000),
            "order",
            TraceId::from_u128(trace),
        );
        TransferRecord::from_request(&request, Amount::from_units(950), 0, Utc::now())
    }

    #[tokio::test]
    async fn test_rollback_leaves_nothing() {
        let ledger = InMemoryLedger::new();
        let staged = ledger.stage(record(1)).await.unwrap();
        ledger.rollback(staged).await.unwrap();

        assert_eq!(ledger.purchase_count(AccountId::from_u128(1)).await.unwrap(), 0);
        assert!(!ledger.contains_trace(TraceId::from_u128(1)).await.unwrap());
    }

    #[tokio::test]
    async fn test_commit_increments_once() {
        let ledger = InMemoryLedger::new();
        let staged = ledger.stage(record(1)).await.unwrap();
        assert_eq!(ledger.commit(staged).await.unwrap(), 1);

        let stats = ledger.stats(AccountId::from_u128(1)).await.unwrap();
        assert_eq!(stats.purchase_count, 1);
        assert_eq!(stats.total_spent, Amount::from_units(950));
        assert!(ledger.record(TraceId::from_u128(1)).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_duplicate_trace() {
        let ledger = InMemoryLedger::new();
        let first = ledger.stage(record(1)).await.unwrap();
        let second = ledger.stage(record(1)).await.unwrap();
        ledger.commit(first).await.unwrap();

        assert!(matches!(
            ledger.commit(second).await,
            Err(LedgerError::DuplicateTrace(_))
        ));
        assert!(matches!(
            ledger.stage(record(1)).await,
            Err(LedgerError::DuplicateTrace(_))
        ));
        assert_eq!(ledger.purchase_count(AccountId::from_u128(1)).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_reset_bulk_set_history_purge() {
        let ledger = InMemoryLedger::new();
        for trace in 1..=3 {
            let staged = ledger.stage(record(trace)).await.unwrap();
            ledger.commit(staged).await.unwrap();
        }

        let history = ledger.history(AccountId::from_u128(3), 2).await.unwrap();
        assert_eq!(history[0].trace_id, TraceId::from_u128(3));
        assert_eq!(history.len(), 2);

        assert_eq!(ledger.reset(AccountId::from_u128(1)).await.unwrap(), 3);
        ledger
            .bulk_set(&[(AccountId::from_u128(1), 7), (AccountId::from_u128(9), 2)])
            .await
            .unwrap();
        assert_eq!(ledger.purchase_count(AccountId::from_u128(1)).await.unwrap(), 7);
        assert_eq!(ledger.purchase_count(AccountId::from_u128(9)).await.unwrap(), 2);

        assert!(ledger.purge(TraceId::from_u128(2)).await.unwrap());
        assert!(!ledger.purge(TraceId::from_u128(2)).await.unwrap());
        assert_eq!(ledger.history(AccountId::from_u128(1), 10).await.unwrap().len(), 2);
    }
}
