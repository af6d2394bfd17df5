//! SQLite-backed [`PurchaseLedger`].
//!
//! `stage` only holds the record in memory; no connection is taken while
//! the transfer service settles, so a settlement that calls back into the
//! orchestrator never waits on the pool or on SQLite's writer lock.
//! `commit` writes the record insert and the counter increment in one
//! transaction.

use async_trait::async_trait;
use tracing::debug;

use super::{LedgerError, LedgerResult, PurchaseLedger};
use tiergate_core::{AccountId, PurchaseCount, PurchaseStats, TraceId, TransferRecord};
use tiergate_db::{Database, DbConfig, DbError, PurchaseCountRepository, TransferRecordRepository};

/// A transfer write waiting for settlement.
#[derive(Debug, Clone)]
pub struct StagedRecord {
    record: TransferRecord,
}

#[derive(Debug, Clone)]
pub struct SqliteLedger {
    db: Database,
}

impl SqliteLedger {
    pub fn new(db: Database) -> Self {
        SqliteLedger { db }
    }

    /// Connects (and migrates) the database described by `config`.
    pub async fn open(config: DbConfig) -> LedgerResult<Self> {
        Ok(SqliteLedger::new(Database::new(config).await?))
    }

    pub fn database(&self) -> &Database {
        &self.db
    }
}

fn duplicate_or_storage(trace_id: TraceId, err: DbError) -> LedgerError {
    if err.is_unique_violation() {
        LedgerError::DuplicateTrace(trace_id)
    } else {
        LedgerError::Storage(err)
    }
}

#[async_trait]
impl PurchaseLedger for SqliteLedger {
    type Staged = StagedRecord;

    async fn purchase_count(&self, account: AccountId) -> LedgerResult<PurchaseCount> {
        Ok(self.db.purchases().get(account).await?)
    }

    async fn stats(&self, account: AccountId) -> LedgerResult<PurchaseStats> {
        Ok(self.db.purchases().stats(account).await?)
    }

    async fn contains_trace(&self, trace_id: TraceId) -> LedgerResult<bool> {
        Ok(self.db.transfers().exists(trace_id).await?)
    }

    async fn stage(&self, record: TransferRecord) -> LedgerResult<StagedRecord> {
        if self.db.transfers().exists(record.trace_id).await? {
            return Err(LedgerError::DuplicateTrace(record.trace_id));
        }
        debug!(trace_id = %record.trace_id, "Ledger write staged");
        Ok(StagedRecord { record })
    }

    async fn commit(&self, staged: StagedRecord) -> LedgerResult<PurchaseCount> {
        let record = staged.record;
        let mut tx = self.db.begin().await?;

        TransferRecordRepository::insert_in(&mut tx, &record)
            .await
            .map_err(|e| duplicate_or_storage(record.trace_id, e))?;
        let purchase_count = PurchaseCountRepository::increment_in(
            &mut tx,
            record.sender,
            record.discounted_amount,
            record.committed_at,
        )
        .await?;

        tx.commit()
            .await
            .map_err(|e| DbError::TransactionFailed(e.to_string()))?;
        debug!(trace_id = %record.trace_id, purchase_count, "Ledger commit");
        Ok(purchase_count)
    }

    async fn rollback(&self, staged: StagedRecord) -> LedgerResult<()> {
        debug!(trace_id = %staged.record.trace_id, "Ledger rollback");
        Ok(())
    }

    async fn reset(&self, account: AccountId) -> LedgerResult<PurchaseCount> {
        Ok(self.db.purchases().reset(account).await?)
    }

    async fn bulk_set(&self, entries: &[(AccountId, PurchaseCount)]) -> LedgerResult<()> {
        Ok(self.db.purchases().bulk_set(entries).await?)
    }

    async fn record(&self, trace_id: TraceId) -> LedgerResult<Option<TransferRecord>> {
        Ok(self.db.transfers().get(trace_id).await?)
    }

    async fn history(&self, account: AccountId, limit: usize) -> LedgerResult<Vec<TransferRecord>> {
        let limit = u32::try_from(limit).unwrap_or(u32::MAX);
        Ok(self.db.transfers().history(account, limit).await?)
    }

    async fn purge(&self, trace_id: TraceId) -> LedgerResult<bool> {
        Ok(self.db.transfers().purge(trace_id).await?)
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
        TransferRecord::from_request(&request, Amount::from_units(900), 0, Utc::now())
    }

    async fn ledger() -> SqliteLedger {
        SqliteLedger::open(DbConfig::in_memory()).await.unwrap()
    }

    #[tokio::test]
    async fn test_commit_makes_write_visible() {
        let ledger = ledger().await;
        let staged = ledger.stage(record(1)).await.unwrap();
        assert_eq!(ledger.commit(staged).await.unwrap(), 1);

        let stats = ledger.stats(AccountId::from_u128(1)).await.unwrap();
        assert_eq!(stats.purchase_count, 1);
        assert_eq!(stats.total_spent, Amount::from_units(900));
        assert!(ledger.contains_trace(TraceId::from_u128(1)).await.unwrap());
    }

    #[tokio::test]
    async fn test_rollback_discards_write() {
        let ledger = ledger().await;
        let staged = ledger.stage(record(1)).await.unwrap();
        ledger.rollback(staged).await.unwrap();

        assert_eq!(ledger.purchase_count(AccountId::from_u128(1)).await.unwrap(), 0);
        assert!(ledger.record(TraceId::from_u128(1)).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_stage_takes_no_connection() {
        // The in-memory pool has a single connection
        let ledger = ledger().await;
        let staged = ledger.stage(record(1)).await.unwrap();

        assert_eq!(ledger.purchase_count(AccountId::from_u128(77)).await.unwrap(), 0);
        let other = ledger.stage(record(2)).await.unwrap();
        assert_eq!(ledger.commit(other).await.unwrap(), 1);
        assert_eq!(ledger.commit(staged).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_duplicate_trace_rejected() {
        let ledger = ledger().await;
        let first = ledger.stage(record(1)).await.unwrap();
        let racing = ledger.stage(record(1)).await.unwrap();
        ledger.commit(first).await.unwrap();

        assert!(matches!(
            ledger.stage(record(1)).await,
            Err(LedgerError::DuplicateTrace(_))
        ));
        // A racing commit of the same trace leaves no partial write
        assert!(matches!(
            ledger.commit(racing).await,
            Err(LedgerError::DuplicateTrace(_))
        ));
        assert_eq!(ledger.purchase_count(AccountId::from_u128(1)).await.unwrap(), 1);
    }
}
