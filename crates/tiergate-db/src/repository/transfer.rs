//! # Transfer Record Repository
//!
//! Append-only audit trail of committed transfers, keyed by trace id.
//!
//! ## Record Lifecycle
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  staged (insert_in, open tx) ──► committed ──► purged (admin only)      │
//! │         │                                                               │
//! │         └── settlement failed ──► rolled back, never visible            │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! `aux1`/`aux2` are opaque u64 values stored bit-for-bit in INTEGER
//! columns, so values above `i64::MAX` survive a round trip.

use chrono::{DateTime, Utc};
use sqlx::{SqliteConnection, SqlitePool};
use tracing::debug;

use super::{from_db_int, parse_column, to_db_int};
use crate::error::{DbError, DbResult};
use tiergate_core::{AccountId, Amount, TraceId, TransferRecord};

const SELECT_RECORD: &str = r#"
    SELECT
        trace_id, sender_id, source_id, destination_id,
        original_amount, discounted_amount, aux1, aux2, memo,
        purchase_count_before, committed_at
    FROM transfer_records
"#;

#[derive(Debug, sqlx::FromRow)]
struct TransferRecordRow {
    trace_id: String,
    sender_id: String,
    source_id: String,
    destination_id: String,
    original_amount: i64,
    discounted_amount: i64,
    aux1: i64,
    aux2: i64,
    memo: String,
    purchase_count_before: i64,
    committed_at: DateTime<Utc>,
}

impl TransferRecordRow {
    fn into_record(self) -> DbResult<TransferRecord> {
        Ok(TransferRecord {
            trace_id: parse_column("trace_id", &self.trace_id)?,
            sender: parse_column("sender_id", &self.sender_id)?,
            source: parse_column("source_id", &self.source_id)?,
            destination: parse_column("destination_id", &self.destination_id)?,
            original_amount: Amount::from_units(from_db_int(
                "original_amount",
                self.original_amount,
            )?),
            discounted_amount: Amount::from_units(from_db_int(
                "discounted_amount",
                self.discounted_amount,
            )?),
            aux1: self.aux1 as u64,
            aux2: self.aux2 as u64,
            memo: self.memo,
            purchase_count_before: from_db_int(
                "purchase_count_before",
                self.purchase_count_before,
            )?,
            committed_at: self.committed_at,
        })
    }
}

/// Repository for transfer records.
#[derive(Debug, Clone)]
pub struct TransferRecordRepository {
    pool: SqlitePool,
}

impl TransferRecordRepository {
    /// Creates a new TransferRecordRepository.
    pub fn new(pool: SqlitePool) -> Self {
        TransferRecordRepository { pool }
    }

    /// Inserts a record outside any caller transaction.
    pub async fn insert(&self, record: &TransferRecord) -> DbResult<()> {
        let mut conn = self.pool.acquire().await?;
        Self::insert_in(&mut conn, record).await
    }

    /// Inserts a record through an existing connection or transaction.
    ///
    /// ## Errors
    /// `DbError::UniqueViolation` when the trace id is already stored.
    pub async fn insert_in(conn: &mut SqliteConnection, record: &TransferRecord) -> DbResult<()> {
        debug!(trace_id = %record.trace_id, sender = %record.sender, "Inserting transfer record");

        sqlx::query(
            r#"
            INSERT INTO transfer_records (
                trace_id, sender_id, source_id, destination_id,
                original_amount, discounted_amount, aux1, aux2, memo,
                purchase_count_before, committed_at
            ) VALUES (
                ?1, ?2, ?3, ?4,
                ?5, ?6, ?7, ?8, ?9,
                ?10, ?11
            )
            "#,
        )
        .bind(record.trace_id.to_string())
        .bind(record.sender.to_string())
        .bind(record.source.to_string())
        .bind(record.destination.to_string())
        .bind(to_db_int("original_amount", record.original_amount.units())?)
        .bind(to_db_int("discounted_amount", record.discounted_amount.units())?)
        .bind(record.aux1 as i64)
        .bind(record.aux2 as i64)
        .bind(&record.memo)
        .bind(to_db_int("purchase_count_before", record.purchase_count_before)?)
        .bind(record.committed_at)
        .execute(&mut *conn)
        .await
        .map_err(|e| match DbError::from(e) {
            DbError::UniqueViolation { field, .. } => DbError::UniqueViolation {
                field,
                value: record.trace_id.to_string(),
            },
            other => other,
        })?;

        Ok(())
    }

    /// Gets a record by trace id.
    pub async fn get(&self, trace_id: TraceId) -> DbResult<Option<TransferRecord>> {
        let row: Option<TransferRecordRow> =
            sqlx::query_as(&format!("{SELECT_RECORD} WHERE trace_id = ?1"))
                .bind(trace_id.to_string())
                .fetch_optional(&self.pool)
                .await?;

        row.map(TransferRecordRow::into_record).transpose()
    }

    /// Checks whether a trace id has been recorded.
    pub async fn exists(&self, trace_id: TraceId) -> DbResult<bool> {
        let found: Option<i64> =
            sqlx::query_scalar("SELECT 1 FROM transfer_records WHERE trace_id = ?1")
                .bind(trace_id.to_string())
                .fetch_optional(&self.pool)
                .await?;
        Ok(found.is_some())
    }

    /// Lists the records `account` took part in, newest first.
    pub async fn history(&self, account: AccountId, limit: u32) -> DbResult<Vec<TransferRecord>> {
        let rows: Vec<TransferRecordRow> = sqlx::query_as(&format!(
            "{SELECT_RECORD}
            WHERE sender_id = ?1 OR source_id = ?1 OR destination_id = ?1
            ORDER BY committed_at DESC, trace_id ASC
            LIMIT ?2"
        ))
        .bind(account.to_string())
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(TransferRecordRow::into_record).collect()
    }

    /// Deletes a record. Returns false when nothing matched.
    pub async fn purge(&self, trace_id: TraceId) -> DbResult<bool> {
        let result = sqlx::query("DELETE FROM transfer_records WHERE trace_id = ?1")
            .bind(trace_id.to_string())
            .execute(&self.pool)
            .await?;

        debug!(trace_id = %trace_id, purged = result.rows_affected(), "Transfer record purge");
        Ok(result.rows_affected() > 0)
    }

    /// Total number of stored records.
    pub async fn count(&self) -> DbResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM transfer_records")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
