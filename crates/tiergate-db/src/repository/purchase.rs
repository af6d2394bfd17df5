//! # Purchase Count Repository
//!
//! Per-account purchase counters, lifetime spend and last purchase time.
//!
//! Rows are created lazily: an account without a row has a count of zero.

use chrono::{DateTime, Utc};
use sqlx::{SqliteConnection, SqlitePool};
use tracing::debug;

use super::{from_db_int, parse_column, to_db_int};
use crate::error::DbResult;
use tiergate_core::{AccountId, Amount, PurchaseCount, PurchaseStats};

#[derive(Debug, sqlx::FromRow)]
struct PurchaseCountRow {
    account_id: String,
    purchase_count: i64,
    total_spent: i64,
    last_purchase_at: Option<DateTime<Utc>>,
}

impl PurchaseCountRow {
    fn into_stats(self) -> DbResult<PurchaseStats> {
        Ok(PurchaseStats {
            account: parse_column("account_id", &self.account_id)?,
            purchase_count: from_db_int("purchase_count", self.purchase_count)?,
            total_spent: Amount::from_units(from_db_int("total_spent", self.total_spent)?),
            last_purchase_at: self.last_purchase_at,
        })
    }
}

/// Repository for purchase counters.
#[derive(Debug, Clone)]
pub struct PurchaseCountRepository {
    pool: SqlitePool,
}

impl PurchaseCountRepository {
    /// Creates a new PurchaseCountRepository.
    pub fn new(pool: SqlitePool) -> Self {
        PurchaseCountRepository { pool }
    }

    /// Returns the purchase count of `account` (zero if never seen).
    pub async fn get(&self, account: AccountId) -> DbResult<PurchaseCount> {
        let mut conn = self.pool.acquire().await?;
        Self::get_in(&mut conn, account).await
    }

    /// Returns aggregate stats of `account`.
    pub async fn stats(&self, account: AccountId) -> DbResult<PurchaseStats> {
        let row: Option<PurchaseCountRow> = sqlx::query_as(
            r#"
            SELECT account_id, purchase_count, total_spent, last_purchase_at
            FROM purchase_counts
            WHERE account_id = ?1
            "#,
        )
        .bind(account.to_string())
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => row.into_stats(),
            None => Ok(PurchaseStats::empty(account)),
        }
    }

    /// Lists accounts by descending purchase count.
    pub async fn top(&self, limit: u32) -> DbResult<Vec<PurchaseStats>> {
        let rows: Vec<PurchaseCountRow> = sqlx::query_as(
            r#"
            SELECT account_id, purchase_count, total_spent, last_purchase_at
            FROM purchase_counts
            ORDER BY purchase_count DESC, account_id ASC
            LIMIT ?1
            "#,
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(PurchaseCountRow::into_stats).collect()
    }

    /// Counts accounts with a stored row.
    pub async fn count_accounts(&self) -> DbResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM purchase_counts")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    /// Resets `account` to zero purchases, returning the previous count.
    ///
    /// Lifetime spend and last purchase time are kept.
    pub async fn reset(&self, account: AccountId) -> DbResult<PurchaseCount> {
        let mut tx = self.pool.begin().await?;
        let previous = Self::get_in(&mut tx, account).await?;
        Self::set_in(&mut tx, account, 0, Utc::now()).await?;
        tx.commit().await?;

        debug!(account = %account, previous, "Purchase count reset");
        Ok(previous)
    }

    /// Sets many counters in one transaction.
    ///
    /// Every value is converted before the transaction starts, so an
    /// out-of-range count leaves all rows untouched.
    pub async fn bulk_set(&self, entries: &[(AccountId, PurchaseCount)]) -> DbResult<()> {
        let converted = entries
            .iter()
            .map(|(account, count)| to_db_int("purchase_count", *count).map(|c| (*account, c)))
            .collect::<DbResult<Vec<(AccountId, i64)>>>()?;

        let now = Utc::now();
        let mut tx = self.pool.begin().await?;
        for (account, count) in converted {
            Self::upsert_count(&mut tx, account, count, now).await?;
        }
        tx.commit().await?;

        debug!(entries = entries.len(), "Purchase counts bulk set");
        Ok(())
    }

    // =========================================================================
    // Connection-scoped operations
    // =========================================================================

    /// Reads the count through an existing connection or transaction.
    pub async fn get_in(
        conn: &mut SqliteConnection,
        account: AccountId,
    ) -> DbResult<PurchaseCount> {
        let count: Option<i64> =
            sqlx::query_scalar("SELECT purchase_count FROM purchase_counts WHERE account_id = ?1")
                .bind(account.to_string())
                .fetch_optional(&mut *conn)
                .await?;

        match count {
            Some(count) => from_db_int("purchase_count", count),
            None => Ok(0),
        }
    }

    /// Overwrites the count through an existing connection or transaction.
    pub async fn set_in(
        conn: &mut SqliteConnection,
        account: AccountId,
        count: PurchaseCount,
        at: DateTime<Utc>,
    ) -> DbResult<()> {
        let count = to_db_int("purchase_count", count)?;
        Self::upsert_count(conn, account, count, at).await
    }

    /// Adds one purchase of `spent` to `account`, returning the new count.
    pub async fn increment_in(
        conn: &mut SqliteConnection,
        account: AccountId,
        spent: Amount,
        at: DateTime<Utc>,
    ) -> DbResult<PurchaseCount> {
        let spent = to_db_int("total_spent", spent.units())?;

        let count: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO purchase_counts (
                account_id, purchase_count, total_spent, last_purchase_at, updated_at
            ) VALUES (?1, 1, ?2, ?3, ?3)
            ON CONFLICT(account_id) DO UPDATE SET
                purchase_count = purchase_count + 1,
                total_spent = total_spent + excluded.total_spent,
                last_purchase_at = excluded.last_purchase_at,
                updated_at = excluded.updated_at
            RETURNING purchase_count
            "#,
        )
        .bind(account.to_string())
        .bind(spent)
        .bind(at)
        .fetch_one(&mut *conn)
        .await?;

        from_db_int("purchase_count", count)
    }

    async fn upsert_count(
        conn: &mut SqliteConnection,
        account: AccountId,
        count: i64,
        at: DateTime<Utc>,
    ) -> DbResult<()> {
        sqlx::query(
            r#"
            INSERT INTO purchase_counts (account_id, purchase_count, total_spent, updated_at)
            VALUES (?1, ?2, 0, ?3)
            ON CONFLICT(account_id) DO UPDATE SET
                purchase_count = excluded.purchase_count,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(account.to_string())
        .bind(count)
        .bind(at)
        .execute(&mut *conn)
        .await?;

        Ok(())
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Database, DbConfig};

    async fn repo() -> (Database, PurchaseCountRepository) {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let repo = db.purchases();
        (db, repo)
    }

    #[tokio::test]
    async fn test_unknown_account_is_zero() {
        let (_db, repo) = repo().await;
        let account = AccountId::from_u128(1);
        assert_eq!(repo.get(account).await.unwrap(), 0);
        assert_eq!(repo.stats(account).await.unwrap(), PurchaseStats::empty(account));
    }

    #[tokio::test]
    async fn test_increment_commits_with_transaction() {
        let (db, repo) = repo().await;
        let account = AccountId::from_u128(1);
        let now = Utc::now();

        let mut tx = db.begin().await.unwrap();
        let first = PurchaseCountRepository::increment_in(&mut tx, account, Amount::from_units(950), now)
            .await
            .unwrap();
        let second = PurchaseCountRepository::increment_in(&mut tx, account, Amount::from_units(50), now)
            .await
            .unwrap();
        tx.commit().await.unwrap();

        assert_eq!((first, second), (1, 2));
        let stats = repo.stats(account).await.unwrap();
        assert_eq!(stats.purchase_count, 2);
        assert_eq!(stats.total_spent, Amount::from_units(1000));
        assert!(stats.last_purchase_at.is_some());
    }

    #[tokio::test]
    async fn test_dropped_transaction_rolls_back() {
        let (db, repo) = repo().await;
        let account = AccountId::from_u128(1);

        {
            let mut tx = db.begin().await.unwrap();
            PurchaseCountRepository::increment_in(&mut tx, account, Amount::from_units(1), Utc::now())
                .await
                .unwrap();
            tx.rollback().await.unwrap();
        }

        assert_eq!(repo.get(account).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_reset_returns_previous_and_keeps_spend() {
        let (db, repo) = repo().await;
        let account = AccountId::from_u128(1);

        let mut tx = db.begin().await.unwrap();
        PurchaseCountRepository::increment_in(&mut tx, account, Amount::from_units(10), Utc::now())
            .await
            .unwrap();
        tx.commit().await.unwrap();

        assert_eq!(repo.reset(account).await.unwrap(), 1);
        let stats = repo.stats(account).await.unwrap();
        assert_eq!(stats.purchase_count, 0);
        assert_eq!(stats.total_spent, Amount::from_units(10));
    }

    #[tokio::test]
    async fn test_bulk_set_and_top() {
        let (_db, repo) = repo().await;
        let a = AccountId::from_u128(1);
        let b = AccountId::from_u128(2);

        repo.bulk_set(&[(a, 5), (b, 20)]).await.unwrap();
        assert_eq!(repo.get(a).await.unwrap(), 5);
        assert_eq!(repo.get(b).await.unwrap(), 20);
        assert_eq!(repo.count_accounts().await.unwrap(), 2);

        let top = repo.top(1).await.unwrap();
        assert_eq!(top[0].account, b);
    }

    #[tokio::test]
    async fn test_bulk_set_out_of_range_is_atomic() {
        let (_db, repo) = repo().await;
        let a = AccountId::from_u128(1);

        let result = repo.bulk_set(&[(a, 5), (AccountId::from_u128(2), u64::MAX)]).await;
        assert!(result.is_err());
        assert_eq!(repo.get(a).await.unwrap(), 0);
    }
}
