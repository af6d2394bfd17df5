//! # Repository Module
//!
//! Database repository implementations for the purchase ledger.
//!
//! ## Repository Pattern
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Repository Layout                                    │
//! │                                                                         │
//! │  SqliteLedger (tiergate-engine)                                        │
//! │       │                                                                 │
//! │       │  db.purchases().get(account)            pool, read-only        │
//! │       │  PurchaseCountRepository::increment_in  inside staged tx       │
//! │       │  TransferRecordRepository::insert_in    inside staged tx       │
//! │       ▼                                                                 │
//! │  SQLite Database                                                       │
//! │                                                                         │
//! │  `*_in` functions take a connection so several writes can share one   │
//! │  transaction owned by the caller.                                      │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Available Repositories
//!
//! - [`PurchaseCountRepository`](purchase::PurchaseCountRepository) - Counters and spend
//! - [`TransferRecordRepository`](transfer::TransferRecordRepository) - Audit records

use std::fmt::Display;
use std::str::FromStr;

use crate::error::{DbError, DbResult};

pub mod purchase;
pub mod transfer;

// =============================================================================
// Column Conversions
// =============================================================================

/// Converts a domain u64 into a SQLite INTEGER, refusing to wrap.
pub(crate) fn to_db_int(field: &str, value: u64) -> DbResult<i64> {
    i64::try_from(value).map_err(|_| DbError::OutOfRange {
        field: field.to_string(),
        value,
    })
}

/// Converts a stored INTEGER back into a domain u64.
pub(crate) fn from_db_int(field: &str, value: i64) -> DbResult<u64> {
    u64::try_from(value).map_err(|e| DbError::decode(field, e))
}

/// Parses a TEXT column into a domain identifier.
pub(crate) fn parse_column<T>(field: &str, raw: &str) -> DbResult<T>
where
    T: FromStr,
    T::Err: Display,
{
    raw.parse().map_err(|e| DbError::decode(field, e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tiergate_core::AccountId;

    #[test]
    fn test_int_conversions() {
        assert_eq!(to_db_int("count", 42).unwrap(), 42);
        assert!(matches!(
            to_db_int("count", u64::MAX),
            Err(DbError::OutOfRange { .. })
        ));
        assert!(from_db_int("count", -1).is_err());
    }

    #[test]
    fn test_parse_column() {
        let id = AccountId::from_u128(5);
        let parsed: AccountId = parse_column("account_id", &id.to_string()).unwrap();
        assert_eq!(parsed, id);
        assert!(parse_column::<AccountId>("account_id", "garbage").is_err());
    }
}
