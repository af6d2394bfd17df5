//! # tiergate-db: Purchase Ledger Storage for TierGate
//!
//! This crate provides durable storage for purchase counters and transfer
//! records. It uses SQLite with sqlx for async operations.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        TierGate Data Flow                               │
//! │                                                                         │
//! │  TransferOrchestrator (tiergate-engine)                                │
//! │       │                                                                 │
//! │       ▼  SqliteLedger: stage → settle → commit / rollback              │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                   tiergate-db (THIS CRATE)                      │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────────┐    ┌────────────────┐   ┌──────────────┐  │   │
//! │  │   │   Database    │    │  Repositories  │   │  Migrations  │  │   │
//! │  │   │   (pool.rs)   │    │                │   │  (embedded)  │  │   │
//! │  │   │               │    │ PurchaseCount  │   │              │  │   │
//! │  │   │ SqlitePool    │◄───│ TransferRecord │   │ 001_init.sql │  │   │
//! │  │   │ Transactions  │    │                │   │              │  │   │
//! │  │   └───────────────┘    └────────────────┘   └──────────────┘  │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                     SQLite Database                             │   │
//! │  │   <data dir>/tiergate/tiergate.db                               │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//!
//! - [`pool`] - Connection pool creation and configuration
//! - [`migrations`] - Embedded database migrations
//! - [`error`] - Database error types
//! - [`repository`] - Purchase-count and transfer-record repositories
//!
//! ## Usage
//!
//! ```rust,ignore
//! use tiergate_db::{Database, DbConfig};
//!
//! let db = Database::new(DbConfig::new("path/to/tiergate.db")).await?;
//! let count = db.purchases().get(account).await?;
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod migrations;
pub mod pool;
pub mod repository;

// =============================================================================
// Re-exports
// =============================================================================

pub use error::{DbError, DbResult};
pub use pool::{Database, DbConfig};

// Repository re-exports for convenience
pub use repository::purchase::PurchaseCountRepository;
pub use repository::transfer::TransferRecordRepository;
