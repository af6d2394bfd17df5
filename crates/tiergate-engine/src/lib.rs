//! # tiergate-engine: Guarded Transfer Orchestration for TierGate
//!
//! This crate wires the pure discount engine to the outside world: an
//! external state store, an external transfer service and a durable
//! purchase ledger.
//!
//! ## Architecture Overview
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Orchestration Layer                              │
//! │                                                                         │
//! │  ┌──────────────────────────────────────────────────────────────────┐  │
//! │  │                  TransferOrchestrator                            │  │
//! │  │                                                                  │  │
//! │  │  custom_transfer: validate ─► check ─► discount ─► settle ─► log │  │
//! │  │  admin surface:   oracle, tiers, counts, overrides, pause        │  │
//! │  └───────┬──────────────────┬──────────────────┬────────────────────┘  │
//! │          │                  │                  │                        │
//! │          ▼                  ▼                  ▼                        │
//! │  ┌────────────────┐  ┌────────────────┐  ┌────────────────────────┐    │
//! │  │ AccountState   │  │ Transfer       │  │ PurchaseLedger         │    │
//! │  │ Gateway        │  │ Service        │  │                        │    │
//! │  │                │  │                │  │ stage / commit /       │    │
//! │  │ active flags,  │  │ moves the      │  │ rollback               │    │
//! │  │ balances, k/v  │  │ discounted     │  │ memory | sqlite        │    │
//! │  │ (external)     │  │ amount         │  │                        │    │
//! │  └────────────────┘  └────────────────┘  └────────────────────────┘    │
//! │                                                                         │
//! │  ReentrancyGuard (RAII) • EventEmitter • EngineConfig (TOML + env)     │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//! - [`orchestrator`] - `TransferOrchestrator`, stages and receipts
//! - [`gateway`] - `AccountStateGateway` trait and in-memory gateway
//! - [`settlement`] - `TransferService` trait and in-memory service
//! - [`ledger`] - `PurchaseLedger` trait, in-memory and SQLite ledgers
//! - [`guard`] - Reentrancy guard
//! - [`access`] - Owner and admin roster
//! - [`events`] - Domain events and emitters
//! - [`config`] - Engine configuration
//! - [`error`] - `TransferError` and its categories
//!
//! ## Usage
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use tiergate_engine::{
//!     InMemoryGateway, InMemoryLedger, InMemoryTransferService, OracleRef, ServiceRef,
//!     TransferOrchestrator,
//! };
//!
//! let orchestrator = TransferOrchestrator::new(owner, DiscountEngine::default(), InMemoryLedger::new());
//! orchestrator
//!     .initialize(owner, OracleRef::new(oracle_id, gateway.clone()), ServiceRef::new(service_id, service))
//!     .await?;
//!
//! let receipt = orchestrator.custom_transfer(&request).await?;
//! println!("charged {} (was {})", receipt.charged, receipt.original);
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod access;
pub mod config;
pub mod error;
pub mod events;
pub mod gateway;
pub mod guard;
pub mod ledger;
pub mod orchestrator;
pub mod settlement;

// =============================================================================
// Re-exports
// =============================================================================

pub use access::AccessControl;
pub use config::{
    AccessSettings, ConfigError, ConfigResult, EngineConfig, LedgerBackend, LedgerSettings, Limits,
};
pub use error::{ErrorCategory, TransferError, TransferResult};
pub use events::{ChannelEmitter, DomainEvent, EventEmitter, NoOpEmitter, TracingEmitter};
pub use gateway::{AccountStateGateway, InMemoryGateway, LookupError};
pub use guard::{GuardKey, GuardToken, ReentrancyGuard};
pub use ledger::{InMemoryLedger, LedgerError, LedgerResult, PurchaseLedger, SqliteLedger};
pub use orchestrator::{OracleRef, ServiceRef, TransferOrchestrator, TransferReceipt, TransferStage};
pub use settlement::{
    InMemoryTransferService, SettlementError, SettlementMode, SettlementOrder, TransferService,
};
