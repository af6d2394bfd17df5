//! # tiergate-core: Pure Business Logic for TierGate
//!
//! This crate is the **heart** of TierGate. It contains the discount-tier
//! resolution engine and the transfer domain types as pure functions with
//! zero I/O dependencies.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        TierGate Architecture                            │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                tiergate-engine (TransferOrchestrator)           │   │
//! │  │    validate ──► check accounts ──► discount ──► settle ──► log  │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │               ★ tiergate-core (THIS CRATE) ★                    │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────┐  ┌───────────┐  ┌───────────┐  ┌───────────┐  │   │
//! │  │   │   types   │  │  amount   │  │   tiers   │  │ discount  │  │   │
//! │  │   │ AccountId │  │  Amount   │  │ TierTable │  │  Policy   │  │   │
//! │  │   │ Request   │  │  floor    │  │  resolve  │  │ modifiers │  │   │
//! │  │   └───────────┘  └───────────┘  └───────────┘  └───────────┘  │   │
//! │  │                                                                 │   │
//! │  │   NO I/O • NO DATABASE • NO NETWORK • PURE FUNCTIONS           │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │                 tiergate-db (Purchase Ledger)                   │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`types`] - Identifiers, rates, transfer requests and records
//! - [`amount`] - Amount type with integer arithmetic (no floating point!)
//! - [`tiers`] - Tier table and purchase-count resolution
//! - [`discount`] - Discount engine and compositional modifiers
//! - [`error`] - Domain error types
//! - [`validation`] - Input validation
//!
//! ## Example Usage
//!
//! ```rust
//! use tiergate_core::{Amount, DiscountEngine, TierTable};
//!
//! let engine = DiscountEngine::new(TierTable::standard());
//!
//! // 5 previous purchases puts the account in the 5% band
//! let charged = engine.compute_discount(Amount::from_units(1000), 5).unwrap();
//! assert_eq!(charged.units(), 950);
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod amount;
pub mod discount;
pub mod error;
pub mod tiers;
pub mod types;
pub mod validation;

// =============================================================================
// Re-exports for Convenience
// =============================================================================

pub use amount::Amount;
pub use discount::{
    BaseRateSource, DiscountBreakdown, DiscountContext, DiscountEngine, DiscountModifier,
    DiscountPolicy, DiscountStep, ModifierKind,
};
pub use error::{CoreError, CoreResult, ValidationError};
pub use tiers::{DiscountTier, TierTable};
pub use types::*;

// =============================================================================
// Crate-Level Constants
// =============================================================================

/// Denominator for basis-point arithmetic (10000 bps = 100%).
pub const BPS_SCALE: u32 = 10_000;

/// Maximum number of elements accepted by any bulk operation.
///
/// ## Business Reason
/// Bounds the work a single admin or batch call can trigger.
/// Overridable through engine configuration, never above this ceiling.
pub const MAX_BATCH_SIZE: usize = 100;

/// Maximum number of tiers in a tier table.
pub const MAX_TIERS: usize = 32;

/// Maximum memo length in bytes.
pub const MAX_MEMO_LEN: usize = 256;

/// Default cap on the combined discount of all modifiers (50%).
pub const DEFAULT_MAX_COMBINED_BPS: u32 = 5_000;
