//! # Domain Events
//!
//! Notifications emitted by the orchestrator after a state change.
//!
//! Emitters are synchronous and must not block: they run after the ledger
//! commit, so a slow emitter delays the caller but can never undo a
//! committed transfer.

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{info, warn};

use tiergate_core::{AccountId, Amount, DiscountRate, DiscountTier, PurchaseCount, TraceId};

// =============================================================================
// Events
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum DomainEvent {
    Initialized {
        owner: AccountId,
        oracle: AccountId,
        transfer_service: AccountId,
    },
    OracleChanged {
        previous: AccountId,
        current: AccountId,
    },
    PurchaseCountChanged {
        account: AccountId,
        previous: PurchaseCount,
        current: PurchaseCount,
    },
    DiscountApplied {
        account: AccountId,
        aux1: u64,
        original: Amount,
        discounted: Amount,
    },
    TransferCommitted {
        trace_id: TraceId,
        sender: AccountId,
        source: AccountId,
        destination: AccountId,
        discounted: Amount,
        aux1: u64,
        aux2: u64,
    },
    TiersChanged {
        tiers: Vec<DiscountTier>,
    },
    CustomDiscountChanged {
        account: AccountId,
        /// `None` when the override was removed.
        rate: Option<DiscountRate>,
    },
    AdminGranted {
        account: AccountId,
    },
    AdminRevoked {
        account: AccountId,
    },
    TransferRecordPurged {
        trace_id: TraceId,
    },
    Paused {
        by: AccountId,
    },
    Unpaused {
        by: AccountId,
    },
}

impl DomainEvent {
    /// Stable snake_case name, matching the serialized tag.
    pub fn name(&self) -> &'static str {
        match self {
            DomainEvent::Initialized { .. } => "initialized",
            DomainEvent::OracleChanged { .. } => "oracle_changed",
            DomainEvent::PurchaseCountChanged { .. } => "purchase_count_changed",
            DomainEvent::DiscountApplied { .. } => "discount_applied",
            DomainEvent::TransferCommitted { .. } => "transfer_committed",
            DomainEvent::TiersChanged { .. } => "tiers_changed",
            DomainEvent::CustomDiscountChanged { .. } => "custom_discount_changed",
            DomainEvent::AdminGranted { .. } => "admin_granted",
            DomainEvent::AdminRevoked { .. } => "admin_revoked",
            DomainEvent::TransferRecordPurged { .. } => "transfer_record_purged",
            DomainEvent::Paused { .. } => "paused",
            DomainEvent::Unpaused { .. } => "unpaused",
        }
    }
}

// =============================================================================
// Event Emitter Trait
// =============================================================================

/// Sink for domain events.
pub trait EventEmitter: Send + Sync {
    fn emit(&self, event: &DomainEvent);
}

/// No-op event emitter for testing.
pub struct NoOpEmitter;

impl EventEmitter for NoOpEmitter {
    fn emit(&self, _event: &DomainEvent) {}
}

/// Writes every event as an `info` log line with a JSON payload.
pub struct TracingEmitter;

impl EventEmitter for TracingEmitter {
    fn emit(&self, event: &DomainEvent) {
        match serde_json::to_string(event) {
            Ok(payload) => info!(event = event.name(), %payload, "Domain event"),
            Err(e) => warn!(event = event.name(), error = %e, "Unserializable domain event"),
        }
    }
}

/// Forwards events to an unbounded channel.
///
/// A dropped receiver is not an error: events are discarded.
pub struct ChannelEmitter {
    tx: mpsc::UnboundedSender<DomainEvent>,
}

impl ChannelEmitter {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<DomainEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (ChannelEmitter { tx }, rx)
    }
}

impl EventEmitter for ChannelEmitter {
    fn emit(&self, event: &DomainEvent) {
        let _ = self.tx.send(event.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_serialized_tag_matches_name() {
        let event = DomainEvent::Paused {
            by: AccountId::from_u128(1),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event"], event.name());

        let event = DomainEvent::CustomDiscountChanged {
            account: AccountId::from_u128(1),
            rate: None,
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event"], "custom_discount_changed");
    }

    #[tokio::test]
    async fn test_channel_emitter() {
        let (emitter, mut rx) = ChannelEmitter::new();
        emitter.emit(&DomainEvent::Unpaused {
            by: AccountId::from_u128(1),
        });
        assert_eq!(rx.recv().await.unwrap().name(), "unpaused");

        drop(rx);
        // Receiver gone: still fine
        emitter.emit(&DomainEvent::Unpaused {
            by: AccountId::from_u128(1),
        });
    }
}
