//! # Settlement
//!
//! The external transfer service that moves value once the discounted
//! amount is known.
//!
//! `execute` answers three ways: `Ok(true)` settled, `Ok(false)` declined,
//! `Err(_)` failed. The orchestrator treats the last two the same way
//! (abort, no ledger mutation) and never retries on its own.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, PoisonError};
use thiserror::Error;
use tracing::{debug, warn};

use crate::gateway::InMemoryGateway;
use tiergate_core::{AccountId, Amount, TraceId, TransferRequest};

// =============================================================================
// Settlement Order
// =============================================================================

/// What the transfer service is asked to move.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettlementOrder {
    pub trace_id: TraceId,
    pub sender: AccountId,
    pub source: AccountId,
    pub destination: AccountId,
    /// The discounted amount.
    pub amount: Amount,
    pub aux1: u64,
    pub aux2: u64,
    pub memo: String,
}

impl SettlementOrder {
    pub fn new(request: &TransferRequest, amount: Amount) -> Self {
        SettlementOrder {
            trace_id: request.trace_id,
            sender: request.sender,
            source: request.source,
            destination: request.destination,
            amount,
            aux1: request.aux1,
            aux2: request.aux2,
            memo: request.memo.clone(),
        }
    }
}

// =============================================================================
// Settlement Error
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SettlementError {
    /// The service could not be reached.
    #[error("Transfer service unavailable: {0}")]
    Unavailable(String),

    /// The service failed while processing the order.
    #[error("Transfer service error: {0}")]
    Failed(String),
}

// =============================================================================
// Transfer Service Trait
// =============================================================================

#[async_trait]
pub trait TransferService: Send + Sync {
    /// Moves `order.amount` from source to destination.
    async fn execute(&self, order: &SettlementOrder) -> Result<bool, SettlementError>;

    /// Undoes a previously settled order.
    ///
    /// Called only when a settled transfer could not be recorded.
    async fn reverse(&self, order: &SettlementOrder) -> Result<(), SettlementError>;
}

// =============================================================================
// In-Memory Transfer Service
// =============================================================================

/// How [`InMemoryTransferService`] answers the next orders.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SettlementMode {
    /// Move funds in the backing gateway.
    #[default]
    Settle,
    /// Answer `Ok(false)`.
    Decline,
    /// Answer `Err(Unavailable)`.
    Fail,
}

/// Transfer service that moves balances inside an [`InMemoryGateway`].
#[derive(Debug)]
pub struct InMemoryTransferService {
    gateway: Arc<InMemoryGateway>,
    mode: Mutex<SettlementMode>,
    settled: Mutex<Vec<SettlementOrder>>,
}

impl InMemoryTransferService {
    pub fn new(gateway: Arc<InMemoryGateway>) -> Self {
        InMemoryTransferService {
            gateway,
            mode: Mutex::new(SettlementMode::default()),
            settled: Mutex::new(Vec::new()),
        }
    }

    pub fn set_mode(&self, mode: SettlementMode) {
        *self.mode.lock().unwrap_or_else(PoisonError::into_inner) = mode;
    }

    /// Orders settled and not reversed, oldest first.
    pub fn settled(&self) -> Vec<SettlementOrder> {
        self.settled
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn mode(&self) -> SettlementMode {
        *self.mode.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl TransferService for InMemoryTransferService {
    async fn execute(&self, order: &SettlementOrder) -> Result<bool, SettlementError> {
        match self.mode() {
            SettlementMode::Decline => {
                debug!(trace_id = %order.trace_id, "Settlement declined");
                Ok(false)
            }
            SettlementMode::Fail => Err(SettlementError::Unavailable(
                "simulated outage".to_string(),
            )),
            SettlementMode::Settle => {
                let moved = self
                    .gateway
                    .move_funds(order.source, order.destination, order.amount)
                    .await
                    .map_err(|e| SettlementError::Failed(e.to_string()))?;
                if moved {
                    self.settled
                        .lock()
                        .unwrap_or_else(PoisonError::into_inner)
                        .push(order.clone());
                }
                Ok(moved)
            }
        }
    }

    async fn reverse(&self, order: &SettlementOrder) -> Result<(), SettlementError> {
        let moved = self
            .gateway
            .move_funds(order.destination, order.source, order.amount)
            .await
            .map_err(|e| SettlementError::Failed(e.to_string()))?;
        if !moved {
            warn!(trace_id = %order.trace_id, "Reversal found insufficient destination funds");
            return Err(SettlementError::Failed(
                "destination no longer holds the settled amount".to_string(),
            ));
        }

        self.settled
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .retain(|settled| settled.trace_id != order.trace_id);
        Ok(())
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
