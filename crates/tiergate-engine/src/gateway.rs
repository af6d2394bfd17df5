//! # Account State Gateway
//!
//! Capability interface to the external state store (the "oracle").
//!
//! ## Contract
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    AccountStateGateway                                  │
//! │                                                                         │
//! │   is_active(id)  ──► Ok(true | false)   │  Err(LookupError)            │
//! │   balance(id)    ──► Ok(Amount)         │  Err(LookupError)            │
//! │   get(key)       ──► Ok(Value | Null)   │  Err(LookupError)            │
//! │   set(key, v)    ──► Ok(())             │  Err(LookupError)            │
//! │                                                                         │
//! │   A failed lookup is NEVER read as false or zero: the orchestrator     │
//! │   aborts with LookupFailure instead.                                   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Auxiliary Flags
//! `loyalty:<account>` and `referral:<account>` hold JSON booleans. A missing
//! key (null) means false; any other non-boolean value is malformed.

use async_trait::async_trait;
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::debug;

use tiergate_core::{AccountId, Amount};

// =============================================================================
// Lookup Error
// =============================================================================

/// Failure of a gateway operation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LookupError {
    /// The store could not be reached or refused the call.
    #[error("State store unavailable: {0}")]
    Unavailable(String),

    /// A value exists but has the wrong shape.
    #[error("Malformed value for '{key}': {reason}")]
    Malformed { key: String, reason: String },
}

// =============================================================================
// Gateway Trait
// =============================================================================

/// External key-value state source for activity flags, balances and
/// auxiliary configuration.
#[async_trait]
pub trait AccountStateGateway: Send + Sync {
    /// Whether `account` may take part in transfers.
    async fn is_active(&self, account: AccountId) -> Result<bool, LookupError>;

    /// Spendable balance of `account`.
    async fn balance(&self, account: AccountId) -> Result<Amount, LookupError>;

    /// Reads a raw value; `Value::Null` when the key is absent.
    async fn get(&self, key: &str) -> Result<Value, LookupError>;

    /// Writes a raw value.
    async fn set(&self, key: &str, value: Value) -> Result<(), LookupError>;
}

/// Key of the loyalty (VIP) flag of `account`.
pub fn loyalty_key(account: AccountId) -> String {
    format!("loyalty:{}", account)
}

/// Key of the referral flag of `account`.
pub fn referral_key(account: AccountId) -> String {
    format!("referral:{}", account)
}

/// Reads a boolean flag. Null is false; other non-booleans are malformed.
pub async fn read_flag<G>(gateway: &G, key: &str) -> Result<bool, LookupError>
where
    G: AccountStateGateway + ?Sized,
{
    match gateway.get(key).await? {
        Value::Null => Ok(false),
        Value::Bool(flag) => Ok(flag),
        other => Err(LookupError::Malformed {
            key: key.to_string(),
            reason: format!("expected a boolean, found {}", other),
        }),
    }
}

// =============================================================================
// In-Memory Gateway
// =============================================================================

#[derive(Debug, Default)]
struct GatewayState {
    active: HashSet<AccountId>,
    balances: HashMap<AccountId, Amount>,
    values: HashMap<String, Value>,
    offline: bool,
}

impl GatewayState {
    fn online(&self) -> Result<(), LookupError> {
        if self.offline {
            return Err(LookupError::Unavailable("gateway is offline".to_string()));
        }
        Ok(())
    }
}

/// Gateway backed by process memory.
///
/// Used by tests, the CLI and local development. Unknown accounts are
/// inactive with a zero balance.
#[derive(Debug, Default)]
pub struct InMemoryGateway {
    state: RwLock<GatewayState>,
}

impl InMemoryGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// Marks `account` active and sets its balance.
    pub async fn open_account(&self, account: AccountId, balance: Amount) {
        let mut state = self.state.write().await;
        state.active.insert(account);
        state.balances.insert(account, balance);
    }

    pub async fn activate(&self, account: AccountId) {
        self.state.write().await.active.insert(account);
    }

    pub async fn deactivate(&self, account: AccountId) {
        self.state.write().await.active.remove(&account);
    }

    pub async fn set_balance(&self, account: AccountId, balance: Amount) {
        self.state.write().await.balances.insert(account, balance);
    }

    /// Simulates an unreachable store: every trait call fails.
    pub async fn set_offline(&self, offline: bool) {
        self.state.write().await.offline = offline;
    }

    /// Moves `amount` from `from` to `to` under one lock.
    ///
    /// Returns `Ok(false)` without moving anything when `from` is short.
    pub async fn move_funds(
        &self,
        from: AccountId,
        to: AccountId,
        amount: Amount,
    ) -> Result<bool, LookupError> {
        let mut state = self.state.write().await;
        state.online()?;

        let available = state.balances.get(&from).copied().unwrap_or_default();
        if available < amount {
            return Ok(false);
        }
        let credited = state
            .balances
            .get(&to)
            .copied()
            .unwrap_or_default()
            .checked_add(amount)
            .map_err(|e| LookupError::Malformed {
                key: format!("balance:{}", to),
                reason: e.to_string(),
            })?;

        state.balances.insert(from, available.saturating_sub(amount));
        state.balances.insert(to, credited);
        debug!(from = %from, to = %to, amount = %amount, "Funds moved");
        Ok(true)
    }
}

#[async_trait]
impl AccountStateGateway for InMemoryGateway {
    async fn is_active(&self, account: AccountId) -> Result<bool, LookupError> {
        let state = self.state.read().await;
        state.online()?;
        Ok(state.active.contains(&account))
    }

    async fn balance(&self, account: AccountId) -> Result<Amount, LookupError> {
        let state = self.state.read().await;
        state.online()?;
        Ok(state.balances.get(&account).copied().unwrap_or_default())
    }

    async fn get(&self, key: &str) -> Result<Value, LookupError> {
        let state = self.state.read().await;
        state.online()?;
        Ok(state.values.get(key).cloned().unwrap_or(Value::Null))
    }

    async fn set(&self, key: &str, value: Value) -> Result<(), LookupError> {
        let mut state = self.state.write().await;
        state.online()?;
        state.values.insert(key.to_string(), value);
        Ok(())
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_unknown_account_defaults() {
        let gateway = InMemoryGateway::new();
        let account = AccountId::from_u128(1);
        assert!(!gateway.is_active(account).await.unwrap());
        assert_eq!(gateway.balance(account).await.unwrap(), Amount::zero());
    }

    #[tokio::test]
    async fn test_offline_is_an_error_not_false() {
        let gateway = InMemoryGateway::new();
        let account = AccountId::from_u128(1);
        gateway.open_account(account, Amount::from_units(10)).await;
        gateway.set_offline(true).await;

        assert!(matches!(
            gateway.is_active(account).await,
            Err(LookupError::Unavailable(_))
        ));
        assert!(gateway.balance(account).await.is_err());
    }

    #[tokio::test]
    async fn test_read_flag() {
        let gateway = InMemoryGateway::new();
        let account = AccountId::from_u128(1);

        assert!(!read_flag(&gateway, &loyalty_key(account)).await.unwrap());

        gateway.set(&loyalty_key(account), json!(true)).await.unwrap();
        assert!(read_flag(&gateway, &loyalty_key(account)).await.unwrap());

        gateway.set(&referral_key(account), json!("yes")).await.unwrap();
        assert!(matches!(
            read_flag(&gateway, &referral_key(account)).await,
            Err(LookupError::Malformed { .. })
        ));
    }

    #[tokio::test]
    async fn test_move_funds() {
        let gateway = InMemoryGateway::new();
        let (a, b) = (AccountId::from_u128(1), AccountId::from_u128(2));
        gateway.set_balance(a, Amount::from_units(100)).await;

        assert!(gateway.move_funds(a, b, Amount::from_units(60)).await.unwrap());
        assert!(!gateway.move_funds(a, b, Amount::from_units(60)).await.unwrap());
        assert_eq!(gateway.balance(a).await.unwrap(), Amount::from_units(40));
        assert_eq!(gateway.balance(b).await.unwrap(), Amount::from_units(60));
    }
}
