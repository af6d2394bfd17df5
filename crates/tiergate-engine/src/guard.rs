//! # Reentrancy Guard
//!
//! Marks accounts and trace ids as in flight for the lifetime of one
//! operation.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  enter([sender, source, destination, trace])                           │
//! │     ├── any key already held ──► Err(key)   (rejected, never queued)   │
//! │     └── all free ──► GuardToken                                        │
//! │                         │                                               │
//! │                         └── dropped (success, error, panic)            │
//! │                             ──► keys released                          │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The lock is a std mutex held only while the set is updated, never across
//! an `.await`.

use std::collections::HashSet;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

use tiergate_core::{AccountId, TraceId};

/// A resource an operation holds exclusively.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GuardKey {
    Account(AccountId),
    Trace(TraceId),
}

impl fmt::Display for GuardKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GuardKey::Account(id) => write!(f, "account {}", id),
            GuardKey::Trace(id) => write!(f, "trace {}", id),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ReentrancyGuard {
    in_flight: Arc<Mutex<HashSet<GuardKey>>>,
}

impl ReentrancyGuard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claims every key or none of them.
    ///
    /// Duplicate keys in `keys` are claimed once.
    pub fn enter<I>(&self, keys: I) -> Result<GuardToken, GuardKey>
    where
        I: IntoIterator<Item = GuardKey>,
    {
        let mut wanted: Vec<GuardKey> = Vec::new();
        for key in keys {
            if !wanted.contains(&key) {
                wanted.push(key);
            }
        }

        let mut in_flight = self.in_flight.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(busy) = wanted.iter().find(|k| in_flight.contains(k)) {
            return Err(*busy);
        }
        in_flight.extend(wanted.iter().copied());

        Ok(GuardToken {
            keys: wanted,
            in_flight: Arc::clone(&self.in_flight),
        })
    }

    pub fn is_held(&self, key: GuardKey) -> bool {
        self.in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(&key)
    }

    /// Number of keys currently held.
    pub fn held(&self) -> usize {
        self.in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

/// Proof of a successful [`ReentrancyGuard::enter`]. Releases on drop.
#[derive(Debug)]
pub struct GuardToken {
    keys: Vec<GuardKey>,
    in_flight: Arc<Mutex<HashSet<GuardKey>>>,
}

impl Drop for GuardToken {
    fn drop(&mut self) {
        let mut in_flight = self.in_flight.lock().unwrap_or_else(PoisonError::into_inner);
        for key in &self.keys {
            in_flight.remove(key);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn account(n: u128) -> GuardKey {
        GuardKey::Account(AccountId::from_u128(n))
    }

    #[test]
    fn test_overlap_rejected_until_release() {
        let guard = ReentrancyGuard::new();
        let token = guard.enter([account(1), account(2)]).unwrap();

        assert_eq!(guard.enter([account(3), account(2)]).unwrap_err(), account(2));
        // The failed attempt claimed nothing
        assert!(!guard.is_held(account(3)));

        drop(token);
        assert_eq!(guard.held(), 0);
        assert!(guard.enter([account(3), account(2)]).is_ok());
    }

    #[test]
    fn test_disjoint_operations_coexist() {
        let guard = ReentrancyGuard::new();
        let _a = guard.enter([account(1)]).unwrap();
        let _b = guard.enter([account(2), GuardKey::Trace(TraceId::from_u128(1))]).unwrap();
        assert_eq!(guard.held(), 3);
    }

    #[test]
    fn test_duplicate_keys_in_one_call() {
        let guard = ReentrancyGuard::new();
        let token = guard.enter([account(1), account(1)]).unwrap();
        assert_eq!(guard.held(), 1);
        drop(token);
        assert_eq!(guard.held(), 0);
    }
}
