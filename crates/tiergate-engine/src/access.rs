//! Owner and admin roster.
//!
//! The owner is fixed at construction and is implicitly an admin. Only the
//! owner may change the roster.

use std::collections::HashSet;

use crate::error::{TransferError, TransferResult};
use tiergate_core::AccountId;

#[derive(Debug, Clone)]
pub struct AccessControl {
    owner: AccountId,
    admins: HashSet<AccountId>,
}

impl AccessControl {
    pub fn new(owner: AccountId) -> Self {
        AccessControl {
            owner,
            admins: HashSet::new(),
        }
    }

    pub fn owner(&self) -> AccountId {
        self.owner
    }

    pub fn is_owner(&self, caller: AccountId) -> bool {
        caller == self.owner
    }

    pub fn is_admin(&self, caller: AccountId) -> bool {
        self.is_owner(caller) || self.admins.contains(&caller)
    }

    pub fn require_owner(&self, caller: AccountId) -> TransferResult<()> {
        if self.is_owner(caller) {
            Ok(())
        } else {
            Err(TransferError::Unauthorized { caller })
        }
    }

    pub fn require_admin(&self, caller: AccountId) -> TransferResult<()> {
        if self.is_admin(caller) {
            Ok(())
        } else {
            Err(TransferError::Unauthorized { caller })
        }
    }

    /// Returns false when `account` already was an admin.
    pub fn grant(&mut self, account: AccountId) -> bool {
        account != self.owner && self.admins.insert(account)
    }

    /// Returns false when `account` was not an admin. The owner cannot be
    /// revoked.
    pub fn revoke(&mut self, account: AccountId) -> bool {
        self.admins.remove(&account)
    }

    /// Explicit admins, sorted. The owner is not listed.
    pub fn admins(&self) -> Vec<AccountId> {
        let mut admins: Vec<AccountId> = self.admins.iter().copied().collect();
        admins.sort();
        admins
    }
}
