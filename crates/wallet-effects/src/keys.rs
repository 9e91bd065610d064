//! In-memory key-role registry.
//!
//! Records which authority roles have a key for an account. Key material is
//! held by the platform's secure store; this registry only mirrors presence.

use std::collections::{BTreeSet, HashMap};

use async_trait::async_trait;
use parking_lot::RwLock;
use wallet_core::effects::SecureKeyStore;
use wallet_core::{AccountKey, KeyRole};

#[derive(Debug, Default)]
pub struct MemoryKeyStore {
    roles: RwLock<HashMap<AccountKey, BTreeSet<KeyRole>>>,
}

impl MemoryKeyStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark a role as available for an account.
    pub fn insert(&self, account: AccountKey, role: KeyRole) {
        self.roles.write().entry(account).or_default().insert(role);
    }

    /// Forget every role for an account.
    pub fn remove_account(&self, account: &AccountKey) {
        self.roles.write().remove(account);
    }
}

#[async_trait]
impl SecureKeyStore for MemoryKeyStore {
    async fn has_key(&self, account: &AccountKey, role: KeyRole) -> bool {
        self.roles
            .read()
            .get(account)
            .is_some_and(|roles| roles.contains(&role))
    }
}
