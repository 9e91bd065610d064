//! Secure key store effect.
//!
//! The engine only asks whether a key exists for a role; it never reads key
//! material.

use async_trait::async_trait;

use crate::account::{AccountKey, KeyRole};

#[async_trait]
pub trait SecureKeyStore: Send + Sync {
    async fn has_key(&self, account: &AccountKey, role: KeyRole) -> bool;

    /// Roles with a stored key, in [`KeyRole::ALL`] order.
    async fn available_roles(&self, account: &AccountKey) -> Vec<KeyRole> {
        let mut roles = Vec::new();
        for role in KeyRole::ALL {
            if self.has_key(account, role).await {
                roles.push(role);
            }
        }
        roles
    }
}
