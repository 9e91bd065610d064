//! Cache persistence effect.
//!
//! # Effect Classification
//!
//! - **Category**: Infrastructure Effect
//! - **Implementation**: `wallet-effects` (`MemoryCacheStorage`, `JsonFileCacheStorage`)
//! - **Usage**: `CacheStore`, which owns key namespacing and TTL checks

use async_trait::async_trait;
use serde_json::Value;

use crate::errors::WalletResult;

/// Flat JSON key/value store. Keys are opaque to the handler.
#[async_trait]
pub trait CacheStorage: Send + Sync {
    async fn get(&self, key: &str) -> WalletResult<Option<Value>>;
    async fn set(&self, key: &str, value: Value) -> WalletResult<()>;
    async fn remove(&self, key: &str) -> WalletResult<()>;
}
