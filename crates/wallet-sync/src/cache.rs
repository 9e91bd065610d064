//! Stale-while-revalidate cache
//!
//! Entries are stored under `"{account}/{kind}"` together with the time they
//! were written. Reads return stale data too, flagged as not fresh, so the
//! caller can paint immediately and refresh in the background. Writes never
//! fail from the caller's point of view: persistence errors are logged and
//! dropped.

use std::sync::Arc;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};
use wallet_core::effects::{CacheStorage, Clock};
use wallet_core::AccountKey;

use crate::config::CacheConfig;

/// Kinds of cached data, each with its own TTL.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CacheKind {
    WalletView,
    ResourceMeters,
    Delegations,
    Price,
}

impl CacheKind {
    pub const ALL: [CacheKind; 4] = [
        Self::WalletView,
        Self::ResourceMeters,
        Self::Delegations,
        Self::Price,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::WalletView => "wallet-view",
            Self::ResourceMeters => "resource-meters",
            Self::Delegations => "delegations",
            Self::Price => "price",
        }
    }

    fn ttl(self, config: &CacheConfig) -> Duration {
        let secs = match self {
            Self::WalletView => config.wallet_view_ttl_secs,
            Self::ResourceMeters => config.resource_meters_ttl_secs,
            Self::Delegations => config.delegations_ttl_secs,
            Self::Price => config.price_ttl_secs,
        };
        Duration::from_secs(secs)
    }
}

/// Persisted form of one entry.
#[derive(Debug, Serialize, Deserialize)]
struct CacheEntry {
    written_at_ms: u64,
    value: Value,
}

/// A cache hit.
#[derive(Clone, Debug, PartialEq)]
pub struct Cached<T> {
    pub value: T,
    /// False once the entry is older than its kind's TTL
    pub fresh: bool,
}

/// Storage key for an account's entry of one kind.
///
/// Account names never contain `/`, so keys of different accounts cannot
/// collide.
pub fn storage_key(account: &AccountKey, kind: CacheKind) -> String {
    format!("{}/{}", account.as_str(), kind.as_str())
}

/// TTL-aware cache over a [`CacheStorage`] handler.
#[derive(Clone)]
pub struct CacheStore {
    storage: Arc<dyn CacheStorage>,
    clock: Arc<dyn Clock>,
    config: CacheConfig,
}

impl CacheStore {
    pub fn new(storage: Arc<dyn CacheStorage>, clock: Arc<dyn Clock>, config: CacheConfig) -> Self {
        Self {
            storage,
            clock,
            config,
        }
    }

    /// Read an entry. Absent, unreadable and undecodable entries are `None`.
    pub async fn read<T: DeserializeOwned>(
        &self,
        account: &AccountKey,
        kind: CacheKind,
    ) -> Option<Cached<T>> {
        let key = storage_key(account, kind);
        let raw = match self.storage.get(&key).await {
            Ok(Some(raw)) => raw,
            Ok(None) => return None,
            Err(e) => {
                warn!(key = %key, error = %e, "Cache read failed");
                return None;
            }
        };
        let entry: CacheEntry = match serde_json::from_value(raw) {
            Ok(entry) => entry,
            Err(e) => {
                warn!(key = %key, error = %e, "Discarding malformed cache entry");
                return None;
            }
        };
        let value = match serde_json::from_value(entry.value) {
            Ok(value) => value,
            Err(e) => {
                warn!(key = %key, error = %e, "Discarding cache entry with unexpected shape");
                return None;
            }
        };
        let age_ms = self.clock.now_ms().saturating_sub(entry.written_at_ms);
        let fresh = u128::from(age_ms) < kind.ttl(&self.config).as_millis();
        debug!(key = %key, age_ms, fresh, "Cache hit");
        Some(Cached { value, fresh })
    }

    /// Upsert an entry stamped with the current time. Failures are logged only.
    pub async fn write<T: Serialize + ?Sized>(&self, account: &AccountKey, kind: CacheKind, value: &T) {
        let key = storage_key(account, kind);
        let value = match serde_json::to_value(value) {
            Ok(value) => value,
            Err(e) => {
                warn!(key = %key, error = %e, "Cache value not serializable");
                return;
            }
        };
        let entry = CacheEntry {
            written_at_ms: self.clock.now_ms(),
            value,
        };
        let entry = match serde_json::to_value(&entry) {
            Ok(entry) => entry,
            Err(e) => {
                warn!(key = %key, error = %e, "Cache entry not serializable");
                return;
            }
        };
        if let Err(e) = self.storage.set(&key, entry).await {
            warn!(key = %key, error = %e, "Cache write failed");
        }
    }

    /// Drop every entry held for `account`. Failures are logged only.
    pub async fn forget(&self, account: &AccountKey) {
        for kind in CacheKind::ALL {
            self.invalidate(account, kind).await;
        }
        debug!(account = %account, "Cache entries dropped");
    }

    /// Drop an entry. Failures are logged only.
    pub async fn invalidate(&self, account: &AccountKey, kind: CacheKind) {
        let key = storage_key(account, kind);
        if let Err(e) = self.storage.remove(&key).await {
            warn!(key = %key, error = %e, "Cache invalidate failed");
        }
    }
}

impl std::fmt::Debug for CacheStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheStore")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use wallet_core::{WalletError, WalletResult};
    use wallet_effects::MemoryCacheStorage;
    use wallet_testkit::ManualClock;

    fn store(clock: Arc<ManualClock>) -> (CacheStore, MemoryCacheStorage) {
        let storage = MemoryCacheStorage::new();
        let store = CacheStore::new(Arc::new(storage.clone()), clock, CacheConfig::default());
        (store, storage)
    }

    fn key(name: &str) -> AccountKey {
        AccountKey::parse(name).unwrap()
    }

    #[tokio::test]
    async fn reads_are_isolated_per_account() {
        let (store, _) = store(Arc::new(ManualClock::new(1_000)));
        store.write(&key("bob"), CacheKind::WalletView, &"bob-view").await;

        assert!(store.read::<String>(&key("alice"), CacheKind::WalletView).await.is_none());
        let bob = store.read::<String>(&key("bob"), CacheKind::WalletView).await.unwrap();
        assert_eq!(bob.value, "bob-view");
        assert!(bob.fresh);
    }

    #[tokio::test]
    async fn stale_entries_are_still_returned() {
        let clock = Arc::new(ManualClock::new(1_000));
        let (store, _) = store(clock.clone());
        store.write(&key("alice"), CacheKind::WalletView, &42u32).await;
        store.write(&key("alice"), CacheKind::Delegations, &7u32).await;

        clock.advance(Duration::from_secs(31));
        let view = store.read::<u32>(&key("alice"), CacheKind::WalletView).await.unwrap();
        assert_eq!(view, Cached { value: 42, fresh: false });
        // delegations live for five minutes
        let delegations = store.read::<u32>(&key("alice"), CacheKind::Delegations).await.unwrap();
        assert!(delegations.fresh);
    }

    #[tokio::test]
    async fn forget_drops_only_that_account() {
        let (store, _) = store(Arc::new(ManualClock::new(0)));
        for kind in CacheKind::ALL {
            store.write(&key("alice"), kind, &1u8).await;
            store.write(&key("bob"), kind, &2u8).await;
        }
        store.forget(&key("alice")).await;
        for kind in CacheKind::ALL {
            assert!(store.read::<u8>(&key("alice"), kind).await.is_none(), "{kind:?}");
            assert_eq!(store.read::<u8>(&key("bob"), kind).await.unwrap().value, 2);
        }
    }

    #[tokio::test]
    async fn malformed_entries_read_as_absent() {
        let (store, storage) = store(Arc::new(ManualClock::new(0)));
        storage
            .set("alice/price", serde_json::json!("garbage"))
            .await
            .unwrap();
        assert!(store.read::<u32>(&key("alice"), CacheKind::Price).await.is_none());

        store.write(&key("alice"), CacheKind::Price, &"text").await;
        assert!(store.read::<u32>(&key("alice"), CacheKind::Price).await.is_none());
    }

    struct FailingStorage;

    #[async_trait]
    impl CacheStorage for FailingStorage {
        async fn get(&self, _key: &str) -> WalletResult<Option<Value>> {
            Err(WalletError::storage("disk gone"))
        }
        async fn set(&self, _key: &str, _value: Value) -> WalletResult<()> {
            Err(WalletError::storage("disk gone"))
        }
        async fn remove(&self, _key: &str) -> WalletResult<()> {
            Err(WalletError::storage("disk gone"))
        }
    }

    #[tokio::test]
    async fn storage_failures_are_absorbed() {
        let store = CacheStore::new(
            Arc::new(FailingStorage),
            Arc::new(ManualClock::new(0)),
            CacheConfig::default(),
        );
        store.write(&key("alice"), CacheKind::WalletView, &1u8).await;
        store.invalidate(&key("alice"), CacheKind::WalletView).await;
        assert!(store.read::<u8>(&key("alice"), CacheKind::WalletView).await.is_none());
    }

    #[test]
    fn keys_are_namespaced() {
        assert_eq!(storage_key(&key("alice"), CacheKind::Delegations), "alice/delegations");
    }
}
