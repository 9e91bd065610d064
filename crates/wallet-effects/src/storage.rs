//! Cache persistence handlers.
//!
//! [`MemoryCacheStorage`] keeps values for the lifetime of the process.
//! [`JsonFileCacheStorage`] keeps the same map in memory and rewrites the
//! whole file as pretty JSON after every mutation, so the file on disk is
//! always a complete snapshot of the cache.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info};
use wallet_core::effects::CacheStorage;
use wallet_core::{WalletError, WalletResult};

/// In-memory cache storage
#[derive(Debug, Clone, Default)]
pub struct MemoryCacheStorage {
    data: Arc<RwLock<HashMap<String, Value>>>,
}

impl MemoryCacheStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored keys.
    pub async fn len(&self) -> usize {
        self.data.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.data.read().await.is_empty()
    }
}

#[async_trait]
impl CacheStorage for MemoryCacheStorage {
    async fn get(&self, key: &str) -> WalletResult<Option<Value>> {
        Ok(self.data.read().await.get(key).cloned())
    }

    async fn set(&self, key: &str, value: Value) -> WalletResult<()> {
        self.data.write().await.insert(key.to_string(), value);
        Ok(())
    }

    async fn remove(&self, key: &str) -> WalletResult<()> {
        self.data.write().await.remove(key);
        Ok(())
    }
}

/// File-backed cache storage.
#[derive(Debug)]
pub struct JsonFileCacheStorage {
    path: PathBuf,
    data: Mutex<BTreeMap<String, Value>>,
}

impl JsonFileCacheStorage {
    /// Open the store at `path`, loading existing contents if the file exists.
    ///
    /// A missing file starts an empty store. An unreadable or malformed file
    /// is a storage error.
    pub async fn open(path: impl Into<PathBuf>) -> WalletResult<Self> {
        let path = path.into();
        let data = match tokio::fs::read(&path).await {
            Ok(bytes) => serde_json::from_slice(&bytes).map_err(|e| {
                WalletError::storage(format!("failed to parse {}: {e}", path.display()))
            })?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => {
                return Err(WalletError::storage(format!(
                    "failed to read {}: {e}",
                    path.display()
                )))
            }
        };
        info!(path = %path.display(), entries = data.len(), "Opened cache file");
        Ok(Self {
            path,
            data: Mutex::new(data),
        })
    }

    /// Location of the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Remove every entry.
    pub async fn clear(&self) -> WalletResult<()> {
        let mut data = self.data.lock().await;
        data.clear();
        self.persist(&data).await
    }

    async fn persist(&self, data: &BTreeMap<String, Value>) -> WalletResult<()> {
        let json = serde_json::to_vec_pretty(data)
            .map_err(|e| WalletError::storage(format!("failed to serialize cache: {e}")))?;
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await.map_err(|e| {
                WalletError::storage(format!("failed to create {}: {e}", parent.display()))
            })?;
        }
        tokio::fs::write(&self.path, json).await.map_err(|e| {
            WalletError::storage(format!("failed to write {}: {e}", self.path.display()))
        })?;
        debug!(path = %self.path.display(), entries = data.len(), "Persisted cache file");
        Ok(())
    }
}

#[async_trait]
impl CacheStorage for JsonFileCacheStorage {
    async fn get(&self, key: &str) -> WalletResult<Option<Value>> {
        Ok(self.data.lock().await.get(key).cloned())
    }

    async fn set(&self, key: &str, value: Value) -> WalletResult<()> {
        let mut data = self.data.lock().await;
        data.insert(key.to_string(), value);
        self.persist(&data).await
    }

    async fn remove(&self, key: &str) -> WalletResult<()> {
        let mut data = self.data.lock().await;
        if data.remove(key).is_none() {
            return Ok(());
        }
        self.persist(&data).await
    }
}
