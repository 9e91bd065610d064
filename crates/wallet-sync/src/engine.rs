//! Wallet engine facade
//!
//! Wires the effect handlers, channel manager, cache, coordinator and
//! switcher together and exposes the consumer surface: the published state,
//! the account-switched event, and the `refresh` and `switch_account`
//! commands.

use std::sync::Arc;

use tokio::sync::{broadcast, watch};
use tracing::{debug, info};
use url::Url;
use wallet_core::effects::{CacheStorage, Clock, JsonRpcTransport, PushTransport, SecureKeyStore};
use wallet_core::{AccountKey, AccountSwitched, ChainClient, PublishedState, WalletError, WalletResult};
use wallet_effects::{
    HttpJsonRpcTransport, JsonFileCacheStorage, MemoryCacheStorage, MemoryKeyStore, SystemClock,
    WebSocketPushTransport,
};

use crate::cache::CacheStore;
use crate::channel::{ChannelEvent, ChannelManager};
use crate::config::SyncConfig;
use crate::coordinator::{SyncCoordinator, SyncOutcome};
use crate::publisher::StatePublisher;
use crate::switcher::{SessionSwitcher, SwitchOutcome, SwitchState};
use crate::tasks::TaskRegistry;

/// The account state sync engine.
pub struct WalletEngine {
    config: SyncConfig,
    publisher: Arc<StatePublisher>,
    channel: ChannelManager,
    coordinator: SyncCoordinator,
    switcher: SessionSwitcher,
    tasks: TaskRegistry,
}

impl WalletEngine {
    pub fn builder() -> WalletEngineBuilder {
        WalletEngineBuilder::default()
    }

    /// Engine with production handlers for `config`.
    ///
    /// Chain queries go over HTTP, the push channel over a WebSocket when an
    /// endpoint is configured, and the cache to a JSON file when a path is
    /// configured.
    pub async fn from_config(config: SyncConfig) -> WalletResult<Self> {
        let mut builder = Self::builder().with_config(config.clone());
        if let Some(path) = &config.cache.path {
            builder = builder.with_storage(Arc::new(JsonFileCacheStorage::open(path.clone()).await?));
        }
        builder.build()
    }

    /// Open the push channel in the background and mirror its state into
    /// the published `channel_connected` flag.
    pub fn start(&self) {
        let mut events = self.channel.events();
        let publisher = self.publisher.clone();
        let channel = self.channel.clone();
        self.tasks.spawn_cancellable(async move {
            loop {
                match events.recv().await {
                    Ok(ChannelEvent::Connected) => publisher.set_channel_connected(true),
                    Ok(ChannelEvent::Disconnected) => publisher.set_channel_connected(false),
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        debug!(skipped, "Channel events lagged");
                        publisher.set_channel_connected(channel.is_connected());
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });

        let channel = self.channel.clone();
        self.tasks.spawn_cancellable(async move {
            channel.connect().await;
        });
        info!(
            rpc_nodes = self.config.network.rpc_nodes.len(),
            push = self.config.network.push_endpoint.is_some(),
            "Wallet engine started"
        );
    }

    /// Current published state.
    pub fn state(&self) -> PublishedState {
        self.publisher.snapshot()
    }

    /// Watch published state changes.
    pub fn subscribe(&self) -> watch::Receiver<PublishedState> {
        self.publisher.subscribe()
    }

    pub fn account_switched(&self) -> broadcast::Receiver<AccountSwitched> {
        self.publisher.account_switched()
    }

    pub async fn switch_account(&self, account: AccountKey) -> SwitchOutcome {
        self.switcher.switch_account(account).await
    }

    pub async fn refresh(&self, full: bool) -> WalletResult<SyncOutcome> {
        self.coordinator.refresh(full).await
    }

    pub fn switch_state(&self) -> SwitchState {
        self.switcher.state()
    }

    pub fn channel(&self) -> &ChannelManager {
        &self.channel
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// Stop session timers, release subscriptions and background tasks.
    pub fn shutdown(&self) {
        self.switcher.shutdown();
        self.tasks.shutdown();
    }
}

impl std::fmt::Debug for WalletEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WalletEngine")
            .field("channel", &self.channel)
            .field("switcher", &self.switcher)
            .finish_non_exhaustive()
    }
}

/// Builder for [`WalletEngine`]. Handlers not supplied are derived from the
/// configuration or fall back to in-memory defaults.
#[derive(Default)]
pub struct WalletEngineBuilder {
    config: SyncConfig,
    rpc: Option<Arc<dyn JsonRpcTransport>>,
    push: Option<Arc<dyn PushTransport>>,
    storage: Option<Arc<dyn CacheStorage>>,
    clock: Option<Arc<dyn Clock>>,
    keys: Option<Arc<dyn SecureKeyStore>>,
}

impl WalletEngineBuilder {
    pub fn with_config(mut self, config: SyncConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_rpc(mut self, rpc: Arc<dyn JsonRpcTransport>) -> Self {
        self.rpc = Some(rpc);
        self
    }

    pub fn with_push(mut self, push: Arc<dyn PushTransport>) -> Self {
        self.push = Some(push);
        self
    }

    pub fn with_storage(mut self, storage: Arc<dyn CacheStorage>) -> Self {
        self.storage = Some(storage);
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn with_key_store(mut self, keys: Arc<dyn SecureKeyStore>) -> Self {
        self.keys = Some(keys);
        self
    }

    pub fn build(self) -> WalletResult<WalletEngine> {
        let config = self.config;
        config.validate()?;

        let rpc = match self.rpc {
            Some(rpc) => rpc,
            None => {
                let nodes = config
                    .network
                    .rpc_nodes
                    .iter()
                    .map(|node| parse_url("rpc_nodes", node))
                    .collect::<WalletResult<Vec<_>>>()?;
                Arc::new(HttpJsonRpcTransport::new(nodes, config.network.request_timeout())?)
            }
        };
        let push = match (self.push, &config.network.push_endpoint) {
            (Some(push), _) => Some(push),
            (None, Some(endpoint)) => Some(Arc::new(WebSocketPushTransport::new(
                parse_url("push_endpoint", endpoint)?,
                config.network.connect_timeout(),
            )) as Arc<dyn PushTransport>),
            (None, None) => None,
        };
        let storage = self
            .storage
            .unwrap_or_else(|| Arc::new(MemoryCacheStorage::new()));
        let clock = self.clock.unwrap_or_else(|| Arc::new(SystemClock));
        let keys = self.keys.unwrap_or_else(|| Arc::new(MemoryKeyStore::new()));

        let channel = match push {
            Some(push) => ChannelManager::new(push, config.reconnect.clone()),
            None => ChannelManager::disabled(),
        };
        let publisher = Arc::new(StatePublisher::new());
        let cache = CacheStore::new(storage, clock.clone(), config.cache.clone());
        let coordinator = SyncCoordinator::new(
            ChainClient::new(rpc),
            channel.clone(),
            cache,
            clock,
            keys,
            publisher.clone(),
            config.refresh.clone(),
        );
        let switcher = SessionSwitcher::new(coordinator.clone(), config.refresh.switch_grace());

        Ok(WalletEngine {
            config,
            publisher,
            channel,
            coordinator,
            switcher,
            tasks: TaskRegistry::new(),
        })
    }
}

fn parse_url(field: &str, raw: &str) -> WalletResult<Url> {
    Url::parse(raw).map_err(|e| WalletError::config(format!("{field}: invalid URL {raw:?}: {e}")))
}
