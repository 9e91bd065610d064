//! Shared push channel
//!
//! One [`ChannelManager`] owns the process-wide push connection. Consumers
//! subscribe to `(topic, account)` keys; duplicate keys are reference
//! counted so the server sees one subscribe per key and one unsubscribe when
//! the last handle goes away.
//!
//! The subscription table outlives connections. When the connection drops,
//! every key stays registered, a disconnect event is broadcast and a
//! reconnect is scheduled with capped exponential backoff. A successful
//! reconnect replays a subscribe frame for every registered key.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::{broadcast, mpsc, oneshot};
use tracing::{debug, info, warn};
use wallet_core::effects::PushTransport;
use wallet_core::{AccountKey, ControlFrame, PushEnvelope, SubscriptionKey, Topic, WalletError, WalletResult};

use crate::config::ReconnectConfig;

const EVENT_CAPACITY: usize = 32;

/// Callback invoked for every envelope routed to a subscription.
pub type MessageHandler = Arc<dyn Fn(&PushEnvelope) + Send + Sync>;

/// Connection lifecycle events.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChannelEvent {
    Connected,
    Disconnected,
}

struct Listener {
    id: u64,
    handler: MessageHandler,
}

#[derive(Default)]
struct Subscription {
    listeners: Vec<Listener>,
}

struct Inner {
    transport: Option<Arc<dyn PushTransport>>,
    reconnect: ReconnectConfig,
    subscriptions: Mutex<BTreeMap<SubscriptionKey, Subscription>>,
    outbound: Mutex<Option<mpsc::UnboundedSender<ControlFrame>>>,
    connected: AtomicBool,
    connect_lock: tokio::sync::Mutex<()>,
    reconnect_scheduled: AtomicBool,
    failed_attempts: AtomicU32,
    next_listener: AtomicU64,
    events: broadcast::Sender<ChannelEvent>,
}

/// Handle to the shared push channel. Cheap to clone.
#[derive(Clone)]
pub struct ChannelManager {
    inner: Arc<Inner>,
}

impl ChannelManager {
    /// Manager over a push transport.
    pub fn new(transport: Arc<dyn PushTransport>, reconnect: ReconnectConfig) -> Self {
        Self::build(Some(transport), reconnect)
    }

    /// Manager with no push endpoint; it never connects and every consumer
    /// stays on the pull path.
    pub fn disabled() -> Self {
        Self::build(None, ReconnectConfig::default())
    }

    fn build(transport: Option<Arc<dyn PushTransport>>, reconnect: ReconnectConfig) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            inner: Arc::new(Inner {
                transport,
                reconnect,
                subscriptions: Mutex::new(BTreeMap::new()),
                outbound: Mutex::new(None),
                connected: AtomicBool::new(false),
                connect_lock: tokio::sync::Mutex::new(()),
                reconnect_scheduled: AtomicBool::new(false),
                failed_attempts: AtomicU32::new(0),
                next_listener: AtomicU64::new(1),
                events,
            }),
        }
    }

    /// Open the connection if it is not already open.
    ///
    /// Safe to call redundantly; concurrent callers are serialized and all
    /// but the first see the existing connection. On failure a reconnect is
    /// scheduled and `false` is returned.
    pub async fn connect(&self) -> bool {
        Inner::connect(&self.inner).await
    }

    pub fn is_connected(&self) -> bool {
        self.inner.connected.load(Ordering::SeqCst)
    }

    /// Lifecycle events from now on.
    pub fn events(&self) -> broadcast::Receiver<ChannelEvent> {
        self.inner.events.subscribe()
    }

    /// Register `handler` for `(topic, account)`.
    ///
    /// The first handle for a key sends a subscribe frame if connected (or on
    /// the next connect otherwise). The subscription lasts until the returned
    /// handle is released or dropped.
    pub fn subscribe<F>(&self, topic: Topic, account: Option<AccountKey>, handler: F) -> SubscriptionHandle
    where
        F: Fn(&PushEnvelope) + Send + Sync + 'static,
    {
        self.subscribe_inner(SubscriptionKey::new(topic, account), Arc::new(handler), false)
    }

    fn subscribe_inner(
        &self,
        key: SubscriptionKey,
        handler: MessageHandler,
        always_send: bool,
    ) -> SubscriptionHandle {
        let id = self.inner.next_listener.fetch_add(1, Ordering::Relaxed);
        {
            let mut subscriptions = self.inner.subscriptions.lock();
            let entry = subscriptions.entry(key.clone()).or_default();
            entry.listeners.push(Listener { id, handler });
            let first = entry.listeners.len() == 1;
            if first || always_send {
                self.inner.send_frame(ControlFrame::subscribe(&key));
            }
            debug!(key = %key, refs = entry.listeners.len(), "Subscribed");
        }
        SubscriptionHandle {
            key,
            id,
            manager: Arc::downgrade(&self.inner),
            released: false,
        }
    }

    /// Wait for the next message on `(topic, account)`.
    ///
    /// A subscribe frame is always sent so the server pushes its current
    /// value even when the key is already subscribed. The temporary
    /// subscription is released before returning.
    pub async fn request(
        &self,
        topic: Topic,
        account: Option<AccountKey>,
        timeout: Duration,
    ) -> WalletResult<PushEnvelope> {
        if !self.is_connected() {
            return Err(WalletError::channel_unavailable("not connected"));
        }
        let (tx, rx) = oneshot::channel();
        let tx = Mutex::new(Some(tx));
        let handle = self.subscribe_inner(
            SubscriptionKey::new(topic, account),
            Arc::new(move |envelope: &PushEnvelope| {
                if let Some(tx) = tx.lock().take() {
                    let _ = tx.send(envelope.clone());
                }
            }),
            true,
        );
        let result = tokio::time::timeout(timeout, rx).await;
        handle.unsubscribe();
        match result {
            Ok(Ok(envelope)) => Ok(envelope),
            Ok(Err(_)) => Err(WalletError::channel_unavailable("request abandoned")),
            Err(_) => Err(WalletError::channel_unavailable(format!(
                "no {topic} message within {}ms",
                timeout.as_millis()
            ))),
        }
    }

    /// Number of live handles for a key.
    pub fn ref_count(&self, key: &SubscriptionKey) -> usize {
        self.inner
            .subscriptions
            .lock()
            .get(key)
            .map_or(0, |s| s.listeners.len())
    }

    /// Keys with at least one live handle.
    pub fn active_keys(&self) -> Vec<SubscriptionKey> {
        self.inner.subscriptions.lock().keys().cloned().collect()
    }
}

impl fmt::Debug for ChannelManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChannelManager")
            .field("enabled", &self.inner.transport.is_some())
            .field("connected", &self.is_connected())
            .finish_non_exhaustive()
    }
}

impl Inner {
    async fn connect(inner: &Arc<Inner>) -> bool {
        let Some(transport) = inner.transport.clone() else {
            return false;
        };
        let _guard = inner.connect_lock.lock().await;
        if inner.connected.load(Ordering::SeqCst) {
            return true;
        }

        match transport.open().await {
            Ok(link) => {
                {
                    // Replay under the table lock so a concurrent subscribe
                    // either lands in the replay or sees the new sender.
                    let subscriptions = inner.subscriptions.lock();
                    for key in subscriptions.keys() {
                        let _ = link.outbound.send(ControlFrame::subscribe(key));
                    }
                    *inner.outbound.lock() = Some(link.outbound);
                    inner.connected.store(true, Ordering::SeqCst);
                    info!(resubscribed = subscriptions.len(), "Push channel connected");
                }
                inner.failed_attempts.store(0, Ordering::SeqCst);
                tokio::spawn(read_loop(Arc::downgrade(inner), link.inbound));
                let _ = inner.events.send(ChannelEvent::Connected);
                true
            }
            Err(e) => {
                warn!(error = %e, "Push channel connect failed, staying on pull");
                inner.schedule_reconnect();
                false
            }
        }
    }

    fn send_frame(&self, frame: ControlFrame) {
        if let Some(outbound) = self.outbound.lock().as_ref() {
            if outbound.send(frame).is_err() {
                debug!("Push link closed before frame could be sent");
            }
        }
    }

    fn dispatch(&self, envelope: &PushEnvelope) {
        let key = envelope.key();
        let handlers: Vec<MessageHandler> = match self.subscriptions.lock().get(&key) {
            Some(subscription) => subscription
                .listeners
                .iter()
                .map(|l| l.handler.clone())
                .collect(),
            None => {
                debug!(key = %key, "Dropping push message with no subscriber");
                return;
            }
        };
        for handler in handlers {
            handler(envelope);
        }
    }

    fn handle_disconnect(self: &Arc<Self>) {
        self.outbound.lock().take();
        if self.connected.swap(false, Ordering::SeqCst) {
            warn!(
                subscriptions = self.subscriptions.lock().len(),
                "Push channel disconnected"
            );
            let _ = self.events.send(ChannelEvent::Disconnected);
        }
        self.schedule_reconnect();
    }

    fn schedule_reconnect(self: &Arc<Self>) {
        if self.reconnect_scheduled.swap(true, Ordering::SeqCst) {
            return;
        }
        let attempt = self.failed_attempts.fetch_add(1, Ordering::SeqCst) + 1;
        let delay = self.reconnect.backoff(attempt);
        debug!(attempt, delay_ms = delay.as_millis() as u64, "Scheduling push reconnect");

        let weak = Arc::downgrade(self);
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let Some(inner) = weak.upgrade() else {
                return;
            };
            inner.reconnect_scheduled.store(false, Ordering::SeqCst);
            Box::pin(Inner::connect(&inner)).await;
        });
    }

    fn release(&self, key: &SubscriptionKey, id: u64) {
        let mut subscriptions = self.subscriptions.lock();
        let Some(subscription) = subscriptions.get_mut(key) else {
            return;
        };
        subscription.listeners.retain(|l| l.id != id);
        let remaining = subscription.listeners.len();
        if remaining == 0 {
            subscriptions.remove(key);
            self.send_frame(ControlFrame::unsubscribe(key));
        }
        debug!(key = %key, refs = remaining, "Unsubscribed");
    }
}

async fn read_loop(inner: Weak<Inner>, mut inbound: mpsc::UnboundedReceiver<PushEnvelope>) {
    while let Some(envelope) = inbound.recv().await {
        let Some(inner) = inner.upgrade() else {
            return;
        };
        inner.dispatch(&envelope);
    }
    if let Some(inner) = inner.upgrade() {
        inner.handle_disconnect();
    }
}

/// One consumer's interest in a key. Releasing the last handle for a key
/// unsubscribes it on the server.
pub struct SubscriptionHandle {
    key: SubscriptionKey,
    id: u64,
    manager: Weak<Inner>,
    released: bool,
}

impl SubscriptionHandle {
    pub fn topic(&self) -> Topic {
        self.key.topic
    }

    pub fn account(&self) -> Option<&AccountKey> {
        self.key.account.as_ref()
    }

    pub fn key(&self) -> &SubscriptionKey {
        &self.key
    }

    /// Release now instead of on drop.
    pub fn unsubscribe(mut self) {
        self.release();
    }

    fn release(&mut self) {
        if self.released {
            return;
        }
        self.released = true;
        if let Some(inner) = self.manager.upgrade() {
            inner.release(&self.key, self.id);
        }
    }
}

impl Drop for SubscriptionHandle {
    fn drop(&mut self) {
        self.release();
    }
}

impl fmt::Debug for SubscriptionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubscriptionHandle")
            .field("key", &self.key)
            .field("id", &self.id)
            .finish()
    }
}
