//! Scripted push server
//!
//! Each `open` returns a fresh link. Control frames the client sends are
//! recorded, and a subscribe to a topic with a scripted response is answered
//! immediately with that payload, the way the real server replays the
//! current value on subscribe.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::mpsc;
use wallet_core::effects::{PushLink, PushTransport};
use wallet_core::{AccountKey, ControlFrame, PushEnvelope, Topic, WalletError, WalletResult};

struct PushState {
    available: bool,
    opens: usize,
    frames: Vec<ControlFrame>,
    inbound: Option<mpsc::UnboundedSender<PushEnvelope>>,
    responses: HashMap<Topic, Value>,
}

/// Scripted push transport. Clones share state.
#[derive(Clone)]
pub struct MockPushTransport {
    state: Arc<Mutex<PushState>>,
}

impl MockPushTransport {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(PushState {
                available: true,
                opens: 0,
                frames: Vec::new(),
                inbound: None,
                responses: HashMap::new(),
            })),
        }
    }

    /// While unavailable, `open` fails.
    pub fn set_available(&self, available: bool) {
        self.state.lock().unwrap().available = available;
    }

    /// Number of `open` calls, failed ones included.
    pub fn open_count(&self) -> usize {
        self.state.lock().unwrap().opens
    }

    pub fn is_open(&self) -> bool {
        self.state.lock().unwrap().inbound.is_some()
    }

    /// Answer every subscribe to `topic` with `payload`.
    pub fn respond_on_subscribe(&self, topic: Topic, payload: Value) {
        self.state.lock().unwrap().responses.insert(topic, payload);
    }

    /// Deliver a message on the current link. False when no link is open.
    pub fn push(&self, topic: Topic, account: Option<AccountKey>, payload: Value) -> bool {
        let state = self.state.lock().unwrap();
        match &state.inbound {
            Some(inbound) => inbound
                .send(PushEnvelope {
                    topic,
                    account,
                    payload,
                })
                .is_ok(),
            None => false,
        }
    }

    /// Close the current link from the server side.
    pub fn drop_connection(&self) {
        self.state.lock().unwrap().inbound = None;
    }

    /// Frames received so far, after letting pending frames drain.
    pub async fn sent_frames(&self) -> Vec<ControlFrame> {
        for _ in 0..4 {
            tokio::task::yield_now().await;
        }
        self.state.lock().unwrap().frames.clone()
    }

    pub fn clear_frames(&self) {
        self.state.lock().unwrap().frames.clear();
    }
}

impl Default for MockPushTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PushTransport for MockPushTransport {
    async fn open(&self) -> WalletResult<PushLink> {
        let (outbound, mut frames) = mpsc::unbounded_channel::<ControlFrame>();
        let (inbound_tx, inbound) = mpsc::unbounded_channel();
        {
            let mut state = self.state.lock().unwrap();
            state.opens += 1;
            if !state.available {
                return Err(WalletError::channel_unavailable("mock push server offline"));
            }
            state.inbound = Some(inbound_tx);
        }

        let shared = self.state.clone();
        tokio::spawn(async move {
            while let Some(frame) = frames.recv().await {
                let mut state = shared.lock().unwrap();
                if let ControlFrame::Subscribe { topic, account } = &frame {
                    if let (Some(payload), Some(inbound)) =
                        (state.responses.get(topic), state.inbound.as_ref())
                    {
                        let _ = inbound.send(PushEnvelope {
                            topic: *topic,
                            account: account.clone(),
                            payload: payload.clone(),
                        });
                    }
                }
                state.frames.push(frame);
            }
        });

        Ok(PushLink { outbound, inbound })
    }
}

impl std::fmt::Debug for MockPushTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock().unwrap();
        f.debug_struct("MockPushTransport")
            .field("available", &state.available)
            .field("opens", &state.opens)
            .field("open", &state.inbound.is_some())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wallet_core::SubscriptionKey;

    #[tokio::test]
    async fn records_frames_and_answers_subscribes() {
        let push = MockPushTransport::new();
        push.respond_on_subscribe(Topic::Ticker, json!({ "latest": "0.3" }));
        let mut link = push.open().await.unwrap();

        let key = SubscriptionKey::new(Topic::Ticker, None);
        link.outbound.send(ControlFrame::subscribe(&key)).unwrap();
        let envelope = link.inbound.recv().await.unwrap();
        assert_eq!(envelope.payload, json!({ "latest": "0.3" }));
        assert_eq!(push.sent_frames().await, vec![ControlFrame::subscribe(&key)]);
    }

    #[tokio::test]
    async fn unavailable_server_refuses_links() {
        let push = MockPushTransport::new();
        push.set_available(false);
        assert!(push.open().await.is_err());
        assert_eq!(push.open_count(), 1);
        assert!(!push.is_open());
    }

    #[tokio::test]
    async fn dropping_the_connection_ends_the_inbound_stream() {
        let push = MockPushTransport::new();
        let mut link = push.open().await.unwrap();
        push.drop_connection();
        assert!(link.inbound.recv().await.is_none());
        assert!(!push.push(Topic::Ticker, None, json!({})));
    }
}
