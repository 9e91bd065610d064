//! WebSocket Push Transport Handler
//!
//! Opens one WebSocket per [`PushTransport::open`] call and runs a pump task
//! that forwards control frames out and decoded envelopes in. The pump owns
//! the socket; callers only see the [`PushLink`] channels.

use std::time::Duration;

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, info, warn};
use url::Url;
use wallet_core::effects::{PushLink, PushTransport};
use wallet_core::{ControlFrame, PushEnvelope, WalletError, WalletResult};

/// Push transport over a WebSocket endpoint.
#[derive(Debug, Clone)]
pub struct WebSocketPushTransport {
    url: Url,
    connect_timeout: Duration,
}

impl WebSocketPushTransport {
    pub fn new(url: Url, connect_timeout: Duration) -> Self {
        Self {
            url,
            connect_timeout,
        }
    }
}

#[async_trait]
impl PushTransport for WebSocketPushTransport {
    async fn open(&self) -> WalletResult<PushLink> {
        let (ws_stream, response) = timeout(self.connect_timeout, connect_async(self.url.as_str()))
            .await
            .map_err(|_| {
                WalletError::channel_unavailable(format!("connect to {} timed out", self.url))
            })?
            .map_err(|e| {
                WalletError::channel_unavailable(format!("connect to {} failed: {e}", self.url))
            })?;
        info!(url = %self.url, status = %response.status(), "Push channel connected");

        let (mut sink, mut stream) = ws_stream.split();
        let (outbound, mut outbound_rx) = mpsc::unbounded_channel::<ControlFrame>();
        let (inbound_tx, inbound) = mpsc::unbounded_channel::<PushEnvelope>();
        let url = self.url.clone();

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    frame = outbound_rx.recv() => {
                        let Some(frame) = frame else {
                            let _ = sink.send(Message::Close(None)).await;
                            break;
                        };
                        let text = match serde_json::to_string(&frame) {
                            Ok(text) => text,
                            Err(e) => {
                                warn!(error = %e, "Failed to encode control frame");
                                continue;
                            }
                        };
                        if let Err(e) = sink.send(Message::Text(text)).await {
                            warn!(url = %url, error = %e, "Push send failed");
                            break;
                        }
                    }
                    message = stream.next() => {
                        match message {
                            Some(Ok(Message::Ping(data))) => {
                                if sink.send(Message::Pong(data)).await.is_err() {
                                    break;
                                }
                            }
                            Some(Ok(Message::Close(_))) | None => break,
                            Some(Ok(message)) => {
                                if let Some(envelope) = decode_message(&message) {
                                    if inbound_tx.send(envelope).is_err() {
                                        break;
                                    }
                                }
                            }
                            Some(Err(e)) => {
                                warn!(url = %url, error = %e, "Push receive failed");
                                break;
                            }
                        }
                    }
                }
            }
            debug!(url = %url, "Push pump stopped");
        });

        Ok(PushLink { outbound, inbound })
    }
}

/// Decode a data frame into an envelope; control frames and malformed
/// payloads yield `None`.
fn decode_message(message: &Message) -> Option<PushEnvelope> {
    let decoded = match message {
        Message::Text(text) => serde_json::from_str(text),
        Message::Binary(bytes) => serde_json::from_slice(bytes),
        _ => return None,
    };
    match decoded {
        Ok(envelope) => Some(envelope),
        Err(e) => {
            warn!(error = %e, "Dropping malformed push message");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wallet_core::Topic;

    #[test]
    fn decodes_text_and_binary_envelopes() {
        let text = r#"{"topic":"account-update","account":"alice","payload":{"balance":"1.000 STEEM"}}"#;
        let envelope = decode_message(&Message::Text(text.to_string())).unwrap();
        assert_eq!(envelope.topic, Topic::AccountUpdate);
        assert_eq!(envelope.account.unwrap().as_str(), "alice");

        let binary = Message::Binary(br#"{"topic":"ticker","payload":{"latest":"0.25"}}"#.to_vec());
        assert_eq!(decode_message(&binary).unwrap().topic, Topic::Ticker);
    }

    #[test]
    fn malformed_and_control_messages_are_skipped() {
        assert!(decode_message(&Message::Text("{\"topic\":\"nope\"}".into())).is_none());
        assert!(decode_message(&Message::Pong(Vec::new())).is_none());
    }
}
