//! Push channel wire format.
//!
//! Outbound control frames ask the server to start or stop a topic; inbound
//! envelopes carry `{topic, account?, payload}`.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::account::AccountKey;

/// Topics served by the push channel.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Topic {
    /// Market ticker (price)
    Ticker,
    /// Internal market order book
    OrderBook,
    /// Internal market recent trades
    RecentTrades,
    /// Dynamic global properties (vesting ratio)
    GlobalProperties,
    /// Partial account object
    AccountUpdate,
    /// Account + RC account + reward fund + median price in one payload
    PowerMeter,
}

impl Topic {
    /// Whether the topic is scoped to one account.
    pub fn is_account_scoped(self) -> bool {
        matches!(self, Self::AccountUpdate | Self::PowerMeter)
    }

    /// Wire name.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Ticker => "ticker",
            Self::OrderBook => "order-book",
            Self::RecentTrades => "recent-trades",
            Self::GlobalProperties => "global-properties",
            Self::AccountUpdate => "account-update",
            Self::PowerMeter => "power-meter",
        }
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identity of one underlying channel subscription.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SubscriptionKey {
    /// Topic
    pub topic: Topic,
    /// Account scope, for account topics
    pub account: Option<AccountKey>,
}

impl SubscriptionKey {
    /// Build a key for a topic and optional account.
    pub fn new(topic: Topic, account: Option<AccountKey>) -> Self {
        Self { topic, account }
    }
}

impl fmt::Display for SubscriptionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.account {
            Some(account) => write!(f, "{}:{}", self.topic, account),
            None => write!(f, "{}", self.topic),
        }
    }
}

/// Control frame sent to the push server.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "lowercase")]
pub enum ControlFrame {
    /// Start delivering a topic
    Subscribe {
        topic: Topic,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        account: Option<AccountKey>,
    },
    /// Stop delivering a topic
    Unsubscribe {
        topic: Topic,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        account: Option<AccountKey>,
    },
}

impl ControlFrame {
    /// Subscribe frame for a key.
    pub fn subscribe(key: &SubscriptionKey) -> Self {
        Self::Subscribe {
            topic: key.topic,
            account: key.account.clone(),
        }
    }

    /// Unsubscribe frame for a key.
    pub fn unsubscribe(key: &SubscriptionKey) -> Self {
        Self::Unsubscribe {
            topic: key.topic,
            account: key.account.clone(),
        }
    }
}

/// Inbound push message.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PushEnvelope {
    /// Topic the payload belongs to
    pub topic: Topic,
    /// Account scope, for account topics
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub account: Option<AccountKey>,
    /// Topic-specific payload
    pub payload: Value,
}

impl PushEnvelope {
    /// Subscription key this envelope is routed to.
    pub fn key(&self) -> SubscriptionKey {
        SubscriptionKey::new(self.topic, self.account.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn control_frames_use_action_tag() {
        let key = SubscriptionKey::new(Topic::PowerMeter, Some(AccountKey::parse("alice").unwrap()));
        let frame = serde_json::to_value(ControlFrame::subscribe(&key)).unwrap();
        assert_eq!(
            frame,
            json!({ "action": "subscribe", "topic": "power-meter", "account": "alice" })
        );

        let ticker = SubscriptionKey::new(Topic::Ticker, None);
        let frame = serde_json::to_value(ControlFrame::unsubscribe(&ticker)).unwrap();
        assert_eq!(frame, json!({ "action": "unsubscribe", "topic": "ticker" }));
    }

    #[test]
    fn envelope_without_account_routes_to_global_key() {
        let env: PushEnvelope =
            serde_json::from_value(json!({ "topic": "ticker", "payload": { "latest": "0.25" } }))
                .unwrap();
        assert_eq!(env.key(), SubscriptionKey::new(Topic::Ticker, None));
    }
}
