//! Push channel effect.
//!
//! # Effect Classification
//!
//! - **Category**: Infrastructure Effect
//! - **Implementation**: `wallet-effects` (`WebSocketPushTransport`)
//! - **Usage**: `ChannelManager` only; everything else goes through its subscriptions

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::errors::WalletResult;
use crate::push::{ControlFrame, PushEnvelope};

/// An open push connection.
///
/// The connection is alive while `inbound` yields messages. When the peer
/// goes away the handler closes `inbound`; dropping `outbound` asks the
/// handler to close the connection.
#[derive(Debug)]
pub struct PushLink {
    pub outbound: mpsc::UnboundedSender<ControlFrame>,
    pub inbound: mpsc::UnboundedReceiver<PushEnvelope>,
}

/// Opens push connections.
#[async_trait]
pub trait PushTransport: Send + Sync {
    /// Open a new connection. Fails with
    /// [`WalletError::ChannelUnavailable`](crate::errors::WalletError::ChannelUnavailable).
    async fn open(&self) -> WalletResult<PushLink>;
}
