//! Chain RPC effect.
//!
//! # Effect Classification
//!
//! - **Category**: Infrastructure Effect
//! - **Implementation**: `wallet-effects` (`HttpJsonRpcTransport`)
//! - **Usage**: `ChainClient` and the pull path of the sync engine

use async_trait::async_trait;
use serde_json::Value;

use crate::errors::WalletResult;

/// One JSON-RPC round trip.
///
/// Implementations return the `result` member of the response. A response
/// carrying `error`, a network failure or a timeout is a
/// [`WalletError::Transport`](crate::errors::WalletError::Transport).
#[async_trait]
pub trait JsonRpcTransport: Send + Sync {
    async fn call(&self, method: &str, params: Value) -> WalletResult<Value>;
}
