//! Wallet Effects - production handlers
//!
//! Implementations of the effect traits declared in `wallet_core::effects`.
//! Handlers hold no sync-engine state; session and subscription bookkeeping
//! lives in `wallet-sync`.
//!
//! - [`HttpJsonRpcTransport`]: chain queries over HTTP with node failover
//! - [`WebSocketPushTransport`]: the push channel over a WebSocket
//! - [`MemoryCacheStorage`], [`JsonFileCacheStorage`]: cache persistence
//! - [`SystemClock`]: wall clock
//! - [`MemoryKeyStore`]: key-role registry

#![allow(missing_docs)]
#![forbid(unsafe_code)]

pub mod keys;
pub mod rpc;
pub mod storage;
pub mod time;
pub mod websocket;

pub use keys::MemoryKeyStore;
pub use rpc::HttpJsonRpcTransport;
pub use storage::{JsonFileCacheStorage, MemoryCacheStorage};
pub use time::SystemClock;
pub use websocket::WebSocketPushTransport;
