//! Effect Trait Definitions
//!
//! Traits for every side effect the engine performs. This module defines
//! **what** can be done; `wallet-effects` provides the production handlers
//! and `wallet-testkit` the scripted ones.
//!
//! # Effect Classification
//!
//! - **Chain RPC**: pull queries against a node (`JsonRpcTransport`)
//! - **Push**: the shared subscription channel (`PushTransport`)
//! - **Cache storage**: JSON key/value persistence (`CacheStorage`)
//! - **Time**: wall-clock reads (`Clock`)
//! - **Keys**: role lookups in the secure key store (`SecureKeyStore`)

pub mod keys;
pub mod push;
pub mod rpc;
pub mod storage;
pub mod time;

pub use keys::SecureKeyStore;
pub use push::{PushLink, PushTransport};
pub use rpc::JsonRpcTransport;
pub use storage::CacheStorage;
pub use time::Clock;
