//! Wallet Sync - account state synchronization engine
//!
//! Keeps one account's wallet view and resource meters fresh across a push
//! channel and a polling fallback, with instant paint from a
//! stale-while-revalidate cache and stale-free account switching.
//!
//! # Components
//!
//! - [`ChannelManager`]: one shared push connection, reference-counted
//!   topic subscriptions, reconnect with capped backoff
//! - [`CacheStore`]: per-account, per-kind TTL cache over a `CacheStorage` handler
//! - [`SyncCoordinator`]: the five-stage fetch pipeline, adaptive refresh,
//!   meter tick, push updates
//! - [`SessionSwitcher`]: account switching state machine with an in-flight guard
//! - [`StatePublisher`]: generation-checked published state
//! - [`WalletEngine`]: wiring and the consumer surface
//!
//! # Generations
//!
//! Each account session is tagged with a monotonically increasing
//! [`Generation`]. Results computed for an older generation are dropped on
//! arrival rather than cancelled in flight.

#![allow(missing_docs)]
#![forbid(unsafe_code)]

pub mod cache;
pub mod channel;
pub mod config;
pub mod coordinator;
pub mod engine;
pub mod publisher;
pub mod session;
pub mod switcher;
pub mod tasks;

pub use cache::{CacheKind, CacheStore, Cached};
pub use channel::{ChannelEvent, ChannelManager, SubscriptionHandle};
pub use config::{CacheConfig, NetworkConfig, ReconnectConfig, RefreshConfig, SyncConfig, SyncConfigBuilder};
pub use coordinator::{RefreshKind, SyncCoordinator, SyncOutcome};
pub use engine::{WalletEngine, WalletEngineBuilder};
pub use publisher::StatePublisher;
pub use session::{Generation, SyncSession};
pub use switcher::{SessionSwitcher, SwitchOutcome, SwitchState};
pub use tasks::TaskRegistry;
