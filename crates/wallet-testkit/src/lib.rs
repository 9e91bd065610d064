//! Wallet Testing Infrastructure
//!
//! Deterministic doubles for the effect traits in `wallet_core::effects` and
//! JSON builders shaped like real node responses.
//!
//! - [`MockChain`]: scripted JSON-RPC node with call log, failure injection
//!   and latency
//! - [`MockPushTransport`]: scripted push server recording control frames
//! - [`ManualClock`]: clock that only moves when told to
//! - [`fixtures`]: account, RC, reward fund, price and global property payloads

#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]
#![allow(missing_docs)]

pub mod chain;
pub mod fixtures;
pub mod push;
pub mod time;

pub use chain::MockChain;
pub use push::MockPushTransport;
pub use time::ManualClock;
