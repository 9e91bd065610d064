//! Wallet Core - account state model for the wallet sync engine
//!
//! Pure types and interfaces shared by the engine, its effect handlers and
//! its test doubles. Nothing here performs I/O directly.
//!
//! # Contents
//!
//! ## Chain data
//! - `AccountKey`, `Asset`, `PriceRatio`, `VestingRatio`: validated identifiers
//!   and integer amounts
//! - `AccountSnapshot`: everything fetched for one account
//! - `decode`: node JSON into snapshots, `ChainClient`: typed pull queries
//!
//! ## Derived data
//! - `ResourceMeterCalculator`: mana regeneration and vote value, arbitrary precision
//! - `WalletView`: formatted balances, USD value, reputation
//! - `PublishedState`: what consumers observe
//!
//! ## Effect interfaces
//! - `JsonRpcTransport`, `PushTransport`, `CacheStorage`, `Clock`, `SecureKeyStore`

#![allow(missing_docs)]
#![forbid(unsafe_code)]

pub mod account;
pub mod amount;
pub mod client;
pub mod decode;
pub mod effects;
pub mod errors;
pub mod meters;
pub mod push;
pub mod snapshot;
pub mod state;
pub mod view;

pub use account::{AccountKey, KeyRole};
pub use amount::{Asset, AssetSymbol, PriceRatio, VestingRatio};
pub use client::ChainClient;
pub use errors::{ErrorClass, WalletError, WalletResult};
pub use meters::{ManaReading, MeterReadings, RechargeTimes, ResourceMeterCalculator, ResourceMeters};
pub use push::{ControlFrame, PushEnvelope, SubscriptionKey, Topic};
pub use snapshot::{AccountPatch, AccountSnapshot, Delegation, ManaBar, RcManaBar, RewardFund};
pub use state::{AccountSwitched, LoadingStage, PublishedState};
pub use view::WalletView;
