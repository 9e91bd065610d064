#![allow(dead_code)]

use std::sync::Arc;

use wallet_core::effects::CacheStorage;
use wallet_core::{AccountKey, PublishedState};
use wallet_sync::{SyncConfig, WalletEngine};
use wallet_testkit::{fixtures, ManualClock, MockChain, MockPushTransport};

pub struct Rig {
    pub engine: Arc<WalletEngine>,
    pub chain: MockChain,
    pub push: MockPushTransport,
    pub clock: Arc<ManualClock>,
}

pub fn key(name: &str) -> AccountKey {
    AccountKey::parse(name).expect("valid account name")
}

pub fn chain_with(accounts: &[&str]) -> MockChain {
    let chain = MockChain::new();
    for name in accounts {
        chain.add_account(fixtures::account(name));
    }
    chain
}

pub fn rig(chain: MockChain, with_push: bool) -> Rig {
    rig_with_storage(chain, with_push, None)
}

pub fn rig_with_storage(
    chain: MockChain,
    with_push: bool,
    storage: Option<Arc<dyn CacheStorage>>,
) -> Rig {
    let push = MockPushTransport::new();
    let clock = Arc::new(ManualClock::new(fixtures::NOW_MS));
    let mut builder = WalletEngine::builder()
        .with_config(SyncConfig::default())
        .with_rpc(Arc::new(chain.clone()))
        .with_clock(clock.clone());
    if with_push {
        builder = builder.with_push(Arc::new(push.clone()));
    }
    if let Some(storage) = storage {
        builder = builder.with_storage(storage);
    }
    let engine = builder.build().expect("engine builds");
    Rig {
        engine: Arc::new(engine),
        chain,
        push,
        clock,
    }
}

/// Collect every published state change until the returned handle is awaited.
pub fn record_states(engine: &WalletEngine) -> tokio::task::JoinHandle<Vec<PublishedState>> {
    let mut rx = engine.subscribe();
    tokio::spawn(async move {
        let mut seen = Vec::new();
        while rx.changed().await.is_ok() {
            let state = rx.borrow_and_update().clone();
            let done = state.loading_stage == wallet_core::LoadingStage::Ready
                && state.account.as_ref().map(AccountKey::as_str) == Some("bob");
            seen.push(state);
            if done {
                break;
            }
        }
        seen
    })
}
