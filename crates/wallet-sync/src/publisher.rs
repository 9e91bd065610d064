//! Published state holder.
//!
//! Consumers watch one [`PublishedState`]. Writers tag every update with the
//! generation they were started under; an update whose generation no longer
//! matches the published one is dropped. The generation bump and the reset to
//! the default view happen in a single watch update, so no consumer can see
//! a new generation carrying old data.

use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::{broadcast, watch};
use tracing::debug;
use wallet_core::{AccountKey, AccountSwitched, PublishedState};

use crate::session::Generation;

const SWITCH_EVENT_CAPACITY: usize = 16;

#[derive(Debug)]
pub struct StatePublisher {
    state: watch::Sender<PublishedState>,
    generation: AtomicU64,
    switched: broadcast::Sender<AccountSwitched>,
}

impl StatePublisher {
    pub fn new() -> Self {
        let (state, _) = watch::channel(PublishedState::default());
        let (switched, _) = broadcast::channel(SWITCH_EVENT_CAPACITY);
        Self {
            state,
            generation: AtomicU64::new(0),
            switched,
        }
    }

    pub fn current_generation(&self) -> Generation {
        Generation::new(self.generation.load(Ordering::SeqCst))
    }

    pub fn is_current(&self, generation: Generation) -> bool {
        self.current_generation() == generation
    }

    /// Start a new generation and publish the default view for `account`.
    pub fn begin(&self, account: Option<AccountKey>, channel_connected: bool) -> Generation {
        let mut next = Generation::default();
        self.state.send_modify(|state| {
            next = Generation::new(self.generation.fetch_add(1, Ordering::SeqCst) + 1);
            *state = PublishedState::reset(account, next.value(), channel_connected);
        });
        next
    }

    /// Apply `update` if `generation` is still current. Returns whether it was applied.
    pub fn publish<F>(&self, generation: Generation, update: F) -> bool
    where
        F: FnOnce(&mut PublishedState),
    {
        let applied = self.state.send_if_modified(|state| {
            if state.generation != generation.value() {
                return false;
            }
            update(state);
            true
        });
        if !applied {
            debug!(
                generation = generation.value(),
                current = self.current_generation().value(),
                "Dropping stale publish"
            );
        }
        applied
    }

    /// Mirror push channel health regardless of generation.
    pub fn set_channel_connected(&self, connected: bool) {
        self.state.send_if_modified(|state| {
            if state.channel_connected == connected {
                return false;
            }
            state.channel_connected = connected;
            true
        });
    }

    pub fn snapshot(&self) -> PublishedState {
        self.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<PublishedState> {
        self.state.subscribe()
    }

    pub fn announce_switch(&self, event: AccountSwitched) {
        // No receivers is fine.
        let _ = self.switched.send(event);
    }

    pub fn account_switched(&self) -> broadcast::Receiver<AccountSwitched> {
        self.switched.subscribe()
    }
}

impl Default for StatePublisher {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wallet_core::LoadingStage;

    #[test]
    fn stale_generation_is_dropped() {
        let publisher = StatePublisher::new();
        let alice = publisher.begin(Some(AccountKey::parse("alice").unwrap()), false);
        let bob = publisher.begin(Some(AccountKey::parse("bob").unwrap()), false);
        assert!(bob > alice);

        assert!(!publisher.publish(alice, |s| s.set_stage(LoadingStage::Ready)));
        assert_eq!(publisher.snapshot().loading_stage, LoadingStage::Idle);

        assert!(publisher.publish(bob, |s| s.set_stage(LoadingStage::Ready)));
        let state = publisher.snapshot();
        assert_eq!(state.loading_stage, LoadingStage::Ready);
        assert_eq!(state.account.unwrap().as_str(), "bob");
    }

    #[test]
    fn begin_resets_everything() {
        let publisher = StatePublisher::new();
        let first = publisher.begin(Some(AccountKey::parse("alice").unwrap()), true);
        publisher.publish(first, |s| s.error = Some("boom".into()));
        publisher.begin(None, true);
        let state = publisher.snapshot();
        assert!(state.error.is_none());
        assert!(state.account.is_none());
        assert!(state.channel_connected);
    }

    #[tokio::test]
    async fn switch_events_reach_subscribers() {
        let publisher = StatePublisher::new();
        let mut rx = publisher.account_switched();
        publisher.announce_switch(AccountSwitched {
            old: None,
            new: AccountKey::parse("bob").unwrap(),
        });
        assert_eq!(rx.recv().await.unwrap().new.as_str(), "bob");
    }
}
