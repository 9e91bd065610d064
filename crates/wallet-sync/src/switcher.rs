//! Account switching
//!
//! `Idle → TearingDown → Resetting → FetchingNew → Ready`, with `Error`
//! reachable from `FetchingNew`. After a transport failure the session keeps
//! refreshing and the state moves from `Error` to `Ready` once a refresh
//! succeeds. A missing account stays in `Error` and its cache entries are
//! dropped.
//!
//! Teardown, reset and the start of the new session happen under one lock
//! and without suspension, so the default view is visible before any request
//! for the new account goes out. A switch to the account already being
//! switched to is ignored; a switch to a different account supersedes the
//! one in flight through the generation counter.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::watch;
use tracing::{debug, info, warn};
use wallet_core::{AccountKey, AccountSwitched, LoadingStage, WalletError};

use crate::coordinator::{SyncCoordinator, SyncOutcome};
use crate::session::{Generation, SyncSession};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SwitchState {
    #[default]
    Idle,
    TearingDown,
    Resetting,
    FetchingNew,
    Ready,
    Error,
}

/// Result of one `switch_account` call.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SwitchOutcome {
    /// The new account's pipeline completed
    Ready,
    /// The pipeline failed; the default view stays published
    Failed(WalletError),
    /// A later switch took over before this one finished
    Superseded,
    /// Already on, or already switching to, this account
    Ignored,
}

struct InFlight {
    target: AccountKey,
    ticket: u64,
}

#[derive(Default)]
struct Slots {
    in_flight: Option<InFlight>,
    session: Option<SyncSession>,
    current: Option<AccountKey>,
}

struct SwitcherInner {
    coordinator: SyncCoordinator,
    slots: Mutex<Slots>,
    state: watch::Sender<SwitchState>,
    next_ticket: AtomicU64,
    grace: Duration,
}

#[derive(Clone)]
pub struct SessionSwitcher {
    inner: Arc<SwitcherInner>,
}

impl SessionSwitcher {
    /// `grace` is how long the in-flight guard outlives a finished switch.
    pub fn new(coordinator: SyncCoordinator, grace: Duration) -> Self {
        let (state, _) = watch::channel(SwitchState::Idle);
        Self {
            inner: Arc::new(SwitcherInner {
                coordinator,
                slots: Mutex::new(Slots::default()),
                state,
                next_ticket: AtomicU64::new(0),
                grace,
            }),
        }
    }

    pub async fn switch_account(&self, account: AccountKey) -> SwitchOutcome {
        let inner = &self.inner;
        let publisher = inner.coordinator.publisher().clone();

        let (generation, ticket) = {
            let mut slots = inner.slots.lock();
            let duplicate = match &slots.in_flight {
                Some(in_flight) => in_flight.target == account,
                None => slots.current.as_ref() == Some(&account),
            };
            if duplicate {
                debug!(account = %account, "Switch ignored");
                return SwitchOutcome::Ignored;
            }
            let ticket = inner.next_ticket.fetch_add(1, Ordering::SeqCst) + 1;
            slots.in_flight = Some(InFlight {
                target: account.clone(),
                ticket,
            });

            inner.set_state(SwitchState::TearingDown);
            if let Some(session) = slots.session.take() {
                session.teardown();
            }

            inner.set_state(SwitchState::Resetting);
            let generation = inner.coordinator.begin_session(&account);
            slots.session = Some(SyncSession::new(account.clone(), generation));
            let old = slots.current.replace(account.clone());
            info!(
                from = old.as_ref().map(AccountKey::as_str),
                to = %account,
                generation = generation.value(),
                "Switching account"
            );
            publisher.announce_switch(AccountSwitched {
                old,
                new: account.clone(),
            });

            inner.set_state(SwitchState::FetchingNew);
            (generation, ticket)
        };

        let result = inner.coordinator.run_pipeline(&account, generation).await;
        if matches!(&result, Err(e) if e.is_fatal()) {
            inner.coordinator.forget_cached(&account).await;
        }

        let outcome = {
            let mut slots = inner.slots.lock();
            if !publisher.is_current(generation) {
                debug!(account = %account, generation = generation.value(), "Switch superseded");
                SwitchOutcome::Superseded
            } else {
                match result {
                    Ok(SyncOutcome::Completed) => {
                        if let Some(session) = slots.session.as_mut() {
                            inner.coordinator.start_session_tasks(session);
                        }
                        inner.set_state(SwitchState::Ready);
                        SwitchOutcome::Ready
                    }
                    Ok(_) => SwitchOutcome::Superseded,
                    Err(e) => {
                        warn!(account = %account, error = %e, "Switch failed");
                        inner.coordinator.fail_session(generation, &e);
                        // A missing account never comes back on its own;
                        // anything else is retried by the refresh timer.
                        if !e.is_fatal() {
                            if let Some(session) = slots.session.as_mut() {
                                inner.coordinator.start_session_tasks(session);
                                self.follow_recovery(session, generation);
                            }
                        }
                        inner.set_state(SwitchState::Error);
                        SwitchOutcome::Failed(e)
                    }
                }
            }
        };

        self.release_after_grace(ticket);
        outcome
    }

    /// Move from `Error` to `Ready` once a scheduled refresh brings the
    /// failed session's published state to `Ready`.
    fn follow_recovery(&self, session: &SyncSession, generation: Generation) {
        let mut states = self.inner.coordinator.publisher().subscribe();
        let weak = Arc::downgrade(&self.inner);
        session.tasks().spawn_cancellable(async move {
            let recovered = states
                .wait_for(|s| {
                    s.generation == generation.value() && s.loading_stage == LoadingStage::Ready
                })
                .await
                .is_ok();
            let Some(inner) = weak.upgrade() else {
                return;
            };
            let _slots = inner.slots.lock();
            if recovered
                && inner.coordinator.publisher().is_current(generation)
                && *inner.state.borrow() == SwitchState::Error
            {
                info!(generation = generation.value(), "Session recovered");
                inner.set_state(SwitchState::Ready);
            }
        });
    }

    fn release_after_grace(&self, ticket: u64) {
        let weak = Arc::downgrade(&self.inner);
        let grace = self.inner.grace;
        tokio::spawn(async move {
            tokio::time::sleep(grace).await;
            let Some(inner) = weak.upgrade() else {
                return;
            };
            let mut slots = inner.slots.lock();
            if slots.in_flight.as_ref().is_some_and(|f| f.ticket == ticket) {
                slots.in_flight = None;
            }
        });
    }

    pub fn state(&self) -> SwitchState {
        *self.inner.state.borrow()
    }

    pub fn watch_state(&self) -> watch::Receiver<SwitchState> {
        self.inner.state.subscribe()
    }

    pub fn current_account(&self) -> Option<AccountKey> {
        self.inner.slots.lock().current.clone()
    }

    /// True while a switch or its grace period is outstanding.
    pub fn is_switching(&self) -> bool {
        self.inner.slots.lock().in_flight.is_some()
    }

    /// Tear down the active session, if any.
    pub fn shutdown(&self) {
        if let Some(session) = self.inner.slots.lock().session.take() {
            session.teardown();
        }
        self.inner.set_state(SwitchState::Idle);
    }
}

impl SwitcherInner {
    fn set_state(&self, state: SwitchState) {
        self.state.send_replace(state);
    }
}

impl std::fmt::Debug for SessionSwitcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionSwitcher")
            .field("state", &self.state())
            .field("grace", &self.inner.grace)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::CacheStore;
    use crate::channel::ChannelManager;
    use crate::config::{CacheConfig, RefreshConfig};
    use crate::publisher::StatePublisher;
    use wallet_core::client::methods;
    use wallet_core::ChainClient;
    use wallet_effects::{MemoryCacheStorage, MemoryKeyStore};
    use wallet_testkit::{fixtures, ManualClock, MockChain};

    fn switcher(chain: &MockChain) -> SessionSwitcher {
        let clock = Arc::new(ManualClock::new(1_700_000_000_000));
        let coordinator = SyncCoordinator::new(
            ChainClient::new(Arc::new(chain.clone())),
            ChannelManager::disabled(),
            CacheStore::new(Arc::new(MemoryCacheStorage::new()), clock.clone(), CacheConfig::default()),
            clock,
            Arc::new(MemoryKeyStore::new()),
            Arc::new(StatePublisher::new()),
            RefreshConfig::default(),
        );
        SessionSwitcher::new(coordinator, Duration::from_millis(500))
    }

    fn key(name: &str) -> AccountKey {
        AccountKey::parse(name).unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn switch_reaches_ready() {
        let chain = MockChain::new();
        chain.add_account(fixtures::account("alice"));
        let switcher = switcher(&chain);

        assert_eq!(switcher.switch_account(key("alice")).await, SwitchOutcome::Ready);
        assert_eq!(switcher.state(), SwitchState::Ready);
        assert_eq!(switcher.current_account(), Some(key("alice")));
        assert!(switcher.is_switching());

        tokio::time::sleep(Duration::from_millis(600)).await;
        assert!(!switcher.is_switching());
        assert_eq!(switcher.switch_account(key("alice")).await, SwitchOutcome::Ignored);
    }

    #[tokio::test(start_paused = true)]
    async fn missing_account_ends_in_error() {
        let chain = MockChain::new();
        let switcher = switcher(&chain);

        let outcome = switcher.switch_account(key("ghost")).await;
        assert!(matches!(outcome, SwitchOutcome::Failed(WalletError::NotFound { .. })));
        assert_eq!(switcher.state(), SwitchState::Error);
        let state = switcher.inner.coordinator.publisher().snapshot();
        assert_eq!(state.loading_stage, LoadingStage::Error);
        assert!(state.error.is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn transport_error_returns_to_ready_after_refresh() {
        let chain = MockChain::new();
        chain.add_account(fixtures::account("alice"));
        chain.fail_method(methods::GET_ACCOUNTS);
        let switcher = switcher(&chain);

        let outcome = switcher.switch_account(key("alice")).await;
        assert!(matches!(outcome, SwitchOutcome::Failed(WalletError::Transport { .. })));
        assert_eq!(switcher.state(), SwitchState::Error);

        chain.recover_method(methods::GET_ACCOUNTS);
        tokio::time::sleep(Duration::from_secs(31)).await;
        assert_eq!(switcher.state(), SwitchState::Ready);
        let state = switcher.inner.coordinator.publisher().snapshot();
        assert_eq!(state.loading_stage, LoadingStage::Ready);
    }

    #[tokio::test(start_paused = true)]
    async fn missing_account_stays_in_error() {
        let chain = MockChain::new();
        let switcher = switcher(&chain);
        assert!(matches!(
            switcher.switch_account(key("ghost")).await,
            SwitchOutcome::Failed(WalletError::NotFound { .. })
        ));

        chain.add_account(fixtures::account("ghost"));
        tokio::time::sleep(Duration::from_secs(61)).await;
        assert_eq!(switcher.state(), SwitchState::Error);
    }

    #[tokio::test(start_paused = true)]
    async fn duplicate_request_while_in_flight_is_ignored() {
        let chain = MockChain::new();
        chain.add_account(fixtures::account("alice"));
        chain.set_delay(Duration::from_secs(1));
        let switcher = switcher(&chain);

        let first = tokio::spawn({
            let switcher = switcher.clone();
            async move { switcher.switch_account(key("alice")).await }
        });
        tokio::task::yield_now().await;
        assert_eq!(switcher.switch_account(key("alice")).await, SwitchOutcome::Ignored);
        assert_eq!(first.await.unwrap(), SwitchOutcome::Ready);
    }

    #[tokio::test(start_paused = true)]
    async fn later_switch_supersedes_earlier() {
        let chain = MockChain::new();
        chain.add_account(fixtures::account("alice"));
        chain.add_account(fixtures::account("bob"));
        chain.set_delay(Duration::from_secs(1));
        let switcher = switcher(&chain);

        let first = tokio::spawn({
            let switcher = switcher.clone();
            async move { switcher.switch_account(key("alice")).await }
        });
        tokio::task::yield_now().await;
        let second = switcher.switch_account(key("bob")).await;

        assert_eq!(first.await.unwrap(), SwitchOutcome::Superseded);
        assert_eq!(second, SwitchOutcome::Ready);
        let state = switcher.inner.coordinator.publisher().snapshot();
        assert_eq!(state.account, Some(key("bob")));
        assert_eq!(state.loading_stage, LoadingStage::Ready);
    }
}
