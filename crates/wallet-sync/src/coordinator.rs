//! Sync coordinator
//!
//! Drives the fetch pipeline for the active account and keeps the published
//! state fresh afterwards.
//!
//! ## Pipeline
//!
//! 1. **Seed**: publish the cached wallet view and meters, if any.
//! 2. **Core fetch**: vesting ratio, price and account snapshot in parallel.
//! 3. **Derive**: build the wallet view and write it through to the cache.
//! 4. **Secondary fetch**: delegations and meter inputs in parallel. Meter
//!    inputs come from the push channel when it is connected and from the
//!    pull transport otherwise.
//! 5. **Publish**: merged state, stage `Ready`.
//!
//! Only a failed account fetch ends the pipeline. Every other sub-fetch
//! failure keeps the previous value and is logged.
//!
//! Every write to session data or published state carries the generation
//! the work was started under and is dropped if that generation is no longer
//! current.

use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use serde_json::Value;
use tracing::{debug, info, warn};
use wallet_core::decode::{from_value, RawAccountPatch, RawGlobalProperties, RawPowerMeter, RawTicker};
use wallet_core::effects::{Clock, SecureKeyStore};
use wallet_core::{
    AccountKey, AccountSnapshot, ChainClient, Delegation, KeyRole, LoadingStage, PriceRatio,
    PublishedState, PushEnvelope, RcManaBar, ResourceMeterCalculator, ResourceMeters, RewardFund,
    Topic, VestingRatio, WalletError, WalletResult, WalletView,
};

use crate::cache::{CacheKind, CacheStore};
use crate::channel::ChannelManager;
use crate::config::RefreshConfig;
use crate::publisher::StatePublisher;
use crate::session::{Generation, SyncSession};

/// How a pipeline or refresh run ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SyncOutcome {
    /// Results were published.
    Completed,
    /// A newer session started while this run was outstanding; nothing was published.
    Superseded,
    /// Another refresh was already running, or there is nothing to refresh.
    Skipped,
}

/// What a refresh fetches.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RefreshKind {
    /// Pipeline stages 2 to 5
    Full,
    /// Price and meter inputs
    PriceAndMeters,
    /// Price only; push delivers everything else
    PriceOnly,
}

#[derive(Default)]
struct SessionData {
    generation: Generation,
    account: Option<AccountKey>,
    snapshot: Option<AccountSnapshot>,
    vesting_ratio: Option<VestingRatio>,
    delegations: Vec<Delegation>,
    key_roles: Vec<KeyRole>,
}

impl SessionData {
    fn view(&self) -> Option<WalletView> {
        let snapshot = self.snapshot.as_ref()?;
        Some(WalletView::derive(
            snapshot,
            self.vesting_ratio.as_ref(),
            &self.delegations,
            self.key_roles.clone(),
        ))
    }

    fn meters(&self, now_secs: u64) -> Option<ResourceMeters> {
        self.snapshot
            .as_ref()
            .map(|snapshot| ResourceMeterCalculator::compute(snapshot, now_secs))
    }
}

/// Meter inputs from stage 4.
enum MeterInputs {
    /// Combined power-meter payload from the push channel
    Push(AccountSnapshot),
    /// Separate pull queries
    Pull {
        rc: WalletResult<Option<RcManaBar>>,
        reward_fund: WalletResult<RewardFund>,
    },
}

/// Replace `target` with a power-meter snapshot.
///
/// The payload carries the whole account, so balances and vesting move
/// together with the mana bars they bound. The price is kept when the
/// payload has none.
fn apply_power_meter(target: &mut AccountSnapshot, meter: AccountSnapshot) {
    target.balances = meter.balances;
    target.vesting = meter.vesting;
    target.reputation = meter.reputation;
    target.voting_manabar = meter.voting_manabar;
    target.downvote_manabar = meter.downvote_manabar;
    target.rc_manabar = meter.rc_manabar;
    target.reward_fund = meter.reward_fund;
    if meter.price.is_some() {
        target.price = meter.price;
    }
}

/// Marks a refresh as running for one generation. A refresh left over from
/// an earlier session neither blocks nor releases the current one.
struct InFlightGuard<'a> {
    slot: &'a Mutex<Option<Generation>>,
    generation: Generation,
}

impl<'a> InFlightGuard<'a> {
    fn acquire(slot: &'a Mutex<Option<Generation>>, generation: Generation) -> Option<Self> {
        let mut running = slot.lock();
        if *running == Some(generation) {
            return None;
        }
        *running = Some(generation);
        Some(Self { slot, generation })
    }
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        let mut running = self.slot.lock();
        if *running == Some(self.generation) {
            *running = None;
        }
    }
}

struct CoordinatorInner {
    chain: ChainClient,
    channel: ChannelManager,
    cache: CacheStore,
    clock: Arc<dyn Clock>,
    keys: Arc<dyn SecureKeyStore>,
    publisher: Arc<StatePublisher>,
    refresh: RefreshConfig,
    data: Mutex<SessionData>,
    refresh_in_flight: Mutex<Option<Generation>>,
}

/// Fetch pipeline, refresh loop and push handling for the active account.
#[derive(Clone)]
pub struct SyncCoordinator {
    inner: Arc<CoordinatorInner>,
}

impl SyncCoordinator {
    pub fn new(
        chain: ChainClient,
        channel: ChannelManager,
        cache: CacheStore,
        clock: Arc<dyn Clock>,
        keys: Arc<dyn SecureKeyStore>,
        publisher: Arc<StatePublisher>,
        refresh: RefreshConfig,
    ) -> Self {
        Self {
            inner: Arc::new(CoordinatorInner {
                chain,
                channel,
                cache,
                clock,
                keys,
                publisher,
                refresh,
                data: Mutex::new(SessionData::default()),
                refresh_in_flight: Mutex::new(None),
            }),
        }
    }

    /// Start a new generation for `account`: published state is reset to the
    /// default view and previous session data is discarded.
    pub fn begin_session(&self, account: &AccountKey) -> Generation {
        let generation = self
            .inner
            .publisher
            .begin(Some(account.clone()), self.inner.channel.is_connected());
        *self.inner.data.lock() = SessionData {
            generation,
            account: Some(account.clone()),
            ..SessionData::default()
        };
        debug!(account = %account, generation = generation.value(), "Session started");
        generation
    }

    /// Run the full pipeline for `account` under `generation`.
    ///
    /// Fails only when the account itself could not be fetched.
    pub async fn run_pipeline(
        &self,
        account: &AccountKey,
        generation: Generation,
    ) -> WalletResult<SyncOutcome> {
        let inner = &self.inner;
        inner.seed(account, generation).await;
        if !inner.publish(generation, |s| s.set_stage(LoadingStage::CoreFetch)) {
            return Ok(SyncOutcome::Superseded);
        }
        let outcome = inner.fetch_full(account, generation, true).await?;
        if outcome == SyncOutcome::Completed {
            info!(account = %account, generation = generation.value(), "Account synced");
        }
        Ok(outcome)
    }

    /// Re-fetch for the current session without resetting it.
    ///
    /// `full` re-runs stages 2 to 5, otherwise only price and meter inputs
    /// are fetched. Skipped while another refresh is running.
    pub async fn refresh(&self, full: bool) -> WalletResult<SyncOutcome> {
        let kind = if full {
            RefreshKind::Full
        } else {
            RefreshKind::PriceAndMeters
        };
        self.inner.refresh_with(kind).await
    }

    /// Refresh with an explicit scope.
    pub async fn refresh_with(&self, kind: RefreshKind) -> WalletResult<SyncOutcome> {
        self.inner.refresh_with(kind).await
    }

    /// Attach the adaptive refresh timer, the meter tick and the push
    /// subscriptions to `session`.
    pub fn start_session_tasks(&self, session: &mut SyncSession) {
        let generation = session.generation();
        let account = session.account().clone();

        let channel = self.inner.channel.clone();
        let refresh = self.inner.refresh.clone();
        let weak = Arc::downgrade(&self.inner);
        session.tasks().spawn_adaptive_until(
            move || {
                if channel.is_connected() {
                    refresh.push_interval()
                } else {
                    refresh.pull_interval()
                }
            },
            move || refresh_tick(weak.clone(), generation),
        );

        let weak = Arc::downgrade(&self.inner);
        session
            .tasks()
            .spawn_interval_until(self.inner.refresh.meter_tick(), move || {
                let weak = weak.clone();
                async move {
                    match weak.upgrade() {
                        Some(inner) => inner.recompute_meters(generation),
                        None => false,
                    }
                }
            });

        for (topic, scope) in [
            (Topic::AccountUpdate, Some(account.clone())),
            (Topic::PowerMeter, Some(account.clone())),
            (Topic::Ticker, None),
            (Topic::GlobalProperties, None),
        ] {
            let weak = Arc::downgrade(&self.inner);
            let handle = self.inner.channel.subscribe(topic, scope, move |envelope| {
                if let Some(inner) = weak.upgrade() {
                    inner.apply_push(generation, envelope);
                }
            });
            session.hold(handle);
        }
        debug!(
            account = %account,
            generation = generation.value(),
            subscriptions = session.subscription_count(),
            "Session tasks started"
        );
    }

    /// Publish the terminal error state for `generation`.
    ///
    /// The default view stays published. Only a missing account sets the
    /// blocking error message.
    pub fn fail_session(&self, generation: Generation, error: &WalletError) {
        let message = error.is_fatal().then(|| error.to_string());
        self.inner.publish(generation, |s| {
            s.wallet_view = WalletView::default();
            s.resource_meters = ResourceMeters::default();
            s.error = message;
            s.set_stage(LoadingStage::Error);
        });
    }

    /// Drop everything cached for `account`, so an account that no longer
    /// exists is not painted from the cache on a later switch.
    pub async fn forget_cached(&self, account: &AccountKey) {
        self.inner.cache.forget(account).await;
    }

    /// Recompute meters from the last snapshot at the current time.
    pub fn recompute_meters(&self, generation: Generation) -> bool {
        self.inner.recompute_meters(generation)
    }

    pub fn channel(&self) -> &ChannelManager {
        &self.inner.channel
    }

    pub fn publisher(&self) -> &Arc<StatePublisher> {
        &self.inner.publisher
    }
}

impl std::fmt::Debug for SyncCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncCoordinator")
            .field("channel", &self.inner.channel)
            .field("refresh", &self.inner.refresh)
            .finish_non_exhaustive()
    }
}

async fn refresh_tick(inner: Weak<CoordinatorInner>, generation: Generation) -> bool {
    let Some(inner) = inner.upgrade() else {
        return false;
    };
    if !inner.publisher.is_current(generation) {
        return false;
    }
    let kind = if inner.channel.is_connected() {
        RefreshKind::PriceOnly
    } else {
        RefreshKind::Full
    };
    match inner.refresh_with(kind).await {
        Ok(SyncOutcome::Superseded) => false,
        Ok(_) => true,
        Err(e) => {
            warn!(generation = generation.value(), error = %e, "Scheduled refresh failed");
            true
        }
    }
}

impl CoordinatorInner {
    /// Publish under `generation`, mirroring the channel state.
    fn publish<F>(&self, generation: Generation, update: F) -> bool
    where
        F: FnOnce(&mut PublishedState),
    {
        let connected = self.channel.is_connected();
        self.publisher.publish(generation, |state| {
            update(state);
            state.channel_connected = connected;
        })
    }

    /// Run `f` on session data if `generation` still owns it.
    fn with_data<R>(&self, generation: Generation, f: impl FnOnce(&mut SessionData) -> R) -> Option<R> {
        let mut data = self.data.lock();
        if data.generation != generation {
            debug!(generation = generation.value(), "Dropping stale session data write");
            return None;
        }
        Some(f(&mut data))
    }

    async fn seed(&self, account: &AccountKey, generation: Generation) {
        let view = self.cache.read::<WalletView>(account, CacheKind::WalletView).await;
        let meters = self
            .cache
            .read::<ResourceMeters>(account, CacheKind::ResourceMeters)
            .await;
        let seeded = view.is_some() || meters.is_some();
        self.publish(generation, |s| {
            if let Some(view) = view {
                s.wallet_view = view.value;
            }
            if let Some(meters) = meters {
                s.resource_meters = meters.value;
            }
            s.set_stage(LoadingStage::Seeding);
        });
        debug!(account = %account, seeded, "Seed stage done");
    }

    /// Stages 2 to 5. With `staged`, pipeline stages are published as they
    /// are reached.
    async fn fetch_full(
        &self,
        account: &AccountKey,
        generation: Generation,
        staged: bool,
    ) -> WalletResult<SyncOutcome> {
        // Stage 2
        let (ratio, price, snapshot) = tokio::join!(
            self.chain.get_vesting_ratio(),
            self.chain.get_price(),
            self.chain.get_account(account),
        );
        let mut snapshot = snapshot?;
        if !self.publisher.is_current(generation) {
            return Ok(SyncOutcome::Superseded);
        }
        let price = self.resolve_price(account, generation, price).await;

        // Stage 3
        let key_roles = self.keys.available_roles(account).await;
        let now_ms = self.clock.now_ms();
        let derived = self.with_data(generation, |data| {
            if let Some(previous) = data.snapshot.take() {
                snapshot.rc_manabar = previous.rc_manabar;
                snapshot.reward_fund = previous.reward_fund;
            }
            snapshot.price = price.clone();
            match ratio {
                Ok(ratio) => data.vesting_ratio = Some(ratio),
                Err(e) => warn!(account = %account, error = %e, "Vesting ratio unavailable, keeping previous"),
            }
            data.snapshot = Some(snapshot);
            data.key_roles = key_roles;
            data.view()
        });
        let Some(Some(view)) = derived else {
            return Ok(SyncOutcome::Superseded);
        };
        let published = self.publish(generation, |s| {
            s.wallet_view = view.clone();
            s.last_updated_ms = now_ms;
            if staged {
                s.set_stage(LoadingStage::Deriving);
            }
        });
        if !published {
            return Ok(SyncOutcome::Superseded);
        }
        self.cache.write(account, CacheKind::WalletView, &view).await;
        if let Some(price) = &price {
            self.cache.write(account, CacheKind::Price, price).await;
        }

        // Stage 4
        if staged && !self.publish(generation, |s| s.set_stage(LoadingStage::SecondaryFetch)) {
            return Ok(SyncOutcome::Superseded);
        }
        let (delegations, inputs) = tokio::join!(
            self.chain.get_vesting_delegations(account),
            self.fetch_meter_inputs(account),
        );
        let delegations = match delegations {
            Ok(delegations) => Some(delegations),
            Err(e) => {
                warn!(account = %account, error = %e, "Delegations unavailable, keeping previous");
                None
            }
        };

        // Stage 5
        let outcome = self.merge_and_publish(account, generation, delegations, Some(inputs), true);
        if outcome == SyncOutcome::Completed {
            self.write_through(account, generation).await;
        }
        Ok(outcome)
    }

    /// Use a fresh price, else the session's previous price, else the cached one.
    async fn resolve_price(
        &self,
        account: &AccountKey,
        generation: Generation,
        fetched: WalletResult<PriceRatio>,
    ) -> Option<PriceRatio> {
        match fetched {
            Ok(price) => Some(price),
            Err(e) => {
                warn!(account = %account, error = %e, "Price unavailable, keeping previous");
                let previous = self
                    .with_data(generation, |data| {
                        data.snapshot.as_ref().and_then(|s| s.price.clone())
                    })
                    .flatten();
                match previous {
                    Some(price) => Some(price),
                    None => self
                        .cache
                        .read::<PriceRatio>(account, CacheKind::Price)
                        .await
                        .map(|cached| cached.value),
                }
            }
        }
    }

    async fn fetch_meter_inputs(&self, account: &AccountKey) -> MeterInputs {
        if self.channel.is_connected() {
            let pushed = self
                .channel
                .request(
                    Topic::PowerMeter,
                    Some(account.clone()),
                    self.refresh.channel_request_timeout(),
                )
                .await
                .and_then(|envelope| {
                    from_value::<RawPowerMeter>("power-meter", envelope.payload)?.into_snapshot()
                });
            match pushed {
                Ok(snapshot) => return MeterInputs::Push(snapshot),
                Err(e) => debug!(account = %account, error = %e, "Power meter via push failed, pulling"),
            }
        }
        let (rc, reward_fund) = tokio::join!(
            self.chain.find_rc_account(account),
            self.chain.get_reward_fund(),
        );
        MeterInputs::Pull { rc, reward_fund }
    }

    /// Fold secondary results into session data, recompute, and publish.
    fn merge_and_publish(
        &self,
        account: &AccountKey,
        generation: Generation,
        delegations: Option<Vec<Delegation>>,
        inputs: Option<MeterInputs>,
        ready: bool,
    ) -> SyncOutcome {
        let now_ms = self.clock.now_ms();
        let merged = self.with_data(generation, |data| {
            if let Some(delegations) = delegations {
                data.delegations = delegations;
            }
            if let (Some(snapshot), Some(inputs)) = (data.snapshot.as_mut(), inputs) {
                match inputs {
                    MeterInputs::Push(meter) => apply_power_meter(snapshot, meter),
                    MeterInputs::Pull { rc, reward_fund } => {
                        match rc {
                            Ok(Some(rc)) => snapshot.rc_manabar = Some(rc),
                            Ok(None) => debug!(account = %account, "No RC record for account"),
                            Err(e) => warn!(account = %account, error = %e, "RC account unavailable, keeping previous"),
                        }
                        match reward_fund {
                            Ok(fund) => snapshot.reward_fund = Some(fund),
                            Err(e) => warn!(account = %account, error = %e, "Reward fund unavailable, keeping previous"),
                        }
                    }
                }
            }
            data.view().zip(data.meters(now_ms / 1_000))
        });
        let Some(Some((view, meters))) = merged else {
            return SyncOutcome::Superseded;
        };
        let published = self.publish(generation, |s| {
            s.wallet_view = view;
            s.resource_meters = meters;
            s.last_updated_ms = now_ms;
            if ready {
                s.error = None;
                s.set_stage(LoadingStage::Ready);
            }
        });
        if published {
            SyncOutcome::Completed
        } else {
            SyncOutcome::Superseded
        }
    }

    async fn write_through(&self, account: &AccountKey, generation: Generation) {
        let state = self.publisher.snapshot();
        if state.generation != generation.value() {
            return;
        }
        let delegations = self
            .with_data(generation, |data| data.delegations.clone())
            .unwrap_or_default();
        self.cache.write(account, CacheKind::WalletView, &state.wallet_view).await;
        self.cache
            .write(account, CacheKind::ResourceMeters, &state.resource_meters)
            .await;
        self.cache.write(account, CacheKind::Delegations, &delegations).await;
    }

    async fn refresh_with(&self, kind: RefreshKind) -> WalletResult<SyncOutcome> {
        let (generation, account, has_snapshot) = {
            let data = self.data.lock();
            (data.generation, data.account.clone(), data.snapshot.is_some())
        };
        let Some(_guard) = InFlightGuard::acquire(&self.refresh_in_flight, generation) else {
            debug!(generation = generation.value(), ?kind, "Refresh already in flight, skipping");
            return Ok(SyncOutcome::Skipped);
        };
        let Some(account) = account else {
            return Ok(SyncOutcome::Skipped);
        };
        debug!(account = %account, generation = generation.value(), ?kind, "Refreshing");

        match kind {
            RefreshKind::Full => self.fetch_full(&account, generation, false).await.map(|outcome| {
                if outcome == SyncOutcome::Completed {
                    self.publish(generation, |s| {
                        s.error = None;
                        s.set_stage(LoadingStage::Ready);
                    });
                }
                outcome
            }),
            _ if !has_snapshot => Ok(SyncOutcome::Skipped),
            RefreshKind::PriceAndMeters => {
                let (price, inputs) =
                    tokio::join!(self.chain.get_price(), self.fetch_meter_inputs(&account));
                let price = self.resolve_price(&account, generation, price).await;
                self.with_data(generation, |data| {
                    if let Some(snapshot) = data.snapshot.as_mut() {
                        snapshot.price = price;
                    }
                });
                Ok(self.merge_and_publish(&account, generation, None, Some(inputs), false))
            }
            RefreshKind::PriceOnly => {
                let price = self.chain.get_price().await;
                let price = self.resolve_price(&account, generation, price).await;
                self.with_data(generation, |data| {
                    if let Some(snapshot) = data.snapshot.as_mut() {
                        snapshot.price = price;
                    }
                });
                Ok(self.merge_and_publish(&account, generation, None, None, false))
            }
        }
    }

    fn recompute_meters(&self, generation: Generation) -> bool {
        let now = self.clock.now_secs();
        let Some(meters) = self.with_data(generation, |data| data.meters(now)) else {
            return false;
        };
        if let Some(meters) = meters {
            return self.publish(generation, |s| s.resource_meters = meters);
        }
        true
    }

    /// Apply a push message for the session that subscribed under `generation`.
    fn apply_push(&self, generation: Generation, envelope: &PushEnvelope) {
        let update = match decode_push(envelope) {
            Ok(update) => update,
            Err(e) => {
                warn!(topic = %envelope.topic, error = %e, "Ignoring malformed push message");
                return;
            }
        };
        let now_ms = self.clock.now_ms();
        let derived = self.with_data(generation, |data| {
            match update {
                PushUpdate::Ratio(ratio) => data.vesting_ratio = Some(ratio),
                PushUpdate::Price(price) => {
                    if let Some(snapshot) = data.snapshot.as_mut() {
                        snapshot.price = Some(price);
                    }
                }
                PushUpdate::Patch(patch) => {
                    if let Some(snapshot) = data.snapshot.as_mut() {
                        snapshot.apply_patch(patch);
                    }
                }
                PushUpdate::PowerMeter(meter) => {
                    if let Some(snapshot) = data.snapshot.as_mut() {
                        apply_power_meter(snapshot, meter);
                    }
                }
            }
            (data.account.clone(), data.view().zip(data.meters(now_ms / 1_000)))
        });
        let Some((Some(account), Some((view, meters)))) = derived else {
            return;
        };
        let published = self.publish(generation, |s| {
            s.wallet_view = view.clone();
            s.resource_meters = meters.clone();
            s.last_updated_ms = now_ms;
        });
        if !published {
            return;
        }
        debug!(account = %account, topic = %envelope.topic, "Applied push update");

        let cache = self.cache.clone();
        tokio::spawn(async move {
            cache.write(&account, CacheKind::WalletView, &view).await;
            cache.write(&account, CacheKind::ResourceMeters, &meters).await;
        });
    }
}

enum PushUpdate {
    Patch(wallet_core::AccountPatch),
    PowerMeter(AccountSnapshot),
    Price(PriceRatio),
    Ratio(VestingRatio),
}

fn decode_push(envelope: &PushEnvelope) -> WalletResult<PushUpdate> {
    let payload: Value = envelope.payload.clone();
    match envelope.topic {
        Topic::AccountUpdate => Ok(PushUpdate::Patch(
            from_value::<RawAccountPatch>("account-update", payload)?.into_patch()?,
        )),
        Topic::PowerMeter => Ok(PushUpdate::PowerMeter(
            from_value::<RawPowerMeter>("power-meter", payload)?.into_snapshot()?,
        )),
        Topic::Ticker => {
            let ticker: RawTicker = from_value("ticker", payload)?;
            Ok(PushUpdate::Price(PriceRatio::from_decimal(&ticker.latest)?))
        }
        Topic::GlobalProperties => Ok(PushUpdate::Ratio(
            from_value::<RawGlobalProperties>("global-properties", payload)?.into_ratio()?,
        )),
        other => Err(WalletError::decode(
            "topic",
            format!("{other} is not consumed by the sync engine"),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CacheConfig;
    use serde_json::json;
    use wallet_core::effects::CacheStorage;
    use wallet_effects::{MemoryCacheStorage, MemoryKeyStore};
    use wallet_testkit::{fixtures, ManualClock, MockChain};

    const NOW_MS: u64 = 1_700_000_000_000;

    struct Harness {
        coordinator: SyncCoordinator,
        chain: MockChain,
        storage: MemoryCacheStorage,
        clock: Arc<ManualClock>,
    }

    fn harness() -> Harness {
        let chain = MockChain::new();
        chain.add_account(fixtures::account("alice"));
        let storage = MemoryCacheStorage::new();
        let clock = Arc::new(ManualClock::new(NOW_MS));
        let keys = MemoryKeyStore::new();
        keys.insert(alice(), KeyRole::Posting);
        let cache = CacheStore::new(Arc::new(storage.clone()), clock.clone(), CacheConfig::default());
        let coordinator = SyncCoordinator::new(
            ChainClient::new(Arc::new(chain.clone())),
            ChannelManager::disabled(),
            cache,
            clock.clone(),
            Arc::new(keys),
            Arc::new(StatePublisher::new()),
            RefreshConfig::default(),
        );
        Harness {
            coordinator,
            chain,
            storage,
            clock,
        }
    }

    fn alice() -> AccountKey {
        AccountKey::parse("alice").unwrap()
    }

    #[tokio::test]
    async fn pipeline_publishes_ready_state() {
        let h = harness();
        let generation = h.coordinator.begin_session(&alice());
        let outcome = h.coordinator.run_pipeline(&alice(), generation).await.unwrap();
        assert_eq!(outcome, SyncOutcome::Completed);

        let state = h.coordinator.publisher().snapshot();
        assert_eq!(state.loading_stage, LoadingStage::Ready);
        assert_eq!(state.loading_progress, 100);
        assert_eq!(state.wallet_view.steem, "10.000 STEEM");
        assert_eq!(state.wallet_view.key_roles, vec![KeyRole::Posting]);
        assert!(state.resource_meters.resource_credits > 0.0);
        assert_eq!(state.last_updated_ms, NOW_MS);
        assert!(state.error.is_none());
    }

    #[tokio::test]
    async fn missing_account_is_an_error() {
        let h = harness();
        let bob = AccountKey::parse("bob").unwrap();
        let generation = h.coordinator.begin_session(&bob);
        let err = h.coordinator.run_pipeline(&bob, generation).await.unwrap_err();
        assert!(err.is_fatal());

        h.coordinator.fail_session(generation, &err);
        let state = h.coordinator.publisher().snapshot();
        assert_eq!(state.loading_stage, LoadingStage::Error);
        assert_eq!(state.wallet_view, WalletView::default());
        assert!(state.error.unwrap().contains("bob"));
    }

    #[tokio::test]
    async fn secondary_failures_degrade() {
        let h = harness();
        h.chain.fail_method(wallet_core::client::methods::GET_VESTING_DELEGATIONS);
        h.chain.fail_method(wallet_core::client::methods::FIND_RC_ACCOUNTS);
        h.chain.fail_method(wallet_core::client::methods::GET_REWARD_FUND);

        let generation = h.coordinator.begin_session(&alice());
        let outcome = h.coordinator.run_pipeline(&alice(), generation).await.unwrap();
        assert_eq!(outcome, SyncOutcome::Completed);

        let state = h.coordinator.publisher().snapshot();
        assert_eq!(state.loading_stage, LoadingStage::Ready);
        assert_eq!(state.wallet_view.steem, "10.000 STEEM");
        assert!(state.wallet_view.delegations.is_empty());
        assert_eq!(state.resource_meters.resource_credits, 0.0);
        assert_eq!(state.resource_meters.full_vote_value, 0.0);
    }

    #[tokio::test]
    async fn superseded_pipeline_publishes_nothing() {
        let h = harness();
        let first = h.coordinator.begin_session(&alice());
        let second = h.coordinator.begin_session(&alice());
        let outcome = h.coordinator.run_pipeline(&alice(), first).await.unwrap();
        assert_eq!(outcome, SyncOutcome::Superseded);

        let state = h.coordinator.publisher().snapshot();
        assert_eq!(state.generation, second.value());
        assert_eq!(state.loading_stage, LoadingStage::Idle);
        assert_eq!(state.wallet_view, WalletView::default());
    }

    #[tokio::test]
    async fn seed_paints_cached_view() {
        let h = harness();
        let mut cached = WalletView::default();
        cached.steem = "99.000 STEEM".into();
        let cache = CacheStore::new(Arc::new(h.storage.clone()), h.clock.clone(), CacheConfig::default());
        cache.write(&alice(), CacheKind::WalletView, &cached).await;

        h.chain.set_delay(std::time::Duration::from_millis(50));
        let generation = h.coordinator.begin_session(&alice());
        let mut rx = h.coordinator.publisher().subscribe();
        let coordinator = h.coordinator.clone();
        let task = tokio::spawn(async move { coordinator.run_pipeline(&alice(), generation).await });

        rx.wait_for(|s| s.loading_stage == LoadingStage::CoreFetch).await.unwrap();
        assert_eq!(rx.borrow().wallet_view.steem, "99.000 STEEM");
        task.await.unwrap().unwrap();
        assert_eq!(h.coordinator.publisher().snapshot().wallet_view.steem, "10.000 STEEM");
    }

    #[tokio::test]
    async fn pipeline_writes_through_to_cache() {
        let h = harness();
        let generation = h.coordinator.begin_session(&alice());
        h.coordinator.run_pipeline(&alice(), generation).await.unwrap();
        for key in ["alice/wallet-view", "alice/resource-meters", "alice/delegations", "alice/price"] {
            assert!(h.storage.get(key).await.unwrap().is_some(), "{key}");
        }
    }

    #[tokio::test]
    async fn price_only_refresh_skips_account_fetch() {
        let h = harness();
        let generation = h.coordinator.begin_session(&alice());
        h.coordinator.run_pipeline(&alice(), generation).await.unwrap();
        h.chain.clear_calls();

        let outcome = h.coordinator.refresh_with(RefreshKind::PriceOnly).await.unwrap();
        assert_eq!(outcome, SyncOutcome::Completed);
        assert_eq!(h.chain.call_count(wallet_core::client::methods::GET_ACCOUNTS), 0);
        assert_eq!(h.chain.call_count(wallet_core::client::methods::GET_TICKER), 1);
    }

    #[tokio::test]
    async fn refresh_without_session_is_skipped() {
        let h = harness();
        assert_eq!(h.coordinator.refresh(true).await.unwrap(), SyncOutcome::Skipped);
    }

    #[tokio::test(start_paused = true)]
    async fn refresh_for_old_session_does_not_block_new_one() {
        let h = harness();
        let old = h.coordinator.begin_session(&alice());
        h.coordinator.run_pipeline(&alice(), old).await.unwrap();

        h.chain.set_delay(std::time::Duration::from_secs(1));
        let stale = tokio::spawn({
            let coordinator = h.coordinator.clone();
            async move { coordinator.refresh(true).await }
        });
        tokio::task::yield_now().await;
        assert_eq!(h.coordinator.refresh(true).await.unwrap(), SyncOutcome::Skipped);

        h.coordinator.begin_session(&alice());
        let current = tokio::spawn({
            let coordinator = h.coordinator.clone();
            async move { coordinator.refresh(true).await }
        });
        tokio::task::yield_now().await;
        // the old refresh finishing must not release the new one's guard
        assert_eq!(stale.await.unwrap().unwrap(), SyncOutcome::Superseded);
        assert_eq!(h.coordinator.refresh(true).await.unwrap(), SyncOutcome::Skipped);
        assert_eq!(current.await.unwrap().unwrap(), SyncOutcome::Completed);
    }

    #[tokio::test]
    async fn account_patch_updates_balances() {
        let h = harness();
        let generation = h.coordinator.begin_session(&alice());
        h.coordinator.run_pipeline(&alice(), generation).await.unwrap();

        h.coordinator.inner.apply_push(
            generation,
            &PushEnvelope {
                topic: Topic::AccountUpdate,
                account: Some(alice()),
                payload: json!({ "balance": "42.000 STEEM" }),
            },
        );
        let state = h.coordinator.publisher().snapshot();
        assert_eq!(state.wallet_view.steem, "42.000 STEEM");
        assert_eq!(state.wallet_view.sbd, "2.500 SBD");
    }

    #[tokio::test]
    async fn power_meter_push_carries_vesting_with_mana() {
        let h = harness();
        let generation = h.coordinator.begin_session(&alice());
        h.coordinator.run_pipeline(&alice(), generation).await.unwrap();
        let before = h.coordinator.publisher().snapshot();
        assert_eq!(before.resource_meters.voting_power, 50.0);

        // Powered down to 500 VESTS, so the same mana is now a full bar.
        let mut payload = fixtures::power_meter("alice");
        payload["account"]["vesting_shares"] = json!("500.000000 VESTS");
        payload["account"]["voting_manabar"]["current_mana"] = json!("500000000");
        h.coordinator.inner.apply_push(
            generation,
            &PushEnvelope {
                topic: Topic::PowerMeter,
                account: Some(alice()),
                payload,
            },
        );

        let after = h.coordinator.publisher().snapshot();
        assert_eq!(after.resource_meters.voting_power, 100.0);
        assert_eq!(after.resource_meters.recharge_times.voting, "Full");
        assert_ne!(after.wallet_view.steem_power, before.wallet_view.steem_power);
        assert_ne!(
            after.wallet_view.effective_steem_power,
            before.wallet_view.effective_steem_power
        );
    }

    #[tokio::test]
    async fn stale_push_is_ignored() {
        let h = harness();
        let old = h.coordinator.begin_session(&alice());
        h.coordinator.run_pipeline(&alice(), old).await.unwrap();
        h.coordinator.begin_session(&alice());

        h.coordinator.inner.apply_push(
            old,
            &PushEnvelope {
                topic: Topic::AccountUpdate,
                account: Some(alice()),
                payload: json!({ "balance": "42.000 STEEM" }),
            },
        );
        assert_eq!(h.coordinator.publisher().snapshot().wallet_view, WalletView::default());
    }

    #[tokio::test]
    async fn meter_tick_regenerates() {
        let h = harness();
        let generation = h.coordinator.begin_session(&alice());
        h.coordinator.run_pipeline(&alice(), generation).await.unwrap();
        let before = h.coordinator.publisher().snapshot().resource_meters.voting_power;

        h.clock.advance(std::time::Duration::from_secs(3_600));
        assert!(h.coordinator.recompute_meters(generation));
        let after = h.coordinator.publisher().snapshot().resource_meters.voting_power;
        assert!(after > before, "{after} <= {before}");
    }
}
