//! Published engine state and client-visible events.

use serde::{Deserialize, Serialize};

use crate::account::AccountKey;
use crate::meters::ResourceMeters;
use crate::view::WalletView;

/// Pipeline stage driving the progress indicator.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LoadingStage {
    /// No account selected
    #[default]
    Idle,
    /// Cache seed published
    Seeding,
    /// Account, price and vesting ratio requested
    CoreFetch,
    /// Wallet view derived
    Deriving,
    /// Delegations and meters requested
    SecondaryFetch,
    /// Pipeline finished
    Ready,
    /// Session ended with an error
    Error,
}

impl LoadingStage {
    /// Approximate progress in percent for this stage.
    pub fn progress(self) -> u8 {
        match self {
            Self::Idle | Self::Error => 0,
            Self::Seeding => 10,
            Self::CoreFetch => 40,
            Self::Deriving => 60,
            Self::SecondaryFetch => 85,
            Self::Ready => 100,
        }
    }

    /// True while the pipeline is running.
    pub fn is_loading(self) -> bool {
        matches!(
            self,
            Self::Seeding | Self::CoreFetch | Self::Deriving | Self::SecondaryFetch
        )
    }
}

/// Read-only state handed to consumers.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct PublishedState {
    /// Account the state belongs to
    pub account: Option<AccountKey>,
    /// Session generation that produced this state
    pub generation: u64,
    pub wallet_view: WalletView,
    pub resource_meters: ResourceMeters,
    pub loading_stage: LoadingStage,
    /// 0..=100
    pub loading_progress: u8,
    /// Blocking error message; only set for a missing account
    pub error: Option<String>,
    /// Push channel health
    pub channel_connected: bool,
    /// Unix milliseconds of the last data change
    pub last_updated_ms: u64,
}

impl PublishedState {
    /// Safe default state for a freshly started session.
    pub fn reset(account: Option<AccountKey>, generation: u64, channel_connected: bool) -> Self {
        Self {
            account,
            generation,
            channel_connected,
            ..Self::default()
        }
    }

    /// Move to a pipeline stage, updating the progress figure.
    pub fn set_stage(&mut self, stage: LoadingStage) {
        self.loading_stage = stage;
        self.loading_progress = stage.progress();
    }
}

/// Broadcast after the published state has been reset for a new account.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountSwitched {
    pub old: Option<AccountKey>,
    pub new: AccountKey,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reset_state_carries_no_data() {
        let key = AccountKey::parse("bob").unwrap();
        let state = PublishedState::reset(Some(key.clone()), 7, true);
        assert_eq!(state.account, Some(key));
        assert_eq!(state.generation, 7);
        assert_eq!(state.wallet_view, WalletView::default());
        assert_eq!(state.resource_meters, ResourceMeters::default());
        assert_eq!(state.loading_stage, LoadingStage::Idle);
        assert!(state.error.is_none());
    }

    #[test]
    fn stage_sets_progress() {
        let mut state = PublishedState::default();
        state.set_stage(LoadingStage::Deriving);
        assert_eq!(state.loading_progress, 60);
        assert!(state.loading_stage.is_loading());
        state.set_stage(LoadingStage::Ready);
        assert_eq!(state.loading_progress, 100);
    }
}
