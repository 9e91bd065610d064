//! Raw account snapshot as fetched from the chain.
//!
//! A snapshot is replaced wholesale by every authoritative fetch. The only
//! in-place mutation is [`AccountSnapshot::apply_patch`], used for partial
//! push updates.

use num_bigint::BigInt;
use num_traits::Zero;
use serde::{Deserialize, Serialize};

use crate::account::AccountKey;
use crate::amount::{Asset, AssetSymbol, PriceRatio};

/// Voting or downvote mana bar. The maximum is derived from vesting power.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManaBar {
    /// Mana stored at `last_update_time`
    pub current_mana: BigInt,
    /// Unix seconds of the last on-chain update
    pub last_update_time: u64,
}

impl ManaBar {
    /// Empty bar.
    pub fn empty() -> Self {
        Self {
            current_mana: BigInt::zero(),
            last_update_time: 0,
        }
    }
}

/// Resource-credit mana bar, which carries its own maximum.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RcManaBar {
    /// Mana stored at `last_update_time`
    pub current_mana: BigInt,
    /// Capacity
    pub max_mana: BigInt,
    /// Unix seconds of the last on-chain update
    pub last_update_time: u64,
}

/// Reward pool figures needed for vote value estimates.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RewardFund {
    /// Pool balance (milli-STEEM)
    pub reward_balance: Asset,
    /// Recent claims (rshares)
    pub recent_claims: BigInt,
}

/// Outgoing vesting delegation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Delegation {
    /// Receiving account
    pub delegatee: String,
    /// Delegated VESTS
    pub vesting_shares: Asset,
    /// Chain timestamp string of the earliest removal
    pub min_delegation_time: String,
}

/// Liquid and savings balances.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Balances {
    /// Liquid STEEM
    pub steem: Asset,
    /// Liquid SBD
    pub sbd: Asset,
    /// STEEM in savings
    pub savings_steem: Asset,
    /// SBD in savings
    pub savings_sbd: Asset,
}

impl Default for Balances {
    fn default() -> Self {
        Self {
            steem: Asset::zero(AssetSymbol::Steem),
            sbd: Asset::zero(AssetSymbol::Sbd),
            savings_steem: Asset::zero(AssetSymbol::Steem),
            savings_sbd: Asset::zero(AssetSymbol::Sbd),
        }
    }
}

/// Vesting position of the account, in micro-VESTS.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Vesting {
    /// Own vesting shares
    pub own: BigInt,
    /// Shares delegated to this account
    pub received: BigInt,
    /// Shares delegated away
    pub delegated: BigInt,
    /// Per-week power-down rate
    pub withdraw_rate: BigInt,
}

impl Default for Vesting {
    fn default() -> Self {
        Self {
            own: BigInt::zero(),
            received: BigInt::zero(),
            delegated: BigInt::zero(),
            withdraw_rate: BigInt::zero(),
        }
    }
}

impl Vesting {
    /// `own + received − delegated − withdraw_rate`, never below zero.
    pub fn effective(&self) -> BigInt {
        let effective = &self.own + &self.received - &self.delegated - &self.withdraw_rate;
        if effective < BigInt::zero() {
            BigInt::zero()
        } else {
            effective
        }
    }
}

/// Everything downstream needs about one account.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountSnapshot {
    /// Account the snapshot belongs to
    pub account: AccountKey,
    /// Liquid and savings balances
    pub balances: Balances,
    /// Vesting shares
    pub vesting: Vesting,
    /// Upvote mana
    pub voting_manabar: ManaBar,
    /// Downvote mana
    pub downvote_manabar: ManaBar,
    /// Resource credits, if the RC query succeeded
    pub rc_manabar: Option<RcManaBar>,
    /// Reward pool figures, if known
    pub reward_fund: Option<RewardFund>,
    /// SBD per STEEM, if known
    pub price: Option<PriceRatio>,
    /// Raw reputation as reported by the chain
    pub reputation: BigInt,
}

impl AccountSnapshot {
    /// Apply a partial push update: present fields replace, absent fields stay.
    pub fn apply_patch(&mut self, patch: AccountPatch) {
        if let Some(v) = patch.steem {
            self.balances.steem = v;
        }
        if let Some(v) = patch.sbd {
            self.balances.sbd = v;
        }
        if let Some(v) = patch.savings_steem {
            self.balances.savings_steem = v;
        }
        if let Some(v) = patch.savings_sbd {
            self.balances.savings_sbd = v;
        }
        if let Some(v) = patch.vesting_shares {
            self.vesting.own = v;
        }
        if let Some(v) = patch.received_vesting_shares {
            self.vesting.received = v;
        }
        if let Some(v) = patch.delegated_vesting_shares {
            self.vesting.delegated = v;
        }
        if let Some(v) = patch.vesting_withdraw_rate {
            self.vesting.withdraw_rate = v;
        }
        if let Some(v) = patch.voting_manabar {
            self.voting_manabar = v;
        }
        if let Some(v) = patch.downvote_manabar {
            self.downvote_manabar = v;
        }
        if let Some(v) = patch.reputation {
            self.reputation = v;
        }
    }
}

/// Partial account update delivered over the push channel.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct AccountPatch {
    pub steem: Option<Asset>,
    pub sbd: Option<Asset>,
    pub savings_steem: Option<Asset>,
    pub savings_sbd: Option<Asset>,
    pub vesting_shares: Option<BigInt>,
    pub received_vesting_shares: Option<BigInt>,
    pub delegated_vesting_shares: Option<BigInt>,
    pub vesting_withdraw_rate: Option<BigInt>,
    pub voting_manabar: Option<ManaBar>,
    pub downvote_manabar: Option<ManaBar>,
    pub reputation: Option<BigInt>,
}

impl AccountPatch {
    /// True when the patch changes nothing.
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}
