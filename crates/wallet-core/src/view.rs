//! Display-ready wallet view.

use num_bigint::BigInt;
use num_traits::{Signed, ToPrimitive, Zero};
use serde::{Deserialize, Serialize};

use crate::account::KeyRole;
use crate::amount::{format_units, Asset, AssetSymbol, PriceRatio, VestingRatio};
use crate::snapshot::{AccountSnapshot, Delegation};

const STEEM_PRECISION: u32 = 3;

/// Outgoing delegation as shown to the user.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DelegationView {
    pub delegatee: String,
    /// e.g. `"1000.000000 VESTS"`
    pub vesting_shares: String,
    /// e.g. `"500.000 SP"`
    pub steem_power: String,
    pub min_delegation_time: String,
}

/// Formatted balances, valuation and reputation for one account.
///
/// The [`Default`] value is the safe view published while no account data is
/// available: every balance is zero and every list is empty.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct WalletView {
    pub steem: String,
    pub sbd: String,
    pub savings_steem: String,
    pub savings_sbd: String,
    /// Own vesting as STEEM POWER
    pub steem_power: String,
    pub received_steem_power: String,
    pub delegated_steem_power: String,
    /// Own + received − delegated
    pub effective_steem_power: String,
    /// SBD per STEEM, 0 when unknown
    pub price: f64,
    /// Estimated USD value (SBD is treated as 1 USD)
    pub usd_value: f64,
    pub reputation: f64,
    pub delegations: Vec<DelegationView>,
    /// Roles with a key in the secure key store
    pub key_roles: Vec<KeyRole>,
}

impl Default for WalletView {
    fn default() -> Self {
        let steem = Asset::zero(AssetSymbol::Steem).to_string();
        let sbd = Asset::zero(AssetSymbol::Sbd).to_string();
        let sp = format_sp(&BigInt::zero());
        Self {
            steem: steem.clone(),
            sbd: sbd.clone(),
            savings_steem: steem,
            savings_sbd: sbd,
            steem_power: sp.clone(),
            received_steem_power: sp.clone(),
            delegated_steem_power: sp.clone(),
            effective_steem_power: sp,
            price: 0.0,
            usd_value: 0.0,
            reputation: reputation_score(&BigInt::zero()),
            delegations: Vec::new(),
            key_roles: Vec::new(),
        }
    }
}

impl WalletView {
    /// Derive the view from a snapshot.
    ///
    /// Without a vesting ratio every STEEM POWER figure is zero; without a
    /// price the USD value only counts SBD.
    pub fn derive(
        snapshot: &AccountSnapshot,
        vesting_ratio: Option<&VestingRatio>,
        delegations: &[Delegation],
        key_roles: Vec<KeyRole>,
    ) -> Self {
        let to_steem = |vests: &BigInt| {
            vesting_ratio.map_or_else(BigInt::zero, |ratio| ratio.vests_to_steem(vests))
        };
        let vesting = &snapshot.vesting;
        let own_sp = to_steem(&vesting.own);
        let received_sp = to_steem(&vesting.received);
        let delegated_sp = to_steem(&vesting.delegated);
        let effective_sp = to_steem(&(&vesting.own + &vesting.received - &vesting.delegated));

        let balances = &snapshot.balances;
        let usd_value = usd_value(
            &(&balances.steem.amount + &balances.savings_steem.amount + &own_sp),
            &(&balances.sbd.amount + &balances.savings_sbd.amount),
            snapshot.price.as_ref(),
        );

        Self {
            steem: balances.steem.to_string(),
            sbd: balances.sbd.to_string(),
            savings_steem: balances.savings_steem.to_string(),
            savings_sbd: balances.savings_sbd.to_string(),
            steem_power: format_sp(&own_sp),
            received_steem_power: format_sp(&received_sp),
            delegated_steem_power: format_sp(&delegated_sp),
            effective_steem_power: format_sp(&effective_sp),
            price: snapshot.price.as_ref().map_or(0.0, PriceRatio::to_f64),
            usd_value,
            reputation: reputation_score(&snapshot.reputation),
            delegations: delegations
                .iter()
                .map(|d| DelegationView {
                    delegatee: d.delegatee.clone(),
                    vesting_shares: d.vesting_shares.to_string(),
                    steem_power: format_sp(&to_steem(&d.vesting_shares.amount)),
                    min_delegation_time: d.min_delegation_time.clone(),
                })
                .collect(),
            key_roles,
        }
    }
}

fn format_sp(milli_steem: &BigInt) -> String {
    format!("{} SP", format_units(milli_steem, STEEM_PRECISION))
}

/// `steem × price + sbd`, both inputs in milli-units.
fn usd_value(steem_units: &BigInt, sbd_units: &BigInt, price: Option<&PriceRatio>) -> f64 {
    let steem_as_sbd = match (price, steem_units.to_biguint()) {
        (Some(price), Some(steem)) => BigInt::from(price.steem_to_sbd(&steem)),
        _ => BigInt::zero(),
    };
    (steem_as_sbd + sbd_units).to_f64().unwrap_or(0.0) / 1_000.0
}

/// Chain reputation score: `sign × max(log10|raw| − 9, 0) × 9 + 25`.
pub fn reputation_score(raw: &BigInt) -> f64 {
    if raw.is_zero() {
        return 25.0;
    }
    let magnitude = raw.abs().to_f64().unwrap_or(f64::MAX);
    let score = (magnitude.log10() - 9.0).max(0.0) * 9.0;
    let signed = if raw.is_negative() { -score } else { score };
    signed + 25.0
}
