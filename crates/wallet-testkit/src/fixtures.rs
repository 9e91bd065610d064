//! Node response fixtures
//!
//! Figures are chosen so derived values are easy to check by hand:
//! `alice`-style accounts hold 10.000 STEEM, 2.500 SBD and 1000 VESTS with
//! voting mana at 50% and RC at 80% as of [`NOW_SECS`].

use serde_json::{json, Value};

/// Timestamp every fixture's mana bars were last updated at.
pub const NOW_SECS: u64 = 1_700_000_000;

/// [`NOW_SECS`] in milliseconds, for a [`ManualClock`](crate::ManualClock).
pub const NOW_MS: u64 = NOW_SECS * 1_000;

/// `condenser_api.get_accounts` entry.
pub fn account(name: &str) -> Value {
    json!({
        "name": name,
        "balance": "10.000 STEEM",
        "sbd_balance": "2.500 SBD",
        "savings_balance": "1.000 STEEM",
        "savings_sbd_balance": "0.000 SBD",
        "vesting_shares": "1000.000000 VESTS",
        "received_vesting_shares": "0.000000 VESTS",
        "delegated_vesting_shares": "0.000000 VESTS",
        "vesting_withdraw_rate": "0.000000 VESTS",
        "voting_manabar": { "current_mana": "500000000", "last_update_time": NOW_SECS },
        "downvote_manabar": { "current_mana": "250000000", "last_update_time": NOW_SECS },
        "reputation": "95832978796820"
    })
}

/// Same as [`account`] with a different liquid STEEM balance.
pub fn account_with_balance(name: &str, balance: &str) -> Value {
    let mut value = account(name);
    value["balance"] = json!(balance);
    value
}

/// `rc_api.find_rc_accounts` entry.
pub fn rc_account(name: &str) -> Value {
    json!({
        "account": name,
        "rc_manabar": { "current_mana": "4000000000", "last_update_time": NOW_SECS },
        "max_rc": "5000000000"
    })
}

/// `condenser_api.get_reward_fund("post")`.
pub fn reward_fund() -> Value {
    json!({
        "name": "post",
        "reward_balance": "800000.000 STEEM",
        "recent_claims": "400000000000000000"
    })
}

/// `condenser_api.get_dynamic_global_properties` subset.
pub fn global_properties() -> Value {
    json!({
        "total_vesting_fund_steem": "180000000.000 STEEM",
        "total_vesting_shares": "340000000000.000000 VESTS"
    })
}

/// `condenser_api.get_ticker`.
pub fn ticker(latest: &str) -> Value {
    json!({ "latest": latest, "lowest_ask": latest, "highest_bid": latest })
}

/// `condenser_api.get_current_median_history_price`.
pub fn median_price() -> Value {
    json!({ "base": "0.250 SBD", "quote": "1.000 STEEM" })
}

/// `condenser_api.get_vesting_delegations` entry.
pub fn delegation(delegator: &str, delegatee: &str, vests: &str) -> Value {
    json!({
        "delegator": delegator,
        "delegatee": delegatee,
        "vesting_shares": vests,
        "min_delegation_time": "2023-11-14T22:13:20"
    })
}

/// Combined `power-meter` push payload.
pub fn power_meter(name: &str) -> Value {
    json!({
        "account": account(name),
        "rc_account": rc_account(name),
        "reward_fund": reward_fund(),
        "median_price": median_price()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use wallet_core::decode::{from_value, RawAccount, RawPowerMeter};

    #[test]
    fn fixtures_decode() {
        let raw: RawAccount = from_value("account", account("alice")).unwrap();
        let snapshot = raw.into_snapshot().unwrap();
        assert_eq!(snapshot.account.as_str(), "alice");

        let raw: RawPowerMeter = from_value("power-meter", power_meter("alice")).unwrap();
        let snapshot = raw.into_snapshot().unwrap();
        assert!(snapshot.rc_manabar.is_some());
        assert!(snapshot.price.is_some());
    }
}
