//! Decoding of chain JSON into snapshot types.
//!
//! Mana values and reputation arrive either as JSON numbers or as decimal
//! strings depending on the node; both are accepted and kept as [`BigInt`].

use num_bigint::BigInt;
use serde::{Deserialize, Deserializer};
use serde_json::Value;

use crate::account::AccountKey;
use crate::amount::{Asset, AssetSymbol, PriceRatio, VestingRatio};
use crate::errors::{WalletError, WalletResult};
use crate::snapshot::{
    AccountPatch, AccountSnapshot, Balances, Delegation, ManaBar, RcManaBar, RewardFund, Vesting,
};

fn bigint_from_value(value: &Value) -> Result<BigInt, String> {
    match value {
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Ok(BigInt::from(i))
            } else if let Some(u) = n.as_u64() {
                Ok(BigInt::from(u))
            } else {
                Err(format!("non-integer number {n}"))
            }
        }
        Value::String(s) => s.parse::<BigInt>().map_err(|e| format!("{s:?}: {e}")),
        other => Err(format!("expected integer, got {other}")),
    }
}

fn deserialize_bigint<'de, D>(deserializer: D) -> Result<BigInt, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    bigint_from_value(&value).map_err(serde::de::Error::custom)
}

fn deserialize_opt_bigint<'de, D>(deserializer: D) -> Result<Option<BigInt>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    value
        .map(|v| bigint_from_value(&v))
        .transpose()
        .map_err(serde::de::Error::custom)
}

fn asset(field: &str, raw: &str, expected: AssetSymbol) -> WalletResult<Asset> {
    let asset = Asset::parse(raw).map_err(|e| WalletError::decode(field, e.to_string()))?;
    if asset.symbol != expected {
        return Err(WalletError::decode(
            field,
            format!("expected {}, got {raw:?}", expected.ticker()),
        ));
    }
    Ok(asset)
}

fn vests(field: &str, raw: &str) -> WalletResult<BigInt> {
    asset(field, raw, AssetSymbol::Vests).map(|a| a.amount)
}

/// Mana bar as returned by the node.
#[derive(Debug, Clone, Deserialize)]
pub struct RawManaBar {
    #[serde(deserialize_with = "deserialize_bigint")]
    pub current_mana: BigInt,
    pub last_update_time: u64,
}

impl From<RawManaBar> for ManaBar {
    fn from(raw: RawManaBar) -> Self {
        Self {
            current_mana: raw.current_mana,
            last_update_time: raw.last_update_time,
        }
    }
}

/// Account object from `condenser_api.get_accounts`.
#[derive(Debug, Clone, Deserialize)]
pub struct RawAccount {
    pub name: String,
    pub balance: String,
    pub sbd_balance: String,
    pub savings_balance: String,
    pub savings_sbd_balance: String,
    pub vesting_shares: String,
    pub received_vesting_shares: String,
    pub delegated_vesting_shares: String,
    pub vesting_withdraw_rate: String,
    pub voting_manabar: RawManaBar,
    #[serde(default)]
    pub downvote_manabar: Option<RawManaBar>,
    #[serde(default, deserialize_with = "deserialize_opt_bigint")]
    pub reputation: Option<BigInt>,
}

impl RawAccount {
    /// Convert into a snapshot with no RC, reward-fund or price data attached.
    pub fn into_snapshot(self) -> WalletResult<AccountSnapshot> {
        let account = AccountKey::parse(self.name.clone())?;
        Ok(AccountSnapshot {
            account,
            balances: Balances {
                steem: asset("balance", &self.balance, AssetSymbol::Steem)?,
                sbd: asset("sbd_balance", &self.sbd_balance, AssetSymbol::Sbd)?,
                savings_steem: asset("savings_balance", &self.savings_balance, AssetSymbol::Steem)?,
                savings_sbd: asset(
                    "savings_sbd_balance",
                    &self.savings_sbd_balance,
                    AssetSymbol::Sbd,
                )?,
            },
            vesting: Vesting {
                own: vests("vesting_shares", &self.vesting_shares)?,
                received: vests("received_vesting_shares", &self.received_vesting_shares)?,
                delegated: vests("delegated_vesting_shares", &self.delegated_vesting_shares)?,
                withdraw_rate: vests("vesting_withdraw_rate", &self.vesting_withdraw_rate)?,
            },
            voting_manabar: self.voting_manabar.into(),
            downvote_manabar: self.downvote_manabar.map(Into::into).unwrap_or_else(ManaBar::empty),
            rc_manabar: None,
            reward_fund: None,
            price: None,
            reputation: self.reputation.unwrap_or_default(),
        })
    }
}

/// Partial account object carried by `account-update` push messages.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawAccountPatch {
    pub balance: Option<String>,
    pub sbd_balance: Option<String>,
    pub savings_balance: Option<String>,
    pub savings_sbd_balance: Option<String>,
    pub vesting_shares: Option<String>,
    pub received_vesting_shares: Option<String>,
    pub delegated_vesting_shares: Option<String>,
    pub vesting_withdraw_rate: Option<String>,
    pub voting_manabar: Option<RawManaBar>,
    pub downvote_manabar: Option<RawManaBar>,
    #[serde(default, deserialize_with = "deserialize_opt_bigint")]
    pub reputation: Option<BigInt>,
}

impl RawAccountPatch {
    /// Validate and convert; a single malformed field rejects the whole patch.
    pub fn into_patch(self) -> WalletResult<AccountPatch> {
        let steem = |f: &str, v: Option<String>| v.map(|s| asset(f, &s, AssetSymbol::Steem)).transpose();
        let sbd = |f: &str, v: Option<String>| v.map(|s| asset(f, &s, AssetSymbol::Sbd)).transpose();
        let vest = |f: &str, v: Option<String>| v.map(|s| vests(f, &s)).transpose();
        Ok(AccountPatch {
            steem: steem("balance", self.balance)?,
            sbd: sbd("sbd_balance", self.sbd_balance)?,
            savings_steem: steem("savings_balance", self.savings_balance)?,
            savings_sbd: sbd("savings_sbd_balance", self.savings_sbd_balance)?,
            vesting_shares: vest("vesting_shares", self.vesting_shares)?,
            received_vesting_shares: vest("received_vesting_shares", self.received_vesting_shares)?,
            delegated_vesting_shares: vest(
                "delegated_vesting_shares",
                self.delegated_vesting_shares,
            )?,
            vesting_withdraw_rate: vest("vesting_withdraw_rate", self.vesting_withdraw_rate)?,
            voting_manabar: self.voting_manabar.map(Into::into),
            downvote_manabar: self.downvote_manabar.map(Into::into),
            reputation: self.reputation,
        })
    }
}

/// RC account from `rc_api.find_rc_accounts`.
#[derive(Debug, Clone, Deserialize)]
pub struct RawRcAccount {
    pub account: String,
    pub rc_manabar: RawManaBar,
    #[serde(deserialize_with = "deserialize_bigint")]
    pub max_rc: BigInt,
}

impl From<RawRcAccount> for RcManaBar {
    fn from(raw: RawRcAccount) -> Self {
        Self {
            current_mana: raw.rc_manabar.current_mana,
            max_mana: raw.max_rc,
            last_update_time: raw.rc_manabar.last_update_time,
        }
    }
}

/// Envelope of `rc_api.find_rc_accounts`.
#[derive(Debug, Clone, Deserialize)]
pub struct RawRcAccounts {
    pub rc_accounts: Vec<RawRcAccount>,
}

/// Reward fund from `condenser_api.get_reward_fund`.
#[derive(Debug, Clone, Deserialize)]
pub struct RawRewardFund {
    pub reward_balance: String,
    #[serde(deserialize_with = "deserialize_bigint")]
    pub recent_claims: BigInt,
}

impl RawRewardFund {
    /// Validate and convert.
    pub fn into_reward_fund(self) -> WalletResult<RewardFund> {
        Ok(RewardFund {
            reward_balance: asset("reward_balance", &self.reward_balance, AssetSymbol::Steem)?,
            recent_claims: self.recent_claims,
        })
    }
}

/// Median price feed entry (`base` SBD per `quote` STEEM).
#[derive(Debug, Clone, Deserialize)]
pub struct RawPrice {
    pub base: String,
    pub quote: String,
}

impl RawPrice {
    /// Validate and convert.
    pub fn into_ratio(self) -> WalletResult<PriceRatio> {
        let base = asset("price.base", &self.base, AssetSymbol::Sbd)?;
        let quote = asset("price.quote", &self.quote, AssetSymbol::Steem)?;
        PriceRatio::from_assets(&base, &quote)
    }
}

/// Ticker from `condenser_api.get_ticker`.
#[derive(Debug, Clone, Deserialize)]
pub struct RawTicker {
    pub latest: String,
}

/// The subset of dynamic global properties the wallet uses.
#[derive(Debug, Clone, Deserialize)]
pub struct RawGlobalProperties {
    pub total_vesting_fund_steem: String,
    pub total_vesting_shares: String,
}

impl RawGlobalProperties {
    /// Validate and convert.
    pub fn into_ratio(self) -> WalletResult<VestingRatio> {
        Ok(VestingRatio {
            total_vesting_fund_steem: asset(
                "total_vesting_fund_steem",
                &self.total_vesting_fund_steem,
                AssetSymbol::Steem,
            )?,
            total_vesting_shares: asset(
                "total_vesting_shares",
                &self.total_vesting_shares,
                AssetSymbol::Vests,
            )?,
        })
    }
}

/// Delegation entry from `condenser_api.get_vesting_delegations`.
#[derive(Debug, Clone, Deserialize)]
pub struct RawDelegation {
    pub delegatee: String,
    pub vesting_shares: String,
    #[serde(default)]
    pub min_delegation_time: String,
}

impl RawDelegation {
    /// Validate and convert.
    pub fn into_delegation(self) -> WalletResult<Delegation> {
        Ok(Delegation {
            delegatee: self.delegatee,
            vesting_shares: asset("vesting_shares", &self.vesting_shares, AssetSymbol::Vests)?,
            min_delegation_time: self.min_delegation_time,
        })
    }
}

/// Combined payload of the `power-meter` push topic.
#[derive(Debug, Clone, Deserialize)]
pub struct RawPowerMeter {
    pub account: RawAccount,
    pub rc_account: RawRcAccount,
    pub reward_fund: RawRewardFund,
    pub median_price: RawPrice,
}

impl RawPowerMeter {
    /// Convert into a snapshot with every meter input attached.
    pub fn into_snapshot(self) -> WalletResult<AccountSnapshot> {
        let mut snapshot = self.account.into_snapshot()?;
        snapshot.rc_manabar = Some(self.rc_account.into());
        snapshot.reward_fund = Some(self.reward_fund.into_reward_fund()?);
        snapshot.price = Some(self.median_price.into_ratio()?);
        Ok(snapshot)
    }
}

/// Deserialize a JSON value into one of the raw types with a decode error.
pub fn from_value<T: serde::de::DeserializeOwned>(field: &str, value: Value) -> WalletResult<T> {
    serde_json::from_value(value).map_err(|e| WalletError::decode(field, e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn account_json() -> Value {
        json!({
            "name": "alice",
            "balance": "10.000 STEEM",
            "sbd_balance": "2.500 SBD",
            "savings_balance": "1.000 STEEM",
            "savings_sbd_balance": "0.000 SBD",
            "vesting_shares": "1000.000000 VESTS",
            "received_vesting_shares": "0.000000 VESTS",
            "delegated_vesting_shares": "0.000000 VESTS",
            "vesting_withdraw_rate": "0.000000 VESTS",
            "voting_manabar": { "current_mana": "500000000", "last_update_time": 1_700_000_000u64 },
            "downvote_manabar": { "current_mana": 250_000_000u64, "last_update_time": 1_700_000_000u64 },
            "reputation": "95832978796820"
        })
    }

    #[test]
    fn decodes_account_with_mixed_number_encodings() {
        let raw: RawAccount = from_value("account", account_json()).unwrap();
        let snapshot = raw.into_snapshot().unwrap();
        assert_eq!(snapshot.account.as_str(), "alice");
        assert_eq!(snapshot.balances.steem.amount, BigInt::from(10_000));
        assert_eq!(snapshot.vesting.own, BigInt::from(1_000_000_000u64));
        assert_eq!(snapshot.voting_manabar.current_mana, BigInt::from(500_000_000u64));
        assert_eq!(snapshot.downvote_manabar.current_mana, BigInt::from(250_000_000u64));
        assert!(snapshot.rc_manabar.is_none());
    }

    #[test]
    fn wrong_symbol_is_a_decode_error() {
        let mut value = account_json();
        value["balance"] = json!("10.000 SBD");
        let raw: RawAccount = from_value("account", value).unwrap();
        assert!(matches!(raw.into_snapshot(), Err(WalletError::Decode { .. })));
    }

    #[test]
    fn patch_keeps_only_present_fields() {
        let raw: RawAccountPatch =
            from_value("patch", json!({ "balance": "42.000 STEEM" })).unwrap();
        let patch = raw.into_patch().unwrap();
        assert!(patch.steem.is_some());
        assert!(patch.sbd.is_none());
        assert!(patch.voting_manabar.is_none());
    }
}
