//! Typed chain queries over a [`JsonRpcTransport`].

use std::sync::Arc;

use num_traits::Zero;
use serde_json::json;
use tracing::debug;

use crate::account::AccountKey;
use crate::amount::{PriceRatio, VestingRatio};
use crate::decode::{
    from_value, RawAccount, RawDelegation, RawGlobalProperties, RawPrice, RawRcAccounts,
    RawRewardFund, RawTicker,
};
use crate::effects::JsonRpcTransport;
use crate::errors::{WalletError, WalletResult};
use crate::snapshot::{AccountSnapshot, Delegation, RcManaBar, RewardFund};

/// Chain query methods.
pub mod methods {
    pub const GET_ACCOUNTS: &str = "condenser_api.get_accounts";
    pub const GET_DYNAMIC_GLOBAL_PROPERTIES: &str = "condenser_api.get_dynamic_global_properties";
    pub const GET_REWARD_FUND: &str = "condenser_api.get_reward_fund";
    pub const FIND_RC_ACCOUNTS: &str = "rc_api.find_rc_accounts";
    pub const GET_TICKER: &str = "condenser_api.get_ticker";
    pub const GET_MEDIAN_PRICE: &str = "condenser_api.get_current_median_history_price";
    pub const GET_VESTING_DELEGATIONS: &str = "condenser_api.get_vesting_delegations";
}

const DELEGATION_PAGE: u32 = 100;

/// Pull-side chain client.
#[derive(Clone)]
pub struct ChainClient {
    transport: Arc<dyn JsonRpcTransport>,
}

impl ChainClient {
    pub fn new(transport: Arc<dyn JsonRpcTransport>) -> Self {
        Self { transport }
    }

    /// Authoritative account snapshot without RC, reward-fund or price data.
    ///
    /// An empty result is [`WalletError::NotFound`].
    pub async fn get_account(&self, account: &AccountKey) -> WalletResult<AccountSnapshot> {
        let result = self
            .transport
            .call(methods::GET_ACCOUNTS, json!([[account.as_str()]]))
            .await?;
        let accounts: Vec<RawAccount> = from_value(methods::GET_ACCOUNTS, result)?;
        let raw = accounts
            .into_iter()
            .find(|a| a.name == account.as_str())
            .ok_or_else(|| WalletError::not_found(account.as_str()))?;
        raw.into_snapshot()
    }

    /// Vesting fund / vesting shares ratio.
    pub async fn get_vesting_ratio(&self) -> WalletResult<VestingRatio> {
        let result = self
            .transport
            .call(methods::GET_DYNAMIC_GLOBAL_PROPERTIES, json!([]))
            .await?;
        from_value::<RawGlobalProperties>(methods::GET_DYNAMIC_GLOBAL_PROPERTIES, result)?
            .into_ratio()
    }

    /// The `post` reward fund.
    pub async fn get_reward_fund(&self) -> WalletResult<RewardFund> {
        let result = self
            .transport
            .call(methods::GET_REWARD_FUND, json!(["post"]))
            .await?;
        from_value::<RawRewardFund>(methods::GET_REWARD_FUND, result)?.into_reward_fund()
    }

    /// RC mana bar, `None` when the node has no RC record for the account.
    pub async fn find_rc_account(&self, account: &AccountKey) -> WalletResult<Option<RcManaBar>> {
        let result = self
            .transport
            .call(
                methods::FIND_RC_ACCOUNTS,
                json!({ "accounts": [account.as_str()] }),
            )
            .await?;
        let accounts: RawRcAccounts = from_value(methods::FIND_RC_ACCOUNTS, result)?;
        Ok(accounts
            .rc_accounts
            .into_iter()
            .find(|rc| rc.account == account.as_str())
            .map(Into::into))
    }

    /// SBD per STEEM from the market ticker, falling back to the median feed
    /// when the ticker is unavailable or reports zero.
    pub async fn get_price(&self) -> WalletResult<PriceRatio> {
        match self.get_ticker_price().await {
            Ok(price) if !price.numerator.is_zero() => return Ok(price),
            Ok(_) => debug!("ticker reported zero price, using median feed"),
            Err(e) => debug!(error = %e, "ticker unavailable, using median feed"),
        }
        let result = self
            .transport
            .call(methods::GET_MEDIAN_PRICE, json!([]))
            .await?;
        from_value::<RawPrice>(methods::GET_MEDIAN_PRICE, result)?.into_ratio()
    }

    async fn get_ticker_price(&self) -> WalletResult<PriceRatio> {
        let result = self.transport.call(methods::GET_TICKER, json!([])).await?;
        let ticker: RawTicker = from_value(methods::GET_TICKER, result)?;
        PriceRatio::from_decimal(&ticker.latest)
    }

    /// Outgoing vesting delegations (first page).
    pub async fn get_vesting_delegations(
        &self,
        account: &AccountKey,
    ) -> WalletResult<Vec<Delegation>> {
        let result = self
            .transport
            .call(
                methods::GET_VESTING_DELEGATIONS,
                json!([account.as_str(), "", DELEGATION_PAGE]),
            )
            .await?;
        let raw: Vec<RawDelegation> = from_value(methods::GET_VESTING_DELEGATIONS, result)?;
        raw.into_iter().map(RawDelegation::into_delegation).collect()
    }
}

impl std::fmt::Debug for ChainClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChainClient").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use serde_json::Value;
    use std::collections::HashMap;

    struct Canned(HashMap<&'static str, WalletResult<Value>>);

    #[async_trait]
    impl JsonRpcTransport for Canned {
        async fn call(&self, method: &str, _params: Value) -> WalletResult<Value> {
            self.0
                .get(method)
                .cloned()
                .unwrap_or_else(|| Err(WalletError::transport(method, "no response")))
        }
    }

    fn client(responses: Vec<(&'static str, WalletResult<Value>)>) -> ChainClient {
        ChainClient::new(Arc::new(Canned(responses.into_iter().collect())))
    }

    #[tokio::test]
    async fn empty_account_list_is_not_found() {
        let client = client(vec![(methods::GET_ACCOUNTS, Ok(json!([])))]);
        let alice = AccountKey::parse("alice").unwrap();
        let err = client.get_account(&alice).await.unwrap_err();
        assert_eq!(err, WalletError::not_found("alice"));
    }

    #[tokio::test]
    async fn price_falls_back_to_median_feed() {
        let client = client(vec![
            (
                methods::GET_TICKER,
                Err(WalletError::transport(methods::GET_TICKER, "timeout")),
            ),
            (
                methods::GET_MEDIAN_PRICE,
                Ok(json!({ "base": "0.250 SBD", "quote": "1.000 STEEM" })),
            ),
        ]);
        let price = client.get_price().await.unwrap();
        assert_eq!(price.to_f64(), 0.25);
    }

    #[tokio::test]
    async fn ticker_price_is_preferred() {
        let client = client(vec![(methods::GET_TICKER, Ok(json!({ "latest": "0.3000" })))]);
        assert_eq!(client.get_price().await.unwrap().to_f64(), 0.3);
    }

    #[tokio::test]
    async fn missing_rc_record_is_none() {
        let client = client(vec![(methods::FIND_RC_ACCOUNTS, Ok(json!({ "rc_accounts": [] })))]);
        let alice = AccountKey::parse("alice").unwrap();
        assert!(client.find_rc_account(&alice).await.unwrap().is_none());
    }
}
