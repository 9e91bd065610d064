//! Scripted chain node
//!
//! Answers the JSON-RPC methods the wallet uses from in-memory fixtures.
//! Every call is logged before it is answered, so tests can assert on which
//! queries a refresh issued.

use std::collections::{BTreeMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use wallet_core::client::methods;
use wallet_core::effects::JsonRpcTransport;
use wallet_core::{WalletError, WalletResult};

use crate::fixtures;

/// One logged call.
#[derive(Clone, Debug, PartialEq)]
pub struct RecordedCall {
    pub method: String,
    pub params: Value,
}

struct ChainState {
    accounts: BTreeMap<String, Value>,
    rc_accounts: BTreeMap<String, Value>,
    delegations: BTreeMap<String, Vec<Value>>,
    global_properties: Value,
    reward_fund: Value,
    ticker: Value,
    median_price: Value,
    failing: HashSet<String>,
    delay: Duration,
    calls: Vec<RecordedCall>,
}

impl Default for ChainState {
    fn default() -> Self {
        Self {
            accounts: BTreeMap::new(),
            rc_accounts: BTreeMap::new(),
            delegations: BTreeMap::new(),
            global_properties: fixtures::global_properties(),
            reward_fund: fixtures::reward_fund(),
            ticker: fixtures::ticker("0.2500"),
            median_price: fixtures::median_price(),
            failing: HashSet::new(),
            delay: Duration::ZERO,
            calls: Vec::new(),
        }
    }
}

/// In-memory node. Clones share state.
#[derive(Clone, Default)]
pub struct MockChain {
    state: Arc<Mutex<ChainState>>,
}

impl MockChain {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an account object, with a matching RC record.
    pub fn add_account(&self, account: Value) {
        let name = account["name"].as_str().unwrap_or_default().to_string();
        let mut state = self.state.lock().unwrap();
        state
            .rc_accounts
            .entry(name.clone())
            .or_insert_with(|| fixtures::rc_account(&name));
        state.accounts.insert(name, account);
    }

    /// Replace an account object, leaving its RC record alone.
    pub fn set_account(&self, account: Value) {
        let name = account["name"].as_str().unwrap_or_default().to_string();
        self.state.lock().unwrap().accounts.insert(name, account);
    }

    pub fn remove_account(&self, name: &str) {
        let mut state = self.state.lock().unwrap();
        state.accounts.remove(name);
        state.rc_accounts.remove(name);
    }

    pub fn set_rc_account(&self, rc_account: Value) {
        let name = rc_account["account"].as_str().unwrap_or_default().to_string();
        self.state.lock().unwrap().rc_accounts.insert(name, rc_account);
    }

    pub fn set_delegations(&self, delegator: &str, delegations: Vec<Value>) {
        self.state
            .lock()
            .unwrap()
            .delegations
            .insert(delegator.to_string(), delegations);
    }

    pub fn set_ticker(&self, latest: &str) {
        self.state.lock().unwrap().ticker = fixtures::ticker(latest);
    }

    pub fn set_global_properties(&self, properties: Value) {
        self.state.lock().unwrap().global_properties = properties;
    }

    pub fn set_reward_fund(&self, fund: Value) {
        self.state.lock().unwrap().reward_fund = fund;
    }

    /// Make every call to `method` fail with a transport error.
    pub fn fail_method(&self, method: &str) {
        self.state.lock().unwrap().failing.insert(method.to_string());
    }

    pub fn recover_method(&self, method: &str) {
        self.state.lock().unwrap().failing.remove(method);
    }

    /// Latency applied to every call, on tokio's clock.
    pub fn set_delay(&self, delay: Duration) {
        self.state.lock().unwrap().delay = delay;
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn call_count(&self, method: &str) -> usize {
        self.state
            .lock()
            .unwrap()
            .calls
            .iter()
            .filter(|c| c.method == method)
            .count()
    }

    pub fn clear_calls(&self) {
        self.state.lock().unwrap().calls.clear();
    }

    fn answer(&self, method: &str, params: &Value) -> WalletResult<Value> {
        let state = self.state.lock().unwrap();
        if state.failing.contains(method) {
            return Err(WalletError::transport(method, "injected failure"));
        }
        match method {
            methods::GET_ACCOUNTS => {
                let found: Vec<Value> = params[0]
                    .as_array()
                    .into_iter()
                    .flatten()
                    .filter_map(|name| name.as_str())
                    .filter_map(|name| state.accounts.get(name).cloned())
                    .collect();
                Ok(Value::Array(found))
            }
            methods::FIND_RC_ACCOUNTS => {
                let found: Vec<Value> = params["accounts"]
                    .as_array()
                    .into_iter()
                    .flatten()
                    .filter_map(|name| name.as_str())
                    .filter_map(|name| state.rc_accounts.get(name).cloned())
                    .collect();
                Ok(json!({ "rc_accounts": found }))
            }
            methods::GET_VESTING_DELEGATIONS => {
                let delegator = params[0].as_str().unwrap_or_default();
                Ok(Value::Array(
                    state.delegations.get(delegator).cloned().unwrap_or_default(),
                ))
            }
            methods::GET_DYNAMIC_GLOBAL_PROPERTIES => Ok(state.global_properties.clone()),
            methods::GET_REWARD_FUND => Ok(state.reward_fund.clone()),
            methods::GET_TICKER => Ok(state.ticker.clone()),
            methods::GET_MEDIAN_PRICE => Ok(state.median_price.clone()),
            other => Err(WalletError::transport(other, "method not scripted")),
        }
    }
}

#[async_trait]
impl JsonRpcTransport for MockChain {
    async fn call(&self, method: &str, params: Value) -> WalletResult<Value> {
        let delay = {
            let mut state = self.state.lock().unwrap();
            state.calls.push(RecordedCall {
                method: method.to_string(),
                params: params.clone(),
            });
            state.delay
        };
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        self.answer(method, &params)
    }
}

impl std::fmt::Debug for MockChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock().unwrap();
        f.debug_struct("MockChain")
            .field("accounts", &state.accounts.keys().collect::<Vec<_>>())
            .field("calls", &state.calls.len())
            .finish_non_exhaustive()
    }
}
