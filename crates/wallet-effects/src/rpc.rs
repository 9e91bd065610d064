//! HTTP JSON-RPC transport
//!
//! Sends each call to the configured nodes in order and returns the first
//! answer. A node that cannot be reached, times out or answers with a non-2xx
//! status is skipped; an RPC-level `error` member is an authoritative answer
//! and is returned without trying further nodes.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};
use url::Url;
use wallet_core::effects::JsonRpcTransport;
use wallet_core::{WalletError, WalletResult};

#[derive(Debug, Serialize)]
struct JsonRpcRequest<'a> {
    jsonrpc: &'static str,
    id: u64,
    method: &'a str,
    params: Value,
}

#[derive(Debug, Deserialize)]
struct JsonRpcResponse {
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<JsonRpcErrorBody>,
}

#[derive(Debug, Deserialize)]
struct JsonRpcErrorBody {
    #[serde(default)]
    code: i64,
    #[serde(default)]
    message: String,
}

impl JsonRpcResponse {
    fn into_result(self, method: &str) -> WalletResult<Value> {
        match (self.error, self.result) {
            (Some(err), _) => Err(WalletError::transport(
                method,
                format!("rpc error {}: {}", err.code, err.message),
            )),
            (None, Some(result)) => Ok(result),
            (None, None) => Err(WalletError::transport(method, "response has no result")),
        }
    }
}

/// Chain RPC over HTTP POST with ordered node failover.
#[derive(Debug)]
pub struct HttpJsonRpcTransport {
    nodes: Vec<Url>,
    client: reqwest::Client,
    next_id: AtomicU64,
}

impl HttpJsonRpcTransport {
    /// Create a transport for `nodes` with a per-request timeout.
    pub fn new(nodes: Vec<Url>, timeout: Duration) -> WalletResult<Self> {
        if nodes.is_empty() {
            return Err(WalletError::config("at least one RPC node is required"));
        }
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| WalletError::config(format!("failed to create HTTP client: {e}")))?;
        Ok(Self {
            nodes,
            client,
            next_id: AtomicU64::new(1),
        })
    }

    /// Configured nodes in failover order.
    pub fn nodes(&self) -> &[Url] {
        &self.nodes
    }

    async fn call_node(
        &self,
        node: &Url,
        request: &JsonRpcRequest<'_>,
    ) -> WalletResult<JsonRpcResponse> {
        let response = self
            .client
            .post(node.clone())
            .json(request)
            .send()
            .await
            .map_err(|e| {
                let reason = if e.is_timeout() {
                    format!("{node} timed out")
                } else {
                    format!("{node}: {e}")
                };
                WalletError::transport(request.method, reason)
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(WalletError::transport(
                request.method,
                format!("{node} returned {status}"),
            ));
        }
        response.json().await.map_err(|e| {
            WalletError::decode(request.method, format!("invalid response from {node}: {e}"))
        })
    }
}

#[async_trait]
impl JsonRpcTransport for HttpJsonRpcTransport {
    async fn call(&self, method: &str, params: Value) -> WalletResult<Value> {
        let request = JsonRpcRequest {
            jsonrpc: "2.0",
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
            method,
            params,
        };

        let mut last_error = None;
        for node in &self.nodes {
            match self.call_node(node, &request).await {
                Ok(body) => {
                    debug!(method, node = %node, "RPC node answered");
                    return body.into_result(method);
                }
                Err(e) => {
                    warn!(method, node = %node, error = %e, "RPC node failed, trying next");
                    last_error = Some(e);
                }
            }
        }
        Err(last_error.unwrap_or_else(|| WalletError::transport(method, "no nodes configured")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn request_serializes_as_json_rpc() {
        let request = JsonRpcRequest {
            jsonrpc: "2.0",
            id: 3,
            method: "condenser_api.get_accounts",
            params: json!([["alice"]]),
        };
        assert_eq!(
            serde_json::to_value(&request).unwrap(),
            json!({
                "jsonrpc": "2.0",
                "id": 3,
                "method": "condenser_api.get_accounts",
                "params": [["alice"]]
            })
        );
    }

    #[test]
    fn error_member_wins_over_result() {
        let response: JsonRpcResponse = serde_json::from_value(json!({
            "id": 1,
            "error": { "code": -32000, "message": "Assert Exception" }
        }))
        .unwrap();
        let err = response.into_result("condenser_api.get_ticker").unwrap_err();
        assert_eq!(
            err.to_string(),
            "transport error during condenser_api.get_ticker: rpc error -32000: Assert Exception"
        );
    }

    #[test]
    fn empty_node_list_is_rejected() {
        let err = HttpJsonRpcTransport::new(Vec::new(), Duration::from_secs(10)).unwrap_err();
        assert!(matches!(err, WalletError::Config(_)));
    }
}
