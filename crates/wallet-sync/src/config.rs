//! Sync engine configuration
//!
//! Every section is `#[serde(default)]`, so a TOML file only needs the keys
//! it changes. Values are then overridden from `WALLET_SYNC_*` environment
//! variables and validated before the engine is built.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use wallet_core::{WalletError, WalletResult};

const ENV_PREFIX: &str = "WALLET_SYNC_";

/// Complete engine configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    pub network: NetworkConfig,
    pub refresh: RefreshConfig,
    pub cache: CacheConfig,
    pub reconnect: ReconnectConfig,
}

/// Node endpoints and request limits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// RPC nodes in failover order
    pub rpc_nodes: Vec<String>,
    /// Push channel endpoint; pull-only when unset
    pub push_endpoint: Option<String>,
    /// Per-request timeout for pull queries
    pub request_timeout_secs: u64,
    /// Push channel connect timeout
    pub connect_timeout_secs: u64,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            rpc_nodes: vec!["https://api.steemit.com".to_string()],
            push_endpoint: None,
            request_timeout_secs: 10,
            connect_timeout_secs: 10,
        }
    }
}

impl NetworkConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }
}

/// Timer cadences.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RefreshConfig {
    /// Full pull refresh while the push channel is down
    pub pull_interval_secs: u64,
    /// Price-only refresh while the push channel is up
    pub push_interval_secs: u64,
    /// Meter recompute without network calls
    pub meter_tick_secs: u64,
    /// Delay before a finished switch releases its in-flight guard
    pub switch_grace_ms: u64,
    /// How long a one-shot channel request waits before falling back to pull
    pub channel_request_timeout_ms: u64,
}

impl Default for RefreshConfig {
    fn default() -> Self {
        Self {
            pull_interval_secs: 30,
            push_interval_secs: 60,
            meter_tick_secs: 15,
            switch_grace_ms: 500,
            channel_request_timeout_ms: 3_000,
        }
    }
}

impl RefreshConfig {
    pub fn pull_interval(&self) -> Duration {
        Duration::from_secs(self.pull_interval_secs)
    }

    pub fn push_interval(&self) -> Duration {
        Duration::from_secs(self.push_interval_secs)
    }

    pub fn meter_tick(&self) -> Duration {
        Duration::from_secs(self.meter_tick_secs)
    }

    pub fn switch_grace(&self) -> Duration {
        Duration::from_millis(self.switch_grace_ms)
    }

    pub fn channel_request_timeout(&self) -> Duration {
        Duration::from_millis(self.channel_request_timeout_ms)
    }
}

/// Per-kind cache TTLs and optional persistence file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub wallet_view_ttl_secs: u64,
    pub resource_meters_ttl_secs: u64,
    pub delegations_ttl_secs: u64,
    pub price_ttl_secs: u64,
    /// JSON file backing the cache; in-memory when unset
    pub path: Option<PathBuf>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            wallet_view_ttl_secs: 30,
            resource_meters_ttl_secs: 30,
            delegations_ttl_secs: 300,
            price_ttl_secs: 60,
            path: None,
        }
    }
}

/// Push channel reconnect backoff.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconnectConfig {
    /// Delay before the first retry
    pub base_delay_ms: u64,
    /// Upper bound for any retry delay
    pub max_delay_ms: u64,
    /// Growth factor per failed attempt
    pub multiplier: f64,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            base_delay_ms: 1_000,
            max_delay_ms: 60_000,
            multiplier: 2.0,
        }
    }
}

impl ReconnectConfig {
    /// Delay before retry number `attempt` (1-based), capped at `max_delay_ms`.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(63) as i32;
        let delay = self.base_delay_ms as f64 * self.multiplier.powi(exponent);
        let capped = if delay.is_finite() {
            delay.min(self.max_delay_ms as f64)
        } else {
            self.max_delay_ms as f64
        };
        Duration::from_millis(capped as u64)
    }
}

impl SyncConfig {
    /// Load from a TOML file.
    pub fn load_from_file(path: &Path) -> WalletResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            WalletError::config(format!("failed to read {}: {e}", path.display()))
        })?;
        toml::from_str(&content)
            .map_err(|e| WalletError::config(format!("invalid config {}: {e}", path.display())))
    }

    /// Apply `WALLET_SYNC_*` overrides from the process environment.
    pub fn merge_with_env(&mut self) -> WalletResult<()> {
        self.merge_with_vars(std::env::vars())
    }

    /// Apply `WALLET_SYNC_*` overrides from an explicit variable list.
    pub fn merge_with_vars<I, K, V>(&mut self, vars: I) -> WalletResult<()>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        for (key, value) in vars {
            let Some(name) = key.as_ref().strip_prefix(ENV_PREFIX) else {
                continue;
            };
            let value = value.as_ref();
            match name {
                "RPC_NODES" => {
                    self.network.rpc_nodes = value
                        .split(',')
                        .map(str::trim)
                        .filter(|s| !s.is_empty())
                        .map(str::to_string)
                        .collect();
                }
                "PUSH_ENDPOINT" => {
                    self.network.push_endpoint =
                        Some(value.to_string()).filter(|s| !s.is_empty());
                }
                "REQUEST_TIMEOUT_SECS" => {
                    self.network.request_timeout_secs = parse_number(name, value)?;
                }
                "PULL_INTERVAL_SECS" => {
                    self.refresh.pull_interval_secs = parse_number(name, value)?;
                }
                "PUSH_INTERVAL_SECS" => {
                    self.refresh.push_interval_secs = parse_number(name, value)?;
                }
                "METER_TICK_SECS" => self.refresh.meter_tick_secs = parse_number(name, value)?,
                "CACHE_PATH" => self.cache.path = Some(PathBuf::from(value)),
                _ => tracing::debug!(variable = %key.as_ref(), "Ignoring unknown config override"),
            }
        }
        Ok(())
    }

    /// Check invariants the engine relies on.
    pub fn validate(&self) -> WalletResult<()> {
        if self.network.rpc_nodes.is_empty() {
            return Err(WalletError::config("network.rpc_nodes must not be empty"));
        }
        for node in &self.network.rpc_nodes {
            url::Url::parse(node)
                .map_err(|e| WalletError::config(format!("invalid rpc node {node:?}: {e}")))?;
        }
        if let Some(endpoint) = &self.network.push_endpoint {
            url::Url::parse(endpoint).map_err(|e| {
                WalletError::config(format!("invalid push endpoint {endpoint:?}: {e}"))
            })?;
        }
        let intervals = [
            ("network.request_timeout_secs", self.network.request_timeout_secs),
            ("refresh.pull_interval_secs", self.refresh.pull_interval_secs),
            ("refresh.push_interval_secs", self.refresh.push_interval_secs),
            ("refresh.meter_tick_secs", self.refresh.meter_tick_secs),
            ("reconnect.base_delay_ms", self.reconnect.base_delay_ms),
        ];
        if let Some((name, _)) = intervals.iter().find(|(_, value)| *value == 0) {
            return Err(WalletError::config(format!("{name} must be greater than zero")));
        }
        if self.reconnect.max_delay_ms < self.reconnect.base_delay_ms {
            return Err(WalletError::config(
                "reconnect.max_delay_ms must be at least reconnect.base_delay_ms",
            ));
        }
        if self.reconnect.multiplier.is_nan() || self.reconnect.multiplier < 1.0 {
            return Err(WalletError::config("reconnect.multiplier must be at least 1.0"));
        }
        Ok(())
    }

    pub fn builder() -> SyncConfigBuilder {
        SyncConfigBuilder::default()
    }
}

fn parse_number(name: &str, value: &str) -> WalletResult<u64> {
    value
        .trim()
        .parse()
        .map_err(|e| WalletError::config(format!("{ENV_PREFIX}{name}={value:?}: {e}")))
}

/// Builder for [`SyncConfig`]
#[derive(Debug, Default)]
pub struct SyncConfigBuilder {
    config: SyncConfig,
}

impl SyncConfigBuilder {
    /// Replace the RPC node list
    pub fn with_rpc_nodes<I, S>(mut self, nodes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.config.network.rpc_nodes = nodes.into_iter().map(Into::into).collect();
        self
    }

    /// Set the push channel endpoint
    pub fn with_push_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.config.network.push_endpoint = Some(endpoint.into());
        self
    }

    /// Set pull and push refresh cadences
    pub fn with_refresh_intervals(mut self, pull: Duration, push: Duration) -> Self {
        self.config.refresh.pull_interval_secs = pull.as_secs();
        self.config.refresh.push_interval_secs = push.as_secs();
        self
    }

    /// Set the meter recompute tick
    pub fn with_meter_tick(mut self, tick: Duration) -> Self {
        self.config.refresh.meter_tick_secs = tick.as_secs();
        self
    }

    /// Set the switch guard grace delay
    pub fn with_switch_grace(mut self, grace: Duration) -> Self {
        self.config.refresh.switch_grace_ms = grace.as_millis().try_into().unwrap_or(u64::MAX);
        self
    }

    /// Persist the cache to a JSON file
    pub fn with_cache_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.cache.path = Some(path.into());
        self
    }

    /// Set reconnect backoff bounds
    pub fn with_reconnect(mut self, reconnect: ReconnectConfig) -> Self {
        self.config.reconnect = reconnect;
        self
    }

    /// Validate and return the configuration
    pub fn build(self) -> WalletResult<SyncConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}
