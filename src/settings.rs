use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::time::Duration;

/// Per-call deadlines, lifecycle retry cadence and process role.
#[derive(Debug, Deserialize, Clone)]
pub struct PricingSettings {
    /// Delay before retrying a failed adapter init/release. Retries are
    /// unbounded and de-duplicated per adapter.
    #[serde(default = "default_setup_retry_timeout_ms")]
    pub setup_retry_timeout_ms: u64,
    #[serde(default = "default_fetch_pool_identifier_timeout_ms")]
    pub fetch_pool_identifier_timeout_ms: u64,
    #[serde(default = "default_fetch_pool_prices_timeout_ms")]
    pub fetch_pool_prices_timeout_ms: u64,
    /// Replicas skip shared-cache invalidation; exactly one process per
    /// deployment should run as master.
    #[serde(default = "default_false")]
    pub is_slave: bool,
}

fn default_setup_retry_timeout_ms() -> u64 {
    20_000
}
fn default_fetch_pool_identifier_timeout_ms() -> u64 {
    1_000
}
fn default_fetch_pool_prices_timeout_ms() -> u64 {
    3_000
}
fn default_false() -> bool {
    false
}

impl Default for PricingSettings {
    fn default() -> Self {
        Self {
            setup_retry_timeout_ms: default_setup_retry_timeout_ms(),
            fetch_pool_identifier_timeout_ms: default_fetch_pool_identifier_timeout_ms(),
            fetch_pool_prices_timeout_ms: default_fetch_pool_prices_timeout_ms(),
            is_slave: default_false(),
        }
    }
}

impl PricingSettings {
    pub fn setup_retry_timeout(&self) -> Duration {
        Duration::from_millis(self.setup_retry_timeout_ms)
    }
    pub fn fetch_pool_identifier_timeout(&self) -> Duration {
        Duration::from_millis(self.fetch_pool_identifier_timeout_ms)
    }
    pub fn fetch_pool_prices_timeout(&self) -> Duration {
        Duration::from_millis(self.fetch_pool_prices_timeout_ms)
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChainSettings {
    #[serde(default = "default_multicall_batch_size")]
    pub multicall_batch_size: usize,
    #[serde(default = "default_log_poll_interval_ms")]
    pub log_poll_interval_ms: u64,
    /// Pools retain this many blocks of state history.
    #[serde(default = "default_state_retention_blocks")]
    pub state_retention_blocks: u64,
    #[serde(default)]
    pub multicall_address: Option<String>,
    #[serde(default)]
    pub wrapped_native_address: Option<String>,
}

fn default_multicall_batch_size() -> usize {
    100
}
fn default_log_poll_interval_ms() -> u64 {
    1_000
}
fn default_state_retention_blocks() -> u64 {
    256
}

impl Default for ChainSettings {
    fn default() -> Self {
        Self {
            multicall_batch_size: default_multicall_batch_size(),
            log_poll_interval_ms: default_log_poll_interval_ms(),
            state_retention_blocks: default_state_retention_blocks(),
            multicall_address: None,
            wrapped_native_address: None,
        }
    }
}

impl ChainSettings {
    pub fn log_poll_interval(&self) -> Duration {
        Duration::from_millis(self.log_poll_interval_ms)
    }
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Settings {
    #[serde(default)]
    pub pricing: PricingSettings,
    #[serde(default)]
    pub chain: ChainSettings,
}

impl Settings {
    /// Loads `Config.toml` (optional) and applies `PRICING__`-prefixed
    /// environment overrides, e.g. `PRICING__PRICING__IS_SLAVE=true`.
    pub fn new() -> Result<Self, ConfigError> {
        let s = Config::builder()
            .add_source(File::with_name("Config.toml").required(false))
            .add_source(Environment::with_prefix("PRICING").separator("__"))
            .build()?;
        s.try_deserialize()
    }
}
