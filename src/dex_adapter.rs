//! # DEX Adapter Trait
//!
//! The capability contract every venue implements. The pricing coordinator
//! only ever talks to venues through this surface, so supporting a new
//! protocol means implementing `DexAdapter` and registering the instance in
//! the `DexRegistry` — core fan-out, validation and lifecycle logic stay
//! untouched.
//!
//! ## Capability model
//!
//! Optional operations are modeled as *tagged presence*: an adapter that
//! owns warm state advertises `supports_pricing_lifecycle()` and gets
//! `initialize_pricing` / `release_resources` driven by the lifecycle
//! manager; an adapter that shares cached state across processes advertises
//! a `cache_state_key`. The coordinator never dispatches on downcasts or
//! method existence.
//!
//! ## Thread safety
//!
//! Adapters are constructed once per process per network, shared behind
//! `Arc`, and invoked from many concurrent requests; implementations keep
//! their mutable state internally synchronized.

use anyhow::Result;
use async_trait::async_trait;
use ethers::types::U256;

use crate::types::{GasCost, PoolPrices, Side, Token, TransferFeeParams};

#[async_trait]
pub trait DexAdapter: Send + Sync {
    /// Venue key, unique per network. Pool identifiers produced by this
    /// adapter are prefixed with it.
    fn key(&self) -> &str;

    /// True when quotes are linear and independent of amount (1:1 bridges,
    /// fixed-rate wrappers). Lets callers opt such venues out of chunked
    /// fan-out.
    fn has_constant_price_large_amounts(&self) -> bool {
        false
    }

    /// Whether native-token inputs must be wrapped to the canonical wrapped
    /// form before this adapter sees them.
    fn need_wrap_native(&self) -> bool {
        true
    }

    /// Venues that cannot model fee-on-transfer tokens are skipped with a
    /// diagnostic envelope when a source-side transfer fee is in play.
    fn is_fee_on_transfer_supported(&self) -> bool {
        false
    }

    /// Tagged presence for the optional lifecycle operations below.
    fn supports_pricing_lifecycle(&self) -> bool {
        false
    }

    /// Warms caches and subscribes to events so pricing reads hit warm
    /// state. Idempotent; failures are retried by the lifecycle manager with
    /// bounded backoff.
    async fn initialize_pricing(&self, _block_number: u64) -> Result<()> {
        Ok(())
    }

    /// Idempotent teardown of whatever `initialize_pricing` set up.
    async fn release_resources(&self) -> Result<()> {
        Ok(())
    }

    /// Namespaced shared-cache key invalidated by the master process on
    /// (re)initialization, forcing replicas to rebuild.
    fn cache_state_key(&self) -> Option<String> {
        None
    }

    /// Identifiers of the pools this venue can quote for the pair at the
    /// given block.
    async fn get_pool_identifiers(
        &self,
        from: &Token,
        to: &Token,
        side: Side,
        block_number: u64,
    ) -> Result<Vec<String>>;

    /// Quotes each amount chunk against this venue's pools.
    ///
    /// `Ok(None)` means "asked, nothing to quote" — the coordinator still
    /// emits one diagnostic envelope for the venue. `limit_pools`, when
    /// present, restricts quoting to the listed identifiers
    /// (case-insensitive).
    async fn get_prices_volume(
        &self,
        from: &Token,
        to: &Token,
        amounts: &[U256],
        side: Side,
        block_number: u64,
        limit_pools: Option<&[String]>,
        transfer_fees: &TransferFeeParams,
    ) -> Result<Option<Vec<PoolPrices>>>;

    /// L1 calldata gas attributable to executing this quote, used by the
    /// rollup gas overlay. Shape must match the quote's `gas_cost` shape.
    fn get_calldata_gas_cost(&self, pool_prices: &PoolPrices) -> GasCost;
}
