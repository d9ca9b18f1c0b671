//! Event-backed constant-product AMM venue.
//!
//! Pool pairs are configured up front (top-pool discovery lives outside the
//! core); `initialize_pricing` warms their reserves through one multicall
//! snapshot and follows `Sync` logs from there, so pricing reads never touch
//! the network.

use anyhow::Result;
use async_trait::async_trait;
use ethers::prelude::{Http, Provider};
use ethers::types::{Address, U256, U512};
use log::warn;
use serde_json::json;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio::task::JoinHandle;

use crate::amm_math::{get_amount_in, get_amount_out};
use crate::chain::ChainSource;
use crate::dex_adapter::DexAdapter;
use crate::multicall::Multicall;
use crate::pool_state::PoolStateMap;
use crate::types::{
    pool_ids_equal, GasCost, PoolPrices, Side, Token, TransferFeeParams, FEE_DENOMINATOR,
};

/// Gas for one pool hop executed through the aggregator contract.
const SWAP_GAS_COST: u64 = 90_000;
/// L1 calldata gas attributed to a quote: fixed route overhead plus one
/// encoded hop per pool.
const CALLDATA_GAS_OVERHEAD: u64 = 3_500;
const CALLDATA_GAS_PER_HOP: u64 = 1_800;

/// Static description of one configured pair.
#[derive(Debug, Clone, Copy)]
pub struct PoolConfig {
    pub address: Address,
    pub token0: Address,
    pub token1: Address,
    pub fee_bps: u32,
}

/// Sorted lowercase token-pair payload shared by real and virtual pool
/// identifiers.
pub fn pair_payload(a: Address, b: Address) -> String {
    let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
    format!("{lo:#x}_{hi:#x}")
}

pub struct ConstantProductAdapter {
    key: String,
    pools: Vec<PoolConfig>,
    state: Arc<PoolStateMap>,
    chain: Option<Arc<ChainSource>>,
    multicall: Option<Multicall<Provider<Http>>>,
    initialized: AtomicBool,
    background_tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl ConstantProductAdapter {
    pub fn new(
        key: impl Into<String>,
        pools: Vec<PoolConfig>,
        state: Arc<PoolStateMap>,
        chain: Arc<ChainSource>,
        multicall: Multicall<Provider<Http>>,
    ) -> Self {
        Self {
            key: key.into(),
            pools,
            state,
            chain: Some(chain),
            multicall: Some(multicall),
            initialized: AtomicBool::new(false),
            background_tasks: Mutex::new(Vec::new()),
        }
    }

    /// Venue with no chain attached; state is injected directly into the
    /// state map. Used by tests and replay tooling.
    pub fn offline(key: impl Into<String>, pools: Vec<PoolConfig>, state: Arc<PoolStateMap>) -> Self {
        Self {
            key: key.into(),
            pools,
            state,
            chain: None,
            multicall: None,
            initialized: AtomicBool::new(false),
            background_tasks: Mutex::new(Vec::new()),
        }
    }

    pub fn state(&self) -> Arc<PoolStateMap> {
        Arc::clone(&self.state)
    }

    /// The configured pool for an unordered token pair, if any.
    pub fn pool_for_pair(&self, a: Address, b: Address) -> Option<&PoolConfig> {
        self.pools.iter().find(|p| {
            (p.token0 == a && p.token1 == b) || (p.token0 == b && p.token1 == a)
        })
    }

    pub fn pool_identifier(&self, pool: &PoolConfig) -> String {
        format!("{}_{}", self.key, pair_payload(pool.token0, pool.token1))
    }

    fn candidate_pools(&self, from: &Token, to: &Token, limit_pools: Option<&[String]>) -> Vec<&PoolConfig> {
        self.pools
            .iter()
            .filter(|p| {
                (p.token0 == from.address && p.token1 == to.address)
                    || (p.token0 == to.address && p.token1 == from.address)
            })
            .filter(|p| match limit_pools {
                Some(ids) => {
                    let id = self.pool_identifier(p);
                    ids.iter().any(|limit| pool_ids_equal(limit, &id))
                }
                None => true,
            })
            .collect()
    }
}

/// Input kept after a source-side transfer fee, floor division.
fn discount_input(amount: U256, fee_bps: u32) -> U256 {
    if fee_bps == 0 {
        return amount;
    }
    let keep = FEE_DENOMINATOR.saturating_sub(fee_bps);
    let kept = amount.full_mul(U256::from(keep)) / U512::from(FEE_DENOMINATOR);
    // kept <= amount, the narrowing cannot fail
    U256::try_from(kept).unwrap_or_else(|_| U256::zero())
}

/// Input the caller must send so that the pool still receives `amount`
/// after the transfer fee, ceiling division.
fn gross_up_input(amount: U256, fee_bps: u32) -> U256 {
    if fee_bps == 0 {
        return amount;
    }
    let keep = FEE_DENOMINATOR.saturating_sub(fee_bps);
    if keep == 0 {
        return U256::zero();
    }
    let (quotient, remainder) = amount
        .full_mul(U256::from(FEE_DENOMINATOR))
        .div_mod(U512::from(keep));
    let rounded = if remainder.is_zero() {
        quotient
    } else {
        quotient + U512::one()
    };
    U256::try_from(rounded).unwrap_or_else(|_| U256::zero())
}

#[async_trait]
impl DexAdapter for ConstantProductAdapter {
    fn key(&self) -> &str {
        &self.key
    }

    fn is_fee_on_transfer_supported(&self) -> bool {
        true
    }

    fn supports_pricing_lifecycle(&self) -> bool {
        true
    }

    fn cache_state_key(&self) -> Option<String> {
        Some(format!("{}_pools_state", self.key))
    }

    async fn initialize_pricing(&self, block_number: u64) -> Result<()> {
        if self.initialized.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        let (chain, multicall) = match (&self.chain, &self.multicall) {
            (Some(chain), Some(multicall)) => (chain, multicall),
            // offline venue: state arrives through the state map directly
            _ => return Ok(()),
        };

        let snapshot: Vec<(Address, u32)> =
            self.pools.iter().map(|p| (p.address, p.fee_bps)).collect();
        if let Err(e) = self.state.warm_pools(multicall, &snapshot, block_number).await {
            self.initialized.store(false, Ordering::SeqCst);
            return Err(e);
        }

        let addresses: Vec<Address> = self.pools.iter().map(|p| p.address).collect();
        let poller = chain.spawn_log_poller(addresses.clone(), block_number + 1);

        let mut receiver = chain.subscribe_logs();
        let state = Arc::clone(&self.state);
        let key = self.key.clone();
        let consumer = tokio::spawn(async move {
            loop {
                match receiver.recv().await {
                    Ok(log) => {
                        if addresses.contains(&log.address) {
                            state.process_log(&log);
                        }
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(missed)) => {
                        warn!("{key}: log consumer lagged, {missed} logs dropped");
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                }
            }
        });

        let mut tasks = self.background_tasks.lock().unwrap();
        tasks.push(poller);
        tasks.push(consumer);
        Ok(())
    }

    async fn release_resources(&self) -> Result<()> {
        let tasks: Vec<JoinHandle<()>> = {
            let mut guard = self.background_tasks.lock().unwrap();
            guard.drain(..).collect()
        };
        for task in tasks {
            task.abort();
        }
        self.initialized.store(false, Ordering::SeqCst);
        Ok(())
    }

    async fn get_pool_identifiers(
        &self,
        from: &Token,
        to: &Token,
        _side: Side,
        _block_number: u64,
    ) -> Result<Vec<String>> {
        if from.address == to.address {
            return Ok(vec![]);
        }
        Ok(self
            .candidate_pools(from, to, None)
            .into_iter()
            .map(|p| self.pool_identifier(p))
            .collect())
    }

    async fn get_prices_volume(
        &self,
        from: &Token,
        to: &Token,
        amounts: &[U256],
        side: Side,
        block_number: u64,
        limit_pools: Option<&[String]>,
        transfer_fees: &TransferFeeParams,
    ) -> Result<Option<Vec<PoolPrices>>> {
        if from.address == to.address {
            return Ok(None);
        }

        let src_fee_bps =
            (transfer_fees.src_fee as u32 + transfer_fees.src_dex_fee as u32).min(FEE_DENOMINATOR);

        let mut quotes = Vec::new();
        for pool in self.candidate_pools(from, to, limit_pools) {
            // missing state means no quote for this pool, never an error
            let state = match self.state.get_state(pool.address, block_number) {
                Some(state) => state,
                None => continue,
            };
            let (reserve_in, reserve_out) = if from.address == pool.token0 {
                (state.reserves0, state.reserves1)
            } else {
                (state.reserves1, state.reserves0)
            };

            let quote_one = |amount: U256| -> U256 {
                if amount.is_zero() {
                    return U256::zero();
                }
                match side {
                    Side::Sell => get_amount_out(
                        discount_input(amount, src_fee_bps),
                        reserve_in,
                        reserve_out,
                        pool.fee_bps,
                    ),
                    Side::Buy => {
                        let needed = get_amount_in(amount, reserve_in, reserve_out, pool.fee_bps);
                        if needed.is_zero() {
                            U256::zero()
                        } else {
                            gross_up_input(needed, src_fee_bps)
                        }
                    }
                }
            };

            let prices: Vec<U256> = amounts.iter().map(|a| quote_one(*a)).collect();
            let unit_amount = match side {
                Side::Sell => from.one_unit(),
                Side::Buy => to.one_unit(),
            };

            quotes.push(PoolPrices {
                prices,
                unit: quote_one(unit_amount),
                gas_cost: GasCost::Scalar(SWAP_GAS_COST),
                exchange: self.key.clone(),
                pool_identifier: Some(self.pool_identifier(pool)),
                pool_addresses: vec![pool.address],
                data: json!({
                    "pool": pool.address,
                    "token_in": from.address,
                    "token_out": to.address,
                    "fee_bps": pool.fee_bps,
                }),
                gas_cost_l2: None,
            });
        }

        if quotes.is_empty() {
            Ok(None)
        } else {
            Ok(Some(quotes))
        }
    }

    fn get_calldata_gas_cost(&self, pool_prices: &PoolPrices) -> GasCost {
        let hops = pool_prices.pool_addresses.len().max(1) as u64;
        GasCost::Scalar(CALLDATA_GAS_OVERHEAD + CALLDATA_GAS_PER_HOP * hops)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool_state::AmmPoolState;

    fn setup() -> (ConstantProductAdapter, Token, Token) {
        let token_a = Address::repeat_byte(0xaa);
        let token_b = Address::repeat_byte(0xbb);
        let pool = PoolConfig {
            address: Address::repeat_byte(0x01),
            token0: token_a,
            token1: token_b,
            fee_bps: 30,
        };
        let state = Arc::new(PoolStateMap::new(128));
        state.set_state(
            pool.address,
            AmmPoolState {
                reserves0: U256::from(1_000_000u64),
                reserves1: U256::from(2_000_000u64),
                fee_bps: 30,
            },
            99,
        );
        let adapter = ConstantProductAdapter::offline("cp-amm", vec![pool], state);
        (adapter, Token::new(token_a, 0), Token::new(token_b, 0))
    }

    #[tokio::test]
    async fn sell_quotes_match_contract_math() {
        let (adapter, from, to) = setup();
        let amounts = [U256::zero(), U256::from(1_000u64)];
        let quotes = adapter
            .get_prices_volume(&from, &to, &amounts, Side::Sell, 100, None, &TransferFeeParams::default())
            .await
            .unwrap()
            .unwrap();

        assert_eq!(quotes.len(), 1);
        assert_eq!(quotes[0].prices, vec![U256::zero(), U256::from(1992u64)]);
        assert_eq!(quotes[0].unit, U256::from(1u64));
        assert_eq!(quotes[0].exchange, "cp-amm");
    }

    #[tokio::test]
    async fn buy_quotes_round_up() {
        let (adapter, from, to) = setup();
        let amounts = [U256::from(1993u64)];
        let quotes = adapter
            .get_prices_volume(&from, &to, &amounts, Side::Buy, 100, None, &TransferFeeParams::default())
            .await
            .unwrap()
            .unwrap();

        // buying back the sell output must cost at least the original input
        assert!(quotes[0].prices[0] >= U256::from(1_000u64));
    }

    #[tokio::test]
    async fn state_not_yet_visible_yields_no_quote() {
        let (adapter, from, to) = setup();
        // state was committed at block 99; a query at 99 must not see it
        let quotes = adapter
            .get_prices_volume(&from, &to, &[U256::from(10u64)], Side::Sell, 99, None, &TransferFeeParams::default())
            .await
            .unwrap();
        assert!(quotes.is_none());
    }

    #[tokio::test]
    async fn identity_pair_has_nothing_to_quote() {
        let (adapter, from, _) = setup();
        assert!(adapter
            .get_prices_volume(&from, &from, &[U256::one()], Side::Sell, 100, None, &TransferFeeParams::default())
            .await
            .unwrap()
            .is_none());
        assert!(adapter
            .get_pool_identifiers(&from, &from, Side::Sell, 100)
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn limit_pools_filters_case_insensitively() {
        let (adapter, from, to) = setup();
        let id = adapter.pool_identifier(&adapter.pools[0]).to_uppercase();
        let quotes = adapter
            .get_prices_volume(
                &from,
                &to,
                &[U256::from(1_000u64)],
                Side::Sell,
                100,
                Some(&[id]),
                &TransferFeeParams::default(),
            )
            .await
            .unwrap();
        assert!(quotes.is_some());

        let none = adapter
            .get_prices_volume(
                &from,
                &to,
                &[U256::from(1_000u64)],
                Side::Sell,
                100,
                Some(&["cp-amm_other".to_string()]),
                &TransferFeeParams::default(),
            )
            .await
            .unwrap();
        assert!(none.is_none());
    }

    #[tokio::test]
    async fn source_transfer_fee_discounts_the_input() {
        let (adapter, from, to) = setup();
        let fees = TransferFeeParams { src_fee: 100, ..Default::default() };
        let with_fee = adapter
            .get_prices_volume(&from, &to, &[U256::from(1_000u64)], Side::Sell, 100, None, &fees)
            .await
            .unwrap()
            .unwrap();
        let without_fee = adapter
            .get_prices_volume(
                &from,
                &to,
                &[U256::from(1_000u64)],
                Side::Sell,
                100,
                None,
                &TransferFeeParams::default(),
            )
            .await
            .unwrap()
            .unwrap();
        assert!(with_fee[0].prices[0] < without_fee[0].prices[0]);
    }

    #[test]
    fn pair_payload_is_sorted_and_lowercase() {
        let a = Address::repeat_byte(0x0b);
        let b = Address::repeat_byte(0x0a);
        let payload = pair_payload(a, b);
        assert!(payload.starts_with(&format!("{b:#x}")));
        assert_eq!(payload, payload.to_lowercase());
    }

    #[test]
    fn gross_up_inverts_discount() {
        for amount in [1u64, 997, 10_000, 123_456] {
            let grossed = gross_up_input(U256::from(amount), 250);
            assert!(discount_input(grossed, 250) >= U256::from(amount));
        }
    }
}
