//! Triangular virtual-pool venue.
//!
//! Quotes pairs without a direct pool by deriving a synthetic pool from two
//! real constant-product pools that share a connector token. Derivation is
//! pure and recomputed per request from immutable state snapshots; nothing
//! is cached. Uncomputable candidates are skipped softly, the request never
//! fails because of one.

use anyhow::Result;
use async_trait::async_trait;
use ethers::types::{Address, U256};
use serde_json::json;
use std::sync::Arc;

use crate::amm_math::{derive_virtual_pool, get_amount_in, get_amount_out, PairLeg};
use crate::adapters::constant_product::{pair_payload, ConstantProductAdapter, PoolConfig};
use crate::dex_adapter::DexAdapter;
use crate::pool_state::AmmPoolState;
use crate::types::{pool_ids_equal, GasCost, PoolPrices, Side, Token, TransferFeeParams};

/// Two real hops execute behind one synthetic quote.
const VIRTUAL_SWAP_GAS_COST: u64 = 180_000;
const CALLDATA_GAS_OVERHEAD: u64 = 3_500;
const CALLDATA_GAS_PER_HOP: u64 = 1_800;

pub struct VirtualPoolAdapter {
    key: String,
    /// The real venue whose pools and warm state back the synthetic pairs.
    base: Arc<ConstantProductAdapter>,
    /// Connector tokens tried as the shared leg, usually the wrapped native.
    connectors: Vec<Address>,
}

struct VirtualCandidate<'a> {
    src_pool: &'a PoolConfig,
    dest_pool: &'a PoolConfig,
    connector: Address,
}

impl VirtualPoolAdapter {
    pub fn new(
        key: impl Into<String>,
        base: Arc<ConstantProductAdapter>,
        connectors: Vec<Address>,
    ) -> Self {
        Self {
            key: key.into(),
            base,
            connectors,
        }
    }

    fn identifier(&self, from: Address, to: Address, connector: Address) -> String {
        format!(
            "{}_{}_{}",
            self.key,
            pair_payload(from, connector),
            pair_payload(to, connector)
        )
    }

    fn candidates(&self, from: &Token, to: &Token) -> Vec<VirtualCandidate<'_>> {
        self.connectors
            .iter()
            .filter(|k| **k != from.address && **k != to.address)
            .filter_map(|k| {
                let src_pool = self.base.pool_for_pair(from.address, *k)?;
                let dest_pool = self.base.pool_for_pair(to.address, *k)?;
                Some(VirtualCandidate {
                    src_pool,
                    dest_pool,
                    connector: *k,
                })
            })
            .collect()
    }

    /// The pool's reserves seen from `base_token` toward the connector.
    fn leg(pool: &PoolConfig, state: &AmmPoolState, base_token: Address, block_number: u64) -> PairLeg {
        let (base_reserve, common_reserve) = if pool.token0 == base_token {
            (state.reserves0, state.reserves1)
        } else {
            (state.reserves1, state.reserves0)
        };
        PairLeg {
            base_reserve,
            common_reserve,
            fee_bps: pool.fee_bps,
            block_number,
        }
    }
}

#[async_trait]
impl DexAdapter for VirtualPoolAdapter {
    fn key(&self) -> &str {
        &self.key
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
            .candidates(from, to)
            .iter()
            .map(|c| self.identifier(from.address, to.address, c.connector))
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
        _transfer_fees: &TransferFeeParams,
    ) -> Result<Option<Vec<PoolPrices>>> {
        if from.address == to.address {
            return Ok(None);
        }

        let state_map = self.base.state();
        let mut quotes = Vec::new();

        for candidate in self.candidates(from, to) {
            let id = self.identifier(from.address, to.address, candidate.connector);
            if let Some(ids) = limit_pools {
                if !ids.iter().any(|limit| pool_ids_equal(limit, &id)) {
                    continue;
                }
            }

            let src_state = match state_map.get_state(candidate.src_pool.address, block_number) {
                Some(state) => state,
                None => continue,
            };
            let dest_state = match state_map.get_state(candidate.dest_pool.address, block_number) {
                Some(state) => state,
                None => continue,
            };

            let src_leg = Self::leg(candidate.src_pool, &src_state, from.address, block_number);
            let dest_leg = Self::leg(candidate.dest_pool, &dest_state, to.address, block_number);
            let pool = match derive_virtual_pool(&src_leg, &dest_leg) {
                Some(pool) => pool,
                None => continue,
            };

            let quote_one = |amount: U256| -> U256 {
                if amount.is_zero() {
                    return U256::zero();
                }
                match side {
                    Side::Sell => {
                        get_amount_out(amount, pool.reserve_in, pool.reserve_out, pool.fee_bps)
                    }
                    Side::Buy => {
                        get_amount_in(amount, pool.reserve_in, pool.reserve_out, pool.fee_bps)
                    }
                }
            };

            let unit_amount = match side {
                Side::Sell => from.one_unit(),
                Side::Buy => to.one_unit(),
            };

            quotes.push(PoolPrices {
                prices: amounts.iter().map(|a| quote_one(*a)).collect(),
                unit: quote_one(unit_amount),
                gas_cost: GasCost::Scalar(VIRTUAL_SWAP_GAS_COST),
                exchange: self.key.clone(),
                pool_identifier: Some(id),
                pool_addresses: vec![candidate.src_pool.address, candidate.dest_pool.address],
                data: json!({
                    "src_pool": candidate.src_pool.address,
                    "dest_pool": candidate.dest_pool.address,
                    "connector": candidate.connector,
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
