//! Wrapped-asset 1:1 bridge venue.
//!
//! Deposit/withdraw between the native asset and its canonical wrapped form
//! is always exactly 1:1, so quotes are linear in the amount and need no
//! state. This venue is the canonical `has_constant_price_large_amounts`
//! adapter: callers may price one chunk and scale.

use anyhow::Result;
use async_trait::async_trait;
use ethers::types::{Address, U256};
use serde_json::json;

use crate::dex_adapter::DexAdapter;
use crate::types::{GasCost, PoolPrices, Side, Token, TransferFeeParams};

/// WETH-style deposit/withdraw, whichever is dearer.
const WRAP_GAS_COST: u64 = 50_000;
const CALLDATA_GAS_COST: u64 = 1_200;

pub struct WrappedNativeAdapter {
    key: String,
    wrapped: Address,
    decimals: u8,
}

impl WrappedNativeAdapter {
    pub fn new(key: impl Into<String>, wrapped: Address, decimals: u8) -> Self {
        Self {
            key: key.into(),
            wrapped,
            decimals,
        }
    }

    fn handles(&self, from: &Token, to: &Token) -> bool {
        (from.is_native() && to.address == self.wrapped)
            || (from.address == self.wrapped && to.is_native())
    }

    fn identifier(&self) -> String {
        format!("{}_{:#x}", self.key, self.wrapped)
    }
}

#[async_trait]
impl DexAdapter for WrappedNativeAdapter {
    fn key(&self) -> &str {
        &self.key
    }

    fn has_constant_price_large_amounts(&self) -> bool {
        true
    }

    // this venue is the wrap: it must see the native sentinel unchanged
    fn need_wrap_native(&self) -> bool {
        false
    }

    async fn get_pool_identifiers(
        &self,
        from: &Token,
        to: &Token,
        _side: Side,
        _block_number: u64,
    ) -> Result<Vec<String>> {
        if self.handles(from, to) {
            Ok(vec![self.identifier()])
        } else {
            Ok(vec![])
        }
    }

    async fn get_prices_volume(
        &self,
        from: &Token,
        to: &Token,
        amounts: &[U256],
        _side: Side,
        _block_number: u64,
        _limit_pools: Option<&[String]>,
        _transfer_fees: &TransferFeeParams,
    ) -> Result<Option<Vec<PoolPrices>>> {
        if !self.handles(from, to) {
            return Ok(None);
        }

        Ok(Some(vec![PoolPrices {
            // 1:1 on both sides, both directions
            prices: amounts.to_vec(),
            unit: U256::exp10(self.decimals as usize),
            gas_cost: GasCost::Scalar(WRAP_GAS_COST),
            exchange: self.key.clone(),
            pool_identifier: Some(self.identifier()),
            pool_addresses: vec![self.wrapped],
            data: json!({ "wrapped": self.wrapped, "deposit": from.is_native() }),
            gas_cost_l2: None,
        }]))
    }

    fn get_calldata_gas_cost(&self, _pool_prices: &PoolPrices) -> GasCost {
        GasCost::Scalar(CALLDATA_GAS_COST)
    }
}
