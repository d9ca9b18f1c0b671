//! Adapter registry: venue key → adapter instance.
//!
//! One registry per process per network. Insertion order is preserved and
//! drives the default key ordering callers see from `all_dex_keys`.

use indexmap::IndexMap;
use log::warn;
use std::sync::Arc;

use crate::dex_adapter::DexAdapter;
use crate::errors::PricingError;
use crate::optimizer::{OptimizerPipeline, UnoptimizedRate};

pub struct DexRegistry {
    adapters: IndexMap<String, Arc<dyn DexAdapter>>,
    optimizer: OptimizerPipeline,
}

impl DexRegistry {
    pub fn new(adapters: Vec<Arc<dyn DexAdapter>>, optimizer: OptimizerPipeline) -> Self {
        let mut map: IndexMap<String, Arc<dyn DexAdapter>> = IndexMap::new();
        for adapter in adapters {
            let key = adapter.key().to_string();
            if map.insert(key.clone(), adapter).is_some() {
                warn!("duplicate adapter key {key}, keeping the later registration");
            }
        }
        Self {
            adapters: map,
            optimizer,
        }
    }

    pub fn all_dex_keys(&self) -> Vec<String> {
        self.adapters.keys().cloned().collect()
    }

    /// Case-insensitive lookup. The only registry operation that surfaces
    /// `InvalidDexKey`; the coordinator recovers it by exclusion instead.
    pub fn dex_by_key(&self, key: &str) -> Result<Arc<dyn DexAdapter>, PricingError> {
        self.adapters
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, adapter)| Arc::clone(adapter))
            .ok_or_else(|| PricingError::InvalidDexKey(key.to_string()))
    }

    /// Filters `keys` down to venues that can model fee-on-transfer tokens.
    /// Unknown keys are silently ignored.
    pub fn dexes_supporting_fee_on_transfer(&self, keys: &[String]) -> Vec<String> {
        keys.iter()
            .filter(|key| {
                self.dex_by_key(key)
                    .map(|adapter| adapter.is_fee_on_transfer_supported())
                    .unwrap_or(false)
            })
            .cloned()
            .collect()
    }

    pub fn optimize_rate(&self, rate: UnoptimizedRate) -> UnoptimizedRate {
        self.optimizer.optimize(rate)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{GasCost, PoolPrices, Side, Token, TransferFeeParams};
    use anyhow::Result;
    use async_trait::async_trait;
    use ethers::types::U256;

    struct StubAdapter {
        key: &'static str,
        fee_on_transfer: bool,
    }

    #[async_trait]
    impl DexAdapter for StubAdapter {
        fn key(&self) -> &str {
            self.key
        }

        fn is_fee_on_transfer_supported(&self) -> bool {
            self.fee_on_transfer
        }

        async fn get_pool_identifiers(
            &self,
            _from: &Token,
            _to: &Token,
            _side: Side,
            _block_number: u64,
        ) -> Result<Vec<String>> {
            Ok(vec![])
        }

        async fn get_prices_volume(
            &self,
            _from: &Token,
            _to: &Token,
            _amounts: &[U256],
            _side: Side,
            _block_number: u64,
            _limit_pools: Option<&[String]>,
            _transfer_fees: &TransferFeeParams,
        ) -> Result<Option<Vec<PoolPrices>>> {
            Ok(None)
        }

        fn get_calldata_gas_cost(&self, _pool_prices: &PoolPrices) -> GasCost {
            GasCost::Scalar(0)
        }
    }

    fn registry() -> DexRegistry {
        DexRegistry::new(
            vec![
                Arc::new(StubAdapter { key: "AlphaSwap", fee_on_transfer: true }),
                Arc::new(StubAdapter { key: "BetaSwap", fee_on_transfer: false }),
            ],
            OptimizerPipeline::new(),
        )
    }

    #[test]
    fn keys_keep_registration_order() {
        assert_eq!(registry().all_dex_keys(), vec!["AlphaSwap", "BetaSwap"]);
    }

    #[test]
    fn lookup_is_case_insensitive() {
        let registry = registry();
        assert_eq!(registry.dex_by_key("alphaswap").unwrap().key(), "AlphaSwap");
        assert!(matches!(
            registry.dex_by_key("GammaSwap"),
            Err(PricingError::InvalidDexKey(_))
        ));
    }

    #[test]
    fn fee_on_transfer_filter_ignores_unknown_keys() {
        let registry = registry();
        let keys = vec![
            "AlphaSwap".to_string(),
            "BetaSwap".to_string(),
            "NoSuchDex".to_string(),
        ];
        assert_eq!(registry.dexes_supporting_fee_on_transfer(&keys), vec!["AlphaSwap"]);
    }
}
