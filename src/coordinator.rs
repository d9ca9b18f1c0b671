//! Pricing coordinator: concurrent fan-out over venue adapters.
//!
//! Each per-adapter call runs under its own deadline and captures its own
//! failure; one venue can never fail the aggregate or delay it past the
//! deadline. Results are ordered by the caller's `keys` order, then by each
//! adapter's internal pool order — never reordered by price.

use ethers::types::{Address, U256};
use futures_util::future::join_all;
use indexmap::IndexMap;
use log::{debug, warn};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time::timeout;

use crate::dex_adapter::DexAdapter;
use crate::errors::PricingError;
use crate::metrics;
use crate::registry::DexRegistry;
use crate::settings::PricingSettings;
use crate::types::{
    to_improved_pool_prices, validate_pool_prices, GasCost, ImprovedPoolPrice, Side, Token,
    TransferFeeParams, SRC_TOKEN_TRANSFER_FEE_POOL_ID,
};

pub struct PricingCoordinator {
    registry: Arc<DexRegistry>,
    wrapped_native: Address,
    identifier_timeout: Duration,
    prices_timeout: Duration,
}

impl PricingCoordinator {
    pub fn new(registry: Arc<DexRegistry>, wrapped_native: Address, settings: &PricingSettings) -> Self {
        Self {
            registry,
            wrapped_native,
            identifier_timeout: settings.fetch_pool_identifier_timeout(),
            prices_timeout: settings.fetch_pool_prices_timeout(),
        }
    }

    pub fn registry(&self) -> &Arc<DexRegistry> {
        &self.registry
    }

    fn wrap_for(&self, adapter: &Arc<dyn DexAdapter>, from: &Token, to: &Token) -> (Token, Token) {
        if adapter.need_wrap_native() {
            (from.wrap_native(self.wrapped_native), to.wrap_native(self.wrapped_native))
        } else {
            (*from, *to)
        }
    }

    /// Fans out identifier discovery across `keys`.
    ///
    /// The returned mapping preserves `keys` order. `None` marks a venue
    /// that opted out via `has_constant_price_large_amounts` when
    /// `filter_constant_price` is set; errors and timeouts degrade to the
    /// empty list. Unknown keys are silently excluded.
    pub async fn get_pool_identifiers(
        &self,
        from: &Token,
        to: &Token,
        side: Side,
        block_number: u64,
        keys: &[String],
        filter_constant_price: bool,
    ) -> IndexMap<String, Option<Vec<String>>> {
        let tasks = keys.iter().map(|key| {
            let key = key.clone();
            let from = *from;
            let to = *to;
            async move {
                let adapter = match self.registry.dex_by_key(&key) {
                    Ok(adapter) => adapter,
                    Err(_) => return None,
                };
                if filter_constant_price && adapter.has_constant_price_large_amounts() {
                    return Some((key, None));
                }
                let (from, to) = self.wrap_for(&adapter, &from, &to);
                if from.address == to.address {
                    return Some((key, Some(vec![])));
                }

                let started = Instant::now();
                let result = timeout(
                    self.identifier_timeout,
                    adapter.get_pool_identifiers(&from, &to, side, block_number),
                )
                .await;
                metrics::record_adapter_latency(
                    "identifiers",
                    &key,
                    started.elapsed().as_secs_f64() * 1_000.0,
                );
                match result {
                    Ok(Ok(identifiers)) => Some((key, Some(identifiers))),
                    Ok(Err(e)) => {
                        warn!("{key}: getPoolIdentifiers failed: {e}");
                        metrics::increment_adapter_error("identifiers", &key);
                        Some((key, Some(vec![])))
                    }
                    Err(_) => {
                        warn!("{key}: getPoolIdentifiers timed out");
                        metrics::increment_adapter_timeout("identifiers", &key);
                        Some((key, Some(vec![])))
                    }
                }
            }
        });

        join_all(tasks).await.into_iter().flatten().collect()
    }

    /// Fans out price discovery across `keys` and returns the flattened,
    /// validated envelope sequence.
    ///
    /// Every invoked venue contributes at least one envelope; failures and
    /// timeouts become diagnostic envelopes carrying the reason as
    /// `pool_id`. When `rollup_l1_to_l2_gas_ratio` is supplied, each
    /// surviving quote's gas cost is raised by the amortized L1 calldata
    /// cost and the pure L2 figure is preserved alongside.
    #[allow(clippy::too_many_arguments)]
    pub async fn get_pool_prices(
        &self,
        from: &Token,
        to: &Token,
        amounts: &[U256],
        side: Side,
        block_number: u64,
        keys: &[String],
        limit_pools_map: Option<&HashMap<String, Vec<String>>>,
        transfer_fees: &TransferFeeParams,
        rollup_l1_to_l2_gas_ratio: Option<f64>,
    ) -> Vec<ImprovedPoolPrice> {
        let tasks = keys.iter().map(|key| {
            let key = key.clone();
            let from = *from;
            let to = *to;
            let transfer_fees = *transfer_fees;
            async move {
                let adapter = match self.registry.dex_by_key(&key) {
                    Ok(adapter) => adapter,
                    Err(_) => return vec![],
                };

                let limit_pools = limit_pools_map.and_then(|map| map.get(&key));
                if let Some(ids) = limit_pools {
                    // an explicitly empty restriction means "nothing wanted here"
                    if ids.is_empty() {
                        return vec![];
                    }
                }

                let (from, to) = self.wrap_for(&adapter, &from, &to);
                if from.address == to.address {
                    return vec![];
                }

                if transfer_fees.source_fee_in_play() && !adapter.is_fee_on_transfer_supported() {
                    debug!("{key}: skipped, source transfer fee unsupported");
                    return vec![ImprovedPoolPrice {
                        dex_key: key,
                        pool_id: SRC_TOKEN_TRANSFER_FEE_POOL_ID.to_string(),
                        prices: None,
                    }];
                }

                let started = Instant::now();
                let result = timeout(
                    self.prices_timeout,
                    adapter.get_prices_volume(
                        &from,
                        &to,
                        amounts,
                        side,
                        block_number,
                        limit_pools.map(|v| v.as_slice()),
                        &transfer_fees,
                    ),
                )
                .await;
                metrics::record_adapter_latency(
                    "prices",
                    &key,
                    started.elapsed().as_secs_f64() * 1_000.0,
                );

                match result {
                    Ok(Ok(answer)) => {
                        let mut envelopes = to_improved_pool_prices(&key, answer);
                        if let Some(ratio) = rollup_l1_to_l2_gas_ratio {
                            if let Err(e) =
                                apply_rollup_gas_overlay(&adapter, &mut envelopes, amounts.len(), ratio)
                            {
                                warn!("{key}: {e}");
                                metrics::increment_adapter_error("prices", &key);
                                return vec![ImprovedPoolPrice {
                                    dex_key: key,
                                    pool_id: e.summary(),
                                    prices: None,
                                }];
                            }
                        }
                        envelopes
                    }
                    Ok(Err(e)) => {
                        warn!("{key}: getPricesVolume failed: {e}");
                        metrics::increment_adapter_error("prices", &key);
                        let summary = e
                            .to_string()
                            .lines()
                            .next()
                            .unwrap_or("adapter error")
                            .to_string();
                        vec![ImprovedPoolPrice {
                            dex_key: key,
                            pool_id: summary,
                            prices: None,
                        }]
                    }
                    Err(_) => {
                        warn!("{key}: getPricesVolume timed out");
                        metrics::increment_adapter_timeout("prices", &key);
                        vec![ImprovedPoolPrice {
                            dex_key: key,
                            pool_id: PricingError::Timeout.summary(),
                            prices: None,
                        }]
                    }
                }
            }
        });

        let mut envelopes: Vec<ImprovedPoolPrice> =
            join_all(tasks).await.into_iter().flatten().collect();

        // post-hoc validation gate; null-price envelopes pass through
        envelopes.retain(|envelope| match &envelope.prices {
            None => true,
            Some(pp) => match validate_pool_prices(pp, amounts) {
                Ok(()) => true,
                Err(reason) => {
                    warn!("dropping quote from {}: {reason}", pp.exchange);
                    metrics::increment_validation_rejection(&envelope.dex_key);
                    false
                }
            },
        });

        envelopes
    }
}

fn ceil_ratio(ratio: f64, gas: u64) -> u64 {
    (ratio * gas as f64).ceil() as u64
}

/// Adds the amortized L1 calldata cost onto each quote's gas figure,
/// preserving the original L2 cost. Mixed scalar/per-chunk shapes, or a
/// per-chunk sequence misaligned with the request's amounts, reject the
/// adapter's whole batch.
fn apply_rollup_gas_overlay(
    adapter: &Arc<dyn DexAdapter>,
    envelopes: &mut [ImprovedPoolPrice],
    amounts_len: usize,
    ratio: f64,
) -> Result<(), PricingError> {
    for envelope in envelopes.iter_mut() {
        let pp = match envelope.prices.as_mut() {
            Some(pp) => pp,
            None => continue,
        };
        let l1_cost = adapter.get_calldata_gas_cost(pp);
        let adjusted = match (&pp.gas_cost, &l1_cost) {
            (GasCost::Scalar(l2), GasCost::Scalar(l1)) => GasCost::Scalar(l2 + ceil_ratio(ratio, *l1)),
            (GasCost::PerChunk(l2), GasCost::PerChunk(l1)) => {
                if l2.len() != amounts_len || l1.len() != amounts_len {
                    return Err(PricingError::InvalidCalldataGasCost(format!(
                        "per-chunk gas lengths {}/{} do not match {} amounts",
                        l2.len(),
                        l1.len(),
                        amounts_len
                    )));
                }
                GasCost::PerChunk(
                    l2.iter()
                        .zip(l1)
                        .map(|(l2, l1)| l2 + ceil_ratio(ratio, *l1))
                        .collect(),
                )
            }
            _ => {
                return Err(PricingError::InvalidCalldataGasCost(
                    "mixed scalar and per-chunk gas cost shapes".to_string(),
                ))
            }
        };
        pp.gas_cost_l2 = Some(pp.gas_cost.clone());
        pp.gas_cost = adjusted;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ceil_ratio_rounds_up_and_zero_is_identity() {
        assert_eq!(ceil_ratio(0.0, 50_000), 0);
        assert_eq!(ceil_ratio(0.3, 50_000), 15_000);
        assert_eq!(ceil_ratio(0.3, 50_001), 15_001);
        assert_eq!(ceil_ratio(1.0, 7), 7);
    }
}
