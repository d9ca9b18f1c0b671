//! Route-optimizer pipeline.
//!
//! An ordered list of pure transforms applied to an unoptimized routing
//! decision by left fold. Transforms are registered at registry
//! construction; the empty pipeline is the identity.

use ethers::types::Address;

use crate::types::{ImprovedPoolPrice, Side};

/// The routing decision as produced by aggregation, before any
/// venue-specific massaging.
#[derive(Debug, Clone)]
pub struct UnoptimizedRate {
    pub src_token: Address,
    pub dest_token: Address,
    pub side: Side,
    pub pool_prices: Vec<ImprovedPoolPrice>,
}

pub type RateTransform = fn(UnoptimizedRate) -> UnoptimizedRate;

#[derive(Default)]
pub struct OptimizerPipeline {
    transforms: Vec<RateTransform>,
}

impl OptimizerPipeline {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_transform(mut self, transform: RateTransform) -> Self {
        self.transforms.push(transform);
        self
    }

    pub fn len(&self) -> usize {
        self.transforms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.transforms.is_empty()
    }

    pub fn optimize(&self, rate: UnoptimizedRate) -> UnoptimizedRate {
        self.transforms
            .iter()
            .fold(rate, |rate, transform| transform(rate))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rate() -> UnoptimizedRate {
        UnoptimizedRate {
            src_token: Address::repeat_byte(0x01),
            dest_token: Address::repeat_byte(0x02),
            side: Side::Sell,
            pool_prices: vec![],
        }
    }

    fn tag(rate: UnoptimizedRate, pool_id: &str) -> UnoptimizedRate {
        let mut rate = rate;
        rate.pool_prices.push(ImprovedPoolPrice {
            dex_key: "marker".to_string(),
            pool_id: pool_id.to_string(),
            prices: None,
        });
        rate
    }

    fn first(rate: UnoptimizedRate) -> UnoptimizedRate {
        tag(rate, "first")
    }

    fn second(rate: UnoptimizedRate) -> UnoptimizedRate {
        tag(rate, "second")
    }

    #[test]
    fn empty_pipeline_is_identity() {
        let optimized = OptimizerPipeline::new().optimize(rate());
        assert!(optimized.pool_prices.is_empty());
    }

    #[test]
    fn transforms_compose_left_to_right() {
        let pipeline = OptimizerPipeline::new()
            .with_transform(first)
            .with_transform(second);
        let optimized = pipeline.optimize(rate());
        let ids: Vec<&str> = optimized.pool_prices.iter().map(|p| p.pool_id.as_str()).collect();
        assert_eq!(ids, vec!["first", "second"]);
    }
}
