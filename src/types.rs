//! Canonical data model for the pricing core.
//!
//! Tokens, sides, transfer-fee parameters, pool quotes and their diagnostic
//! envelopes. Everything crossing the adapter boundary is defined here so the
//! coordinator, registry and venues agree on one shape.

use ethers::types::{Address, U256};
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Sentinel address used by callers to mean "the chain's native asset".
/// Must be wrapped to its canonical wrapped form before entering pricing.
pub static NATIVE_TOKEN_ADDRESS: Lazy<Address> = Lazy::new(|| Address::repeat_byte(0xee));

/// Pool id used for the diagnostic envelope emitted when the source token
/// takes a transfer fee and the venue cannot model it.
pub const SRC_TOKEN_TRANSFER_FEE_POOL_ID: &str = "isSrcTokenTransferFeeToBeExchanged_pool";

/// Basis-point denominator shared by swap fees and transfer fees.
pub const FEE_DENOMINATOR: u32 = 10_000;

/// A token as seen by the pricing core: address plus decimal precision.
///
/// Two tokens with equal address are identical regardless of symbol, so
/// equality and hashing are address-only.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Token {
    pub address: Address,
    pub decimals: u8,
}

impl Token {
    pub fn new(address: Address, decimals: u8) -> Self {
        Self { address, decimals }
    }

    /// Maps the native sentinel to the canonical wrapped address, leaving
    /// every other token untouched. Venues that set `need_wrap_native` get
    /// their inputs run through this before any pricing call.
    pub fn wrap_native(self, wrapped: Address) -> Self {
        if self.address == *NATIVE_TOKEN_ADDRESS {
            Self { address: wrapped, decimals: self.decimals }
        } else {
            self
        }
    }

    pub fn is_native(&self) -> bool {
        self.address == *NATIVE_TOKEN_ADDRESS
    }

    /// One whole unit of this token (10^decimals).
    pub fn one_unit(&self) -> U256 {
        U256::exp10(self.decimals as usize)
    }
}

impl PartialEq for Token {
    fn eq(&self, other: &Self) -> bool {
        self.address == other.address
    }
}

impl Eq for Token {}

impl std::hash::Hash for Token {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.address.hash(state);
    }
}

/// Swap side. SELL fixes the input amount, BUY fixes the output amount.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Side {
    Sell,
    Buy,
}

/// Integer basis-point transfer fees for fee-on-transfer tokens.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferFeeParams {
    #[serde(default)]
    pub src_fee: u16,
    #[serde(default)]
    pub dest_fee: u16,
    #[serde(default)]
    pub src_dex_fee: u16,
    #[serde(default)]
    pub dest_dex_fee: u16,
}

impl TransferFeeParams {
    /// A source-side transfer fee is in play when either the token itself or
    /// the venue skims on the input leg. Venues without fee-on-transfer
    /// support are skipped for such requests.
    pub fn source_fee_in_play(&self) -> bool {
        self.src_fee > 0 || self.src_dex_fee > 0
    }
}

/// Gas cost attached to a quote: one figure for all chunks, or one per chunk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum GasCost {
    Scalar(u64),
    PerChunk(Vec<u64>),
}

impl GasCost {
    pub fn is_per_chunk(&self) -> bool {
        matches!(self, GasCost::PerChunk(_))
    }
}

/// A quote for one pool on one venue.
///
/// `prices[i]` is the output amount for input `amounts[i]` (SELL) or the
/// input amount for output `amounts[i]` (BUY); zero means "no quote" for
/// that chunk. `data` is venue-opaque and is consumed untouched by
/// transaction encoding.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoolPrices {
    pub prices: Vec<U256>,
    /// Quote for one whole unit of the fixed-decimal token, used for
    /// price-impact baselining downstream.
    pub unit: U256,
    pub gas_cost: GasCost,
    pub exchange: String,
    #[serde(default)]
    pub pool_identifier: Option<String>,
    #[serde(default)]
    pub pool_addresses: Vec<Address>,
    #[serde(default)]
    pub data: serde_json::Value,
    /// Original L2 gas cost, preserved when the rollup L1 overlay is applied.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gas_cost_l2: Option<GasCost>,
}

/// Envelope around a venue's answer for one pool.
///
/// `prices: None` signals that the venue was asked but returned no quote for
/// a known reason (skipped, errored, fee-incompatible); `pool_id` then
/// carries the reason so diagnostic lineage survives aggregation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImprovedPoolPrice {
    pub dex_key: String,
    pub pool_id: String,
    pub prices: Option<PoolPrices>,
}

/// Wraps an adapter's raw answer into envelopes.
///
/// An absent or empty answer still yields exactly one diagnostic envelope,
/// so every adapter invocation contributes at least one entry.
pub fn to_improved_pool_prices(dex_key: &str, prices: Option<Vec<PoolPrices>>) -> Vec<ImprovedPoolPrice> {
    match prices {
        Some(pps) if !pps.is_empty() => pps
            .into_iter()
            .map(|pp| ImprovedPoolPrice {
                dex_key: dex_key.to_string(),
                pool_id: pp.pool_identifier.clone().unwrap_or_default(),
                prices: Some(pp),
            })
            .collect(),
        _ => vec![ImprovedPoolPrice {
            dex_key: dex_key.to_string(),
            pool_id: String::new(),
            prices: None,
        }],
    }
}

/// Case-insensitive pool identifier comparison. Identifiers are
/// `<venueKey>_<payload>` strings and payloads embed hex addresses whose
/// casing varies by producer.
pub fn pool_ids_equal(a: &str, b: &str) -> bool {
    a.eq_ignore_ascii_case(b)
}

/// Reason a quote was dropped by the validation gate.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum QuoteRejection {
    #[error("prices length {prices} does not match amounts length {amounts}")]
    PriceLengthMismatch { prices: usize, amounts: usize },
    #[error("gas cost length {gas} does not match amounts length {amounts}")]
    GasLengthMismatch { gas: usize, amounts: usize },
    #[error("non-zero price at zero amount (chunk {0})")]
    NonZeroPriceAtZeroAmount(usize),
    #[error("non-zero gas cost at zero amount (chunk {0})")]
    NonZeroGasAtZeroAmount(usize),
    #[error("all price chunks are zero")]
    AllZeroPrices,
}

/// Post-hoc invariant checks applied to every non-null quote that leaves the
/// coordinator. Chunk counts must line up, zero-amount chunks must quote
/// zero price and zero gas, and a quote that prices nothing at all is noise.
pub fn validate_pool_prices(pp: &PoolPrices, amounts: &[U256]) -> Result<(), QuoteRejection> {
    if pp.prices.len() != amounts.len() {
        return Err(QuoteRejection::PriceLengthMismatch {
            prices: pp.prices.len(),
            amounts: amounts.len(),
        });
    }

    if let GasCost::PerChunk(gas) = &pp.gas_cost {
        if gas.len() != amounts.len() {
            return Err(QuoteRejection::GasLengthMismatch {
                gas: gas.len(),
                amounts: amounts.len(),
            });
        }
        for (i, amount) in amounts.iter().enumerate() {
            if amount.is_zero() && gas[i] != 0 {
                return Err(QuoteRejection::NonZeroGasAtZeroAmount(i));
            }
        }
    }

    for (i, amount) in amounts.iter().enumerate() {
        if amount.is_zero() && !pp.prices[i].is_zero() {
            return Err(QuoteRejection::NonZeroPriceAtZeroAmount(i));
        }
    }

    if pp.prices.iter().all(|p| p.is_zero()) {
        return Err(QuoteRejection::AllZeroPrices);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quote(prices: Vec<u64>, gas_cost: GasCost) -> PoolPrices {
        PoolPrices {
            prices: prices.into_iter().map(U256::from).collect(),
            unit: U256::one(),
            gas_cost,
            exchange: "TestDex".to_string(),
            pool_identifier: Some("TestDex_0xabc".to_string()),
            pool_addresses: vec![],
            data: serde_json::Value::Null,
            gas_cost_l2: None,
        }
    }

    #[test]
    fn token_equality_is_address_only() {
        let addr = Address::repeat_byte(0x11);
        assert_eq!(Token::new(addr, 18), Token::new(addr, 6));
    }

    #[test]
    fn native_sentinel_is_wrapped() {
        let wrapped = Address::repeat_byte(0x42);
        let token = Token::new(*NATIVE_TOKEN_ADDRESS, 18).wrap_native(wrapped);
        assert_eq!(token.address, wrapped);

        let other = Token::new(Address::repeat_byte(0x01), 18).wrap_native(wrapped);
        assert_eq!(other.address, Address::repeat_byte(0x01));
    }

    #[test]
    fn source_fee_in_play() {
        assert!(!TransferFeeParams::default().source_fee_in_play());
        assert!(TransferFeeParams { src_fee: 50, ..Default::default() }.source_fee_in_play());
        assert!(TransferFeeParams { src_dex_fee: 1, ..Default::default() }.source_fee_in_play());
        assert!(!TransferFeeParams { dest_fee: 100, ..Default::default() }.source_fee_in_play());
    }

    #[test]
    fn empty_answer_yields_one_diagnostic_envelope() {
        for answer in [None, Some(vec![])] {
            let envelopes = to_improved_pool_prices("TestDex", answer);
            assert_eq!(envelopes.len(), 1);
            assert_eq!(envelopes[0].dex_key, "TestDex");
            assert_eq!(envelopes[0].pool_id, "");
            assert!(envelopes[0].prices.is_none());
        }
    }

    #[test]
    fn envelopes_carry_pool_identifiers() {
        let mut pp = quote(vec![1, 2], GasCost::Scalar(100));
        pp.pool_identifier = None;
        let envelopes = to_improved_pool_prices("TestDex", Some(vec![pp]));
        assert_eq!(envelopes.len(), 1);
        assert_eq!(envelopes[0].pool_id, "");
        assert!(envelopes[0].prices.is_some());
    }

    #[test]
    fn pool_id_comparison_ignores_case() {
        assert!(pool_ids_equal("TestDex_0xABC", "testdex_0xabc"));
        assert!(!pool_ids_equal("TestDex_0xABC", "TestDex_0xABD"));
    }

    #[test]
    fn validation_accepts_well_formed_quote() {
        let amounts = [U256::zero(), U256::from(1_000u64)];
        let pp = quote(vec![0, 1993], GasCost::Scalar(90_000));
        assert!(validate_pool_prices(&pp, &amounts).is_ok());
    }

    #[test]
    fn validation_rejects_length_mismatch() {
        let amounts = [U256::from(1u64)];
        let pp = quote(vec![1, 2], GasCost::Scalar(0));
        assert_eq!(
            validate_pool_prices(&pp, &amounts),
            Err(QuoteRejection::PriceLengthMismatch { prices: 2, amounts: 1 })
        );
    }

    #[test]
    fn validation_rejects_nonzero_gas_at_zero_amount() {
        let amounts = [U256::zero(), U256::from(5u64), U256::from(7u64)];
        let pp = quote(vec![0, 1, 2], GasCost::PerChunk(vec![10, 20, 30]));
        assert_eq!(
            validate_pool_prices(&pp, &amounts),
            Err(QuoteRejection::NonZeroGasAtZeroAmount(0))
        );
    }

    #[test]
    fn validation_rejects_all_zero_prices() {
        let amounts = [U256::from(1u64), U256::from(2u64), U256::from(3u64)];
        let pp = quote(vec![0, 0, 0], GasCost::Scalar(100));
        assert_eq!(validate_pool_prices(&pp, &amounts), Err(QuoteRejection::AllZeroPrices));
    }

    #[test]
    fn gas_cost_serde_shape_is_untagged() {
        let scalar: GasCost = serde_json::from_str("90000").unwrap();
        assert_eq!(scalar, GasCost::Scalar(90_000));
        let per_chunk: GasCost = serde_json::from_str("[1,2,3]").unwrap();
        assert_eq!(per_chunk, GasCost::PerChunk(vec![1, 2, 3]));
    }
}
