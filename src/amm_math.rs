//! Constant-product AMM math and virtual-pool derivation.
//!
//! All quote math is pure big-integer arithmetic on `U256`, with `U512`
//! intermediates where products can exceed 256 bits. Division is integer
//! division matching the on-chain contracts, including the `1 +` round-up on
//! the exact-output path.

use ethers::types::{U256, U512};
use once_cell::sync::Lazy;

use crate::types::{Side, FEE_DENOMINATOR};

/// Uniswap V2 pair reserves are `uint112`; a swap that would push a reserve
/// past this reverts on chain, so the quote for it is zero.
pub static RESERVE_LIMIT: Lazy<U256> = Lazy::new(|| (U256::one() << 112) - 1);

/// Output amount for an exact-input swap, fee taken on the input.
///
/// `(x·(F−fee)·r_out) / (r_in·F + x·(F−fee))`, returning zero on a zero
/// denominator or when `r_in + x` would overflow the reserve width.
pub fn get_amount_out(amount_in: U256, reserve_in: U256, reserve_out: U256, fee_bps: u32) -> U256 {
    if amount_in.is_zero() {
        return U256::zero();
    }
    match reserve_in.checked_add(amount_in) {
        Some(sum) if sum <= *RESERVE_LIMIT => {}
        _ => return U256::zero(),
    }

    let fee_factor = U256::from(FEE_DENOMINATOR.saturating_sub(fee_bps));
    // amount_in is bounded by the reserve width, so this product fits U256
    let amount_with_fee = amount_in * fee_factor;
    let numerator = amount_with_fee.full_mul(reserve_out);
    let denominator =
        reserve_in.full_mul(U256::from(FEE_DENOMINATOR)) + U512::from(amount_with_fee);
    if denominator.is_zero() {
        return U256::zero();
    }

    // quotient <= reserve_out, so the narrowing cannot fail
    U256::try_from(numerator / denominator).unwrap_or_else(|_| U256::zero())
}

/// Input amount for an exact-output swap, fee taken on the input.
///
/// `1 + (r_in·y·F) / ((F−fee)·(r_out − y))`, contract-exact round-up.
/// Returns zero when the denominator is non-positive (`y >= r_out` or a
/// 100% fee) or the numerator is zero.
pub fn get_amount_in(amount_out: U256, reserve_in: U256, reserve_out: U256, fee_bps: u32) -> U256 {
    if amount_out.is_zero() || reserve_in.is_zero() {
        return U256::zero();
    }
    if amount_out >= reserve_out {
        return U256::zero();
    }
    let fee_factor = FEE_DENOMINATOR.saturating_sub(fee_bps);
    if fee_factor == 0 {
        return U256::zero();
    }

    let numerator = match reserve_in
        .full_mul(amount_out)
        .checked_mul(U512::from(FEE_DENOMINATOR))
    {
        Some(n) => n,
        None => return U256::zero(),
    };
    let denominator = (reserve_out - amount_out).full_mul(U256::from(fee_factor));

    let quotient = match U256::try_from(numerator / denominator) {
        Ok(q) => q,
        Err(_) => return U256::zero(),
    };
    quotient.checked_add(U256::one()).unwrap_or_else(U256::zero)
}

/// One hop of a swap path, oriented in the direction of the trade.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolLeg {
    pub reserve_in: U256,
    pub reserve_out: U256,
    pub fee_bps: u32,
}

/// Composes a quote across a multi-hop path.
///
/// SELL folds left-to-right on the input amount; BUY folds right-to-left on
/// the output amount. A zero anywhere along the chain poisons the whole
/// quote to zero.
pub fn compute_path_amount(amount: U256, legs: &[PoolLeg], side: Side) -> U256 {
    match side {
        Side::Sell => legs.iter().fold(amount, |acc, leg| {
            if acc.is_zero() {
                acc
            } else {
                get_amount_out(acc, leg.reserve_in, leg.reserve_out, leg.fee_bps)
            }
        }),
        Side::Buy => legs.iter().rev().fold(amount, |acc, leg| {
            if acc.is_zero() {
                acc
            } else {
                get_amount_in(acc, leg.reserve_in, leg.reserve_out, leg.fee_bps)
            }
        }),
    }
}

/// One real pool seen from its own token toward the shared connector token.
#[derive(Debug, Clone)]
pub struct PairLeg {
    /// Reserve of the leg's own token (the `i` or `j` side).
    pub base_reserve: U256,
    /// Reserve of the shared connector token in the same pool.
    pub common_reserve: U256,
    pub fee_bps: u32,
    /// Block the leg's state was committed at. Both legs must agree.
    pub block_number: u64,
}

/// Derives a synthetic src→dest pool from two real pools sharing a connector
/// token.
///
/// The smaller leg is scaled up so both connector reserves match; the
/// synthetic fee is the max of the two legs' fees. Returns `None` when the
/// legs' states are at different block references or a connector reserve is
/// empty — callers treat that as a soft skip, never a request failure.
pub fn derive_virtual_pool(src_leg: &PairLeg, dest_leg: &PairLeg) -> Option<PoolLeg> {
    if src_leg.block_number != dest_leg.block_number {
        return None;
    }
    if src_leg.common_reserve.is_zero() || dest_leg.common_reserve.is_zero() {
        return None;
    }

    let (reserve_in, reserve_out) = if src_leg.common_reserve == dest_leg.common_reserve {
        (src_leg.base_reserve, dest_leg.base_reserve)
    } else if src_leg.common_reserve < dest_leg.common_reserve {
        let scaled = src_leg.base_reserve.full_mul(dest_leg.common_reserve)
            / U512::from(src_leg.common_reserve);
        (U256::try_from(scaled).ok()?, dest_leg.base_reserve)
    } else {
        let scaled = dest_leg.base_reserve.full_mul(src_leg.common_reserve)
            / U512::from(dest_leg.common_reserve);
        (src_leg.base_reserve, U256::try_from(scaled).ok()?)
    };

    Some(PoolLeg {
        reserve_in,
        reserve_out,
        fee_bps: src_leg.fee_bps.max(dest_leg.fee_bps),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn u(v: u128) -> U256 {
        U256::from(v)
    }

    #[test]
    fn amount_out_matches_contract_division() {
        // (1000 * 9970 * 2_000_000) / (1_000_000 * 10_000 + 1000 * 9970)
        let out = get_amount_out(u(1000), u(1_000_000), u(2_000_000), 30);
        assert_eq!(out, u(1992));
    }

    #[test]
    fn unit_amount_out_floors() {
        let out = get_amount_out(u(1), u(1_000_000), u(2_000_000), 30);
        assert_eq!(out, u(1));
    }

    #[test]
    fn zero_input_quotes_zero() {
        assert_eq!(get_amount_out(U256::zero(), u(1), u(1), 30), U256::zero());
        assert_eq!(get_amount_in(U256::zero(), u(1), u(1), 30), U256::zero());
    }

    #[test]
    fn empty_reserves_quote_zero() {
        assert_eq!(get_amount_out(u(10), U256::zero(), U256::zero(), 0), U256::zero());
        assert_eq!(get_amount_in(u(10), U256::zero(), u(100), 0), U256::zero());
    }

    #[test]
    fn reserve_overflow_quotes_zero() {
        let near_limit = *RESERVE_LIMIT - u(10);
        assert_eq!(get_amount_out(u(100), near_limit, u(1_000_000), 30), U256::zero());
        // just inside the limit still quotes
        assert!(get_amount_out(u(10), near_limit, *RESERVE_LIMIT, 30) > U256::zero());
    }

    #[test]
    fn amount_in_rounds_up() {
        // exact-output demands at least the exact-input quote plus rounding
        let amount_in = get_amount_in(u(1993), u(1_000_000), u(2_000_000), 30);
        let replay = get_amount_out(amount_in, u(1_000_000), u(2_000_000), 30);
        assert!(replay >= u(1993));
    }

    #[test]
    fn amount_in_unfillable_output_quotes_zero() {
        assert_eq!(get_amount_in(u(2_000_000), u(1_000_000), u(2_000_000), 30), U256::zero());
        assert_eq!(get_amount_in(u(2_000_001), u(1_000_000), u(2_000_000), 30), U256::zero());
    }

    #[test]
    fn round_trip_never_undershoots() {
        // inputs small against the reserves, where one unit of floor loss in
        // the output maps to less than one unit of input
        let reserves = [
            (u(1_000_000), u(2_000_000)),
            (u(5), u(1_000_000_000_000)),
            (u(123_456_789), u(987_654_321)),
        ];
        for (r0, r1) in reserves {
            for fee in [0u32, 30, 100] {
                for x in [1u128, 17, 1_000] {
                    let out = get_amount_out(u(x), r0, r1, fee);
                    if out.is_zero() {
                        continue;
                    }
                    let back = get_amount_in(out, r0, r1, fee);
                    assert!(
                        back >= u(x),
                        "round trip undershot: x={x} fee={fee} out={out} back={back}"
                    );
                }
            }
        }
    }

    #[test]
    fn exact_output_quote_always_fills() {
        // the contract-exact guarantee behind the `1 +` round-up: swapping
        // the quoted input yields at least the requested output
        let reserves = [
            (u(1_000), u(1_000)),
            (u(1_000_000), u(2_000_000)),
            (u(5), u(1_000_000_000_000)),
            (u(123_456_789), u(987_654_321)),
        ];
        for (r0, r1) in reserves {
            for fee in [0u32, 30, 100, 9_999] {
                for y in [1u128, 100, 799] {
                    let amount_in = get_amount_in(u(y), r0, r1, fee);
                    if amount_in.is_zero() {
                        continue;
                    }
                    let filled = get_amount_out(amount_in, r0, r1, fee);
                    assert!(
                        filled >= u(y),
                        "exact-output unfilled: y={y} fee={fee} in={amount_in} filled={filled}"
                    );
                }
            }
        }
    }

    #[test]
    fn sell_path_composes_left_to_right() {
        let legs = [
            PoolLeg { reserve_in: u(1_000_000), reserve_out: u(2_000_000), fee_bps: 30 },
            PoolLeg { reserve_in: u(2_000_000), reserve_out: u(1_000_000), fee_bps: 30 },
        ];
        let hop1 = get_amount_out(u(1000), u(1_000_000), u(2_000_000), 30);
        let expected = get_amount_out(hop1, u(2_000_000), u(1_000_000), 30);
        assert_eq!(compute_path_amount(u(1000), &legs, Side::Sell), expected);
    }

    #[test]
    fn buy_path_composes_right_to_left() {
        let legs = [
            PoolLeg { reserve_in: u(1_000_000), reserve_out: u(2_000_000), fee_bps: 30 },
            PoolLeg { reserve_in: u(2_000_000), reserve_out: u(1_000_000), fee_bps: 30 },
        ];
        let hop2 = get_amount_in(u(500), u(2_000_000), u(1_000_000), 30);
        let expected = get_amount_in(hop2, u(1_000_000), u(2_000_000), 30);
        assert_eq!(compute_path_amount(u(500), &legs, Side::Buy), expected);
    }

    #[test]
    fn zero_poisons_the_path() {
        let legs = [
            PoolLeg { reserve_in: U256::zero(), reserve_out: U256::zero(), fee_bps: 30 },
            PoolLeg { reserve_in: u(2_000_000), reserve_out: u(1_000_000), fee_bps: 30 },
        ];
        assert_eq!(compute_path_amount(u(1000), &legs, Side::Sell), U256::zero());
    }

    #[test]
    fn virtual_pool_scales_common_leg() {
        let src = PairLeg {
            base_reserve: u(1_000_000),
            common_reserve: u(500_000),
            fee_bps: 30,
            block_number: 100,
        };
        let dest = PairLeg {
            base_reserve: u(3_000_000),
            common_reserve: u(1_000_000),
            fee_bps: 25,
            block_number: 100,
        };
        let pool = derive_virtual_pool(&src, &dest).unwrap();
        // src leg scaled by 1_000_000 / 500_000 = 2
        assert_eq!(pool.reserve_in, u(2_000_000));
        assert_eq!(pool.reserve_out, u(3_000_000));
        assert_eq!(pool.fee_bps, 30);
    }

    #[test]
    fn virtual_pool_requires_matching_blocks() {
        let src = PairLeg {
            base_reserve: u(1),
            common_reserve: u(1),
            fee_bps: 30,
            block_number: 100,
        };
        let dest = PairLeg {
            base_reserve: u(1),
            common_reserve: u(1),
            fee_bps: 30,
            block_number: 101,
        };
        assert!(derive_virtual_pool(&src, &dest).is_none());
    }

    #[test]
    fn virtual_pool_requires_connector_liquidity() {
        let src = PairLeg {
            base_reserve: u(1),
            common_reserve: U256::zero(),
            fee_bps: 30,
            block_number: 100,
        };
        let dest = PairLeg {
            base_reserve: u(1),
            common_reserve: u(1),
            fee_bps: 30,
            block_number: 100,
        };
        assert!(derive_virtual_pool(&src, &dest).is_none());
    }
}
