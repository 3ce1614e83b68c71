//! Block reward schedules.
//!
//! Proof-of-work subsidy is difficulty-coupled: it is cut in half for every
//! 16× multiply of difficulty, found by binary search over
//! `(cap / subsidy)^4 == limit / target`. Proof-of-stake mints interest on
//! destroyed coin age, with the per-coin-year rate following the same
//! difficulty curve under its own cap.

use primitive_types::{U256, U512};

use cinder_core::constants::{CENT, MAX_MINT_PROOF_OF_STAKE, MAX_MINT_PROOF_OF_WORK};

use crate::compact::compact_to_target;

fn widen(x: U256) -> U512 {
    let mut bytes = [0u8; 64];
    x.to_big_endian(&mut bytes[32..]);
    U512::from_big_endian(&bytes)
}

fn fourth_power(x: u64) -> U512 {
    let x = U512::from(x);
    x * x * x * x
}

/// Binary-search the difficulty-scaled amount in `[CENT, cap]` satisfying
/// `(cap / amount)^4 == limit / target`, rounded down to a whole cent.
fn difficulty_scaled(cap: i64, bits: u32, limit: &U256) -> i64 {
    let Some(target) = compact_to_target(bits) else {
        return 0;
    };

    let rhs = fourth_power(cap as u64) * widen(target);
    let mut lower = CENT as u64;
    let mut upper = cap as u64;
    while lower + CENT as u64 <= upper {
        let mid = (lower + upper) / 2;
        if fourth_power(mid) * widen(*limit) > rhs {
            upper = mid;
        } else {
            lower = mid;
        }
    }

    let amount = (upper as i64 / CENT) * CENT;
    amount.min(cap)
}

/// Proof-of-work block reward for the given difficulty, plus collected fees.
pub fn proof_of_work_reward(bits: u32, fees: i64, pow_limit: &U256) -> i64 {
    difficulty_scaled(MAX_MINT_PROOF_OF_WORK, bits, pow_limit) + fees
}

/// Proof-of-stake reward for the coin age destroyed by a coin-stake.
///
/// The per-coin-year rate is difficulty-scaled under
/// [`MAX_MINT_PROOF_OF_STAKE`]; `coin_age` is measured in coin-days, so one
/// coin held for a year earns `rate` at the easiest difficulty.
pub fn proof_of_stake_reward(coin_age: u64, bits: u32, pos_limit: &U256) -> i64 {
    let rate = difficulty_scaled(MAX_MINT_PROOF_OF_STAKE, bits, pos_limit);
    // 33-part fixed-point year; multiply before dividing so small stakes
    // do not round to zero.
    ((coin_age as i128) * (rate as i128) * 33 / (365 * 33 + 8)) as i64
}
