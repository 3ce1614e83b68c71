//! Per-block difficulty retargeting.
//!
//! PoW and PoS difficulties adjust independently: the caller finds the two
//! most recent blocks of the requested proof type and feeds their spacing
//! here. The new target is an exponential moving average of the previous
//! target weighted by how far the observed spacing deviates from
//! [`TARGET_SPACING`], clamped to the per-algorithm limit.

use primitive_types::U256;

use crate::compact::{compact_to_target, target_to_compact};

/// Desired seconds between blocks of one proof type.
pub const TARGET_SPACING: i64 = 10 * 60;

/// Averaging window of the retarget filter.
pub const TARGET_TIMESPAN: i64 = 7 * 24 * 60 * 60;

/// Number of spacings in the averaging window.
pub const fn interval() -> i64 {
    TARGET_TIMESPAN / TARGET_SPACING
}

/// Compute the required target following a block with `prev_bits`, given
/// the spacing between the two most recent blocks of the same proof type.
///
/// `new = old * ((interval−1)·spacing + 2·actual) / ((interval+1)·spacing)`
///
/// Negative spacings (out-of-order timestamps) are clamped to zero, which
/// pushes difficulty up.
pub fn next_target(prev_bits: u32, actual_spacing: i64, limit: &U256) -> u32 {
    let Some(prev) = compact_to_target(prev_bits) else {
        return target_to_compact(*limit);
    };

    let actual = actual_spacing.max(0);
    let n = interval();
    let numerator = ((n - 1) * TARGET_SPACING + 2 * actual) as u64;
    let denominator = ((n + 1) * TARGET_SPACING) as u64;

    let new = match prev.checked_mul(U256::from(numerator)) {
        Some(scaled) => scaled / U256::from(denominator),
        None => *limit,
    };

    target_to_compact(if new > *limit { *limit } else { new })
}
