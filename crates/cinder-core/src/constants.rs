//! Protocol constants. All monetary values in sparks (1 CND = 10^6 sparks).

pub const COIN: i64 = 1_000_000;
pub const CENT: i64 = 10_000;

/// Largest legal monetary value. Individual outputs and output sums must
/// stay within `[0, MAX_MONEY]`.
pub const MAX_MONEY: i64 = i64::MAX;

pub const MAX_BLOCK_SIZE: usize = 1_000_000;
pub const MAX_BLOCK_SIZE_GEN: usize = MAX_BLOCK_SIZE / 2;
pub const MAX_BLOCK_SIGOPS: usize = MAX_BLOCK_SIZE / 50;
pub const MAX_TX_SIGOPS: usize = MAX_BLOCK_SIGOPS / 5;
pub const MAX_ORPHAN_TRANSACTIONS: usize = MAX_BLOCK_SIZE / 100;
pub const MAX_ORPHAN_BLOCKS: usize = MAX_ORPHAN_TRANSACTIONS / 100;

pub const MIN_TX_FEE: i64 = CENT / 10;
pub const MIN_RELAY_TX_FEE: i64 = CENT / 50;
pub const MIN_TXOUT_AMOUNT: i64 = CENT / 100;

pub const MAX_MINT_PROOF_OF_WORK: i64 = 100 * COIN;
pub const MAX_MINT_PROOF_OF_STAKE: i64 = COIN;

pub const MAX_SCRIPTCHECK_THREADS: usize = 16;

pub const CURRENT_TX_VERSION: i32 = 1;
pub const CURRENT_BLOCK_VERSION: i32 = 6;

/// Lock-time values below this threshold are block heights; values at or
/// above it are Unix timestamps.
pub const LOCKTIME_THRESHOLD: i64 = 500_000_000;

pub const MAX_STANDARD_TX_SIZE: usize = 100_000;
pub const MAX_STANDARD_SIGSCRIPT_SIZE: usize = 1650;

pub const SECONDS_PER_DAY: i64 = 24 * 60 * 60;
pub const ONE_HOUR: i64 = 3600;

/// Minimum age an output must reach before it can be staked.
pub const STAKE_MIN_AGE: i64 = 30 * SECONDS_PER_DAY;
/// Age beyond which an output stops accumulating stake weight.
pub const STAKE_MAX_AGE: i64 = 90 * SECONDS_PER_DAY;

pub fn money_range(value: i64) -> bool {
    (0..=MAX_MONEY).contains(&value)
}

/// Oldest timestamp a new block may carry relative to adjusted time.
pub fn past_drift(now: i64) -> i64 {
    now - 2 * ONE_HOUR
}

/// Newest timestamp a new block may carry relative to adjusted time.
pub fn future_drift(now: i64) -> i64 {
    now + 2 * ONE_HOUR
}

#[cfg(test)]
mod tests {
    use super::*;
    #[test]
    fn sigop_limit_matches_block_size() { assert_eq!(MAX_BLOCK_SIGOPS, 20_000); }
    #[test]
    fn drift_is_two_hours() { assert_eq!(future_drift(0) - past_drift(0), 4 * ONE_HOUR); }
    #[test]
    fn money_range_bounds() {
        assert!(money_range(0));
        assert!(money_range(MAX_MONEY));
        assert!(!money_range(-1));
    }
}
