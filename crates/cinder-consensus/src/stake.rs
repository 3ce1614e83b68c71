//! Proof-of-stake: entropy bits, the stake modifier, coin age, and the
//! kernel hash check.
//!
//! The stake modifier is a per-block 64-bit value folded from chain
//! history; it perturbs the kernel hash so a staker cannot grind future
//! kernels by choosing transaction bits ahead of time.

use primitive_types::U256;

use cinder_core::constants::{COIN, SECONDS_PER_DAY, STAKE_MAX_AGE, STAKE_MIN_AGE};
use cinder_core::hash::{sha256d, Hash256};
use cinder_core::types::OutPoint;

use crate::compact::{compact_to_target, hash_to_u256};
use crate::error::ConsensusError;

/// One bit of entropy contributed by each block to the modifier stream.
pub fn stake_entropy_bit(block_hash: &Hash256) -> u32 {
    block_hash.low_bit()
}

/// Fold a block into the running stake modifier.
pub fn next_stake_modifier(prev_modifier: u64, entropy_bit: u32, block_hash: &Hash256) -> u64 {
    let mut buf = Vec::with_capacity(8 + 1 + 32);
    buf.extend_from_slice(&prev_modifier.to_le_bytes());
    buf.push(entropy_bit as u8);
    buf.extend_from_slice(block_hash.as_bytes());
    let digest = sha256d(&buf);
    u64::from_le_bytes(
        digest.0[..8]
            .try_into()
            .expect("digest is 32 bytes, slice of 8 always succeeds"),
    )
}

/// Rolling checksum over the modifier chain, recomputed on index load to
/// detect corrupted records.
pub fn stake_modifier_checksum(
    prev_checksum: u32,
    flags: u32,
    hash_proof_of_stake: &Hash256,
    stake_modifier: u64,
) -> u32 {
    let mut buf = Vec::with_capacity(4 + 4 + 32 + 8);
    buf.extend_from_slice(&prev_checksum.to_le_bytes());
    buf.extend_from_slice(&flags.to_le_bytes());
    buf.extend_from_slice(hash_proof_of_stake.as_bytes());
    buf.extend_from_slice(&stake_modifier.to_le_bytes());
    let digest = sha256d(&buf);
    u32::from_le_bytes(
        digest.0[..4]
            .try_into()
            .expect("digest is 32 bytes, slice of 4 always succeeds"),
    )
}

/// The kernel hash: commits to the modifier, the staked output, and the
/// claimed stake time.
pub fn kernel_hash(
    stake_modifier: u64,
    prev_tx_time: i64,
    prevout: &OutPoint,
    stake_time: i64,
) -> Hash256 {
    let mut buf = Vec::with_capacity(8 + 8 + 32 + 4 + 8);
    buf.extend_from_slice(&stake_modifier.to_le_bytes());
    buf.extend_from_slice(&prev_tx_time.to_le_bytes());
    buf.extend_from_slice(prevout.hash.as_bytes());
    buf.extend_from_slice(&prevout.n.to_le_bytes());
    buf.extend_from_slice(&stake_time.to_le_bytes());
    sha256d(&buf)
}

/// Verify a stake kernel and return the proof hash on success.
///
/// The staked output must have reached [`STAKE_MIN_AGE`]; its weight grows
/// with age (capped at [`STAKE_MAX_AGE`]) and value, and the kernel hash
/// must fall below the compact target scaled by that weight.
pub fn check_stake_kernel(
    bits: u32,
    stake_modifier: u64,
    prev_tx_time: i64,
    prev_value: i64,
    prevout: &OutPoint,
    stake_time: i64,
) -> Result<Hash256, ConsensusError> {
    let age = stake_time - prev_tx_time;
    if age < STAKE_MIN_AGE {
        return Err(ConsensusError::StakeUnderMinAge);
    }

    let target = compact_to_target(bits).ok_or(ConsensusError::BadBits)?;

    let weight_seconds = age.min(STAKE_MAX_AGE) - STAKE_MIN_AGE;
    let coin_day_weight =
        (prev_value as u128) * (weight_seconds as u128) / (COIN as u128) / (SECONDS_PER_DAY as u128);

    let weighted_target = target.saturating_mul(U256::from(coin_day_weight));

    let proof = kernel_hash(stake_modifier, prev_tx_time, prevout, stake_time);
    if hash_to_u256(&proof) > weighted_target {
        return Err(ConsensusError::StakeKernelFailed);
    }
    Ok(proof)
}

/// Coin age destroyed by a transaction, in coin-days.
///
/// Each input contributes `value × seconds-held` once it has passed
/// [`STAKE_MIN_AGE`]; younger inputs contribute nothing.
pub fn transaction_coin_age(tx_time: i64, inputs: &[(i64, i64)]) -> u64 {
    let mut value_seconds: u128 = 0;
    for &(value, prev_time) in inputs {
        let elapsed = tx_time - prev_time;
        if elapsed >= STAKE_MIN_AGE && value > 0 {
            value_seconds += (value as u128) * (elapsed as u128);
        }
    }
    (value_seconds / (COIN as u128 * SECONDS_PER_DAY as u128)) as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    fn prevout() -> OutPoint {
        OutPoint::new(Hash256([0x44; 32]), 1)
    }

    fn easy_bits() -> u32 {
        0x2000_FFFF
    }

    #[test]
    fn entropy_bit_is_hash_parity() {
        assert_eq!(stake_entropy_bit(&Hash256([2; 32])), 0);
        assert_eq!(stake_entropy_bit(&Hash256([3; 32])), 1);
    }

    #[test]
    fn modifier_is_deterministic_and_history_sensitive() {
        let h = Hash256([9; 32]);
        let a = next_stake_modifier(1, 0, &h);
        assert_eq!(a, next_stake_modifier(1, 0, &h));
        assert_ne!(a, next_stake_modifier(2, 0, &h));
        assert_ne!(a, next_stake_modifier(1, 1, &h));
        assert_ne!(a, next_stake_modifier(1, 0, &Hash256([10; 32])));
    }

    #[test]
    fn checksum_chains() {
        let proof = Hash256([7; 32]);
        let c1 = stake_modifier_checksum(0, 1, &proof, 42);
        let c2 = stake_modifier_checksum(c1, 1, &proof, 42);
        assert_ne!(c1, c2);
        assert_eq!(c1, stake_modifier_checksum(0, 1, &proof, 42));
    }

    #[test]
    fn kernel_rejects_young_stake() {
        let now = 1_700_000_000;
        let err = check_stake_kernel(
            easy_bits(),
            5,
            now - STAKE_MIN_AGE + 1,
            1000 * COIN,
            &prevout(),
            now,
        )
        .unwrap_err();
        assert_eq!(err, ConsensusError::StakeUnderMinAge);
    }

    #[test]
    fn kernel_accepts_aged_heavy_stake_at_easy_target() {
        // With the easiest target and a large weight the kernel check is
        // overwhelmingly likely to pass for any concrete hash; grind the
        // stake time a little to make the test deterministic.
        let prev_time = 1_600_000_000;
        let stake_time = prev_time + STAKE_MIN_AGE + 30 * SECONDS_PER_DAY;
        let result = (0..64).find_map(|i| {
            check_stake_kernel(
                easy_bits(),
                5,
                prev_time,
                1_000_000 * COIN,
                &prevout(),
                stake_time + i,
            )
            .ok()
        });
        assert!(result.is_some());
    }

    #[test]
    fn kernel_rejects_zero_weight() {
        // Exactly at the minimum age the weight is zero, so no hash passes.
        let prev_time = 1_600_000_000;
        let err = check_stake_kernel(
            easy_bits(),
            5,
            prev_time,
            1000 * COIN,
            &prevout(),
            prev_time + STAKE_MIN_AGE,
        )
        .unwrap_err();
        assert_eq!(err, ConsensusError::StakeKernelFailed);
    }

    #[test]
    fn coin_age_counts_only_aged_inputs() {
        let now = 1_700_000_000;
        let aged = (100 * COIN, now - 40 * SECONDS_PER_DAY);
        let young = (100 * COIN, now - SECONDS_PER_DAY);
        assert_eq!(transaction_coin_age(now, &[young]), 0);
        assert_eq!(transaction_coin_age(now, &[aged]), 4000);
        assert_eq!(transaction_coin_age(now, &[aged, young]), 4000);
    }

    #[test]
    fn coin_age_sums_inputs() {
        let now = 1_700_000_000;
        let a = (50 * COIN, now - 60 * SECONDS_PER_DAY);
        let b = (25 * COIN, now - 32 * SECONDS_PER_DAY);
        assert_eq!(transaction_coin_age(now, &[a, b]), 50 * 60 + 25 * 32);
    }
}
