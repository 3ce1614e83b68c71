//! Compact difficulty encoding, target checks, and chain trust.
//!
//! `bits` packs a 256-bit target into 32 bits: one exponent byte and a
//! 23-bit mantissa (bit 23 is the sign, which no valid target sets).

use primitive_types::U256;

use cinder_core::hash::Hash256;

use crate::error::ConsensusError;

/// Expand compact `bits` into a 256-bit target.
///
/// Returns `None` for zero, negative, or overflowing encodings.
pub fn compact_to_target(bits: u32) -> Option<U256> {
    let size = (bits >> 24) as usize;
    let word = bits & 0x007F_FFFF;
    if bits & 0x0080_0000 != 0 || word == 0 {
        return None;
    }
    // Overflow: the mantissa shifted past 256 bits.
    if size > 34 || (word > 0xFF && size > 33) || (word > 0xFFFF && size > 32) {
        return None;
    }
    let target = if size <= 3 {
        U256::from(word >> (8 * (3 - size)))
    } else {
        U256::from(word) << (8 * (size - 3))
    };
    if target.is_zero() {
        None
    } else {
        Some(target)
    }
}

/// Pack a 256-bit target into compact `bits`.
pub fn target_to_compact(target: U256) -> u32 {
    let mut size = (target.bits() + 7) / 8;
    let mut word = if size <= 3 {
        (target.low_u64() << (8 * (3 - size))) as u32
    } else {
        (target >> (8 * (size - 3))).low_u64() as u32
    };
    // Carry the mantissa sign bit into the exponent.
    if word & 0x0080_0000 != 0 {
        word >>= 8;
        size += 1;
    }
    word | ((size as u32) << 24)
}

/// Interpret a hash as a little-endian 256-bit integer.
pub fn hash_to_u256(hash: &Hash256) -> U256 {
    U256::from_little_endian(hash.as_bytes())
}

/// Trust contributed by one block: `2^256 / (target + 1)`, with
/// proof-of-stake counting double relative to proof-of-work.
pub fn block_trust(bits: u32, proof_of_stake: bool) -> U256 {
    let Some(target) = compact_to_target(bits) else {
        return U256::zero();
    };
    let Some(denom) = target.checked_add(U256::one()) else {
        return U256::one();
    };
    // 2^256 does not fit in a word, so compute (~target / (target+1)) + 1.
    let base = (!target) / denom + U256::one();
    if proof_of_stake {
        base
    } else {
        base >> 1
    }
}

/// Verify a proof-of-work hash against the claimed `bits`.
pub fn check_proof_of_work(
    hash: &Hash256,
    bits: u32,
    pow_limit: &U256,
) -> Result<(), ConsensusError> {
    let target = compact_to_target(bits).ok_or(ConsensusError::BadBits)?;
    if target > *pow_limit {
        return Err(ConsensusError::BadBits);
    }
    if hash_to_u256(hash) > target {
        return Err(ConsensusError::ProofOfWorkFailed);
    }
    Ok(())
}
