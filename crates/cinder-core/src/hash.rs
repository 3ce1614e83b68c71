//! 256-bit hashes and the protocol hash functions.
//!
//! Transaction identity and merkle nodes use double SHA-256 over the
//! canonical encoding. Block identity uses [`header_hash`], a seam for the
//! memory-hard header hash; the built-in implementation is double SHA-256
//! so that the rest of the validator is independent of the concrete
//! function.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

/// A 256-bit hash value, compared by value.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct Hash256(pub [u8; 32]);

impl Hash256 {
    /// The zero hash. Used as the null prevout txid and the "no block" marker.
    pub const ZERO: Self = Self([0u8; 32]);

    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; 32]
    }

    /// Low bit of the hash, used as the per-block entropy bit.
    pub fn low_bit(&self) -> u32 {
        (self.0[0] & 1) as u32
    }
}

impl fmt::Display for Hash256 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Byte-reversed hex, matching the conventional display of block and
        // transaction hashes.
        for byte in self.0.iter().rev() {
            write!(f, "{byte:02x}")?;
        }
        Ok(())
    }
}

impl From<[u8; 32]> for Hash256 {
    fn from(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }
}

impl AsRef<[u8]> for Hash256 {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

/// Double SHA-256.
pub fn sha256d(data: &[u8]) -> Hash256 {
    let first = Sha256::digest(data);
    Hash256(Sha256::digest(first).into())
}

/// Hash of a serialized block header.
///
/// The protocol specifies a memory-hard function here; this implementation
/// substitutes double SHA-256 behind the same seam, the way the mining hash
/// is normally swapped per deployment.
pub fn header_hash(header_bytes: &[u8]) -> Hash256 {
    sha256d(header_bytes)
}
