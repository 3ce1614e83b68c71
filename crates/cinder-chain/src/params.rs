//! Per-network chain parameters.

use primitive_types::U256;

use cinder_consensus::compact::compact_to_target;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Network {
    Main,
    Test,
}

/// Consensus parameters that vary between mainnet and testnet.
///
/// Both target limits are compact-representable so that clamping and
/// comparison against header `bits` are exact.
#[derive(Clone, Debug)]
pub struct ChainParams {
    pub network: Network,
    /// Block-file record magic; distinguishes mainnet files from testnet.
    pub magic: u32,
    pub pow_limit_bits: u32,
    pub pos_limit_bits: u32,
    pub pow_limit: U256,
    pub pos_limit: U256,
    pub coinbase_maturity: i32,
    /// Timestamp of the genesis block.
    pub genesis_time: i64,
}

impl ChainParams {
    pub fn main() -> Self {
        Self::from_bits(Network::Main, 0xC1DE_A1B2, 0x1E0F_FFFF, 0x1E0F_FFFF, 100, 1_393_221_600)
    }

    pub fn test() -> Self {
        Self::from_bits(Network::Test, 0xC1DE_7E57, 0x2100_FFFF, 0x2100_FFFF, 10, 1_393_221_600)
    }

    fn from_bits(
        network: Network,
        magic: u32,
        pow_limit_bits: u32,
        pos_limit_bits: u32,
        coinbase_maturity: i32,
        genesis_time: i64,
    ) -> Self {
        let pow_limit = compact_to_target(pow_limit_bits)
            .expect("chain parameter bits are valid by construction");
        let pos_limit = compact_to_target(pos_limit_bits)
            .expect("chain parameter bits are valid by construction");
        Self {
            network,
            magic,
            pow_limit_bits,
            pos_limit_bits,
            pow_limit,
            pos_limit,
            coinbase_maturity,
            genesis_time,
        }
    }

    /// Limit for the requested proof type.
    pub fn limit(&self, proof_of_stake: bool) -> &U256 {
        if proof_of_stake {
            &self.pos_limit
        } else {
            &self.pow_limit
        }
    }

    pub fn limit_bits(&self, proof_of_stake: bool) -> u32 {
        if proof_of_stake {
            self.pos_limit_bits
        } else {
            self.pow_limit_bits
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cinder_consensus::compact::target_to_compact;

    #[test]
    fn networks_have_distinct_magics() {
        assert_ne!(ChainParams::main().magic, ChainParams::test().magic);
    }

    #[test]
    fn limits_round_trip_through_compact() {
        for params in [ChainParams::main(), ChainParams::test()] {
            assert_eq!(target_to_compact(params.pow_limit), params.pow_limit_bits);
            assert_eq!(target_to_compact(params.pos_limit), params.pos_limit_bits);
        }
    }

    #[test]
    fn testnet_is_easier() {
        assert!(ChainParams::test().pow_limit > ChainParams::main().pow_limit);
    }
}
