//! The genesis block.
//!
//! Deterministically constructed per network; its hash anchors index
//! loading. The genesis coinbase is unspendable (it is never given a
//! transaction-index record).

use cinder_core::types::{Block, BlockHeader, OutPoint, Transaction, TxIn, TxOut};
use cinder_core::hash::Hash256;

use crate::params::ChainParams;

const GENESIS_TAG: &[u8] = b"cinder rises from the ashes of trust";

/// Build the genesis block for the given network.
pub fn genesis_block(params: &ChainParams) -> Block {
    let mut sig_script = vec![GENESIS_TAG.len() as u8];
    sig_script.extend_from_slice(GENESIS_TAG);

    let coinbase = Transaction {
        version: 1,
        time: params.genesis_time,
        vin: vec![TxIn {
            prevout: OutPoint::null(),
            sig_script,
            sequence: u32::MAX,
        }],
        vout: vec![TxOut::empty()],
        lock_time: 0,
    };

    let mut block = Block {
        header: BlockHeader {
            version: 1,
            hash_prev_block: Hash256::ZERO,
            hash_merkle_root: Hash256::ZERO,
            time: params.genesis_time,
            bits: params.pow_limit_bits,
            nonce: 0,
        },
        vtx: vec![coinbase],
        signature: Vec::new(),
    };
    block.header.hash_merkle_root = block.merkle_root();
    block
}

/// Hash of the genesis block for the given network.
pub fn genesis_hash(params: &ChainParams) -> Hash256 {
    genesis_block(params).hash()
}
