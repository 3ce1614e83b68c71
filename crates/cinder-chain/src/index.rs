//! In-memory block index: one node per known block header, linked by hash.
//!
//! The map owns the nodes; `prev` and `next` are hash references resolved
//! through the map, so the parent/child graph carries no ownership cycles.
//! `next` is only set along the current best chain.

use std::collections::HashMap;
use std::io::{self, Read, Write};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use primitive_types::U256;

use cinder_core::hash::Hash256;
use cinder_core::ser::{Decodable, Encodable, SerError, SerMode};
use cinder_core::types::{Block, OutPoint};
use cinder_consensus::compact::block_trust;
use cinder_consensus::stake;

/// Serialization envelope version for on-disk index records.
const RECORD_VERSION: i32 = 1;

pub mod flags {
    /// The block is proof-of-stake.
    pub const PROOF_OF_STAKE: u32 = 1 << 0;
    /// Entropy bit contributed to the stake-modifier stream.
    pub const STAKE_ENTROPY: u32 = 1 << 1;
    /// The stake modifier was regenerated at this block.
    pub const STAKE_MODIFIER: u32 = 1 << 2;
}

/// One node of the block index.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BlockIndex {
    pub hash: Hash256,
    pub prev: Option<Hash256>,
    /// Successor on the best chain; `None` off-chain or at the tip.
    pub next: Option<Hash256>,
    pub file: u32,
    pub block_pos: u32,
    pub height: i32,
    pub chain_trust: U256,
    /// Coins newly created by this block; fees move existing coins and do
    /// not count.
    pub mint: i64,
    pub money_supply: i64,
    pub flags: u32,
    pub stake_modifier: u64,
    /// Memory-only checksum over the modifier chain.
    pub stake_modifier_checksum: u32,
    pub prevout_stake: OutPoint,
    pub stake_time: i64,
    pub hash_proof_of_stake: Hash256,
    // header fields
    pub version: i32,
    pub hash_merkle_root: Hash256,
    pub time: i64,
    pub bits: u32,
    pub nonce: u32,
}

impl BlockIndex {
    /// Build an index node for a block stored at the given file position.
    pub fn from_block(block: &Block, file: u32, block_pos: u32) -> Self {
        let hash = block.hash();
        let proof_of_stake = block.is_proof_of_stake();
        let (prevout_stake, stake_time) = if proof_of_stake {
            (block.vtx[1].vin[0].prevout, block.vtx[1].time)
        } else {
            (OutPoint::null(), 0)
        };
        let mut flags = 0;
        if proof_of_stake {
            flags |= flags::PROOF_OF_STAKE;
        }
        let prev = if block.header.hash_prev_block.is_zero() {
            None
        } else {
            Some(block.header.hash_prev_block)
        };
        Self {
            hash,
            prev,
            next: None,
            file,
            block_pos,
            height: 0,
            chain_trust: U256::zero(),
            mint: 0,
            money_supply: 0,
            flags,
            stake_modifier: 0,
            stake_modifier_checksum: 0,
            prevout_stake,
            stake_time,
            hash_proof_of_stake: Hash256::ZERO,
            version: block.header.version,
            hash_merkle_root: block.header.hash_merkle_root,
            time: block.header.time,
            bits: block.header.bits,
            nonce: block.header.nonce,
        }
    }

    pub fn is_proof_of_stake(&self) -> bool {
        self.flags & flags::PROOF_OF_STAKE != 0
    }

    pub fn is_proof_of_work(&self) -> bool {
        !self.is_proof_of_stake()
    }

    pub fn stake_entropy_bit(&self) -> u32 {
        (self.flags & flags::STAKE_ENTROPY) >> 1
    }

    pub fn set_stake_entropy_bit(&mut self, bit: u32) {
        if bit != 0 {
            self.flags |= flags::STAKE_ENTROPY;
        } else {
            self.flags &= !flags::STAKE_ENTROPY;
        }
    }

    pub fn generated_stake_modifier(&self) -> bool {
        self.flags & flags::STAKE_MODIFIER != 0
    }

    pub fn set_stake_modifier(&mut self, modifier: u64, generated: bool) {
        self.stake_modifier = modifier;
        if generated {
            self.flags |= flags::STAKE_MODIFIER;
        }
    }

    /// Trust contributed by this block alone.
    pub fn block_trust(&self) -> U256 {
        block_trust(self.bits, self.is_proof_of_stake())
    }

    /// Recompute the rolling modifier checksum from the parent's.
    pub fn compute_modifier_checksum(&self, prev_checksum: u32) -> u32 {
        stake::stake_modifier_checksum(
            prev_checksum,
            self.flags,
            &self.hash_proof_of_stake,
            self.stake_modifier,
        )
    }
}

/// Serialized form of a [`BlockIndex`], with the in-memory links replaced
/// by explicit hashes and the block's own hash carried alongside.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DiskBlockIndex {
    pub hash_prev: Hash256,
    pub hash_next: Hash256,
    pub file: u32,
    pub block_pos: u32,
    pub height: i32,
    pub mint: i64,
    pub money_supply: i64,
    pub flags: u32,
    pub stake_modifier: u64,
    pub prevout_stake: OutPoint,
    pub stake_time: i64,
    pub hash_proof_of_stake: Hash256,
    pub version: i32,
    pub hash_merkle_root: Hash256,
    pub time: i64,
    pub bits: u32,
    pub nonce: u32,
    pub block_hash: Hash256,
}

impl DiskBlockIndex {
    pub fn from_index(index: &BlockIndex) -> Self {
        Self {
            hash_prev: index.prev.unwrap_or(Hash256::ZERO),
            hash_next: index.next.unwrap_or(Hash256::ZERO),
            file: index.file,
            block_pos: index.block_pos,
            height: index.height,
            mint: index.mint,
            money_supply: index.money_supply,
            flags: index.flags,
            stake_modifier: index.stake_modifier,
            prevout_stake: index.prevout_stake,
            stake_time: index.stake_time,
            hash_proof_of_stake: index.hash_proof_of_stake,
            version: index.version,
            hash_merkle_root: index.hash_merkle_root,
            time: index.time,
            bits: index.bits,
            nonce: index.nonce,
            block_hash: index.hash,
        }
    }

    /// Rebuild the in-memory node. Links, trust, and the modifier checksum
    /// are restored by [`BlockIndexMap`] linking, not stored here.
    pub fn into_index(self) -> BlockIndex {
        BlockIndex {
            hash: self.block_hash,
            prev: if self.hash_prev.is_zero() { None } else { Some(self.hash_prev) },
            next: if self.hash_next.is_zero() { None } else { Some(self.hash_next) },
            file: self.file,
            block_pos: self.block_pos,
            height: self.height,
            chain_trust: U256::zero(),
            mint: self.mint,
            money_supply: self.money_supply,
            flags: self.flags,
            stake_modifier: self.stake_modifier,
            stake_modifier_checksum: 0,
            prevout_stake: self.prevout_stake,
            stake_time: self.stake_time,
            hash_proof_of_stake: self.hash_proof_of_stake,
            version: self.version,
            hash_merkle_root: self.hash_merkle_root,
            time: self.time,
            bits: self.bits,
            nonce: self.nonce,
        }
    }

    fn is_proof_of_stake(&self) -> bool {
        self.flags & flags::PROOF_OF_STAKE != 0
    }
}

impl Encodable for DiskBlockIndex {
    fn encode<W: Write>(&self, w: &mut W, mode: SerMode) -> io::Result<()> {
        if mode != SerMode::GetHash {
            w.write_i32::<LittleEndian>(RECORD_VERSION)?;
        }
        self.hash_next.encode(w, mode)?;
        w.write_u32::<LittleEndian>(self.file)?;
        w.write_u32::<LittleEndian>(self.block_pos)?;
        w.write_i32::<LittleEndian>(self.height)?;
        w.write_i64::<LittleEndian>(self.mint)?;
        w.write_i64::<LittleEndian>(self.money_supply)?;
        w.write_u32::<LittleEndian>(self.flags)?;
        w.write_u64::<LittleEndian>(self.stake_modifier)?;
        if self.is_proof_of_stake() {
            self.prevout_stake.encode(w, mode)?;
            w.write_i64::<LittleEndian>(self.stake_time)?;
            self.hash_proof_of_stake.encode(w, mode)?;
        }
        w.write_i32::<LittleEndian>(self.version)?;
        self.hash_prev.encode(w, mode)?;
        self.hash_merkle_root.encode(w, mode)?;
        w.write_i64::<LittleEndian>(self.time)?;
        w.write_u32::<LittleEndian>(self.bits)?;
        w.write_u32::<LittleEndian>(self.nonce)?;
        self.block_hash.encode(w, mode)
    }
}

impl Decodable for DiskBlockIndex {
    fn decode<R: Read>(r: &mut R, mode: SerMode) -> Result<Self, SerError> {
        if mode != SerMode::GetHash {
            let _record_version = r.read_i32::<LittleEndian>()?;
        }
        let hash_next = Hash256::decode(r, mode)?;
        let file = r.read_u32::<LittleEndian>()?;
        let block_pos = r.read_u32::<LittleEndian>()?;
        let height = r.read_i32::<LittleEndian>()?;
        let mint = r.read_i64::<LittleEndian>()?;
        let money_supply = r.read_i64::<LittleEndian>()?;
        let flags = r.read_u32::<LittleEndian>()?;
        let stake_modifier = r.read_u64::<LittleEndian>()?;
        let (prevout_stake, stake_time, hash_proof_of_stake) = if flags & flags::PROOF_OF_STAKE != 0
        {
            (
                OutPoint::decode(r, mode)?,
                r.read_i64::<LittleEndian>()?,
                Hash256::decode(r, mode)?,
            )
        } else {
            (OutPoint::null(), 0, Hash256::ZERO)
        };
        Ok(Self {
            hash_next,
            file,
            block_pos,
            height,
            mint,
            money_supply,
            flags,
            stake_modifier,
            prevout_stake,
            stake_time,
            hash_proof_of_stake,
            version: r.read_i32::<LittleEndian>()?,
            hash_prev: Hash256::decode(r, mode)?,
            hash_merkle_root: Hash256::decode(r, mode)?,
            time: r.read_i64::<LittleEndian>()?,
            bits: r.read_u32::<LittleEndian>()?,
            nonce: r.read_u32::<LittleEndian>()?,
            block_hash: Hash256::decode(r, mode)?,
        })
    }
}

/// Hash-keyed arena of block index nodes.
#[derive(Default)]
pub struct BlockIndexMap {
    entries: HashMap<Hash256, BlockIndex>,
}

impl BlockIndexMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, entry: BlockIndex) {
        self.entries.insert(entry.hash, entry);
    }

    pub fn get(&self, hash: &Hash256) -> Option<&BlockIndex> {
        self.entries.get(hash)
    }

    pub fn get_mut(&mut self, hash: &Hash256) -> Option<&mut BlockIndex> {
        self.entries.get_mut(hash)
    }

    pub fn contains(&self, hash: &Hash256) -> bool {
        self.entries.contains_key(hash)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn iter(&self) -> impl Iterator<Item = &BlockIndex> {
        self.entries.values()
    }

    /// Median of the last 11 block times ending at `hash`; the lower bound
    /// on a child's timestamp.
    pub fn median_time_past(&self, hash: &Hash256) -> i64 {
        let mut times = Vec::with_capacity(11);
        let mut cursor = self.get(hash);
        while let Some(entry) = cursor {
            times.push(entry.time);
            if times.len() == 11 {
                break;
            }
            cursor = entry.prev.as_ref().and_then(|p| self.get(p));
        }
        if times.is_empty() {
            return 0;
        }
        times.sort_unstable();
        times[times.len() / 2]
    }

    /// Most recent block of the requested proof type at or before `from`.
    pub fn last_of_type(&self, from: &Hash256, proof_of_stake: bool) -> Option<&BlockIndex> {
        let mut cursor = self.get(from);
        while let Some(entry) = cursor {
            if entry.is_proof_of_stake() == proof_of_stake {
                return Some(entry);
            }
            cursor = entry.prev.as_ref().and_then(|p| self.get(p));
        }
        None
    }

    /// Whether `required` of the last `to_check` blocks ending at `start`
    /// carry at least `min_version`.
    pub fn is_super_majority(
        &self,
        min_version: i32,
        start: &Hash256,
        required: usize,
        to_check: usize,
    ) -> bool {
        let mut found = 0;
        let mut checked = 0;
        let mut cursor = self.get(start);
        while let Some(entry) = cursor {
            if checked == to_check || found >= required {
                break;
            }
            if entry.version >= min_version {
                found += 1;
            }
            checked += 1;
            cursor = entry.prev.as_ref().and_then(|p| self.get(p));
        }
        found >= required
    }

    /// Walk back from `hash` to the genesis, yielding hashes in descending
    /// height order (inclusive of `hash`).
    pub fn ancestors(&self, hash: Hash256) -> Vec<Hash256> {
        let mut out = Vec::new();
        let mut cursor = Some(hash);
        while let Some(h) = cursor {
            match self.get(&h) {
                Some(entry) => {
                    out.push(h);
                    cursor = entry.prev;
                }
                None => break,
            }
        }
        out
    }
}
