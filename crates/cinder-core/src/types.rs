//! Core protocol types: transactions and blocks.
//!
//! All monetary values are signed 64-bit sparks; the legal range is
//! `[0, MAX_MONEY]` with `-1` reserved as the null sentinel on outputs.
//! Timestamps are signed 64-bit Unix seconds.

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::io::{self, Read, Write};

use crate::constants::{
    money_range, CURRENT_TX_VERSION, LOCKTIME_THRESHOLD, MAX_BLOCK_SIZE, MIN_TXOUT_AMOUNT,
};
use crate::error::TxError;
use crate::hash::{header_hash, Hash256};
use crate::merkle;
use crate::ser::{
    read_bytes, read_vec_len, serialize_hash, write_bytes, write_var_int, Decodable, Encodable,
    SerError, SerMode,
};

/// Reference to a specific output of a previous transaction.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct OutPoint {
    pub hash: Hash256,
    pub n: u32,
}

impl OutPoint {
    pub fn new(hash: Hash256, n: u32) -> Self {
        Self { hash, n }
    }

    /// The null outpoint, legal only as the prevout of a coinbase input.
    pub fn null() -> Self {
        Self { hash: Hash256::ZERO, n: u32::MAX }
    }

    pub fn is_null(&self) -> bool {
        self.hash.is_zero() && self.n == u32::MAX
    }
}

impl fmt::Display for OutPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.hash, self.n)
    }
}

impl Encodable for OutPoint {
    fn encode<W: Write>(&self, w: &mut W, mode: SerMode) -> io::Result<()> {
        self.hash.encode(w, mode)?;
        w.write_u32::<LittleEndian>(self.n)
    }
}

impl Decodable for OutPoint {
    fn decode<R: Read>(r: &mut R, mode: SerMode) -> Result<Self, SerError> {
        Ok(Self {
            hash: Hash256::decode(r, mode)?,
            n: r.read_u32::<LittleEndian>()?,
        })
    }
}

/// A transaction input.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct TxIn {
    pub prevout: OutPoint,
    pub sig_script: Vec<u8>,
    pub sequence: u32,
}

impl TxIn {
    pub fn new(prevout: OutPoint, sig_script: Vec<u8>) -> Self {
        Self { prevout, sig_script, sequence: u32::MAX }
    }

    /// A maxed-out sequence finalizes the input, disabling lock-time.
    pub fn is_final(&self) -> bool {
        self.sequence == u32::MAX
    }
}

impl Encodable for TxIn {
    fn encode<W: Write>(&self, w: &mut W, mode: SerMode) -> io::Result<()> {
        self.prevout.encode(w, mode)?;
        write_bytes(w, &self.sig_script)?;
        w.write_u32::<LittleEndian>(self.sequence)
    }
}

impl Decodable for TxIn {
    fn decode<R: Read>(r: &mut R, mode: SerMode) -> Result<Self, SerError> {
        Ok(Self {
            prevout: OutPoint::decode(r, mode)?,
            sig_script: read_bytes(r)?,
            sequence: r.read_u32::<LittleEndian>()?,
        })
    }
}

/// A transaction output.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct TxOut {
    pub value: i64,
    pub pub_key_script: Vec<u8>,
}

impl TxOut {
    pub fn new(value: i64, pub_key_script: Vec<u8>) -> Self {
        Self { value, pub_key_script }
    }

    /// The null sentinel output (`value = -1`).
    pub fn null() -> Self {
        Self { value: -1, pub_key_script: Vec::new() }
    }

    pub fn is_null(&self) -> bool {
        self.value == -1
    }

    /// The empty output: zero value, empty script. A coin-stake transaction
    /// is marked by an empty first output.
    pub fn empty() -> Self {
        Self { value: 0, pub_key_script: Vec::new() }
    }

    pub fn is_empty(&self) -> bool {
        self.value == 0 && self.pub_key_script.is_empty()
    }
}

impl Encodable for TxOut {
    fn encode<W: Write>(&self, w: &mut W, _mode: SerMode) -> io::Result<()> {
        w.write_i64::<LittleEndian>(self.value)?;
        write_bytes(w, &self.pub_key_script)
    }
}

impl Decodable for TxOut {
    fn decode<R: Read>(r: &mut R, _mode: SerMode) -> Result<Self, SerError> {
        Ok(Self {
            value: r.read_i64::<LittleEndian>()?,
            pub_key_script: read_bytes(r)?,
        })
    }
}

/// A transaction. Identity is SHA-256d over the canonical encoding.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct Transaction {
    pub version: i32,
    pub time: i64,
    pub vin: Vec<TxIn>,
    pub vout: Vec<TxOut>,
    pub lock_time: i64,
}

impl Transaction {
    pub fn new(time: i64) -> Self {
        Self {
            version: CURRENT_TX_VERSION,
            time,
            vin: Vec::new(),
            vout: Vec::new(),
            lock_time: 0,
        }
    }

    pub fn hash(&self) -> Hash256 {
        serialize_hash(self)
    }

    /// Coinbase: exactly one input with a null prevout, at least one output.
    pub fn is_coinbase(&self) -> bool {
        self.vin.len() == 1 && self.vin[0].prevout.is_null() && !self.vout.is_empty()
    }

    /// Coin-stake: a non-null first input, at least two outputs, and an
    /// empty first output.
    pub fn is_coin_stake(&self) -> bool {
        !self.vin.is_empty()
            && !self.vin[0].prevout.is_null()
            && self.vout.len() >= 2
            && self.vout[0].is_empty()
    }

    /// Whether the transaction is final relative to the given chain position.
    ///
    /// A zero lock-time is always final. Otherwise the lock-time is compared
    /// against the block height when below [`LOCKTIME_THRESHOLD`] and against
    /// the block time when at or above it. Inputs with a maxed sequence
    /// override the lock-time entirely.
    pub fn is_final(&self, block_height: i32, block_time: i64) -> bool {
        if self.lock_time == 0 {
            return true;
        }
        let cutoff = if self.lock_time < LOCKTIME_THRESHOLD {
            block_height as i64
        } else {
            block_time
        };
        if self.lock_time < cutoff {
            return true;
        }
        self.vin.iter().all(TxIn::is_final)
    }

    /// Sum of output values, range-checked.
    pub fn value_out(&self) -> Result<i64, TxError> {
        let mut total: i64 = 0;
        for out in &self.vout {
            if !money_range(out.value) {
                return Err(TxError::OutputOutOfRange(out.value));
            }
            total = total
                .checked_add(out.value)
                .ok_or(TxError::OutputSumOutOfRange)?;
        }
        if !money_range(total) {
            return Err(TxError::OutputSumOutOfRange);
        }
        Ok(total)
    }

    /// Context-free validity checks.
    ///
    /// Everything that can be decided from the transaction bytes alone:
    /// shape, monetary ranges, prevout uniqueness, and the coinbase
    /// sigScript size window.
    pub fn check(&self) -> Result<(), TxError> {
        if self.vin.is_empty() || self.vout.is_empty() {
            return Err(TxError::EmptyInputsOrOutputs);
        }

        let size = self.serialized_size(SerMode::Full);
        if size > MAX_BLOCK_SIZE {
            return Err(TxError::Oversized { size, max: MAX_BLOCK_SIZE });
        }

        let is_generation = self.is_coinbase() || self.is_coin_stake();
        let mut total: i64 = 0;
        for (index, out) in self.vout.iter().enumerate() {
            if !money_range(out.value) {
                return Err(TxError::OutputOutOfRange(out.value));
            }
            if out.is_empty() {
                if !is_generation {
                    return Err(TxError::EmptyUserOutput(index));
                }
            } else if out.value < MIN_TXOUT_AMOUNT {
                return Err(TxError::OutputBelowMinimum { index, value: out.value });
            }
            total = total
                .checked_add(out.value)
                .ok_or(TxError::OutputSumOutOfRange)?;
            if !money_range(total) {
                return Err(TxError::OutputSumOutOfRange);
            }
        }

        let mut seen = HashSet::with_capacity(self.vin.len());
        for input in &self.vin {
            if !seen.insert(input.prevout) {
                return Err(TxError::DuplicateInputs);
            }
        }

        if self.is_coinbase() {
            let len = self.vin[0].sig_script.len();
            if !(2..=100).contains(&len) {
                return Err(TxError::BadCoinbaseScriptSize(len));
            }
        } else {
            for (i, input) in self.vin.iter().enumerate() {
                if input.prevout.is_null() {
                    return Err(TxError::NullPrevout(i));
                }
            }
        }

        Ok(())
    }
}

impl Encodable for Transaction {
    fn encode<W: Write>(&self, w: &mut W, mode: SerMode) -> io::Result<()> {
        w.write_i32::<LittleEndian>(self.version)?;
        w.write_i64::<LittleEndian>(self.time)?;
        write_var_int(w, self.vin.len() as u64)?;
        for input in &self.vin {
            input.encode(w, mode)?;
        }
        write_var_int(w, self.vout.len() as u64)?;
        for output in &self.vout {
            output.encode(w, mode)?;
        }
        w.write_i64::<LittleEndian>(self.lock_time)
    }
}

impl Decodable for Transaction {
    fn decode<R: Read>(r: &mut R, mode: SerMode) -> Result<Self, SerError> {
        let version = r.read_i32::<LittleEndian>()?;
        let time = r.read_i64::<LittleEndian>()?;
        let vin_len = read_vec_len(r, MAX_BLOCK_SIZE)?;
        let mut vin = Vec::new();
        for _ in 0..vin_len {
            vin.push(TxIn::decode(r, mode)?);
        }
        let vout_len = read_vec_len(r, MAX_BLOCK_SIZE)?;
        let mut vout = Vec::new();
        for _ in 0..vout_len {
            vout.push(TxOut::decode(r, mode)?);
        }
        let lock_time = r.read_i64::<LittleEndian>()?;
        Ok(Self { version, time, vin, vout, lock_time })
    }
}

/// Block header: the six fields covered by the block hash.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
pub struct BlockHeader {
    pub version: i32,
    pub hash_prev_block: Hash256,
    pub hash_merkle_root: Hash256,
    pub time: i64,
    pub bits: u32,
    pub nonce: u32,
}

impl BlockHeader {
    /// Block identity: the memory-hard hash over the 84 header bytes.
    pub fn hash(&self) -> Hash256 {
        header_hash(&self.to_vec(SerMode::Full))
    }
}

impl Encodable for BlockHeader {
    fn encode<W: Write>(&self, w: &mut W, mode: SerMode) -> io::Result<()> {
        w.write_i32::<LittleEndian>(self.version)?;
        self.hash_prev_block.encode(w, mode)?;
        self.hash_merkle_root.encode(w, mode)?;
        w.write_i64::<LittleEndian>(self.time)?;
        w.write_u32::<LittleEndian>(self.bits)?;
        w.write_u32::<LittleEndian>(self.nonce)
    }
}

impl Decodable for BlockHeader {
    fn decode<R: Read>(r: &mut R, mode: SerMode) -> Result<Self, SerError> {
        Ok(Self {
            version: r.read_i32::<LittleEndian>()?,
            hash_prev_block: Hash256::decode(r, mode)?,
            hash_merkle_root: Hash256::decode(r, mode)?,
            time: r.read_i64::<LittleEndian>()?,
            bits: r.read_u32::<LittleEndian>()?,
            nonce: r.read_u32::<LittleEndian>()?,
        })
    }
}

/// A block: header, transactions, and (for proof-of-stake blocks) a
/// signature over the header by the key owning a coin-stake output.
///
/// In [`SerMode::HeaderOnly`] and [`SerMode::GetHash`] only the header is
/// serialized, so the block hash covers the six header fields alone.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct Block {
    pub header: BlockHeader,
    pub vtx: Vec<Transaction>,
    pub signature: Vec<u8>,
}

impl Block {
    pub fn hash(&self) -> Hash256 {
        self.header.hash()
    }

    /// A block is proof-of-stake when its second transaction is a coin-stake.
    pub fn is_proof_of_stake(&self) -> bool {
        self.vtx.len() > 1 && self.vtx[1].is_coin_stake()
    }

    pub fn is_proof_of_work(&self) -> bool {
        !self.is_proof_of_stake()
    }

    /// Merkle root over the transaction hashes.
    pub fn merkle_root(&self) -> Hash256 {
        let hashes: Vec<Hash256> = self.vtx.iter().map(Transaction::hash).collect();
        merkle::merkle_root(&hashes)
    }

    /// Byte offset of each transaction within the full block encoding.
    ///
    /// Used to record per-transaction disk positions when the block is
    /// appended to a block file.
    pub fn tx_offsets(&self) -> Vec<u32> {
        let mut prefix = Vec::new();
        self.header
            .encode(&mut prefix, SerMode::Full)
            .expect("writing to a Vec cannot fail");
        write_var_int(&mut prefix, self.vtx.len() as u64)
            .expect("writing to a Vec cannot fail");

        let mut offsets = Vec::with_capacity(self.vtx.len());
        let mut pos = prefix.len();
        for tx in &self.vtx {
            offsets.push(pos as u32);
            pos += tx.serialized_size(SerMode::Full);
        }
        offsets
    }
}

impl Encodable for Block {
    fn encode<W: Write>(&self, w: &mut W, mode: SerMode) -> io::Result<()> {
        self.header.encode(w, mode)?;
        if matches!(mode, SerMode::HeaderOnly | SerMode::GetHash) {
            return Ok(());
        }
        write_var_int(w, self.vtx.len() as u64)?;
        for tx in &self.vtx {
            tx.encode(w, mode)?;
        }
        write_bytes(w, &self.signature)
    }
}

impl Decodable for Block {
    fn decode<R: Read>(r: &mut R, mode: SerMode) -> Result<Self, SerError> {
        let header = BlockHeader::decode(r, mode)?;
        if matches!(mode, SerMode::HeaderOnly | SerMode::GetHash) {
            return Ok(Self { header, vtx: Vec::new(), signature: Vec::new() });
        }
        let vtx_len = read_vec_len(r, MAX_BLOCK_SIZE)?;
        let mut vtx = Vec::new();
        for _ in 0..vtx_len {
            vtx.push(Transaction::decode(r, mode)?);
        }
        let signature = read_bytes(r)?;
        Ok(Self { header, vtx, signature })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::{CENT, COIN};

    fn spark_script(seed: u8) -> Vec<u8> {
        // OP_DUP OP_HASH160 <20 bytes> OP_EQUALVERIFY OP_CHECKSIG
        let mut s = vec![0x76, 0xA9, 0x14];
        s.extend_from_slice(&[seed; 20]);
        s.extend_from_slice(&[0x88, 0xAC]);
        s
    }

    fn sample_coinbase() -> Transaction {
        Transaction {
            version: CURRENT_TX_VERSION,
            time: 1_700_000_000,
            vin: vec![TxIn {
                prevout: OutPoint::null(),
                sig_script: vec![0x01, 0x02],
                sequence: u32::MAX,
            }],
            vout: vec![TxOut::new(50 * COIN, spark_script(0xAA))],
            lock_time: 0,
        }
    }

    fn sample_spend() -> Transaction {
        Transaction {
            version: CURRENT_TX_VERSION,
            time: 1_700_000_100,
            vin: vec![TxIn::new(
                OutPoint::new(Hash256([0x11; 32]), 0),
                vec![0x02, 0xAB, 0xCD],
            )],
            vout: vec![TxOut::new(49 * COIN, spark_script(0xBB))],
            lock_time: 0,
        }
    }

    fn sample_coin_stake() -> Transaction {
        Transaction {
            version: CURRENT_TX_VERSION,
            time: 1_700_000_200,
            vin: vec![TxIn::new(
                OutPoint::new(Hash256([0x22; 32]), 1),
                vec![0x01, 0xFF],
            )],
            vout: vec![TxOut::empty(), TxOut::new(51 * COIN, spark_script(0xCC))],
            lock_time: 0,
        }
    }

    fn sample_block() -> Block {
        let vtx = vec![sample_coinbase(), sample_spend()];
        let mut block = Block {
            header: BlockHeader {
                version: 6,
                hash_prev_block: Hash256([0x33; 32]),
                hash_merkle_root: Hash256::ZERO,
                time: 1_700_000_300,
                bits: 0x1F00_FFFF,
                nonce: 42,
            },
            vtx,
            signature: Vec::new(),
        };
        block.header.hash_merkle_root = block.merkle_root();
        block
    }

    // --- OutPoint ---

    #[test]
    fn null_outpoint_detection() {
        assert!(OutPoint::null().is_null());
        assert!(!OutPoint::new(Hash256([1; 32]), 0).is_null());
        // A zero hash alone is not null; the index must be maxed too.
        assert!(!OutPoint::new(Hash256::ZERO, 0).is_null());
    }

    #[test]
    fn null_output_sentinel() {
        assert!(TxOut::null().is_null());
        assert!(!TxOut::null().is_empty());
        assert!(TxOut::empty().is_empty());
        assert!(!TxOut::empty().is_null());
        assert!(!TxOut::new(1, vec![]).is_empty());
    }

    // --- classification ---

    #[test]
    fn coinbase_detection() {
        assert!(sample_coinbase().is_coinbase());
        assert!(!sample_spend().is_coinbase());
        assert!(!sample_coin_stake().is_coinbase());
    }

    #[test]
    fn coin_stake_detection() {
        assert!(sample_coin_stake().is_coin_stake());
        assert!(!sample_coinbase().is_coin_stake());
        assert!(!sample_spend().is_coin_stake());
    }

    #[test]
    fn coinbase_without_outputs_is_not_coinbase() {
        let mut tx = sample_coinbase();
        tx.vout.clear();
        assert!(!tx.is_coinbase());
    }

    // --- finality ---

    #[test]
    fn zero_locktime_is_final() {
        assert!(sample_spend().is_final(0, 0));
    }

    #[test]
    fn height_locktime() {
        let mut tx = sample_spend();
        tx.lock_time = 100;
        tx.vin[0].sequence = 0;
        assert!(!tx.is_final(100, 0));
        assert!(tx.is_final(101, 0));
    }

    #[test]
    fn time_locktime() {
        let mut tx = sample_spend();
        tx.lock_time = LOCKTIME_THRESHOLD + 500;
        tx.vin[0].sequence = 0;
        assert!(!tx.is_final(0, LOCKTIME_THRESHOLD + 500));
        assert!(tx.is_final(0, LOCKTIME_THRESHOLD + 501));
    }

    #[test]
    fn maxed_sequences_override_locktime() {
        let mut tx = sample_spend();
        tx.lock_time = 1_000_000;
        assert!(tx.is_final(0, 0));
    }

    // --- check ---

    #[test]
    fn check_accepts_valid_transactions() {
        assert!(sample_coinbase().check().is_ok());
        assert!(sample_spend().check().is_ok());
        assert!(sample_coin_stake().check().is_ok());
    }

    #[test]
    fn check_rejects_empty_vin() {
        let mut tx = sample_spend();
        tx.vin.clear();
        assert_eq!(tx.check().unwrap_err(), TxError::EmptyInputsOrOutputs);
    }

    #[test]
    fn check_rejects_empty_vout() {
        let mut tx = sample_spend();
        tx.vout.clear();
        assert_eq!(tx.check().unwrap_err(), TxError::EmptyInputsOrOutputs);
    }

    #[test]
    fn check_rejects_negative_output() {
        let mut tx = sample_spend();
        tx.vout[0].value = -5;
        assert!(matches!(tx.check().unwrap_err(), TxError::OutputOutOfRange(-5)));
    }

    #[test]
    fn check_rejects_output_below_minimum() {
        let mut tx = sample_spend();
        tx.vout[0].value = CENT / 100 - 1;
        assert!(matches!(
            tx.check().unwrap_err(),
            TxError::OutputBelowMinimum { index: 0, .. }
        ));
    }

    #[test]
    fn check_rejects_empty_output_in_user_tx() {
        let mut tx = sample_spend();
        tx.vout[0] = TxOut::empty();
        assert_eq!(tx.check().unwrap_err(), TxError::EmptyUserOutput(0));
    }

    #[test]
    fn check_allows_empty_first_output_of_coin_stake() {
        assert!(sample_coin_stake().check().is_ok());
    }

    #[test]
    fn check_rejects_output_sum_overflow() {
        let mut tx = sample_spend();
        tx.vout = vec![
            TxOut::new(i64::MAX, spark_script(0x01)),
            TxOut::new(1 * COIN, spark_script(0x02)),
        ];
        assert_eq!(tx.check().unwrap_err(), TxError::OutputSumOutOfRange);
    }

    #[test]
    fn check_rejects_duplicate_prevouts() {
        let mut tx = sample_spend();
        tx.vin.push(tx.vin[0].clone());
        assert_eq!(tx.check().unwrap_err(), TxError::DuplicateInputs);
    }

    #[test]
    fn check_rejects_short_coinbase_script() {
        let mut tx = sample_coinbase();
        tx.vin[0].sig_script = vec![0x01];
        assert_eq!(tx.check().unwrap_err(), TxError::BadCoinbaseScriptSize(1));
    }

    #[test]
    fn check_rejects_long_coinbase_script() {
        let mut tx = sample_coinbase();
        tx.vin[0].sig_script = vec![0; 101];
        assert_eq!(tx.check().unwrap_err(), TxError::BadCoinbaseScriptSize(101));
    }

    #[test]
    fn check_rejects_null_prevout_in_spend() {
        let mut tx = sample_spend();
        tx.vin.push(TxIn::new(OutPoint::null(), vec![0x01, 0x02]));
        assert_eq!(tx.check().unwrap_err(), TxError::NullPrevout(1));
    }

    // --- hashing & serialization ---

    #[test]
    fn tx_hash_is_deterministic_and_data_sensitive() {
        let tx = sample_spend();
        assert_eq!(tx.hash(), tx.hash());
        let mut tx2 = tx.clone();
        tx2.lock_time = 1;
        assert_ne!(tx.hash(), tx2.hash());
    }

    #[test]
    fn tx_round_trip() {
        for tx in [sample_coinbase(), sample_spend(), sample_coin_stake()] {
            let bytes = tx.to_vec(SerMode::Full);
            let back = Transaction::from_slice(&bytes, SerMode::Full).unwrap();
            assert_eq!(back, tx);
            assert_eq!(back.hash(), tx.hash());
        }
    }

    #[test]
    fn header_is_84_bytes() {
        // version(4) + prev(32) + merkle(32) + time(8) + bits(4) + nonce(4)
        let block = sample_block();
        assert_eq!(block.header.to_vec(SerMode::Full).len(), 84);
    }

    #[test]
    fn block_round_trip() {
        let block = sample_block();
        let bytes = block.to_vec(SerMode::Full);
        let back = Block::from_slice(&bytes, SerMode::Full).unwrap();
        assert_eq!(back, block);
        assert_eq!(back.hash(), block.hash());
    }

    #[test]
    fn header_only_mode_drops_transactions() {
        let block = sample_block();
        let header_bytes = block.to_vec(SerMode::HeaderOnly);
        assert_eq!(header_bytes, block.header.to_vec(SerMode::Full));
        let back = Block::from_slice(&header_bytes, SerMode::HeaderOnly).unwrap();
        assert!(back.vtx.is_empty());
        assert_eq!(back.header, block.header);
    }

    #[test]
    fn block_hash_covers_header_only() {
        let mut block = sample_block();
        let before = block.hash();
        block.signature = vec![1, 2, 3];
        assert_eq!(block.hash(), before);
        block.header.nonce += 1;
        assert_ne!(block.hash(), before);
    }

    #[test]
    fn tx_offsets_locate_transactions() {
        let block = sample_block();
        let bytes = block.to_vec(SerMode::Full);
        for (i, offset) in block.tx_offsets().into_iter().enumerate() {
            let tx =
                Transaction::decode(&mut &bytes[offset as usize..], SerMode::Full).unwrap();
            assert_eq!(tx.hash(), block.vtx[i].hash());
        }
    }

    #[test]
    fn merkle_root_changes_with_tx_set() {
        let block = sample_block();
        let mut other = block.clone();
        other.vtx.pop();
        assert_ne!(block.merkle_root(), other.merkle_root());
    }

    #[test]
    fn proof_of_stake_classification() {
        let mut block = sample_block();
        assert!(block.is_proof_of_work());
        block.vtx[1] = sample_coin_stake();
        assert!(block.is_proof_of_stake());
    }
}
