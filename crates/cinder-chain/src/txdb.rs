//! The transaction/index database.
//!
//! Records live under tagged byte keys: `"tx" + txid` maps to a [`TxIndex`],
//! `"blockindex" + hash` to a [`DiskBlockIndex`](crate::index::DiskBlockIndex),
//! plus the singletons `"hashBestChain"`, `"bnBestInvalidTrust"` and
//! `"checkpoint"`, and `"stake" + (prevout, time)` presence markers.
//!
//! [`TxDb`] layers an abstract transaction over a raw [`KvBackend`]:
//! writes between `txn_begin` and `txn_commit` stage in an overlay that
//! reads observe, and commit applies the whole batch atomically. An aborted
//! transaction leaves no partial records visible.

use std::collections::{BTreeMap, HashMap};
use std::io::{self, Read, Write};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use primitive_types::U256;

use cinder_core::hash::Hash256;
use cinder_core::ser::{read_vec_len, Decodable, Encodable, SerError, SerMode};
use cinder_core::types::OutPoint;

use crate::error::DbError;
use crate::index::DiskBlockIndex;

const RECORD_VERSION: i32 = 1;

const KEY_TX: &[u8] = b"tx";
const KEY_BLOCK_INDEX: &[u8] = b"blockindex";
const KEY_BEST_CHAIN: &[u8] = b"hashBestChain";
const KEY_BEST_INVALID_TRUST: &[u8] = b"bnBestInvalidTrust";
const KEY_CHECKPOINT: &[u8] = b"checkpoint";
const KEY_STAKE_SEEN: &[u8] = b"stake";

/// Position of a transaction on disk: block file, block offset within the
/// file, and the transaction's offset within the file.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DiskPos {
    pub file: u32,
    pub block_pos: u32,
    pub tx_pos: u32,
}

impl DiskPos {
    pub fn new(file: u32, block_pos: u32, tx_pos: u32) -> Self {
        Self { file, block_pos, tx_pos }
    }

    /// The null position (`file == u32::MAX`): an unspent marker.
    pub fn null() -> Self {
        Self { file: u32::MAX, block_pos: 0, tx_pos: 0 }
    }

    pub fn is_null(&self) -> bool {
        self.file == u32::MAX
    }
}

impl Encodable for DiskPos {
    fn encode<W: Write>(&self, w: &mut W, _mode: SerMode) -> io::Result<()> {
        w.write_u32::<LittleEndian>(self.file)?;
        w.write_u32::<LittleEndian>(self.block_pos)?;
        w.write_u32::<LittleEndian>(self.tx_pos)
    }
}

impl Decodable for DiskPos {
    fn decode<R: Read>(r: &mut R, _mode: SerMode) -> Result<Self, SerError> {
        Ok(Self {
            file: r.read_u32::<LittleEndian>()?,
            block_pos: r.read_u32::<LittleEndian>()?,
            tx_pos: r.read_u32::<LittleEndian>()?,
        })
    }
}

/// Per-transaction spend tracking: where the transaction lives and, for
/// each output, the position of the transaction that consumed it (null
/// while unspent). The spent vector's length is fixed at creation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TxIndex {
    pub pos: DiskPos,
    pub spent: Vec<DiskPos>,
}

impl TxIndex {
    pub fn new(pos: DiskPos, outputs: usize) -> Self {
        Self { pos, spent: vec![DiskPos::null(); outputs] }
    }
}

impl Encodable for TxIndex {
    fn encode<W: Write>(&self, w: &mut W, mode: SerMode) -> io::Result<()> {
        if mode != SerMode::GetHash {
            w.write_i32::<LittleEndian>(RECORD_VERSION)?;
        }
        self.pos.encode(w, mode)?;
        cinder_core::ser::write_var_int(w, self.spent.len() as u64)?;
        for pos in &self.spent {
            pos.encode(w, mode)?;
        }
        Ok(())
    }
}

impl Decodable for TxIndex {
    fn decode<R: Read>(r: &mut R, mode: SerMode) -> Result<Self, SerError> {
        if mode != SerMode::GetHash {
            let _record_version = r.read_i32::<LittleEndian>()?;
        }
        let pos = DiskPos::decode(r, mode)?;
        let len = read_vec_len(r, cinder_core::constants::MAX_BLOCK_SIZE)?;
        let mut spent = Vec::new();
        for _ in 0..len {
            spent.push(DiskPos::decode(r, mode)?);
        }
        Ok(Self { pos, spent })
    }
}

/// Raw ordered key/value storage beneath [`TxDb`].
///
/// `apply` must be atomic: either every entry in the batch lands or none
/// does. A `None` value deletes the key.
pub trait KvBackend: Send {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, DbError>;
    fn apply(&mut self, batch: Vec<(Vec<u8>, Option<Vec<u8>>)>) -> Result<(), DbError>;
    fn scan_prefix(
        &self,
        prefix: &[u8],
        f: &mut dyn FnMut(&[u8], &[u8]) -> Result<(), DbError>,
    ) -> Result<(), DbError>;
}

/// In-memory backend for tests and tools.
#[derive(Default)]
pub struct MemBackend {
    map: BTreeMap<Vec<u8>, Vec<u8>>,
}

impl MemBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of every record, for byte-equality assertions in tests.
    pub fn dump(&self) -> BTreeMap<Vec<u8>, Vec<u8>> {
        self.map.clone()
    }
}

impl KvBackend for MemBackend {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, DbError> {
        Ok(self.map.get(key).cloned())
    }

    fn apply(&mut self, batch: Vec<(Vec<u8>, Option<Vec<u8>>)>) -> Result<(), DbError> {
        for (key, value) in batch {
            match value {
                Some(v) => {
                    self.map.insert(key, v);
                }
                None => {
                    self.map.remove(&key);
                }
            }
        }
        Ok(())
    }

    fn scan_prefix(
        &self,
        prefix: &[u8],
        f: &mut dyn FnMut(&[u8], &[u8]) -> Result<(), DbError>,
    ) -> Result<(), DbError> {
        for (key, value) in self.map.range(prefix.to_vec()..) {
            if !key.starts_with(prefix) {
                break;
            }
            f(key, value)?;
        }
        Ok(())
    }
}

fn tagged_key(tag: &[u8], suffix: &[u8]) -> Vec<u8> {
    let mut key = Vec::with_capacity(tag.len() + suffix.len());
    key.extend_from_slice(tag);
    key.extend_from_slice(suffix);
    key
}

fn stake_seen_key(prevout: &OutPoint, stake_time: i64) -> Vec<u8> {
    let mut key = tagged_key(KEY_STAKE_SEEN, &prevout.to_vec(SerMode::Full));
    key.extend_from_slice(&stake_time.to_le_bytes());
    key
}

/// The record store used by the validator.
pub struct TxDb {
    backend: Box<dyn KvBackend>,
    txn: Option<HashMap<Vec<u8>, Option<Vec<u8>>>>,
}

impl TxDb {
    pub fn new(backend: Box<dyn KvBackend>) -> Self {
        Self { backend, txn: None }
    }

    /// Begin an atomic batch. Reads observe staged writes.
    pub fn txn_begin(&mut self) {
        if self.txn.is_none() {
            self.txn = Some(HashMap::new());
        }
    }

    /// Commit the staged batch atomically.
    pub fn txn_commit(&mut self) -> Result<(), DbError> {
        if let Some(staged) = self.txn.take() {
            self.backend.apply(staged.into_iter().collect())?;
        }
        Ok(())
    }

    /// Discard the staged batch; no staged record becomes visible.
    pub fn txn_abort(&mut self) {
        self.txn = None;
    }

    pub fn in_txn(&self) -> bool {
        self.txn.is_some()
    }

    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, DbError> {
        if let Some(staged) = &self.txn {
            if let Some(value) = staged.get(key) {
                return Ok(value.clone());
            }
        }
        self.backend.get(key)
    }

    fn put(&mut self, key: Vec<u8>, value: Vec<u8>) -> Result<(), DbError> {
        match &mut self.txn {
            Some(staged) => {
                staged.insert(key, Some(value));
                Ok(())
            }
            None => self.backend.apply(vec![(key, Some(value))]),
        }
    }

    fn del(&mut self, key: Vec<u8>) -> Result<(), DbError> {
        match &mut self.txn {
            Some(staged) => {
                staged.insert(key, None);
                Ok(())
            }
            None => self.backend.apply(vec![(key, None)]),
        }
    }

    // --- tx index records ---

    pub fn read_tx_index(&self, txid: &Hash256) -> Result<Option<TxIndex>, DbError> {
        match self.get(&tagged_key(KEY_TX, txid.as_bytes()))? {
            Some(bytes) => Ok(Some(TxIndex::from_slice(&bytes, SerMode::Full)?)),
            None => Ok(None),
        }
    }

    pub fn write_tx_index(&mut self, txid: &Hash256, index: &TxIndex) -> Result<(), DbError> {
        self.put(tagged_key(KEY_TX, txid.as_bytes()), index.to_vec(SerMode::Full))
    }

    pub fn erase_tx_index(&mut self, txid: &Hash256) -> Result<(), DbError> {
        self.del(tagged_key(KEY_TX, txid.as_bytes()))
    }

    pub fn contains_tx(&self, txid: &Hash256) -> Result<bool, DbError> {
        Ok(self.get(&tagged_key(KEY_TX, txid.as_bytes()))?.is_some())
    }

    // --- block index records ---

    pub fn read_block_index(&self, hash: &Hash256) -> Result<Option<DiskBlockIndex>, DbError> {
        match self.get(&tagged_key(KEY_BLOCK_INDEX, hash.as_bytes()))? {
            Some(bytes) => Ok(Some(DiskBlockIndex::from_slice(&bytes, SerMode::Full)?)),
            None => Ok(None),
        }
    }

    pub fn write_block_index(&mut self, record: &DiskBlockIndex) -> Result<(), DbError> {
        self.put(
            tagged_key(KEY_BLOCK_INDEX, record.block_hash.as_bytes()),
            record.to_vec(SerMode::Full),
        )
    }

    pub fn erase_block_index(&mut self, hash: &Hash256) -> Result<(), DbError> {
        self.del(tagged_key(KEY_BLOCK_INDEX, hash.as_bytes()))
    }

    /// Scan every persisted block index record. Must run outside a
    /// transaction (used by index load).
    pub fn for_each_block_index(
        &self,
        f: &mut dyn FnMut(DiskBlockIndex) -> Result<(), DbError>,
    ) -> Result<(), DbError> {
        debug_assert!(self.txn.is_none());
        self.backend.scan_prefix(KEY_BLOCK_INDEX, &mut |_, value| {
            f(DiskBlockIndex::from_slice(value, SerMode::Full)?)
        })
    }

    // --- scalar chain state ---

    pub fn read_best_chain(&self) -> Result<Option<Hash256>, DbError> {
        match self.get(KEY_BEST_CHAIN)? {
            Some(bytes) => Ok(Some(Hash256::from_slice(&bytes, SerMode::Full)?)),
            None => Ok(None),
        }
    }

    pub fn write_best_chain(&mut self, hash: &Hash256) -> Result<(), DbError> {
        self.put(KEY_BEST_CHAIN.to_vec(), hash.to_vec(SerMode::Full))
    }

    pub fn read_best_invalid_trust(&self) -> Result<U256, DbError> {
        match self.get(KEY_BEST_INVALID_TRUST)? {
            Some(bytes) if bytes.len() == 32 => Ok(U256::from_little_endian(&bytes)),
            Some(_) => Err(DbError::Corrupt("bad invalid-trust record length")),
            None => Ok(U256::zero()),
        }
    }

    pub fn write_best_invalid_trust(&mut self, trust: &U256) -> Result<(), DbError> {
        let mut bytes = [0u8; 32];
        trust.to_little_endian(&mut bytes);
        self.put(KEY_BEST_INVALID_TRUST.to_vec(), bytes.to_vec())
    }

    pub fn read_checkpoint(&self) -> Result<Option<Hash256>, DbError> {
        match self.get(KEY_CHECKPOINT)? {
            Some(bytes) => Ok(Some(Hash256::from_slice(&bytes, SerMode::Full)?)),
            None => Ok(None),
        }
    }

    pub fn write_checkpoint(&mut self, hash: &Hash256) -> Result<(), DbError> {
        self.put(KEY_CHECKPOINT.to_vec(), hash.to_vec(SerMode::Full))
    }

    // --- stake-seen markers ---

    pub fn write_stake_seen(&mut self, prevout: &OutPoint, stake_time: i64) -> Result<(), DbError> {
        self.put(stake_seen_key(prevout, stake_time), Vec::new())
    }

    pub fn for_each_stake_seen(
        &self,
        f: &mut dyn FnMut(OutPoint, i64) -> Result<(), DbError>,
    ) -> Result<(), DbError> {
        debug_assert!(self.txn.is_none());
        self.backend.scan_prefix(KEY_STAKE_SEEN, &mut |key, _| {
            let suffix = &key[KEY_STAKE_SEEN.len()..];
            if suffix.len() != 36 + 8 {
                return Err(DbError::Corrupt("bad stake-seen key length"));
            }
            let prevout = OutPoint::from_slice(&suffix[..36], SerMode::Full)?;
            let time = i64::from_le_bytes(
                suffix[36..]
                    .try_into()
                    .expect("slice is exactly 8 bytes"),
            );
            f(prevout, time)
        })
    }
}
