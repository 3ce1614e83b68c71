//! The block-acceptance pipeline.
//!
//! One [`Validator`] owns the whole chain state: the block index, the
//! record database, the block files, the orphan pools, and the scalar best
//! chain pointers, all guarded by a single chain mutex. The mempool and
//! the wallet-notifier set carry their own locks; the acquisition order is
//! mempool → chain → wallet-set, so chain-side work collects its mempool
//! and wallet effects and applies them only after the chain lock drops.
//!
//! Disk writes of a connect, disconnect, or whole reorganization are
//! staged in one database transaction and committed per move; a failed
//! `set_best_chain` aborts the batch, leaving both the database and the
//! in-memory pointers exactly as they were before the attempt.

use std::collections::{HashMap, HashSet, VecDeque};
use std::path::Path;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use primitive_types::U256;
use tracing::{debug, info, warn};

use cinder_core::constants::{
    future_drift, money_range, past_drift, MAX_BLOCK_SIGOPS, MAX_BLOCK_SIZE,
    MAX_ORPHAN_BLOCKS, MAX_ORPHAN_TRANSACTIONS,
};
use cinder_core::error::TxError;
use cinder_core::hash::Hash256;
use cinder_core::script;
use cinder_core::ser::{Encodable, SerMode};
use cinder_core::types::{Block, OutPoint, Transaction};
use cinder_consensus::{compact, retarget, reward, stake};

use crate::blockfile::BlockFiles;
use crate::error::{BlockError, ChainError, DbError, MempoolError};
use crate::genesis;
use crate::index::{BlockIndex, BlockIndexMap, DiskBlockIndex};
use crate::mempool::{min_relay_fee, Mempool};
use crate::notify::{NotifierSet, Peer, WalletNotifier};
use crate::params::ChainParams;
use crate::scriptcheck::{
    ScriptCheck, ScriptCheckPool, ScriptEngine, STANDARD_SCRIPT_VERIFY_FLAGS, STRICT_FLAGS,
};
use crate::txdb::{DiskPos, KvBackend, TxDb, TxIndex};

#[derive(Clone, Debug)]
pub struct ValidatorConfig {
    /// Worker threads for batched script verification; zero runs checks
    /// inline on the connecting thread.
    pub script_check_threads: usize,
    pub max_block_file_size: u64,
}

impl Default for ValidatorConfig {
    fn default() -> Self {
        Self {
            script_check_threads: 0,
            max_block_file_size: crate::blockfile::DEFAULT_MAX_FILE_SIZE,
        }
    }
}

/// Outcome of handing a block to the pipeline.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BlockStatus {
    Accepted,
    AlreadyHave,
    OrphanBuffered,
}

/// Outcome of handing a loose transaction to the pipeline.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TxStatus {
    Accepted,
    Orphaned,
}

/// Orphan blocks buffered until their parent arrives, keyed both by their
/// own hash and by the missing parent's.
#[derive(Default)]
struct OrphanBlocks {
    by_hash: HashMap<Hash256, Block>,
    by_prev: HashMap<Hash256, Vec<Hash256>>,
    arrival: VecDeque<Hash256>,
}

impl OrphanBlocks {
    fn contains(&self, hash: &Hash256) -> bool {
        self.by_hash.contains_key(hash)
    }

    fn insert(&mut self, block: Block) {
        let hash = block.hash();
        if self.by_hash.contains_key(&hash) {
            return;
        }
        while self.by_hash.len() >= MAX_ORPHAN_BLOCKS {
            match self.arrival.pop_front() {
                Some(oldest) => self.remove(&oldest),
                None => break,
            }
        }
        self.by_prev
            .entry(block.header.hash_prev_block)
            .or_default()
            .push(hash);
        self.arrival.push_back(hash);
        self.by_hash.insert(hash, block);
    }

    fn remove(&mut self, hash: &Hash256) {
        if let Some(block) = self.by_hash.remove(hash) {
            if let Some(children) = self.by_prev.get_mut(&block.header.hash_prev_block) {
                children.retain(|h| h != hash);
                if children.is_empty() {
                    self.by_prev.remove(&block.header.hash_prev_block);
                }
            }
            self.arrival.retain(|h| h != hash);
        }
    }

    /// Remove and return every orphan whose parent is `parent`.
    fn take_children(&mut self, parent: &Hash256) -> Vec<Block> {
        let hashes = self.by_prev.remove(parent).unwrap_or_default();
        let mut blocks = Vec::with_capacity(hashes.len());
        for hash in hashes {
            if let Some(block) = self.by_hash.remove(&hash) {
                self.arrival.retain(|h| *h != hash);
                blocks.push(block);
            }
        }
        blocks
    }

    /// Deepest missing ancestor of `block`: the hash to request from the
    /// peer that sent it.
    fn missing_root(&self, block: &Block) -> Hash256 {
        let mut wanted = block.header.hash_prev_block;
        while let Some(parent) = self.by_hash.get(&wanted) {
            wanted = parent.header.hash_prev_block;
        }
        wanted
    }

    fn len(&self) -> usize {
        self.by_hash.len()
    }

    fn clear(&mut self) {
        self.by_hash.clear();
        self.by_prev.clear();
        self.arrival.clear();
    }
}

/// Everything guarded by the chain mutex.
struct ChainInner {
    db: TxDb,
    files: BlockFiles,
    index: BlockIndexMap,
    genesis_hash: Hash256,
    best_hash: Hash256,
    best_height: i32,
    best_trust: U256,
    best_invalid_trust: U256,
    time_best_received: i64,
    stake_seen: HashSet<(OutPoint, i64)>,
    orphans: OrphanBlocks,
}

impl ChainInner {
    fn entry(&self, hash: &Hash256) -> Result<&BlockIndex, DbError> {
        self.index
            .get(hash)
            .ok_or(DbError::Corrupt("block index link broken"))
    }
}

/// Mempool and wallet effects of a best-chain move, applied after the
/// chain lock is released.
#[derive(Default)]
struct ChainUpdates {
    disconnected: Vec<Block>,
    connected: Vec<Block>,
}

pub struct Validator {
    params: ChainParams,
    chain: Mutex<ChainInner>,
    mempool: Mempool,
    notifiers: NotifierSet,
    script_pool: ScriptCheckPool,
    engine: Arc<dyn ScriptEngine>,
    orphan_txs: Mutex<HashMap<Hash256, Transaction>>,
    clock: Box<dyn Fn() -> i64 + Send + Sync>,
    /// Median network offset added to the local clock.
    time_offset: AtomicI64,
}

impl Validator {
    pub fn new(
        params: ChainParams,
        backend: Box<dyn KvBackend>,
        block_dir: impl AsRef<Path>,
        engine: Arc<dyn ScriptEngine>,
        config: ValidatorConfig,
    ) -> Result<Self, ChainError> {
        Self::with_clock(params, backend, block_dir, engine, config, || {
            std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .map(|d| d.as_secs() as i64)
                .unwrap_or_default()
        })
    }

    /// Like [`Validator::new`] but with an injected clock, for tests and
    /// simulation.
    pub fn with_clock(
        params: ChainParams,
        backend: Box<dyn KvBackend>,
        block_dir: impl AsRef<Path>,
        engine: Arc<dyn ScriptEngine>,
        config: ValidatorConfig,
        clock: impl Fn() -> i64 + Send + Sync + 'static,
    ) -> Result<Self, ChainError> {
        let files = BlockFiles::open(block_dir, params.magic, config.max_block_file_size)?;
        let script_pool = ScriptCheckPool::new(config.script_check_threads, Arc::clone(&engine));
        Ok(Self {
            chain: Mutex::new(ChainInner {
                db: TxDb::new(backend),
                files,
                index: BlockIndexMap::new(),
                genesis_hash: Hash256::ZERO,
                best_hash: Hash256::ZERO,
                best_height: -1,
                best_trust: U256::zero(),
                best_invalid_trust: U256::zero(),
                time_best_received: 0,
                stake_seen: HashSet::new(),
                orphans: OrphanBlocks::default(),
            }),
            params,
            mempool: Mempool::new(),
            notifiers: NotifierSet::new(),
            script_pool,
            engine,
            orphan_txs: Mutex::new(HashMap::new()),
            clock: Box::new(clock),
            time_offset: AtomicI64::new(0),
        })
    }

    // --- time ---

    fn now(&self) -> i64 {
        (self.clock)()
    }

    /// Local time corrected by the median network offset.
    pub fn adjusted_time(&self) -> i64 {
        self.now() + self.time_offset.load(Ordering::Relaxed)
    }

    pub fn set_time_offset(&self, offset: i64) {
        self.time_offset.store(offset, Ordering::Relaxed);
    }

    // --- snapshots ---

    pub fn best_height(&self) -> i32 {
        self.chain.lock().best_height
    }

    pub fn best_hash(&self) -> Hash256 {
        self.chain.lock().best_hash
    }

    pub fn best_chain_trust(&self) -> U256 {
        self.chain.lock().best_trust
    }

    pub fn time_best_received(&self) -> i64 {
        self.chain.lock().time_best_received
    }

    pub fn genesis_hash(&self) -> Hash256 {
        self.chain.lock().genesis_hash
    }

    /// Total coins minted along the best chain.
    pub fn money_supply(&self) -> i64 {
        let inner = self.chain.lock();
        inner
            .index
            .get(&inner.best_hash)
            .map(|e| e.money_supply)
            .unwrap_or(0)
    }

    pub fn block_index_len(&self) -> usize {
        self.chain.lock().index.len()
    }

    pub fn orphan_block_count(&self) -> usize {
        self.chain.lock().orphans.len()
    }

    pub fn orphan_tx_count(&self) -> usize {
        self.orphan_txs.lock().len()
    }

    pub fn mempool(&self) -> &Mempool {
        &self.mempool
    }

    pub fn register_wallet(&self, wallet: Arc<dyn WalletNotifier>) {
        self.notifiers.register(wallet);
    }

    pub fn unregister_wallet(&self, wallet: &Arc<dyn WalletNotifier>) {
        self.notifiers.unregister(wallet);
    }

    /// Required `bits` for a block whose parent is `prev_hash`.
    pub fn next_target_required(&self, prev_hash: &Hash256, proof_of_stake: bool) -> u32 {
        let inner = self.chain.lock();
        self.target_required(&inner.index, prev_hash, proof_of_stake)
    }

    /// Warning string surfaced to the UI layer.
    pub fn get_warnings(&self) -> String {
        let inner = self.chain.lock();
        let margin = inner
            .index
            .get(&inner.best_hash)
            .map(|tip| tip.block_trust() * U256::from(6u64))
            .unwrap_or_default();
        if inner.best_invalid_trust > inner.best_trust + margin {
            return "Warning: displayed transactions may not be correct. \
                    You may need to upgrade, or other nodes may need to upgrade."
                .to_string();
        }
        String::new()
    }

    /// Look up a transaction in the pool or on the main chain. Returns the
    /// containing block hash for confirmed transactions.
    pub fn get_transaction(&self, txid: &Hash256) -> Option<(Transaction, Option<Hash256>)> {
        if let Some(tx) = self.mempool.lookup(txid) {
            return Some((tx, None));
        }
        let inner = self.chain.lock();
        let idx = inner.db.read_tx_index(txid).ok()??;
        let tx = inner.files.read_transaction(&idx.pos).ok()?;
        let header = inner.files.read_header(idx.pos.file, idx.pos.block_pos).ok()?;
        Some((tx, Some(header.hash())))
    }

    // --- index load / unload ---

    /// Scan the database, rebuild the in-memory index, recompute per-node
    /// chain trust and modifier checksums, and restore the best-chain
    /// pointers. With `allow_new`, an empty database is seeded with the
    /// genesis block.
    pub fn load_block_index(&self, allow_new: bool) -> Result<(), ChainError> {
        let mut guard = self.chain.lock();
        let inner = &mut *guard;

        let mut records = Vec::new();
        inner
            .db
            .for_each_block_index(&mut |record| {
                records.push(record);
                Ok(())
            })?;

        if records.is_empty() {
            if !allow_new {
                return Err(DbError::Corrupt("block index is empty").into());
            }
            return self.create_genesis(inner);
        }

        for record in records {
            inner.index.insert(record.into_index());
        }

        // Bottom-up pass: trust accumulates parent-first, and the modifier
        // checksum chain is recomputed from scratch.
        let mut hashes: Vec<Hash256> = inner.index.iter().map(|e| e.hash).collect();
        hashes.sort_by_key(|h| inner.index.get(h).map(|e| e.height).unwrap_or(i32::MAX));
        for hash in hashes {
            let parent = inner
                .index
                .get(&hash)
                .and_then(|e| e.prev)
                .and_then(|p| inner.index.get(&p))
                .map(|p| (p.chain_trust, p.stake_modifier_checksum));
            let (parent_trust, parent_checksum) = parent.unwrap_or((U256::zero(), 0));
            if let Some(entry) = inner.index.get_mut(&hash) {
                entry.chain_trust = parent_trust + entry.block_trust();
                entry.stake_modifier_checksum = entry.compute_modifier_checksum(parent_checksum);
            }
        }

        inner.genesis_hash = genesis::genesis_hash(&self.params);
        if !inner.index.contains(&inner.genesis_hash) {
            return Err(DbError::Corrupt("genesis block missing from index").into());
        }

        {
            let db = &inner.db;
            let stake_seen = &mut inner.stake_seen;
            db.for_each_stake_seen(&mut |prevout, time| {
                stake_seen.insert((prevout, time));
                Ok(())
            })?;
        }

        let best = inner
            .db
            .read_best_chain()?
            .ok_or(DbError::Corrupt("best-chain pointer missing"))?;
        let best_entry = inner.entry(&best)?.clone();
        inner.best_hash = best;
        inner.best_height = best_entry.height;
        inner.best_trust = best_entry.chain_trust;
        inner.time_best_received = self.now();
        inner.best_invalid_trust = inner.db.read_best_invalid_trust()?;

        // Restore the next-links along the best chain.
        let path = inner.index.ancestors(best);
        for pair in path.windows(2) {
            if let Some(parent) = inner.index.get_mut(&pair[1]) {
                parent.next = Some(pair[0]);
            }
        }
        if let Some(tip) = inner.index.get_mut(&best) {
            tip.next = None;
        }

        info!(height = inner.best_height, best = %inner.best_hash, "block index loaded");
        Ok(())
    }

    /// Drop all in-memory chain state; the inverse of
    /// [`load_block_index`](Self::load_block_index).
    pub fn unload_block_index(&self) {
        let mut inner = self.chain.lock();
        inner.index.clear();
        inner.best_hash = Hash256::ZERO;
        inner.best_height = -1;
        inner.best_trust = U256::zero();
        inner.best_invalid_trust = U256::zero();
        inner.genesis_hash = Hash256::ZERO;
        inner.time_best_received = 0;
        inner.stake_seen.clear();
        inner.orphans.clear();
        drop(inner);
        self.mempool.clear();
        self.orphan_txs.lock().clear();
    }

    fn create_genesis(&self, inner: &mut ChainInner) -> Result<(), ChainError> {
        let block = genesis::genesis_block(&self.params);
        let hash = block.hash();
        let (file, block_pos) = inner.files.append_block(&block)?;

        let mut entry = BlockIndex::from_block(&block, file, block_pos);
        entry.height = 0;
        entry.chain_trust = entry.block_trust();
        entry.set_stake_entropy_bit(stake::stake_entropy_bit(&hash));
        entry.set_stake_modifier(
            stake::next_stake_modifier(0, stake::stake_entropy_bit(&hash), &hash),
            true,
        );
        entry.stake_modifier_checksum = entry.compute_modifier_checksum(0);

        inner.db.txn_begin();
        let staged = (|| -> Result<(), DbError> {
            inner.db.write_block_index(&DiskBlockIndex::from_index(&entry))?;
            inner.db.write_best_chain(&hash)
        })();
        if let Err(e) = staged {
            inner.db.txn_abort();
            return Err(e.into());
        }
        inner.db.txn_commit()?;

        inner.genesis_hash = hash;
        inner.best_hash = hash;
        inner.best_height = 0;
        inner.best_trust = entry.chain_trust;
        inner.time_best_received = self.now();
        inner.index.insert(entry);

        info!(genesis = %hash, "created new chain");
        Ok(())
    }

    // --- block pipeline ---

    fn punish(&self, peer: Option<&dyn Peer>, score: u32) {
        if score > 0 {
            if let Some(peer) = peer {
                peer.misbehaving(score);
            }
        }
    }

    /// Entry point for candidate blocks from the network.
    pub fn process_block(
        &self,
        peer: Option<&dyn Peer>,
        block: Block,
    ) -> Result<BlockStatus, ChainError> {
        let hash = block.hash();

        if let Err(source) = self.check_block(&block) {
            self.punish(peer, source.dos_score());
            return Err(source.into());
        }

        let mut updates = Vec::new();
        {
            let mut guard = self.chain.lock();
            let inner = &mut *guard;

            if inner.index.contains(&hash) || inner.orphans.contains(&hash) {
                debug!(block = %hash, "already have block");
                return Ok(BlockStatus::AlreadyHave);
            }

            if !inner.index.contains(&block.header.hash_prev_block) {
                let wanted = inner.orphans.missing_root(&block);
                info!(block = %hash, missing = %wanted, "buffered orphan block");
                inner.orphans.insert(block.clone());
                if let Some(peer) = peer {
                    peer.request_blocks(inner.best_hash, wanted);
                }
                return Ok(BlockStatus::OrphanBuffered);
            }

            match self.accept_block(inner, &block) {
                Ok(u) => updates.push(u),
                Err(e) => {
                    self.punish(peer, e.dos_score());
                    return Err(e);
                }
            }

            // Re-drive any orphan whose ancestor just arrived.
            let mut parents = VecDeque::from(vec![hash]);
            while let Some(parent) = parents.pop_front() {
                for orphan in inner.orphans.take_children(&parent) {
                    let orphan_hash = orphan.hash();
                    if let Err(e) = self.check_block(&orphan) {
                        debug!(block = %orphan_hash, error = %e, "dropping invalid orphan");
                        continue;
                    }
                    match self.accept_block(inner, &orphan) {
                        Ok(u) => {
                            updates.push(u);
                            parents.push_back(orphan_hash);
                        }
                        Err(e) => {
                            debug!(block = %orphan_hash, error = %e, "orphan failed to connect")
                        }
                    }
                }
            }
        }

        self.apply_updates(updates);
        self.retry_orphan_txs();
        Ok(BlockStatus::Accepted)
    }

    /// Context-free block checks: everything decidable from the block
    /// bytes and the local clock.
    fn check_block(&self, block: &Block) -> Result<(), BlockError> {
        if block.vtx.is_empty() {
            return Err(BlockError::NoTransactions);
        }
        let size = block.serialized_size(SerMode::Full);
        if size > MAX_BLOCK_SIZE {
            return Err(BlockError::Oversized(size));
        }
        if block.header.time > future_drift(self.adjusted_time()) {
            return Err(BlockError::TimestampTooNew);
        }

        if !block.vtx[0].is_coinbase() {
            return Err(BlockError::FirstTxNotCoinbase);
        }
        if block.vtx[1..].iter().any(Transaction::is_coinbase) {
            return Err(BlockError::MultipleCoinbase);
        }

        let proof_of_stake = block.is_proof_of_stake();
        if proof_of_stake {
            // The coin-stake sits at slot one and nowhere else, the block
            // timestamp is the stake timestamp, and the coinbase mints
            // nothing.
            if block.vtx[2..].iter().any(Transaction::is_coin_stake) {
                return Err(BlockError::MisplacedCoinStake);
            }
            if block.header.time != block.vtx[1].time {
                return Err(BlockError::CoinStakeTimeMismatch {
                    block: block.header.time,
                    tx: block.vtx[1].time,
                });
            }
            if block.vtx[0].vout.len() != 1 || !block.vtx[0].vout[0].is_empty() {
                return Err(BlockError::NonEmptyStakeCoinbase);
            }
        } else {
            if block.vtx.iter().any(Transaction::is_coin_stake) {
                return Err(BlockError::MisplacedCoinStake);
            }
            compact::check_proof_of_work(&block.hash(), block.header.bits, &self.params.pow_limit)?;
        }

        for (index, tx) in block.vtx.iter().enumerate() {
            tx.check().map_err(|source| BlockError::Tx { index, source })?;
            if tx.time > block.header.time {
                return Err(BlockError::TxTimeAfterBlock(index));
            }
        }

        let mut sigops = 0;
        for tx in &block.vtx {
            for input in &tx.vin {
                sigops += script::sig_op_count(&input.sig_script);
            }
            for output in &tx.vout {
                sigops += script::sig_op_count(&output.pub_key_script);
            }
        }
        if sigops > MAX_BLOCK_SIGOPS {
            return Err(BlockError::TooManySigOps);
        }

        if block.header.hash_merkle_root != block.merkle_root() {
            return Err(BlockError::MerkleRootMismatch);
        }

        if proof_of_stake {
            if !self.engine.verify_block_signature(block) {
                return Err(BlockError::BadBlockSignature);
            }
        } else if !block.signature.is_empty() {
            return Err(BlockError::UnexpectedBlockSignature);
        }

        Ok(())
    }

    /// Contextual checks against the parent, then index insertion and, when
    /// the new node outranks the tip, the best-chain move.
    fn accept_block(
        &self,
        inner: &mut ChainInner,
        block: &Block,
    ) -> Result<ChainUpdates, ChainError> {
        let hash = block.hash();
        let parent = inner
            .index
            .get(&block.header.hash_prev_block)
            .cloned()
            .ok_or(BlockError::UnknownParent)?;
        let height = parent.height + 1;
        let proof_of_stake = block.is_proof_of_stake();

        let expected = self.target_required(&inner.index, &parent.hash, proof_of_stake);
        if block.header.bits != expected {
            return Err(BlockError::WrongTarget { got: block.header.bits, expected }.into());
        }

        if block.header.time <= inner.index.median_time_past(&parent.hash) {
            return Err(BlockError::TimestampBeforeMedian.into());
        }
        if block.header.time <= past_drift(self.adjusted_time()) {
            return Err(BlockError::TimestampTooOld.into());
        }

        for (index, tx) in block.vtx.iter().enumerate() {
            if !tx.is_final(height, block.header.time) {
                return Err(BlockError::NonFinalTx(index).into());
            }
        }

        let mut hash_proof_of_stake = Hash256::ZERO;
        let mut stake_pair = None;
        if proof_of_stake {
            let coin_stake = &block.vtx[1];
            let pair = (coin_stake.vin[0].prevout, coin_stake.time);
            if inner.stake_seen.contains(&pair) {
                return Err(BlockError::DuplicateStake.into());
            }
            let prevout = coin_stake.vin[0].prevout;
            let prev_index = inner
                .db
                .read_tx_index(&prevout.hash)?
                .ok_or(BlockError::StakeInputMissing)?;
            let prev_tx = inner.files.read_transaction(&prev_index.pos)?;
            let prev_out = prev_tx
                .vout
                .get(prevout.n as usize)
                .ok_or(BlockError::StakeInputMissing)?;
            hash_proof_of_stake = stake::check_stake_kernel(
                block.header.bits,
                parent.stake_modifier,
                prev_tx.time,
                prev_out.value,
                &prevout,
                coin_stake.time,
            )
            .map_err(BlockError::from)?;
            stake_pair = Some(pair);
        }

        let (file, block_pos) = inner.files.append_block(block)?;
        let mut entry = BlockIndex::from_block(block, file, block_pos);
        entry.height = height;
        entry.chain_trust = parent.chain_trust + entry.block_trust();
        entry.hash_proof_of_stake = hash_proof_of_stake;
        entry.set_stake_entropy_bit(stake::stake_entropy_bit(&hash));
        entry.set_stake_modifier(
            stake::next_stake_modifier(
                parent.stake_modifier,
                stake::stake_entropy_bit(&hash),
                &hash,
            ),
            true,
        );
        entry.stake_modifier_checksum = entry.compute_modifier_checksum(parent.stake_modifier_checksum);

        inner.db.txn_begin();
        let staged = (|| -> Result<(), DbError> {
            inner.db.write_block_index(&DiskBlockIndex::from_index(&entry))?;
            if let Some((prevout, time)) = &stake_pair {
                inner.db.write_stake_seen(prevout, *time)?;
            }
            Ok(())
        })();
        if let Err(e) = staged {
            inner.db.txn_abort();
            return Err(e.into());
        }
        inner.db.txn_commit()?;

        let chain_trust = entry.chain_trust;
        inner.index.insert(entry);
        if let Some(pair) = stake_pair {
            inner.stake_seen.insert(pair);
        }
        debug!(block = %hash, height, "accepted block");

        if chain_trust > inner.best_trust {
            self.set_best_chain(inner, &hash)
        } else {
            debug!(block = %hash, "block extends a side chain");
            Ok(ChainUpdates::default())
        }
    }

    /// Retargeting walk: the spacing of the two most recent blocks of the
    /// requested proof type feeds the moving-average filter.
    fn target_required(
        &self,
        index: &BlockIndexMap,
        prev_hash: &Hash256,
        proof_of_stake: bool,
    ) -> u32 {
        let Some(last) = index.last_of_type(prev_hash, proof_of_stake) else {
            return self.params.limit_bits(proof_of_stake);
        };
        let Some(before_last) = last.prev else {
            return self.params.limit_bits(proof_of_stake);
        };
        let Some(prev_last) = index.last_of_type(&before_last, proof_of_stake) else {
            return self.params.limit_bits(proof_of_stake);
        };
        let actual_spacing = last.time - prev_last.time;
        retarget::next_target(last.bits, actual_spacing, self.params.limit(proof_of_stake))
    }

    // --- connect / disconnect / reorganize ---

    /// Resolve every input of `tx` to its index record and source
    /// transaction, consulting the staged records of the block being
    /// connected first. A missing input at this stage is invalid, not
    /// transient.
    fn fetch_inputs(
        db: &TxDb,
        files: &BlockFiles,
        test_pool: &HashMap<Hash256, TxIndex>,
        tx_index_in_block: usize,
        tx: &Transaction,
    ) -> Result<HashMap<Hash256, (TxIndex, Arc<Transaction>)>, ChainError> {
        let mut fetched: HashMap<Hash256, (TxIndex, Arc<Transaction>)> = HashMap::new();
        for (n, input) in tx.vin.iter().enumerate() {
            let prev_hash = input.prevout.hash;
            if fetched.contains_key(&prev_hash) {
                continue;
            }
            let record = match test_pool.get(&prev_hash) {
                Some(record) => record.clone(),
                None => db.read_tx_index(&prev_hash)?.ok_or(BlockError::Tx {
                    index: tx_index_in_block,
                    source: TxError::MissingInput(n),
                })?,
            };
            let prev_tx = files.read_transaction(&record.pos)?;
            if prev_tx.hash() != prev_hash {
                return Err(DbError::Corrupt("transaction index points at wrong data").into());
            }
            fetched.insert(prev_hash, (record, Arc::new(prev_tx)));
        }
        Ok(fetched)
    }

    /// Depth of the block containing a generation transaction, measured
    /// from `height`.
    fn generation_depth(
        files: &BlockFiles,
        index: &BlockIndexMap,
        record: &TxIndex,
        height: i32,
    ) -> Result<i32, ChainError> {
        let header = files.read_header(record.pos.file, record.pos.block_pos)?;
        let entry = index
            .get(&header.hash())
            .ok_or(DbError::Corrupt("generation block missing from index"))?;
        Ok(height - entry.height)
    }

    /// Connect a block's transactions on top of the staged database state.
    /// Returns the index entry updated with mint and supply figures; all
    /// record writes stay inside the caller's transaction.
    fn connect_block(
        &self,
        inner: &mut ChainInner,
        staged_entries: &HashMap<Hash256, BlockIndex>,
        block: &Block,
        mut entry: BlockIndex,
    ) -> Result<BlockIndex, ChainError> {
        let offsets = block.tx_offsets();
        let mut test_pool: HashMap<Hash256, TxIndex> = HashMap::new();
        let mut checks: Vec<ScriptCheck> = Vec::new();
        let shared: Vec<Arc<Transaction>> =
            block.vtx.iter().map(|tx| Arc::new(tx.clone())).collect();

        let mut fees: i64 = 0;
        let mut stake_reward: i64 = 0;
        let mut stake_coin_age: u64 = 0;
        let mut value_in_total: i64 = 0;
        let mut value_out_total: i64 = 0;

        for (i, tx) in block.vtx.iter().enumerate() {
            let txid = tx.hash();
            let pos_this = DiskPos::new(entry.file, entry.block_pos, entry.block_pos + offsets[i]);
            let value_out = tx
                .value_out()
                .map_err(|source| BlockError::Tx { index: i, source })?;
            value_out_total = value_out_total
                .checked_add(value_out)
                .ok_or(BlockError::Tx { index: i, source: TxError::OutputSumOutOfRange })?;

            if !tx.is_coinbase() {
                let mut inputs =
                    Self::fetch_inputs(&inner.db, &inner.files, &test_pool, i, tx)?;

                let mut value_in: i64 = 0;
                for (n, input) in tx.vin.iter().enumerate() {
                    let (record, prev_tx) = inputs
                        .get_mut(&input.prevout.hash)
                        .ok_or(DbError::Corrupt("fetched input disappeared"))?;
                    let out_n = input.prevout.n as usize;
                    if out_n >= prev_tx.vout.len() || out_n >= record.spent.len() {
                        return Err(BlockError::Tx {
                            index: i,
                            source: TxError::InputOutOfRange(n),
                        }
                        .into());
                    }
                    if prev_tx.time > tx.time {
                        return Err(BlockError::Tx {
                            index: i,
                            source: TxError::TimestampBeforeInput(n),
                        }
                        .into());
                    }
                    if prev_tx.is_coinbase() || prev_tx.is_coin_stake() {
                        let depth = Self::generation_depth(
                            &inner.files,
                            &inner.index,
                            record,
                            entry.height,
                        )?;
                        if depth < self.params.coinbase_maturity {
                            return Err(BlockError::Tx {
                                index: i,
                                source: TxError::ImmatureSpend { input: n, depth },
                            }
                            .into());
                        }
                    }
                    if !record.spent[out_n].is_null() {
                        return Err(BlockError::Tx {
                            index: i,
                            source: TxError::AlreadySpent(n),
                        }
                        .into());
                    }

                    let value = prev_tx.vout[out_n].value;
                    value_in = value
                        .checked_add(value_in)
                        .filter(|v| money_range(*v))
                        .ok_or(BlockError::Tx {
                            index: i,
                            source: TxError::InputValueOutOfRange,
                        })?;

                    checks.push(ScriptCheck {
                        tx_from: Arc::clone(prev_tx),
                        tx_to: Arc::clone(&shared[i]),
                        n_in: n,
                        flags: STRICT_FLAGS,
                    });

                    record.spent[out_n] = pos_this;
                }

                if tx.is_coin_stake() {
                    stake_reward = value_out - value_in;
                    let age_inputs: Vec<(i64, i64)> = tx
                        .vin
                        .iter()
                        .filter_map(|input| {
                            inputs.get(&input.prevout.hash).map(|(_, prev_tx)| {
                                (prev_tx.vout[input.prevout.n as usize].value, prev_tx.time)
                            })
                        })
                        .collect();
                    stake_coin_age = stake::transaction_coin_age(tx.time, &age_inputs);
                } else {
                    if value_in < value_out {
                        return Err(BlockError::Tx {
                            index: i,
                            source: TxError::InputsBelowOutputs,
                        }
                        .into());
                    }
                    fees = fees
                        .checked_add(value_in - value_out)
                        .ok_or(BlockError::Tx {
                            index: i,
                            source: TxError::InputValueOutOfRange,
                        })?;
                }

                value_in_total = value_in_total
                    .checked_add(value_in)
                    .ok_or(BlockError::Tx { index: i, source: TxError::InputValueOutOfRange })?;

                for (hash, (record, _)) in inputs {
                    test_pool.insert(hash, record);
                }
            }

            test_pool.insert(txid, TxIndex::new(pos_this, tx.vout.len()));
        }

        if block.is_proof_of_work() {
            let limit = reward::proof_of_work_reward(block.header.bits, fees, &self.params.pow_limit);
            let got = block.vtx[0]
                .value_out()
                .map_err(|source| BlockError::Tx { index: 0, source })?;
            if got > limit {
                return Err(BlockError::CoinbaseRewardTooHigh { got, limit }.into());
            }
        } else {
            let limit =
                reward::proof_of_stake_reward(stake_coin_age, block.header.bits, &self.params.pos_limit);
            if stake_reward > limit {
                return Err(BlockError::StakeRewardTooHigh { got: stake_reward, limit }.into());
            }
        }

        if !self.script_pool.dispatch(checks) {
            return Err(BlockError::ScriptBatchFailed.into());
        }

        // Fees are recycled existing coins; only the out-minus-in surplus
        // is newly minted and counts toward the supply.
        entry.mint = value_out_total - value_in_total;
        let parent_supply = entry
            .prev
            .and_then(|p| staged_entries.get(&p).or_else(|| inner.index.get(&p)))
            .map(|p| p.money_supply)
            .unwrap_or(0);
        entry.money_supply = parent_supply + entry.mint;

        for (hash, record) in &test_pool {
            inner.db.write_tx_index(hash, record)?;
        }

        Ok(entry)
    }

    /// Undo a connected block: restore each spent slot of the producer
    /// transactions and drop this block's own records.
    fn disconnect_block(db: &mut TxDb, block: &Block) -> Result<(), ChainError> {
        for tx in block.vtx.iter().rev() {
            if !tx.is_coinbase() {
                for input in &tx.vin {
                    let prevout = input.prevout;
                    let mut record = db
                        .read_tx_index(&prevout.hash)?
                        .ok_or(DbError::Corrupt("spend target missing during disconnect"))?;
                    let slot = record
                        .spent
                        .get_mut(prevout.n as usize)
                        .ok_or(DbError::Corrupt("spent slot out of range"))?;
                    *slot = DiskPos::null();
                    db.write_tx_index(&prevout.hash, &record)?;
                }
            }
            db.erase_tx_index(&tx.hash())?;
        }
        Ok(())
    }

    /// Move the best chain to `new_hash`.
    ///
    /// Computes the fork point, disconnects the old branch in reverse,
    /// connects the new branch in order, and commits every record write in
    /// one database transaction. On failure, nothing moves: the batch is
    /// aborted and the in-memory pointers keep their previous values.
    fn set_best_chain(
        &self,
        inner: &mut ChainInner,
        new_hash: &Hash256,
    ) -> Result<ChainUpdates, ChainError> {
        if inner.best_hash == *new_hash {
            return Ok(ChainUpdates::default());
        }
        let new_entry = inner.entry(new_hash)?.clone();

        // Fork point: walk the higher side down to equal height, then both
        // sides in lock-step.
        let fork = {
            let mut a = inner.entry(&inner.best_hash)?.clone();
            let mut b = new_entry.clone();
            while b.height > a.height {
                let prev = b.prev.ok_or(DbError::Corrupt("chain walk fell off genesis"))?;
                b = inner.entry(&prev)?.clone();
            }
            while a.height > b.height {
                let prev = a.prev.ok_or(DbError::Corrupt("chain walk fell off genesis"))?;
                a = inner.entry(&prev)?.clone();
            }
            while a.hash != b.hash {
                let pa = a.prev.ok_or(DbError::Corrupt("chain walk fell off genesis"))?;
                let pb = b.prev.ok_or(DbError::Corrupt("chain walk fell off genesis"))?;
                a = inner.entry(&pa)?.clone();
                b = inner.entry(&pb)?.clone();
            }
            a.hash
        };

        let mut to_disconnect = Vec::new();
        {
            let mut cursor = inner.best_hash;
            while cursor != fork {
                to_disconnect.push(cursor);
                cursor = inner
                    .entry(&cursor)?
                    .prev
                    .ok_or(DbError::Corrupt("chain walk fell off genesis"))?;
            }
        }
        let mut to_connect = Vec::new();
        {
            let mut cursor = *new_hash;
            while cursor != fork {
                to_connect.push(cursor);
                cursor = inner
                    .entry(&cursor)?
                    .prev
                    .ok_or(DbError::Corrupt("chain walk fell off genesis"))?;
            }
            to_connect.reverse();
        }

        if !to_disconnect.is_empty() {
            info!(
                fork = %fork,
                disconnecting = to_disconnect.len(),
                connecting = to_connect.len(),
                "chain reorganization"
            );
        }

        let mut disconnect_blocks = Vec::with_capacity(to_disconnect.len());
        for hash in &to_disconnect {
            let e = inner.entry(hash)?;
            disconnect_blocks.push(inner.files.read_block(e.file, e.block_pos)?);
        }
        let mut connect_blocks = Vec::with_capacity(to_connect.len());
        for hash in &to_connect {
            let e = inner.entry(hash)?;
            connect_blocks.push(inner.files.read_block(e.file, e.block_pos)?);
        }

        inner.db.txn_begin();
        let mut staged: HashMap<Hash256, BlockIndex> = HashMap::new();
        let result = (|inner: &mut ChainInner,
                       staged: &mut HashMap<Hash256, BlockIndex>|
         -> Result<(), ChainError> {
            for block in &disconnect_blocks {
                Self::disconnect_block(&mut inner.db, block)?;
            }
            for (hash, block) in to_connect.iter().zip(&connect_blocks) {
                let entry = inner.entry(hash)?.clone();
                let connected = self.connect_block(inner, staged, block, entry)?;
                staged.insert(*hash, connected);
            }

            // Relink: the old branch loses its next-pointers, the new
            // branch is chained from the fork.
            for hash in &to_disconnect {
                let mut e = staged
                    .get(hash)
                    .cloned()
                    .unwrap_or(inner.entry(hash)?.clone());
                e.next = None;
                staged.insert(*hash, e);
            }
            let mut link_prev = fork;
            for hash in &to_connect {
                let mut e = staged
                    .get(&link_prev)
                    .cloned()
                    .unwrap_or(inner.entry(&link_prev)?.clone());
                e.next = Some(*hash);
                staged.insert(link_prev, e);
                link_prev = *hash;
            }
            let mut tip = staged
                .get(new_hash)
                .cloned()
                .unwrap_or(inner.entry(new_hash)?.clone());
            tip.next = None;
            staged.insert(*new_hash, tip);

            for entry in staged.values() {
                inner.db.write_block_index(&DiskBlockIndex::from_index(entry))?;
            }
            inner.db.write_best_chain(new_hash)?;
            Ok(())
        })(inner, &mut staged);

        if let Err(e) = result {
            inner.db.txn_abort();
            self.invalid_chain_found(inner, &new_entry);
            return Err(e);
        }
        inner.db.txn_commit()?;

        for entry in staged.into_values() {
            inner.index.insert(entry);
        }
        inner.best_hash = *new_hash;
        inner.best_height = new_entry.height;
        inner.best_trust = new_entry.chain_trust;
        inner.time_best_received = self.now();

        info!(
            height = inner.best_height,
            best = %inner.best_hash,
            trust = %inner.best_trust,
            "new best chain"
        );

        Ok(ChainUpdates { disconnected: disconnect_blocks, connected: connect_blocks })
    }

    fn invalid_chain_found(&self, inner: &mut ChainInner, entry: &BlockIndex) {
        if entry.chain_trust > inner.best_invalid_trust {
            inner.best_invalid_trust = entry.chain_trust;
            if let Err(e) = inner.db.write_best_invalid_trust(&inner.best_invalid_trust) {
                warn!(error = %e, "failed to persist invalid-chain trust");
            }
        }
        warn!(block = %entry.hash, height = entry.height, "invalid chain found");
    }

    /// Mempool and wallet follow-up once the chain lock is released.
    fn apply_updates(&self, updates: Vec<ChainUpdates>) {
        for update in updates {
            for block in &update.disconnected {
                // Resurrect the user transactions of abandoned blocks.
                for tx in &block.vtx {
                    if !tx.is_coinbase() && !tx.is_coin_stake() && tx.check().is_ok() {
                        let _ = self.mempool.insert(tx.clone());
                    }
                }
                for tx in &block.vtx {
                    self.notifiers.sync_with_wallets(tx, Some(block), false, false);
                }
            }
            for block in &update.connected {
                for tx in &block.vtx {
                    self.mempool.remove(tx);
                    self.mempool.remove_conflicts(tx);
                }
                for tx in &block.vtx {
                    self.notifiers.sync_with_wallets(tx, Some(block), true, true);
                }
            }
        }
    }

    // --- mempool admission ---

    /// Entry point for loose transactions from the network.
    pub fn accept_to_memory_pool(&self, tx: Transaction) -> Result<TxStatus, ChainError> {
        tx.check().map_err(ChainError::Tx)?;
        if tx.is_coinbase() {
            return Err(MempoolError::CoinbaseRejected.into());
        }
        if tx.is_coin_stake() {
            return Err(MempoolError::CoinStakeRejected.into());
        }
        let txid = tx.hash();
        if self.mempool.exists(&txid) {
            return Err(MempoolError::AlreadyInPool.into());
        }
        script::check_standard(&tx).map_err(MempoolError::NotStandard)?;

        // Pool-sourced parents are snapshotted before the chain lock so the
        // mempool lock is never taken underneath it.
        let mut pool_parents: HashMap<Hash256, Transaction> = HashMap::new();
        for input in &tx.vin {
            if let Some(parent) = self.mempool.lookup(&input.prevout.hash) {
                pool_parents.insert(input.prevout.hash, parent);
            }
        }

        let verdict = {
            let inner = self.chain.lock();
            self.validate_pool_tx(&inner, &tx, &pool_parents)
        };
        let fee = match verdict {
            Ok(fee) => fee,
            Err(ChainError::Mempool(MempoolError::MissingInputs)) => {
                self.store_orphan_tx(tx);
                return Ok(TxStatus::Orphaned);
            }
            Err(e) => return Err(e),
        };

        self.mempool.insert(tx.clone()).map_err(ChainError::Mempool)?;
        debug!(tx = %txid, fee, "accepted transaction to memory pool");
        self.notifiers.sync_with_wallets(&tx, None, true, true);
        Ok(TxStatus::Accepted)
    }

    /// The mempool acceptance ruleset: finality, duplication, input
    /// resolution, standardness of the spent outputs, value conservation,
    /// the relay fee floor, and script verification with standard flags.
    fn validate_pool_tx(
        &self,
        inner: &ChainInner,
        tx: &Transaction,
        pool_parents: &HashMap<Hash256, Transaction>,
    ) -> Result<i64, ChainError> {
        if !tx.is_final(inner.best_height + 1, self.adjusted_time()) {
            return Err(MempoolError::NonFinal.into());
        }
        if inner.db.contains_tx(&tx.hash())? {
            return Err(MempoolError::AlreadyKnown.into());
        }

        let mut value_in: i64 = 0;
        for (n, input) in tx.vin.iter().enumerate() {
            let prev_hash = input.prevout.hash;
            let out_n = input.prevout.n as usize;

            let prev_tx: Transaction = match pool_parents.get(&prev_hash) {
                Some(parent) => parent.clone(),
                None => {
                    let Some(record) = inner.db.read_tx_index(&prev_hash)? else {
                        return Err(MempoolError::MissingInputs.into());
                    };
                    if out_n < record.spent.len() && !record.spent[out_n].is_null() {
                        return Err(ChainError::Tx(TxError::AlreadySpent(n)));
                    }
                    let prev_tx = inner.files.read_transaction(&record.pos)?;
                    if prev_tx.is_coinbase() || prev_tx.is_coin_stake() {
                        let depth = Self::generation_depth(
                            &inner.files,
                            &inner.index,
                            &record,
                            inner.best_height + 1,
                        )?;
                        if depth < self.params.coinbase_maturity {
                            return Err(ChainError::Tx(TxError::ImmatureSpend {
                                input: n,
                                depth,
                            }));
                        }
                    }
                    prev_tx
                }
            };

            let Some(prev_out) = prev_tx.vout.get(out_n) else {
                return Err(ChainError::Tx(TxError::InputOutOfRange(n)));
            };
            if prev_tx.time > tx.time {
                return Err(ChainError::Tx(TxError::TimestampBeforeInput(n)));
            }
            if script::solve(&prev_out.pub_key_script).is_none() {
                return Err(MempoolError::InputsNotStandard.into());
            }
            value_in = prev_out
                .value
                .checked_add(value_in)
                .filter(|v| money_range(*v))
                .ok_or(ChainError::Tx(TxError::InputValueOutOfRange))?;

            if !self
                .engine
                .verify_input(&prev_tx, tx, n, STANDARD_SCRIPT_VERIFY_FLAGS)
            {
                return Err(ChainError::Tx(TxError::ScriptFailed(n)));
            }
        }

        let value_out = tx.value_out().map_err(ChainError::Tx)?;
        if value_in < value_out {
            return Err(ChainError::Tx(TxError::InputsBelowOutputs));
        }
        let fee = value_in - value_out;
        let required = min_relay_fee(tx.serialized_size(SerMode::Full));
        if fee < required {
            return Err(MempoolError::FeeTooLow { fee, required }.into());
        }
        Ok(fee)
    }

    fn store_orphan_tx(&self, tx: Transaction) {
        let txid = tx.hash();
        let mut orphans = self.orphan_txs.lock();
        if orphans.len() >= MAX_ORPHAN_TRANSACTIONS {
            if let Some(evict) = orphans.keys().next().copied() {
                orphans.remove(&evict);
            }
        }
        debug!(tx = %txid, "buffered orphan transaction");
        orphans.insert(txid, tx);
    }

    /// Re-try buffered orphan transactions after chain activity; resolved
    /// and permanently invalid ones leave the buffer.
    fn retry_orphan_txs(&self) {
        let candidates: Vec<(Hash256, Transaction)> = {
            let orphans = self.orphan_txs.lock();
            orphans.iter().map(|(k, v)| (*k, v.clone())).collect()
        };
        for (txid, tx) in candidates {
            match self.accept_to_memory_pool(tx) {
                Ok(TxStatus::Accepted) => {
                    self.orphan_txs.lock().remove(&txid);
                    debug!(tx = %txid, "orphan transaction resolved");
                }
                Ok(TxStatus::Orphaned) => {}
                Err(e) => {
                    self.orphan_txs.lock().remove(&txid);
                    debug!(tx = %txid, error = %e, "evicting invalid orphan transaction");
                }
            }
        }
    }
}
