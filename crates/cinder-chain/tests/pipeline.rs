//! End-to-end pipeline scenarios: genesis bootstrap, chain extension,
//! double spends, reorganization, orphan resolution, and timestamp drift.

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use cinder_chain::genesis;
use cinder_chain::notify::{Peer, WalletNotifier};
use cinder_chain::rocks::RocksBackend;
use cinder_chain::scriptcheck::StructuralScriptEngine;
use cinder_chain::txdb::MemBackend;
use cinder_chain::{BlockError, BlockStatus, ChainError, ChainParams, TxStatus, Validator, ValidatorConfig};
use cinder_consensus::compact::check_proof_of_work;
use cinder_consensus::reward;
use cinder_core::constants::{CENT, COIN, MAX_MINT_PROOF_OF_WORK, ONE_HOUR};
use cinder_core::hash::Hash256;
use cinder_core::types::{Block, BlockHeader, OutPoint, Transaction, TxIn, TxOut};

const SPACING: i64 = 600;

// ----------------------------------------------------------------------
// Harness
// ----------------------------------------------------------------------

struct Harness {
    validator: Validator,
    params: ChainParams,
    clock: Arc<AtomicI64>,
    _dir: tempfile::TempDir,
}

impl Harness {
    fn new() -> Self {
        let params = ChainParams::test();
        let dir = tempfile::tempdir().unwrap();
        let clock = Arc::new(AtomicI64::new(params.genesis_time));
        let tick = Arc::clone(&clock);
        let validator = Validator::with_clock(
            params.clone(),
            Box::new(MemBackend::new()),
            dir.path().join("blocks"),
            Arc::new(StructuralScriptEngine),
            ValidatorConfig::default(),
            move || tick.load(Ordering::Relaxed),
        )
        .unwrap();
        validator.load_block_index(true).unwrap();
        Self { validator, params, clock, _dir: dir }
    }

    fn set_time(&self, time: i64) {
        self.clock.store(time, Ordering::Relaxed);
    }

    /// Submit a block with the local clock aligned to its timestamp.
    fn submit(&self, peer: Option<&dyn Peer>, block: &Block) -> Result<BlockStatus, ChainError> {
        if block.header.time > self.clock.load(Ordering::Relaxed) {
            self.set_time(block.header.time);
        }
        self.validator.process_block(peer, block.clone())
    }

    /// Build a proof-of-work block on `parent` carrying `txs` paying
    /// `fees` in total.
    fn pow_block(
        &self,
        parent: Hash256,
        time: i64,
        txs: Vec<Transaction>,
        fees: i64,
        key: u8,
    ) -> Block {
        let bits = self.validator.next_target_required(&parent, false);
        let value = reward::proof_of_work_reward(bits, fees, &self.params.pow_limit);
        let mut vtx = vec![coinbase(time, value, key)];
        vtx.extend(txs);

        let mut block = Block {
            header: BlockHeader {
                version: 6,
                hash_prev_block: parent,
                hash_merkle_root: Hash256::ZERO,
                time,
                bits,
                nonce: 0,
            },
            vtx,
            signature: Vec::new(),
        };
        block.header.hash_merkle_root = block.merkle_root();
        while check_proof_of_work(&block.hash(), bits, &self.params.pow_limit).is_err() {
            block.header.nonce += 1;
        }
        block
    }

    /// Extend the current best chain by `count` empty blocks; returns the
    /// new tip hash.
    fn grow(&self, count: usize) -> Hash256 {
        let mut parent = self.validator.best_hash();
        for i in 0..count {
            let time = self.tip_time() + SPACING;
            let block = self.pow_block(parent, time, Vec::new(), 0, 0x10 + i as u8);
            assert_eq!(self.submit(None, &block).unwrap(), BlockStatus::Accepted);
            parent = block.hash();
        }
        parent
    }

    fn tip_time(&self) -> i64 {
        self.clock.load(Ordering::Relaxed)
    }
}

fn p2pkh(seed: u8) -> Vec<u8> {
    let mut script = vec![0x76, 0xA9, 0x14];
    script.extend_from_slice(&[seed; 20]);
    script.extend_from_slice(&[0x88, 0xAC]);
    script
}

fn coinbase(time: i64, value: i64, key: u8) -> Transaction {
    let mut sig_script = vec![8u8];
    sig_script.extend_from_slice(&(time as u64).to_le_bytes());
    Transaction {
        version: 1,
        time,
        vin: vec![TxIn {
            prevout: OutPoint::null(),
            sig_script,
            sequence: u32::MAX,
        }],
        vout: vec![TxOut::new(value, p2pkh(key))],
        lock_time: 0,
    }
}

fn spend(prevout: OutPoint, value: i64, time: i64, key: u8) -> Transaction {
    Transaction {
        version: 1,
        time,
        vin: vec![TxIn::new(prevout, vec![0x02, 0xAB, key])],
        vout: vec![TxOut::new(value, p2pkh(key))],
        lock_time: 0,
    }
}

#[derive(Default)]
struct RecordingPeer {
    scores: Mutex<Vec<u32>>,
    requests: Mutex<Vec<(Hash256, Hash256)>>,
}

impl Peer for RecordingPeer {
    fn misbehaving(&self, score: u32) {
        self.scores.lock().push(score);
    }
    fn request_blocks(&self, from_best: Hash256, wanted: Hash256) {
        self.requests.lock().push((from_best, wanted));
    }
}

#[derive(Default)]
struct RecordingWallet {
    events: Mutex<Vec<(Hash256, bool)>>,
}

impl WalletNotifier for RecordingWallet {
    fn sync_transaction(&self, tx: &Transaction, _: Option<&Block>, _: bool, connect: bool) {
        self.events.lock().push((tx.hash(), connect));
    }
}

// ----------------------------------------------------------------------
// Scenario 1: genesis load
// ----------------------------------------------------------------------

#[test]
fn genesis_load_creates_height_zero() {
    let h = Harness::new();
    assert_eq!(h.validator.best_height(), 0);
    assert_eq!(h.validator.best_hash(), genesis::genesis_hash(&h.params));
    assert_eq!(h.validator.block_index_len(), 1);
    assert!(h.validator.best_chain_trust() > primitive_types::U256::zero());
    assert!(h.validator.get_warnings().is_empty());
}

#[test]
fn load_without_allow_new_requires_records() {
    let dir = tempfile::tempdir().unwrap();
    let validator = Validator::new(
        ChainParams::test(),
        Box::new(MemBackend::new()),
        dir.path().join("blocks"),
        Arc::new(StructuralScriptEngine),
        ValidatorConfig::default(),
    )
    .unwrap();
    assert!(validator.load_block_index(false).is_err());
}

#[test]
fn chain_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let params = ChainParams::test();
    let clock = Arc::new(AtomicI64::new(params.genesis_time));

    let tip = {
        let tick = Arc::clone(&clock);
        let validator = Validator::with_clock(
            params.clone(),
            Box::new(RocksBackend::open(dir.path().join("db")).unwrap()),
            dir.path().join("blocks"),
            Arc::new(StructuralScriptEngine),
            ValidatorConfig::default(),
            move || tick.load(Ordering::Relaxed),
        )
        .unwrap();
        validator.load_block_index(true).unwrap();

        let mut parent = validator.best_hash();
        for i in 0..3 {
            let time = params.genesis_time + (i + 1) * SPACING;
            clock.store(time, Ordering::Relaxed);
            let bits = validator.next_target_required(&parent, false);
            let value = reward::proof_of_work_reward(bits, 0, &params.pow_limit);
            let mut block = Block {
                header: BlockHeader {
                    version: 6,
                    hash_prev_block: parent,
                    hash_merkle_root: Hash256::ZERO,
                    time,
                    bits,
                    nonce: 0,
                },
                vtx: vec![coinbase(time, value, i as u8)],
                signature: Vec::new(),
            };
            block.header.hash_merkle_root = block.merkle_root();
            while check_proof_of_work(&block.hash(), bits, &params.pow_limit).is_err() {
                block.header.nonce += 1;
            }
            validator.process_block(None, block.clone()).unwrap();
            parent = block.hash();
        }
        validator.best_hash()
    };

    let tick = Arc::clone(&clock);
    let reopened = Validator::with_clock(
        params.clone(),
        Box::new(RocksBackend::open(dir.path().join("db")).unwrap()),
        dir.path().join("blocks"),
        Arc::new(StructuralScriptEngine),
        ValidatorConfig::default(),
        move || tick.load(Ordering::Relaxed),
    )
    .unwrap();
    reopened.load_block_index(false).unwrap();
    assert_eq!(reopened.best_height(), 3);
    assert_eq!(reopened.best_hash(), tip);
}

// ----------------------------------------------------------------------
// Scenario 2: simple extension
// ----------------------------------------------------------------------

#[test]
fn simple_extension_advances_best_chain() {
    let h = Harness::new();
    let wallet = Arc::new(RecordingWallet::default());
    h.validator.register_wallet(wallet.clone());

    let genesis_hash = h.validator.best_hash();
    let block = h.pow_block(genesis_hash, h.params.genesis_time + SPACING, Vec::new(), 0, 1);
    assert_eq!(h.submit(None, &block).unwrap(), BlockStatus::Accepted);

    assert_eq!(h.validator.best_height(), 1);
    assert_eq!(h.validator.best_hash(), block.hash());
    assert!(h.validator.best_chain_trust() > primitive_types::U256::zero());

    let events = wallet.events.lock();
    assert_eq!(events.as_slice(), &[(block.vtx[0].hash(), true)]);
}

#[test]
fn duplicate_block_is_ignored() {
    let h = Harness::new();
    let block = h.pow_block(h.validator.best_hash(), h.params.genesis_time + SPACING, Vec::new(), 0, 1);
    assert_eq!(h.submit(None, &block).unwrap(), BlockStatus::Accepted);
    assert_eq!(h.submit(None, &block).unwrap(), BlockStatus::AlreadyHave);
    assert_eq!(h.validator.best_height(), 1);
}

#[test]
fn coinbase_overpay_is_rejected() {
    let h = Harness::new();
    let parent = h.validator.best_hash();
    let time = h.params.genesis_time + SPACING;
    let mut block = h.pow_block(parent, time, Vec::new(), 0, 1);
    block.vtx[0].vout[0].value += CENT;
    block.header.hash_merkle_root = block.merkle_root();
    while check_proof_of_work(&block.hash(), block.header.bits, &h.params.pow_limit).is_err() {
        block.header.nonce += 1;
    }

    let peer = RecordingPeer::default();
    let err = h.submit(Some(&peer), &block).unwrap_err();
    assert!(matches!(
        err,
        ChainError::Block(BlockError::CoinbaseRewardTooHigh { .. })
    ));
    assert_eq!(peer.scores.lock().as_slice(), &[100]);
    assert_eq!(h.validator.best_height(), 0);
}

#[test]
fn fees_do_not_inflate_money_supply() {
    let h = Harness::new();
    let funded = h.pow_block(h.validator.best_hash(), h.params.genesis_time + SPACING, Vec::new(), 0, 1);
    h.submit(None, &funded).unwrap();
    let source = OutPoint::new(funded.vtx[0].hash(), 0);
    let funded_value = funded.vtx[0].vout[0].value;
    h.grow(11);

    // Twelve subsidy-only blocks on top of the unspendable genesis.
    let supply_before = h.validator.money_supply();
    assert_eq!(supply_before, 12 * MAX_MINT_PROOF_OF_WORK);

    // A block whose coinbase claims a fee: the fee moves existing coins,
    // so the supply grows by the subsidy alone.
    let time = h.tip_time() + SPACING;
    let t = spend(source, funded_value - CENT, time, 0xF1);
    let block = h.pow_block(h.validator.best_hash(), time, vec![t], CENT, 0xF2);
    assert_eq!(h.submit(None, &block).unwrap(), BlockStatus::Accepted);
    assert_eq!(
        h.validator.money_supply(),
        supply_before + MAX_MINT_PROOF_OF_WORK
    );
}

// ----------------------------------------------------------------------
// Scenario 3: double spend inside a block
// ----------------------------------------------------------------------

#[test]
fn double_spend_in_block_scores_100() {
    let h = Harness::new();
    let funded = h.pow_block(h.validator.best_hash(), h.params.genesis_time + SPACING, Vec::new(), 0, 1);
    h.submit(None, &funded).unwrap();
    let source = OutPoint::new(funded.vtx[0].hash(), 0);
    let funded_value = funded.vtx[0].vout[0].value;

    // Mature the coinbase (testnet maturity is 10).
    h.grow(11);
    let tip = h.validator.best_hash();
    let tip_height = h.validator.best_height();

    let time = h.tip_time() + SPACING;
    let spend_a = spend(source, funded_value - CENT, time, 0xA1);
    let spend_b = spend(source, funded_value - 2 * CENT, time, 0xA2);
    let fees = 3 * CENT;
    let block = h.pow_block(tip, time, vec![spend_a, spend_b], fees, 0xA3);

    let peer = RecordingPeer::default();
    let err = h.submit(Some(&peer), &block).unwrap_err();
    assert_eq!(err.dos_score(), 100);
    assert_eq!(peer.scores.lock().as_slice(), &[100]);

    // The move was aborted: pointers unchanged, no record of the spends.
    assert_eq!(h.validator.best_hash(), tip);
    assert_eq!(h.validator.best_height(), tip_height);
    assert!(h.validator.get_transaction(&block.vtx[1].hash()).is_none());
    assert!(h.validator.get_transaction(&block.vtx[2].hash()).is_none());

    // The chain still accepts an honest block at the same height.
    let honest = h.pow_block(tip, time + SPACING, Vec::new(), 0, 0xA4);
    assert_eq!(h.submit(None, &honest).unwrap(), BlockStatus::Accepted);
    assert_eq!(h.validator.best_hash(), honest.hash());
}

// ----------------------------------------------------------------------
// Scenario 4: reorganization preserves mempool transactions
// ----------------------------------------------------------------------

#[test]
fn reorg_moves_tip_and_requeues_transactions() {
    let h = Harness::new();
    let wallet = Arc::new(RecordingWallet::default());
    h.validator.register_wallet(wallet.clone());

    let funded = h.pow_block(h.validator.best_hash(), h.params.genesis_time + SPACING, Vec::new(), 0, 1);
    h.submit(None, &funded).unwrap();
    let source = OutPoint::new(funded.vtx[0].hash(), 0);
    let funded_value = funded.vtx[0].vout[0].value;

    h.grow(11);
    let fork_base = h.validator.best_hash();
    let fork_time = h.tip_time();

    // Block A carries transaction T.
    let t = spend(source, funded_value - CENT, fork_time + SPACING, 0xB1);
    let t_hash = t.hash();
    let block_a = h.pow_block(fork_base, fork_time + SPACING, vec![t.clone()], CENT, 0xB2);
    assert_eq!(h.submit(None, &block_a).unwrap(), BlockStatus::Accepted);
    assert_eq!(h.validator.best_hash(), block_a.hash());
    assert!(h.validator.get_transaction(&t_hash).is_some());

    // A': equal-trust competitor. The incumbent keeps the tip.
    let block_a2 = h.pow_block(fork_base, fork_time + SPACING + 30, Vec::new(), 0, 0xC1);
    assert_eq!(h.submit(None, &block_a2).unwrap(), BlockStatus::Accepted);
    assert_eq!(h.validator.best_hash(), block_a.hash());

    // B' on top of A' outranks the incumbent and triggers the reorg.
    let block_b2 = h.pow_block(block_a2.hash(), fork_time + 2 * SPACING, Vec::new(), 0, 0xC2);
    assert_eq!(h.submit(None, &block_b2).unwrap(), BlockStatus::Accepted);

    assert_eq!(h.validator.best_hash(), block_b2.hash());
    assert_eq!(h.validator.best_height(), 14);

    // T came back to the pool and its confirmed copy is gone.
    assert!(h.validator.mempool().exists(&t_hash));
    assert!(h.validator.get_transaction(&t_hash).is_some());

    // The wallet saw T disconnect.
    assert!(wallet
        .events
        .lock()
        .iter()
        .any(|(hash, connect)| *hash == t_hash && !connect));

    // A block on the new chain may confirm T again: its input is unspent
    // once more after the disconnect.
    let block_c2 = h.pow_block(block_b2.hash(), fork_time + 3 * SPACING, vec![t.clone()], CENT, 0xC3);
    assert_eq!(h.submit(None, &block_c2).unwrap(), BlockStatus::Accepted);
    assert!(!h.validator.mempool().exists(&t_hash));
    let (_, containing) = h.validator.get_transaction(&t_hash).unwrap();
    assert_eq!(containing, Some(block_c2.hash()));
}

// ----------------------------------------------------------------------
// Scenario 5: orphan resolution
// ----------------------------------------------------------------------

#[test]
fn orphan_block_waits_for_its_parent() {
    let h = Harness::new();
    let genesis_hash = h.validator.best_hash();

    let b1 = h.pow_block(genesis_hash, h.params.genesis_time + SPACING, Vec::new(), 0, 1);
    let b2 = h.pow_block(b1.hash(), h.params.genesis_time + 2 * SPACING, Vec::new(), 0, 2);

    let peer = RecordingPeer::default();
    assert_eq!(
        h.submit(Some(&peer), &b2).unwrap(),
        BlockStatus::OrphanBuffered
    );
    assert_eq!(h.validator.orphan_block_count(), 1);
    assert_eq!(h.validator.best_height(), 0);
    // The peer was asked for the missing ancestor.
    assert_eq!(peer.requests.lock().as_slice(), &[(genesis_hash, b1.hash())]);

    // The parent arrives: both connect in order.
    assert_eq!(h.submit(None, &b1).unwrap(), BlockStatus::Accepted);
    assert_eq!(h.validator.best_height(), 2);
    assert_eq!(h.validator.best_hash(), b2.hash());
    assert_eq!(h.validator.orphan_block_count(), 0);
}

#[test]
fn orphan_chain_resolves_recursively() {
    let h = Harness::new();
    let genesis_hash = h.validator.best_hash();
    let t0 = h.params.genesis_time;

    let b1 = h.pow_block(genesis_hash, t0 + SPACING, Vec::new(), 0, 1);
    let b2 = h.pow_block(b1.hash(), t0 + 2 * SPACING, Vec::new(), 0, 2);
    let b3 = h.pow_block(b2.hash(), t0 + 3 * SPACING, Vec::new(), 0, 3);

    let peer = RecordingPeer::default();
    assert_eq!(h.submit(Some(&peer), &b3).unwrap(), BlockStatus::OrphanBuffered);
    assert_eq!(h.submit(Some(&peer), &b2).unwrap(), BlockStatus::OrphanBuffered);
    // The deepest missing ancestor is requested, not the direct parent.
    assert_eq!(peer.requests.lock()[1].1, b1.hash());

    assert_eq!(h.submit(None, &b1).unwrap(), BlockStatus::Accepted);
    assert_eq!(h.validator.best_height(), 3);
    assert_eq!(h.validator.best_hash(), b3.hash());
    assert_eq!(h.validator.orphan_block_count(), 0);
}

// ----------------------------------------------------------------------
// Scenario 6: timestamp drift
// ----------------------------------------------------------------------

#[test]
fn far_future_timestamp_is_rejected() {
    let h = Harness::new();
    let before = h.validator.block_index_len();
    let now = h.params.genesis_time;
    h.set_time(now);

    let block = h.pow_block(h.validator.best_hash(), now + 2 * ONE_HOUR + 10, Vec::new(), 0, 1);
    // Keep the local clock behind the block's timestamp.
    h.set_time(now);
    let peer = RecordingPeer::default();
    let err = h.validator.process_block(Some(&peer), block).unwrap_err();

    assert!(matches!(err, ChainError::Block(BlockError::TimestampTooNew)));
    assert_eq!(peer.scores.lock().as_slice(), &[50]);
    assert_eq!(h.validator.block_index_len(), before);
}

// ----------------------------------------------------------------------
// Mempool admission
// ----------------------------------------------------------------------

#[test]
fn mempool_accepts_standard_spend_and_rejects_conflicts() {
    let h = Harness::new();
    let funded = h.pow_block(h.validator.best_hash(), h.params.genesis_time + SPACING, Vec::new(), 0, 1);
    h.submit(None, &funded).unwrap();
    let source = OutPoint::new(funded.vtx[0].hash(), 0);
    let value = funded.vtx[0].vout[0].value;
    h.grow(11);

    let now = h.tip_time();
    let t = spend(source, value - CENT, now, 0xD1);
    assert_eq!(
        h.validator.accept_to_memory_pool(t.clone()).unwrap(),
        TxStatus::Accepted
    );
    assert!(h.validator.mempool().exists(&t.hash()));

    // A second spender of the same outpoint is refused, never swapped in.
    let rival = spend(source, value - 2 * CENT, now, 0xD2);
    assert!(matches!(
        h.validator.accept_to_memory_pool(rival).unwrap_err(),
        ChainError::Mempool(cinder_chain::MempoolError::Conflict(_))
    ));
    assert!(h.validator.mempool().exists(&t.hash()));

    // Confirming T clears the pool.
    let tip = h.validator.best_hash();
    let block = h.pow_block(tip, now + SPACING, vec![t.clone()], CENT, 0xD3);
    h.submit(None, &block).unwrap();
    assert!(!h.validator.mempool().exists(&t.hash()));
}

#[test]
fn mempool_rejects_fee_below_relay_floor() {
    let h = Harness::new();
    let funded = h.pow_block(h.validator.best_hash(), h.params.genesis_time + SPACING, Vec::new(), 0, 1);
    h.submit(None, &funded).unwrap();
    let source = OutPoint::new(funded.vtx[0].hash(), 0);
    let value = funded.vtx[0].vout[0].value;
    h.grow(11);

    let zero_fee = spend(source, value, h.tip_time(), 0xD4);
    assert!(matches!(
        h.validator.accept_to_memory_pool(zero_fee).unwrap_err(),
        ChainError::Mempool(cinder_chain::MempoolError::FeeTooLow { .. })
    ));
}

#[test]
fn mempool_buffers_transaction_with_unknown_inputs() {
    let h = Harness::new();
    let mystery = OutPoint::new(Hash256([0x77; 32]), 0);
    let orphan = spend(mystery, 10 * COIN, h.params.genesis_time, 0xD5);
    assert_eq!(
        h.validator.accept_to_memory_pool(orphan.clone()).unwrap(),
        TxStatus::Orphaned
    );
    assert_eq!(h.validator.orphan_tx_count(), 1);
    assert!(!h.validator.mempool().exists(&orphan.hash()));
}

#[test]
fn mempool_refuses_generation_transactions() {
    let h = Harness::new();
    let cb = coinbase(h.params.genesis_time, 50 * COIN, 9);
    assert!(matches!(
        h.validator.accept_to_memory_pool(cb).unwrap_err(),
        ChainError::Mempool(cinder_chain::MempoolError::CoinbaseRejected)
    ));
}

// ----------------------------------------------------------------------
// Proof of stake
// ----------------------------------------------------------------------

fn stake_setup(h: &Harness) -> (OutPoint, i64, i64) {
    // A funded, matured coinbase that will serve as the stake.
    let funded = h.pow_block(h.validator.best_hash(), h.params.genesis_time + SPACING, Vec::new(), 0, 1);
    h.submit(None, &funded).unwrap();
    h.grow(11);
    (
        OutPoint::new(funded.vtx[0].hash(), 0),
        funded.vtx[0].vout[0].value,
        funded.vtx[0].time,
    )
}

fn pos_block(h: &Harness, parent: Hash256, time: i64, stake: OutPoint, stake_value: i64) -> Block {
    let bits = h.validator.next_target_required(&parent, true);
    let coin_stake = Transaction {
        version: 1,
        time,
        vin: vec![TxIn::new(stake, vec![0x02, 0xEE, 0xFF])],
        vout: vec![TxOut::empty(), TxOut::new(stake_value, p2pkh(0xE1))],
        lock_time: 0,
    };
    let mut empty_coinbase = coinbase(time, 0, 0xE2);
    empty_coinbase.vout = vec![TxOut::empty()];

    let mut block = Block {
        header: BlockHeader {
            version: 6,
            hash_prev_block: parent,
            hash_merkle_root: Hash256::ZERO,
            time,
            bits,
            nonce: 0,
        },
        vtx: vec![empty_coinbase, coin_stake],
        signature: vec![0x01],
    };
    block.header.hash_merkle_root = block.merkle_root();
    block
}

#[test]
fn proof_of_stake_block_connects_after_min_age() {
    let h = Harness::new();
    let (stake, stake_value, stake_birth) = stake_setup(&h);

    // Move past the minimum stake age.
    let stake_time = stake_birth + 31 * 24 * 3600;
    let parent = h.validator.best_hash();
    let block = pos_block(&h, parent, stake_time, stake, stake_value);

    assert_eq!(h.submit(None, &block).unwrap(), BlockStatus::Accepted);
    assert_eq!(h.validator.best_hash(), block.hash());
    assert_eq!(h.validator.best_height(), 13);
}

#[test]
fn duplicate_stake_is_rejected() {
    let h = Harness::new();
    let (stake, stake_value, stake_birth) = stake_setup(&h);
    let stake_time = stake_birth + 31 * 24 * 3600;
    let parent = h.validator.best_hash();

    let first = pos_block(&h, parent, stake_time, stake, stake_value);
    h.submit(None, &first).unwrap();

    // Same (prevout, stake time) pair on a fresh block.
    let mut second = pos_block(&h, parent, stake_time, stake, stake_value);
    second.vtx[0].vin[0].sig_script = vec![0x02, 0x11, 0x22];
    second.header.hash_merkle_root = second.merkle_root();

    let err = h.submit(None, &second).unwrap_err();
    assert!(matches!(err, ChainError::Block(BlockError::DuplicateStake)));
}

#[test]
fn young_stake_is_rejected() {
    let h = Harness::new();
    let (stake, stake_value, stake_birth) = stake_setup(&h);

    // Ten days is under the minimum age.
    let stake_time = stake_birth + 10 * 24 * 3600;
    let parent = h.validator.best_hash();
    let block = pos_block(&h, parent, stake_time, stake, stake_value);

    let err = h.submit(None, &block).unwrap_err();
    assert!(matches!(
        err,
        ChainError::Block(BlockError::StakeKernelFailed)
    ));
}
