//! In-memory staging area for unconfirmed transactions.
//!
//! Two maps under one mutex: `map_tx` keyed by txid, and `map_next_tx`
//! mapping every claimed outpoint to its spender. At most one pool
//! transaction may spend any given outpoint; a second claimant is rejected,
//! never evicted in favor of. Contextual validation (inputs, fees, scripts)
//! is the validator's job; the pool itself enforces only the conflict
//! discipline.

use std::collections::HashMap;

use parking_lot::Mutex;

use cinder_core::constants::MIN_RELAY_TX_FEE;
use cinder_core::hash::Hash256;
use cinder_core::types::{OutPoint, Transaction};

use crate::error::MempoolError;

/// Relay fee floor for a transaction of the given serialized size: the
/// base fee plus one increment per started kilobyte.
pub fn min_relay_fee(bytes: usize) -> i64 {
    (1 + bytes as i64 / 1000) * MIN_RELAY_TX_FEE
}

#[derive(Default)]
struct MempoolInner {
    map_tx: HashMap<Hash256, Transaction>,
    /// outpoint → (spender txid, input index)
    map_next_tx: HashMap<OutPoint, (Hash256, usize)>,
    /// Bumped on every mutation; peers use it to detect pool churn.
    updated: u64,
}

#[derive(Default)]
pub struct Mempool {
    inner: Mutex<MempoolInner>,
}

impl Mempool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a validated transaction, refusing duplicates and input
    /// conflicts atomically.
    pub fn insert(&self, tx: Transaction) -> Result<Hash256, MempoolError> {
        let txid = tx.hash();
        let mut inner = self.inner.lock();
        if inner.map_tx.contains_key(&txid) {
            return Err(MempoolError::AlreadyInPool);
        }
        for input in &tx.vin {
            if inner.map_next_tx.contains_key(&input.prevout) {
                return Err(MempoolError::Conflict(input.prevout));
            }
        }
        for (n, input) in tx.vin.iter().enumerate() {
            inner.map_next_tx.insert(input.prevout, (txid, n));
        }
        inner.map_tx.insert(txid, tx);
        inner.updated += 1;
        Ok(txid)
    }

    /// Insert without conflict checks. The caller must have run the accept
    /// path; used when re-queueing transactions during a reorg.
    pub fn add_unchecked(&self, txid: Hash256, tx: Transaction) {
        let mut inner = self.inner.lock();
        for (n, input) in tx.vin.iter().enumerate() {
            inner.map_next_tx.insert(input.prevout, (txid, n));
        }
        inner.map_tx.insert(txid, tx);
        inner.updated += 1;
    }

    /// Remove a transaction and its outpoint claims. Returns whether it was
    /// present.
    pub fn remove(&self, tx: &Transaction) -> bool {
        let txid = tx.hash();
        let mut inner = self.inner.lock();
        match inner.map_tx.remove(&txid) {
            Some(stored) => {
                for input in &stored.vin {
                    inner.map_next_tx.remove(&input.prevout);
                }
                inner.updated += 1;
                true
            }
            None => false,
        }
    }

    /// Evict any pool transaction that spends an outpoint `tx` also spends.
    /// Called when a confirmed block claims those inputs.
    pub fn remove_conflicts(&self, tx: &Transaction) {
        let spenders: Vec<Hash256> = {
            let inner = self.inner.lock();
            tx.vin
                .iter()
                .filter_map(|input| inner.map_next_tx.get(&input.prevout).map(|(id, _)| *id))
                .collect()
        };
        for txid in spenders {
            if let Some(conflicted) = self.lookup(&txid) {
                self.remove(&conflicted);
            }
        }
    }

    pub fn clear(&self) {
        let mut inner = self.inner.lock();
        inner.map_tx.clear();
        inner.map_next_tx.clear();
        inner.updated += 1;
    }

    pub fn query_hashes(&self) -> Vec<Hash256> {
        self.inner.lock().map_tx.keys().copied().collect()
    }

    pub fn exists(&self, txid: &Hash256) -> bool {
        self.inner.lock().map_tx.contains_key(txid)
    }

    pub fn lookup(&self, txid: &Hash256) -> Option<Transaction> {
        self.inner.lock().map_tx.get(txid).cloned()
    }

    /// Txid currently claiming the outpoint, if any.
    pub fn spender_of(&self, outpoint: &OutPoint) -> Option<Hash256> {
        self.inner.lock().map_next_tx.get(outpoint).map(|(id, _)| *id)
    }

    pub fn size(&self) -> usize {
        self.inner.lock().map_tx.len()
    }

    pub fn transactions_updated(&self) -> u64 {
        self.inner.lock().updated
    }
}
